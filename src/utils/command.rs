//! Запуск внешних программ
//!
//! Аргументы передаются списком, без оболочки. Дочерний процесс убивается,
//! если future выполнения отброшен (отмена, таймаут, ошибка соседнего
//! интервала).

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};

use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{DubError, Result};

/// Сколько символов stderr сохранять в ошибке
const STDERR_TAIL: usize = 2000;

/// Run `program` with `args`, optionally feeding `stdin`, and return its output.
///
/// A non-zero exit becomes `DubError::MediaTool` carrying the tail of stderr.
pub async fn run_command<I, S>(program: &Path, args: I, stdin: Option<&[u8]>) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    let tool = tool_name(program);
    debug!("Running {} {:?}", program.display(), args);

    let mut child = Command::new(program)
        .args(&args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DubError::MediaTool {
            tool: tool.clone(),
            status: "spawn".to_string(),
            stderr: e.to_string(),
        })?;

    let pipe = child.stdin.take();
    let feed = async move {
        if let (Some(mut pipe), Some(input)) = (pipe, stdin) {
            pipe.write_all(input).await?;
            pipe.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    };

    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DubError::MediaTool {
            tool,
            status: output.status.to_string(),
            stderr: tail(stderr.trim(), STDERR_TAIL).to_string(),
        });
    }
    fed?;

    Ok(output)
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string())
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
