use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::ToolOverrides;
use crate::error::{DubError, Result};

/// Пути ко всем внешним программам, нужным конвейеру
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub whisper: PathBuf,
    pub argos_translate: PathBuf,
    pub piper: PathBuf,
}

impl ToolPaths {
    /// Resolve every tool up front so a missing binary fails before any work starts
    pub fn resolve(overrides: &ToolOverrides) -> Result<Self> {
        info!("Resolving external tools...");

        Ok(Self {
            ffmpeg: resolve_tool("ffmpeg", overrides.ffmpeg.as_deref())?,
            ffprobe: resolve_tool("ffprobe", overrides.ffprobe.as_deref())?,
            whisper: resolve_tool("whisper", overrides.whisper.as_deref())?,
            argos_translate: resolve_tool("argos-translate", overrides.argos_translate.as_deref())?,
            piper: resolve_tool("piper", overrides.piper.as_deref())?,
        })
    }
}

/// Find a tool either at the configured path or in PATH
pub fn resolve_tool(name: &str, configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            debug!("Using configured {} at {}", name, path.display());
            return Ok(path.to_path_buf());
        }
        // голое имя программы тоже допустимо
        return which::which(path).map_err(|_| DubError::ToolNotFound(path.display().to_string()));
    }

    match which::which(name) {
        Ok(path) => {
            info!("Found {} at {}", name, path.display());
            Ok(path)
        }
        Err(_) => Err(DubError::ToolNotFound(name.to_string())),
    }
}
