use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use crate::config::WhisperModel;
use crate::error::{DubError, Result};
use crate::media::ffmpeg::path_arg;
use crate::timeline::TranscriptSegment;
use crate::utils::command::run_command;

/// Распознавание речи во всём видео
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Вернуть упорядоченные сегменты речи; `scratch` принадлежит вызывающему
    async fn transcribe(
        &self,
        video: &Path,
        language: &str,
        scratch: &Path,
    ) -> Result<Vec<TranscriptSegment>>;
}

/// Whisper command-line tool
#[derive(Debug, Clone)]
pub struct WhisperCli {
    program: PathBuf,
    model: WhisperModel,
}

// Whisper JSON output; everything except segments is ignored
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

impl WhisperCli {
    pub fn new(program: PathBuf, model: WhisperModel) -> Self {
        Self { program, model }
    }
}

#[async_trait]
impl Transcriber for WhisperCli {
    async fn transcribe(
        &self,
        video: &Path,
        language: &str,
        scratch: &Path,
    ) -> Result<Vec<TranscriptSegment>> {
        info!(
            "Transcribing {} with whisper model {}",
            video.display(),
            self.model.as_str()
        );

        let args = vec![
            path_arg(video)?,
            "--model".to_string(),
            self.model.as_str().to_string(),
            "--language".to_string(),
            language.to_string(),
            "--task".to_string(),
            "transcribe".to_string(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            path_arg(scratch)?,
            "--verbose".to_string(),
            "False".to_string(),
        ];

        run_command(&self.program, args, None)
            .await
            .map_err(|e| DubError::Transcription(e.to_string()))?;

        let stem = video
            .file_stem()
            .ok_or_else(|| DubError::InvalidInput(format!("no file name: {}", video.display())))?;
        let json_path = scratch.join(format!("{}.json", stem.to_string_lossy()));
        let content = tokio::fs::read_to_string(&json_path).await.map_err(|e| {
            DubError::Transcription(format!(
                "whisper produced no transcript at {}: {}",
                json_path.display(),
                e
            ))
        })?;

        let segments = parse_whisper_json(&content)?;
        info!("Transcribed {} segments", segments.len());
        Ok(segments)
    }
}

/// Разобрать JSON-вывод whisper
pub fn parse_whisper_json(content: &str) -> Result<Vec<TranscriptSegment>> {
    let output: WhisperOutput = serde_json::from_str(content)
        .map_err(|e| DubError::Transcription(format!("malformed whisper output: {}", e)))?;

    let segments = output
        .segments
        .into_iter()
        .map(|s| TranscriptSegment::new(s.start, s.end, s.text))
        .collect::<Vec<_>>();
    debug!("Parsed {} whisper segments", segments.len());
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whisper_json() {
        let content = r#"{
            "text": " Hello there. How are you?",
            "segments": [
                {"id": 0, "seek": 0, "start": 0.0, "end": 2.4, "text": " Hello there.", "tokens": [1, 2], "temperature": 0.0},
                {"id": 1, "seek": 0, "start": 3.1, "end": 5.0, "text": " How are you?", "tokens": [3], "temperature": 0.0}
            ],
            "language": "en"
        }"#;

        let segments = parse_whisper_json(content).unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], TranscriptSegment::new(0.0, 2.4, " Hello there."));
        assert_eq!(segments[1].start, 3.1);
    }

    #[test]
    fn test_malformed_output_is_transcription_error() {
        let err = parse_whisper_json("{\"text\": \"\"}").unwrap_err();
        assert!(matches!(err, DubError::Transcription(_)));
    }
}
