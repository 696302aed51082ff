use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use crate::error::{DubError, Result};
use crate::media::audio::SynthesizedAudio;
use crate::media::ffmpeg::path_arg;
use crate::utils::command::run_command;

/// Голосовая модель Piper, загружается один раз на запуск
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub model_path: PathBuf,
    pub config_path: PathBuf,
    /// Частота дискретизации, которую выдаёт модель
    pub sample_rate: u32,
    /// Код языка голоса, например `en_US`
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoiceConfig {
    audio: VoiceAudio,
    #[serde(default)]
    language: Option<VoiceLanguage>,
}

#[derive(Debug, Deserialize)]
struct VoiceAudio {
    sample_rate: u32,
}

#[derive(Debug, Deserialize)]
struct VoiceLanguage {
    code: String,
}

impl Voice {
    /// Загрузить голос: модель `.onnx` и конфигурацию `<модель>.json` рядом с ней
    pub fn load(model_path: &Path) -> Result<Self> {
        if !model_path.is_file() {
            return Err(DubError::FileNotFound(format!(
                "voice model {}",
                model_path.display()
            )));
        }

        let mut config_name = model_path.as_os_str().to_os_string();
        config_name.push(".json");
        let config_path = PathBuf::from(config_name);
        if !config_path.is_file() {
            return Err(DubError::FileNotFound(format!(
                "voice config {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: VoiceConfig = serde_json::from_str(&content).map_err(|e| {
            DubError::Synthesis(format!(
                "invalid voice config {}: {}",
                config_path.display(),
                e
            ))
        })?;
        if config.audio.sample_rate == 0 {
            return Err(DubError::Synthesis(format!(
                "voice config {} declares a zero sample rate",
                config_path.display()
            )));
        }

        let voice = Self {
            model_path: model_path.to_path_buf(),
            config_path,
            sample_rate: config.audio.sample_rate,
            language: config.language.map(|l| l.code),
        };
        info!(
            "Loaded voice {} ({} Hz, language {})",
            voice.model_path.display(),
            voice.sample_rate,
            voice.language.as_deref().unwrap_or("unknown")
        );
        Ok(voice)
    }

    /// Подходит ли голос для языка `code` (`es` подходит к `es_ES`)
    pub fn speaks(&self, code: &str) -> bool {
        match &self.language {
            Some(language) => {
                let primary = language.split(['_', '-']).next().unwrap_or(language);
                let wanted = code.split(['_', '-']).next().unwrap_or(code);
                primary.eq_ignore_ascii_case(wanted)
            }
            None => true,
        }
    }
}

/// Синтез речи из текста
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, voice: &Voice, text: &str) -> Result<SynthesizedAudio>;
}

/// Piper command-line synthesizer producing raw 16-bit mono PCM
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    program: PathBuf,
}

impl PiperSynthesizer {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

#[async_trait]
impl Synthesizer for PiperSynthesizer {
    async fn synthesize(&self, voice: &Voice, text: &str) -> Result<SynthesizedAudio> {
        let args = vec![
            "--model".to_string(),
            path_arg(&voice.model_path)?,
            "--config".to_string(),
            path_arg(&voice.config_path)?,
            "--output_raw".to_string(),
        ];

        // piper читает по строке на фразу
        let input = format!("{}\n", text.replace(['\n', '\r'], " "));
        let output = run_command(&self.program, args, Some(input.as_bytes()))
            .await
            .map_err(|e| DubError::Synthesis(e.to_string()))?;

        let audio = SynthesizedAudio::from_pcm_s16le(&output.stdout, voice.sample_rate);
        if audio.is_empty() {
            return Err(DubError::Synthesis(format!(
                "piper produced no audio for {:?}",
                text
            )));
        }
        debug!(
            "Synthesized {:.3}s of speech for {:?}",
            audio.duration(),
            text
        );
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_voice(dir: &Path, config: &str) -> PathBuf {
        let model = dir.join("es_ES-davefx-medium.onnx");
        std::fs::write(&model, b"onnx").unwrap();
        std::fs::write(dir.join("es_ES-davefx-medium.onnx.json"), config).unwrap();
        model
    }

    #[test]
    fn test_load_voice_reads_sample_rate() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model = write_voice(
            temp_dir.path(),
            r#"{"audio": {"sample_rate": 22050, "quality": "medium"}, "language": {"code": "es_ES"}, "num_speakers": 1}"#,
        );

        let voice = Voice::load(&model).unwrap();

        assert_eq!(voice.sample_rate, 22050);
        assert_eq!(voice.language.as_deref(), Some("es_ES"));
        assert!(voice.speaks("es"));
        assert!(!voice.speaks("de"));
    }

    #[test]
    fn test_missing_config_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model = temp_dir.path().join("voice.onnx");
        std::fs::write(&model, b"onnx").unwrap();

        assert!(matches!(Voice::load(&model), Err(DubError::FileNotFound(_))));
        assert!(matches!(
            Voice::load(&temp_dir.path().join("absent.onnx")),
            Err(DubError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_voice_without_language_speaks_anything() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model = write_voice(temp_dir.path(), r#"{"audio": {"sample_rate": 16000}}"#);

        let voice = Voice::load(&model).unwrap();

        assert!(voice.language.is_none());
        assert!(voice.speaks("fr"));
    }
}
