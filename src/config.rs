//! Модуль конфигурации библиотеки mediadubs
//!
//! Этот модуль содержит структуры и перечисления для настройки конвейера.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DubError, Result};

/// Размер модели Whisper для распознавания речи
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WhisperModel {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl WhisperModel {
    /// Получить строковое представление модели
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl std::str::FromStr for WhisperModel {
    type Err = DubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tiny" => Ok(Self::Tiny),
            "base" => Ok(Self::Base),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            other => Err(DubError::Configuration(format!(
                "unknown whisper model `{}`",
                other
            ))),
        }
    }
}

/// Параметры кодирования промежуточных клипов и результата
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncodingSettings {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    /// Частота дискретизации звука во всех клипах
    pub audio_sample_rate: u32,
    /// Количество каналов звука во всех клипах
    pub audio_channels: u16,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_sample_rate: 48000,
            audio_channels: 2,
        }
    }
}

/// Явные пути к внешним программам (иначе ищутся в PATH)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolOverrides {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub whisper: Option<PathBuf>,
    pub argos_translate: Option<PathBuf>,
    pub piper: Option<PathBuf>,
}

/// Конфигурация запуска дубляжа
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DubConfig {
    /// Модель Whisper
    pub whisper_model: WhisperModel,
    /// Максимальное количество одновременно рендерящихся интервалов
    pub max_concurrent_renders: usize,
    /// Ограничение времени на один этап (секунды)
    pub stage_timeout_secs: Option<u64>,
    /// Допустимое перекрытие соседних сегментов (секунды)
    pub overlap_tolerance: f64,
    /// Родительская директория для рабочей директории
    pub work_root: Option<PathBuf>,
    /// Директория установленных пакетов Argos Translate
    pub argos_packages_dir: Option<PathBuf>,
    pub encoding: EncodingSettings,
    pub tools: ToolOverrides,
}

impl Default for DubConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            whisper_model: WhisperModel::default(),
            max_concurrent_renders: workers.max(1),
            stage_timeout_secs: None,
            overlap_tolerance: 0.0,
            work_root: None,
            argos_packages_dir: None,
            encoding: EncodingSettings::default(),
            tools: ToolOverrides::default(),
        }
    }
}

impl DubConfig {
    /// Загрузить конфигурацию из JSON-файла
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_renders == 0 {
            return Err(DubError::Configuration(
                "max_concurrent_renders must be at least 1".to_string(),
            ));
        }
        if !self.overlap_tolerance.is_finite() || self.overlap_tolerance < 0.0 {
            return Err(DubError::Configuration(
                "overlap_tolerance must be a non-negative number".to_string(),
            ));
        }
        if self.stage_timeout_secs == Some(0) {
            return Err(DubError::Configuration(
                "stage_timeout_secs must be positive".to_string(),
            ));
        }
        if self.encoding.crf > 51 {
            return Err(DubError::Configuration(format!(
                "crf {} is out of range 0..=51",
                self.encoding.crf
            )));
        }
        if self.encoding.audio_sample_rate == 0 || self.encoding.audio_channels == 0 {
            return Err(DubError::Configuration(
                "audio sample rate and channel count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DubConfig::default();
        assert_eq!(config.whisper_model, WhisperModel::Base);
        assert!(config.max_concurrent_renders >= 1);
        assert_eq!(config.encoding.crf, 23);
        assert_eq!(config.encoding.preset, "veryfast");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "whisper_model": "small", "max_concurrent_renders": 3, "encoding": { "crf": 28 } }"#,
        )
        .unwrap();

        let config = DubConfig::from_file(&path).unwrap();

        assert_eq!(config.whisper_model, WhisperModel::Small);
        assert_eq!(config.max_concurrent_renders, 3);
        assert_eq!(config.encoding.crf, 28);
        assert_eq!(config.encoding.audio_sample_rate, 48000);
        assert!(config.tools.ffmpeg.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = DubConfig {
            max_concurrent_renders: 0,
            ..DubConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = DubConfig::default();
        config.encoding.crf = 60;
        assert!(config.validate().is_err());

        let config = DubConfig {
            overlap_tolerance: -0.1,
            ..DubConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_whisper_model_parsing() {
        assert_eq!("Medium".parse::<WhisperModel>().unwrap(), WhisperModel::Medium);
        assert!("huge".parse::<WhisperModel>().is_err());
    }
}
