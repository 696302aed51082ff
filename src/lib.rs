//! Основной файл библиотеки mediadubs
//!
//! Библиотека озвучивает видео на другом языке: распознаёт речь, переводит
//! каждый сегмент, синтезирует его выбранным голосом, подгоняет по времени
//! под исходный сегмент и собирает ролик той же длительности.

pub mod assemble;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod services;
pub mod timeline;
pub mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::config::DubConfig;
use crate::error::{DubError, Result};
use crate::media::FfmpegToolkit;
use crate::pipeline::{Collaborators, DubRequest, PipelineOrchestrator};
use crate::progress::ProgressUpdate;
use crate::services::{ArgosTranslator, PiperSynthesizer, Voice, WhisperCli};
use crate::utils::tools::ToolPaths;

/// Код языка: `en`, `pt_BR`, `zh-Hans`
static LANGUAGE_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}([_-][A-Za-z0-9]{2,8})?$").unwrap()
});

/// Основная структура для работы с библиотекой
pub struct Dubber {
    orchestrator: PipelineOrchestrator,
}

impl Dubber {
    /// Создать экземпляр с внешними программами, найденными в системе
    pub fn new(config: DubConfig) -> Result<Self> {
        config.validate()?;
        let tools = ToolPaths::resolve(&config.tools)?;

        let packages_dir = match &config.argos_packages_dir {
            Some(dir) => dir.clone(),
            None => ArgosTranslator::default_packages_dir()?,
        };
        let services = Collaborators {
            transcriber: Arc::new(WhisperCli::new(tools.whisper.clone(), config.whisper_model)),
            translator: Arc::new(ArgosTranslator::new(tools.argos_translate.clone(), packages_dir)),
            synthesizer: Arc::new(PiperSynthesizer::new(tools.piper.clone())),
            media: Arc::new(FfmpegToolkit::new(
                tools.ffmpeg.clone(),
                tools.ffprobe.clone(),
                config.encoding.clone(),
            )),
        };

        Ok(Self::with_collaborators(config, services))
    }

    /// Создать экземпляр с заданными исполнителями
    pub fn with_collaborators(config: DubConfig, services: Collaborators) -> Self {
        Self {
            orchestrator: PipelineOrchestrator::new(config, services),
        }
    }

    /// Установить получателя обновлений прогресса
    pub fn with_progress(self, sender: Sender<ProgressUpdate>) -> Self {
        Self {
            orchestrator: self.orchestrator.with_progress(sender),
        }
    }

    /// Озвучить `video` с языка `source_lang` на `target_lang` голосом `voice_model`.
    ///
    /// Результат пишется рядом с исходником как `<имя>_dubbed_<язык>.mp4`.
    pub async fn dub(
        &self,
        video: &Path,
        source_lang: &str,
        target_lang: &str,
        voice_model: &Path,
    ) -> Result<PathBuf> {
        self.dub_with_cancel(video, source_lang, target_lang, voice_model, CancellationToken::new())
            .await
    }

    /// То же, что [`Dubber::dub`], но с возможностью отмены
    pub async fn dub_with_cancel(
        &self,
        video: &Path,
        source_lang: &str,
        target_lang: &str,
        voice_model: &Path,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        validate_input(video, source_lang, target_lang)?;
        let video = std::path::absolute(video)?;
        let voice = Voice::load(voice_model)?;
        info!(
            "Voice {} ({} Hz)",
            voice.model_path.display(),
            voice.sample_rate
        );

        let request = DubRequest {
            output: output_path_for(&video, target_lang),
            video,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            voice: Arc::new(voice),
        };
        self.orchestrator.run(&request, cancel).await
    }
}

/// Путь результата: `<каталог>/<имя>_dubbed_<язык>.mp4`
pub fn output_path_for(video: &Path, target_lang: &str) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    let name = format!("{}_dubbed_{}.mp4", stem, target_lang);
    match video.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Проверить входное видео и коды языков до начала работы
pub fn validate_input(video: &Path, source_lang: &str, target_lang: &str) -> Result<()> {
    if !video.exists() {
        return Err(DubError::FileNotFound(video.display().to_string()));
    }
    if !video.is_file() {
        return Err(DubError::InvalidInput(format!(
            "{} is not a regular file",
            video.display()
        )));
    }

    for code in [source_lang, target_lang] {
        if !LANGUAGE_CODE.is_match(code) {
            return Err(DubError::InvalidInput(format!(
                "invalid language code {:?}",
                code
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_for() {
        assert_eq!(
            output_path_for(Path::new("/videos/talk.v2.mp4"), "es"),
            PathBuf::from("/videos/talk.v2_dubbed_es.mp4")
        );
        assert_eq!(
            output_path_for(Path::new("clip.mkv"), "pt_BR"),
            PathBuf::from("clip_dubbed_pt_BR.mp4")
        );
    }

    #[test]
    fn test_language_codes() {
        for code in ["en", "deu", "pt_BR", "zh-Hans"] {
            assert!(LANGUAGE_CODE.is_match(code), "{}", code);
        }
        for code in ["", "e", "english-language-name", "en;rm", "../en"] {
            assert!(!LANGUAGE_CODE.is_match(code), "{}", code);
        }
    }

    #[test]
    fn test_validate_input() {
        let temp_dir = tempfile::tempdir().unwrap();
        let video = temp_dir.path().join("talk.mp4");

        assert!(matches!(
            validate_input(&video, "en", "es"),
            Err(DubError::FileNotFound(_))
        ));
        assert!(matches!(
            validate_input(temp_dir.path(), "en", "es"),
            Err(DubError::InvalidInput(_))
        ));

        std::fs::write(&video, b"video").unwrap();
        assert!(validate_input(&video, "en", "es").is_ok());
        assert!(matches!(
            validate_input(&video, "en", "e s"),
            Err(DubError::InvalidInput(_))
        ));
    }
}
