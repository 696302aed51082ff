//! Модуль обработки ошибок библиотеки mediadubs
//!
//! Все этапы конвейера возвращают `DubError`. Ошибки рендеринга отдельных
//! интервалов оборачиваются в `DubError::Render`, чтобы было видно, какой
//! интервал и на каком шаге упал.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::timeline::IntervalKind;

/// Шаг рендеринга интервала, на котором произошла ошибка
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStep {
    Translate,
    Synthesize,
    Extract,
    Stretch,
    Mux,
    Cut,
}

impl fmt::Display for RenderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Translate => "translate",
            Self::Synthesize => "synthesize",
            Self::Extract => "extract",
            Self::Stretch => "stretch",
            Self::Mux => "mux",
            Self::Cut => "cut",
        };
        f.write_str(name)
    }
}

/// Ошибки библиотеки mediadubs
#[derive(Debug, Error)]
pub enum DubError {
    /// Ошибка движка распознавания речи
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Нет установленного пути перевода между языками
    #[error("No translation available: {from} -> {to}")]
    TranslationUnavailable { from: String, to: String },

    /// Ошибка перевода текста
    #[error("Translation error: {0}")]
    Translation(String),

    /// Ошибка синтеза речи
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Неположительная длительность в расчёте темпа
    #[error("Invalid duration: synthesized {synthesized:.3}s, target {target:.3}s")]
    InvalidDuration { synthesized: f64, target: f64 },

    /// Внешняя медиа-команда завершилась с ошибкой
    #[error("{tool} failed ({status}): {stderr}")]
    MediaTool {
        tool: String,
        status: String,
        stderr: String,
    },

    /// Пустой список клипов для сборки
    #[error("Nothing to assemble: the clip list is empty")]
    EmptyTimeline,

    /// Сегменты транскрипта перекрываются или идут не по порядку
    #[error("Segment {index} starts at {start:.3}s before the previous segment ends at {previous_end:.3}s")]
    Overlap {
        index: usize,
        start: f64,
        previous_end: f64,
    },

    /// Сегмент с некорректными временными метками
    #[error("Segment {index} has invalid bounds [{start}, {end})")]
    InvalidSegment { index: usize, start: f64, end: f64 },

    /// Ошибка рендеринга конкретного интервала
    #[error("Rendering {kind} interval #{index} [{start:.3}s, {end:.3}s) failed at {step}: {source}")]
    Render {
        index: usize,
        kind: IntervalKind,
        start: f64,
        end: f64,
        step: RenderStep,
        #[source]
        source: Box<DubError>,
    },

    /// Некорректные входные данные
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Файл не найден
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Внешняя программа не найдена
    #[error("Required tool `{0}` was not found in PATH")]
    ToolNotFound(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Этап не уложился в отведённое время
    #[error("Stage {stage} timed out after {after:?}")]
    Timeout { stage: String, after: Duration },

    /// Запуск был отменён
    #[error("Dub run was cancelled")]
    Cancelled,

    /// Задача рендеринга аварийно завершилась
    #[error("Render task aborted: {0}")]
    TaskAborted(String),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка чтения/записи WAV
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl DubError {
    /// Оборачивает ошибку контекстом интервала
    pub fn in_render(
        self,
        index: usize,
        kind: IntervalKind,
        start: f64,
        end: f64,
        step: RenderStep,
    ) -> Self {
        DubError::Render {
            index,
            kind,
            start,
            end,
            step,
            source: Box::new(self),
        }
    }

    /// Ошибка, вызванная отменой, а не сбоем
    pub fn is_cancellation(&self) -> bool {
        match self {
            DubError::Cancelled => true,
            DubError::Render { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}

/// Тип Result для библиотеки mediadubs
pub type Result<T> = std::result::Result<T, DubError>;
