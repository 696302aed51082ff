//! Рендеринг интервалов временной шкалы в отдельные клипы
//!
//! Каждый интервал рендерится независимо в собственную поддиректорию рабочей
//! директории и читает исходное видео только на чтение.

mod gap;
mod segment;

pub use gap::GapRenderer;
pub use segment::SegmentRenderer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::media::MediaToolkit;
use crate::services::{Synthesizer, Translator, Voice};
use crate::timeline::{Interval, IntervalKind};

/// Готовый клип на диске
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedClip {
    pub path: PathBuf,
    pub kind: IntervalKind,
    /// Позиция клипа на временной шкале
    pub order: usize,
    /// Ожидаемая длительность клипа в секундах
    pub duration: f64,
}

/// Общие зависимости рендеринга одного запуска
#[derive(Clone)]
pub struct RenderContext {
    pub source_video: PathBuf,
    pub source_lang: String,
    pub target_lang: String,
    pub voice: Arc<Voice>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub media: Arc<dyn MediaToolkit>,
    /// Есть ли у исходного видео звуковая дорожка
    pub source_has_audio: bool,
}

/// Отрендерить интервал подходящим рендерером
pub async fn render_interval(
    context: &RenderContext,
    index: usize,
    interval: &Interval,
    scratch: &Path,
) -> Result<RenderedClip> {
    match interval.kind {
        IntervalKind::Spoken => {
            SegmentRenderer::new(context)
                .render(index, interval, scratch)
                .await
        }
        IntervalKind::Gap => GapRenderer::new(context).render(index, interval, scratch).await,
    }
}
