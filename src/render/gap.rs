use std::path::Path;

use log::debug;

use crate::error::{RenderStep, Result};
use crate::media::AudioTrack;
use crate::render::{RenderContext, RenderedClip};
use crate::timeline::Interval;

/// Копирует участок без речи из исходного видео вместе со звуком
pub struct GapRenderer<'a> {
    context: &'a RenderContext,
}

impl<'a> GapRenderer<'a> {
    pub fn new(context: &'a RenderContext) -> Self {
        Self { context }
    }

    pub async fn render(&self, index: usize, interval: &Interval, scratch: &Path) -> Result<RenderedClip> {
        let output = scratch.join("gap.mp4");
        let audio = if self.context.source_has_audio {
            AudioTrack::Keep
        } else {
            AudioTrack::Silence
        };

        debug!(
            "Cutting gap #{} [{:.3}, {:.3})",
            index, interval.start, interval.end
        );
        self.context
            .media
            .cut(
                &self.context.source_video,
                interval.start,
                interval.end,
                audio,
                &output,
            )
            .await
            .map_err(|e| {
                e.in_render(index, interval.kind, interval.start, interval.end, RenderStep::Cut)
            })?;

        Ok(RenderedClip {
            path: output,
            kind: interval.kind,
            order: index,
            duration: interval.duration(),
        })
    }
}
