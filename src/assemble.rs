//! Сборка клипов в одно видео
//!
//! Клипы могут прийти в порядке завершения рендеринга; перед склейкой они
//! упорядочиваются по позиции на временной шкале.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::error::{DubError, Result};
use crate::media::MediaToolkit;
use crate::render::RenderedClip;

/// Частота кадров, если определить её по исходнику не удалось
const FALLBACK_FRAME_RATE: f64 = 25.0;

/// Итог сборки
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub clip_count: usize,
    /// Сумма ожидаемых длительностей клипов
    pub expected_duration: f64,
    /// Фактическая длительность результата
    pub actual_duration: f64,
    /// Допуск: один кадр на клип
    pub tolerance: f64,
}

impl AssemblyReport {
    pub fn drift(&self) -> f64 {
        (self.actual_duration - self.expected_duration).abs()
    }

    pub fn within_tolerance(&self) -> bool {
        self.drift() <= self.tolerance
    }
}

pub struct Assembler {
    media: Arc<dyn MediaToolkit>,
}

impl Assembler {
    pub fn new(media: Arc<dyn MediaToolkit>) -> Self {
        Self { media }
    }

    /// Упорядочить клипы по временной шкале и проверить, что позиции уникальны
    pub fn order_clips(mut clips: Vec<RenderedClip>) -> Result<Vec<RenderedClip>> {
        if clips.is_empty() {
            return Err(DubError::EmptyTimeline);
        }
        clips.sort_by_key(|clip| clip.order);
        if let Some(pair) = clips.windows(2).find(|pair| pair[0].order == pair[1].order) {
            return Err(DubError::InvalidInput(format!(
                "two clips claim timeline position {}",
                pair[0].order
            )));
        }
        Ok(clips)
    }

    /// Склеить клипы в `output`
    pub async fn assemble(
        &self,
        clips: Vec<RenderedClip>,
        output: &Path,
        frame_rate: Option<f64>,
    ) -> Result<AssemblyReport> {
        let clips = Self::order_clips(clips)?;
        let paths: Vec<PathBuf> = clips.iter().map(|clip| clip.path.clone()).collect();

        self.media.concat(&paths, output).await?;

        let expected_duration: f64 = clips.iter().map(|clip| clip.duration).sum();
        let actual_duration = self.media.probe_duration(output).await?;
        let frame = 1.0 / frame_rate.unwrap_or(FALLBACK_FRAME_RATE);
        let report = AssemblyReport {
            output: output.to_path_buf(),
            clip_count: clips.len(),
            expected_duration,
            actual_duration,
            tolerance: frame * clips.len() as f64,
        };

        if report.within_tolerance() {
            info!(
                "Assembled {} clips: {:.3}s (expected {:.3}s)",
                report.clip_count, actual_duration, expected_duration
            );
        } else {
            warn!(
                "Assembled duration {:.3}s drifts {:.3}s from expected {:.3}s (tolerance {:.3}s)",
                actual_duration,
                report.drift(),
                expected_duration,
                report.tolerance
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{AudioTrack, TempoPlan};
    use crate::timeline::IntervalKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingToolkit {
        concatenated: Mutex<Vec<PathBuf>>,
        output_duration: f64,
    }

    #[async_trait]
    impl MediaToolkit for RecordingToolkit {
        async fn probe_duration(&self, _path: &Path) -> Result<f64> {
            Ok(self.output_duration)
        }

        async fn probe_frame_rate(&self, _path: &Path) -> Result<Option<f64>> {
            Ok(Some(25.0))
        }

        async fn has_audio(&self, _path: &Path) -> Result<bool> {
            Ok(true)
        }

        async fn cut(&self, _: &Path, _: f64, _: f64, _: AudioTrack, _: &Path) -> Result<()> {
            unreachable!("assembler never cuts")
        }

        async fn stretch_audio(&self, _: &Path, _: &TempoPlan, _: f64, _: &Path) -> Result<()> {
            unreachable!("assembler never stretches")
        }

        async fn mux(&self, _: &Path, _: &Path, _: &Path) -> Result<()> {
            unreachable!("assembler never muxes")
        }

        async fn concat(&self, clips: &[PathBuf], _output: &Path) -> Result<()> {
            self.concatenated.lock().unwrap().extend_from_slice(clips);
            Ok(())
        }
    }

    fn clip(order: usize, kind: IntervalKind, duration: f64) -> RenderedClip {
        RenderedClip {
            path: PathBuf::from(format!("/work/{:05}.mp4", order)),
            kind,
            order,
            duration,
        }
    }

    #[tokio::test]
    async fn test_empty_clip_list() {
        let assembler = Assembler::new(Arc::new(RecordingToolkit::default()));

        let err = assembler
            .assemble(Vec::new(), Path::new("/work/out.mp4"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, DubError::EmptyTimeline));
    }

    #[tokio::test]
    async fn test_clips_are_joined_in_timeline_order() {
        let toolkit = Arc::new(RecordingToolkit {
            output_duration: 10.02,
            ..Default::default()
        });
        let assembler = Assembler::new(toolkit.clone());
        let clips = vec![
            clip(2, IntervalKind::Gap, 3.0),
            clip(0, IntervalKind::Gap, 2.0),
            clip(3, IntervalKind::Spoken, 1.0),
            clip(1, IntervalKind::Spoken, 3.0),
            clip(4, IntervalKind::Gap, 1.0),
        ];

        let report = assembler
            .assemble(clips, Path::new("/work/out.mp4"), Some(25.0))
            .await
            .unwrap();

        let joined = toolkit.concatenated.lock().unwrap().clone();
        let expected: Vec<PathBuf> = (0..5)
            .map(|i| PathBuf::from(format!("/work/{:05}.mp4", i)))
            .collect();
        assert_eq!(joined, expected);
        assert_eq!(report.expected_duration, 10.0);
        assert!((report.tolerance - 0.2).abs() < 1e-9);
        assert!(report.within_tolerance());
    }

    #[tokio::test]
    async fn test_drift_is_reported() {
        let toolkit = Arc::new(RecordingToolkit {
            output_duration: 4.0,
            ..Default::default()
        });
        let assembler = Assembler::new(toolkit);

        let report = assembler
            .assemble(vec![clip(0, IntervalKind::Gap, 5.0)], Path::new("/work/out.mp4"), Some(30.0))
            .await
            .unwrap();

        assert!(!report.within_tolerance());
        assert_eq!(report.drift(), 1.0);
    }

    #[test]
    fn test_duplicate_positions_are_rejected() {
        let clips = vec![clip(1, IntervalKind::Gap, 1.0), clip(1, IntervalKind::Spoken, 1.0)];
        assert!(matches!(
            Assembler::order_clips(clips),
            Err(DubError::InvalidInput(_))
        ));
    }
}
