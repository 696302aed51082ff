use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{DubError, RenderStep, Result};
use crate::media::{AudioTrack, SynthesizedAudio, TempoPlan};
use crate::render::{RenderContext, RenderedClip};
use crate::timeline::Interval;

/// Переводит, озвучивает и подгоняет по времени один интервал речи
pub struct SegmentRenderer<'a> {
    context: &'a RenderContext,
}

impl<'a> SegmentRenderer<'a> {
    pub fn new(context: &'a RenderContext) -> Self {
        Self { context }
    }

    pub async fn render(&self, index: usize, interval: &Interval, scratch: &Path) -> Result<RenderedClip> {
        let fail = |step: RenderStep| {
            move |e: DubError| e.in_render(index, interval.kind, interval.start, interval.end, step)
        };

        let text = interval
            .source_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DubError::InvalidInput("spoken interval without text".to_string()))
            .map_err(fail(RenderStep::Translate))?;
        let target = interval.duration();

        let tts_path = scratch.join("tts.wav");
        let video_path = scratch.join("vid.mp4");
        let stretched_path = scratch.join("tts_stretch.wav");
        let output = scratch.join("dub.mp4");

        // речь и немой видеофрагмент не зависят друг от друга
        let speech = async {
            let translated = self
                .context
                .translator
                .translate(text, &self.context.source_lang, &self.context.target_lang)
                .await
                .map_err(fail(RenderStep::Translate))?;
            debug!("#{} translated: {:?}", index, translated);

            let audio = self
                .context
                .synthesizer
                .synthesize(&self.context.voice, &translated)
                .await
                .map_err(fail(RenderStep::Synthesize))?;
            write_speech(audio, tts_path.clone())
                .await
                .map_err(fail(RenderStep::Synthesize))
        };
        let video = async {
            self.context
                .media
                .cut(
                    &self.context.source_video,
                    interval.start,
                    interval.end,
                    AudioTrack::Mute,
                    &video_path,
                )
                .await
                .map_err(fail(RenderStep::Extract))
        };
        let (speech_duration, ()) = tokio::try_join!(speech, video)?;

        let plan = TempoPlan::new(speech_duration, target).map_err(fail(RenderStep::Stretch))?;
        info!(
            "#{}: {:.3}s of speech into {:.3}s (tempo {:.3}, {} step(s))",
            index,
            speech_duration,
            target,
            plan.ratio(),
            plan.steps().len()
        );
        self.context
            .media
            .stretch_audio(&tts_path, &plan, target, &stretched_path)
            .await
            .map_err(fail(RenderStep::Stretch))?;

        self.context
            .media
            .mux(&video_path, &stretched_path, &output)
            .await
            .map_err(fail(RenderStep::Mux))?;

        Ok(RenderedClip {
            path: output,
            kind: interval.kind,
            order: index,
            duration: target,
        })
    }
}

/// Записать речь в WAV вне рабочих потоков tokio; возвращает длительность
async fn write_speech(audio: SynthesizedAudio, path: PathBuf) -> Result<f64> {
    if audio.is_empty() {
        return Err(DubError::Synthesis("synthesized audio is empty".to_string()));
    }
    tokio::task::spawn_blocking(move || {
        audio.write_wav(&path)?;
        Ok::<_, DubError>(audio.duration())
    })
    .await
    .map_err(|e| DubError::TaskAborted(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn test_speech_is_written_off_the_runtime() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("tts.wav");
        let audio = SynthesizedAudio::new(vec![0.25; 11025], 22050);

        let duration = write_speech(audio, path.clone()).await.unwrap();

        assert_eq!(duration, 0.5);
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.len(), 11025);
    }

    #[tokio::test]
    async fn test_empty_speech_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("tts.wav");

        let err = write_speech(SynthesizedAudio::new(Vec::new(), 22050), path.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, DubError::Synthesis(_)));
        assert!(!path.exists());
    }
}
