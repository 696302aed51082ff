//! Модуль для работы с аудио
//!
//! Синтезированная речь хранится как моно PCM (f32) и записывается в WAV
//! перед передачей в ffmpeg.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::debug;

use crate::error::{DubError, Result};

/// Синтезированный звук: моно семплы и частота дискретизации
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Собирает семплы из сырых 16-битных little-endian данных
    pub fn from_pcm_s16le(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Длительность в секундах
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Записывает звук в 32-битный float WAV
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(DubError::Synthesis("sample rate is zero".to_string()));
        }

        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let mut writer = WavWriter::create(path, spec)?;
        for sample in &self.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;

        debug!(
            "Wrote {} samples ({:.3}s @ {} Hz) to {}",
            self.samples.len(),
            self.duration(),
            self.sample_rate,
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_duration_from_samples() {
        let audio = SynthesizedAudio::new(vec![0.0; 44100], 22050);
        assert_eq!(audio.duration(), 2.0);
        assert_eq!(SynthesizedAudio::new(Vec::new(), 0).duration(), 0.0);
    }

    #[test]
    fn test_pcm_conversion() {
        let bytes = [0x00, 0x00, 0xff, 0x7f, 0x01, 0x80];
        let audio = SynthesizedAudio::from_pcm_s16le(&bytes, 16000);

        assert_eq!(audio.samples.len(), 3);
        assert_eq!(audio.samples[0], 0.0);
        assert_eq!(audio.samples[1], 1.0);
        assert_eq!(audio.samples[2], -1.0);
    }

    #[test]
    fn test_write_wav() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("speech.wav");
        let audio = SynthesizedAudio::new(vec![0.25; 22050], 22050);

        audio.write_wav(&path).unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.duration(), 22050);
    }
}
