//! Модуль для работы с FFmpeg
//!
//! Все операции над медиафайлами, которые нужны конвейеру: измерение
//! длительности, нарезка, изменение темпа, сведение и склейка. Команды
//! собираются списком аргументов; пути делаются абсолютными, метки времени
//! проверяются до запуска.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};

use crate::config::EncodingSettings;
use crate::error::{DubError, Result};
use crate::media::tempo::TempoPlan;
use crate::utils::command::run_command;

/// Что делать со звуком при нарезке
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioTrack {
    /// Только видео, без звука
    Mute,
    /// Оригинальный звук, перекодированный в общий формат
    Keep,
    /// Сгенерированная тишина (у источника нет звуковой дорожки)
    Silence,
}

/// Операции медиа-инструментария, используемые конвейером
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Длительность файла в секундах
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Частота кадров первой видеодорожки, если её удаётся определить
    async fn probe_frame_rate(&self, path: &Path) -> Result<Option<f64>>;

    /// Есть ли у файла звуковая дорожка
    async fn has_audio(&self, path: &Path) -> Result<bool>;

    /// Вырезать `[start, end)` из видео
    async fn cut(
        &self,
        source: &Path,
        start: f64,
        end: f64,
        audio: AudioTrack,
        output: &Path,
    ) -> Result<()>;

    /// Применить цепочку темпа и привести звук ровно к `target_duration`
    async fn stretch_audio(
        &self,
        input: &Path,
        plan: &TempoPlan,
        target_duration: f64,
        output: &Path,
    ) -> Result<()>;

    /// Свести видео без звука с новой звуковой дорожкой
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;

    /// Склеить клипы по порядку с перекодированием
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<()>;
}

/// Реализация через бинарники ffmpeg/ffprobe
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    encoding: EncodingSettings,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, encoding: EncodingSettings) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            encoding,
        }
    }

    async fn run_ffmpeg(&self, args: Vec<String>) -> Result<()> {
        run_command(&self.ffmpeg, args, None).await?;
        Ok(())
    }

    async fn run_ffprobe(&self, args: Vec<String>) -> Result<String> {
        let output = run_command(&self.ffprobe, args, None).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path_arg(path)?,
        ];
        let raw = self.run_ffprobe(args).await?;
        let duration = parse_duration(&raw)?;
        debug!("Duration of {}: {:.3}s", path.display(), duration);
        Ok(duration)
    }

    async fn probe_frame_rate(&self, path: &Path) -> Result<Option<f64>> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=avg_frame_rate".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path_arg(path)?,
        ];
        let raw = self.run_ffprobe(args).await?;
        Ok(parse_frame_rate(&raw))
    }

    async fn has_audio(&self, path: &Path) -> Result<bool> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "a".to_string(),
            "-show_entries".to_string(),
            "stream=index".to_string(),
            "-of".to_string(),
            "csv=p=0".to_string(),
            path_arg(path)?,
        ];
        let raw = self.run_ffprobe(args).await?;
        Ok(!raw.is_empty())
    }

    async fn cut(
        &self,
        source: &Path,
        start: f64,
        end: f64,
        audio: AudioTrack,
        output: &Path,
    ) -> Result<()> {
        let args = cut_args(&self.encoding, source, start, end, audio, output)?;
        self.run_ffmpeg(args).await
    }

    async fn stretch_audio(
        &self,
        input: &Path,
        plan: &TempoPlan,
        target_duration: f64,
        output: &Path,
    ) -> Result<()> {
        let args = stretch_args(&self.encoding, input, plan, target_duration, output)?;
        self.run_ffmpeg(args).await
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let args = mux_args(&self.encoding, video, audio, output)?;
        self.run_ffmpeg(args).await
    }

    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<()> {
        if clips.is_empty() {
            return Err(DubError::EmptyTimeline);
        }

        let list_path = output.with_extension("concat.txt");
        tokio::fs::write(&list_path, concat_list(clips)?).await?;
        info!("Concatenating {} clips into {}", clips.len(), output.display());

        let args = concat_args(&self.encoding, &list_path, output)?;
        self.run_ffmpeg(args).await
    }
}

/// Абсолютный путь в виде аргумента; такой аргумент не может начинаться с `-`
pub fn path_arg(path: &Path) -> Result<String> {
    let absolute = std::path::absolute(path)?;
    let text = absolute.to_str().ok_or_else(|| {
        DubError::InvalidInput(format!("path is not valid UTF-8: {}", absolute.display()))
    })?;
    if text.contains('\n') || text.contains('\r') {
        return Err(DubError::InvalidInput(format!(
            "path contains a line break: {:?}",
            text
        )));
    }
    Ok(text.to_string())
}

/// Метка времени в секундах с точностью до миллисекунды
pub fn timestamp_arg(seconds: f64) -> Result<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(DubError::InvalidInput(format!(
            "invalid timestamp: {}",
            seconds
        )));
    }
    Ok(format!("{:.3}", seconds))
}

fn common_args() -> Vec<String> {
    ["-y", "-nostdin", "-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn video_encode_args(encoding: &EncodingSettings) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        encoding.video_codec.clone(),
        "-preset".to_string(),
        encoding.preset.clone(),
        "-crf".to_string(),
        encoding.crf.to_string(),
    ]
}

fn audio_encode_args(encoding: &EncodingSettings) -> Vec<String> {
    vec![
        "-c:a".to_string(),
        encoding.audio_codec.clone(),
        "-ar".to_string(),
        encoding.audio_sample_rate.to_string(),
        "-ac".to_string(),
        encoding.audio_channels.to_string(),
    ]
}

fn channel_layout(channels: u16) -> String {
    match channels {
        1 => "mono".to_string(),
        2 => "stereo".to_string(),
        n => format!("{}c", n),
    }
}

pub fn cut_args(
    encoding: &EncodingSettings,
    source: &Path,
    start: f64,
    end: f64,
    audio: AudioTrack,
    output: &Path,
) -> Result<Vec<String>> {
    if end <= start {
        return Err(DubError::InvalidInput(format!(
            "empty cut range [{}, {})",
            start, end
        )));
    }

    let mut args = common_args();
    args.extend([
        "-ss".to_string(),
        timestamp_arg(start)?,
        "-i".to_string(),
        path_arg(source)?,
    ]);
    if audio == AudioTrack::Silence {
        args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!(
                "anullsrc=r={}:cl={}",
                encoding.audio_sample_rate,
                channel_layout(encoding.audio_channels)
            ),
        ]);
    }
    args.extend([
        "-t".to_string(),
        timestamp_arg(end - start)?,
        "-map".to_string(),
        "0:v:0".to_string(),
    ]);
    match audio {
        AudioTrack::Mute => {}
        AudioTrack::Keep => args.extend(["-map".to_string(), "0:a:0".to_string()]),
        AudioTrack::Silence => args.extend(["-map".to_string(), "1:a:0".to_string()]),
    }
    args.extend(video_encode_args(encoding));
    if audio == AudioTrack::Mute {
        args.push("-an".to_string());
    } else {
        args.extend(audio_encode_args(encoding));
    }
    args.push(path_arg(output)?);
    Ok(args)
}

pub fn stretch_args(
    encoding: &EncodingSettings,
    input: &Path,
    plan: &TempoPlan,
    target_duration: f64,
    output: &Path,
) -> Result<Vec<String>> {
    // apad + -t выравнивают длительность до целевой после округлений atempo
    let filter = if plan.is_identity() {
        "apad".to_string()
    } else {
        format!("{},apad", plan.filter_chain())
    };

    let mut args = common_args();
    args.extend([
        "-i".to_string(),
        path_arg(input)?,
        "-filter:a".to_string(),
        filter,
        "-t".to_string(),
        timestamp_arg(target_duration)?,
        "-ar".to_string(),
        encoding.audio_sample_rate.to_string(),
        "-ac".to_string(),
        encoding.audio_channels.to_string(),
        path_arg(output)?,
    ]);
    Ok(args)
}

pub fn mux_args(
    encoding: &EncodingSettings,
    video: &Path,
    audio: &Path,
    output: &Path,
) -> Result<Vec<String>> {
    let mut args = common_args();
    args.extend([
        "-i".to_string(),
        path_arg(video)?,
        "-i".to_string(),
        path_arg(audio)?,
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
    ]);
    args.extend(audio_encode_args(encoding));
    args.push(path_arg(output)?);
    Ok(args)
}

pub fn concat_args(
    encoding: &EncodingSettings,
    list_path: &Path,
    output: &Path,
) -> Result<Vec<String>> {
    let mut args = common_args();
    args.extend([
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        path_arg(list_path)?,
    ]);
    args.extend(video_encode_args(encoding));
    args.extend(audio_encode_args(encoding));
    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        path_arg(output)?,
    ]);
    Ok(args)
}

/// Содержимое списка для concat-демультиплексора
pub fn concat_list(clips: &[PathBuf]) -> Result<String> {
    let mut list = String::new();
    for clip in clips {
        let path = path_arg(clip)?;
        list.push_str("file '");
        list.push_str(&path.replace('\'', "'\\''"));
        list.push_str("'\n");
    }
    Ok(list)
}

fn parse_duration(raw: &str) -> Result<f64> {
    let duration = raw.trim().parse::<f64>().map_err(|_| DubError::MediaTool {
        tool: "ffprobe".to_string(),
        status: "parse".to_string(),
        stderr: format!("failed to parse duration: {:?}", raw),
    })?;
    if !duration.is_finite() || duration < 0.0 {
        return Err(DubError::MediaTool {
            tool: "ffprobe".to_string(),
            status: "parse".to_string(),
            stderr: format!("invalid duration: {}", duration),
        });
    }
    Ok(duration)
}

fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.lines().next()?.trim();
    let fps = match raw.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().ok()?;
            let den = den.parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse::<f64>().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let arg = path_arg(Path::new("-i.mp4")).unwrap();
        assert!(!arg.starts_with('-'));
        assert!(arg.ends_with("-i.mp4"));
        assert!(path_arg(Path::new("bad\nname.mp4")).is_err());
    }

    #[test]
    fn test_timestamps_are_validated() {
        assert_eq!(timestamp_arg(2.5).unwrap(), "2.500");
        assert!(timestamp_arg(-1.0).is_err());
        assert!(timestamp_arg(f64::INFINITY).is_err());
    }

    #[test]
    fn test_muted_cut() {
        let args = cut_args(
            &EncodingSettings::default(),
            Path::new("/videos/in.mp4"),
            2.0,
            5.0,
            AudioTrack::Mute,
            Path::new("/tmp/work/vid.mp4"),
        )
        .unwrap();

        assert_eq!(args[position(&args, "-ss") + 1], "2.000");
        assert_eq!(args[position(&args, "-t") + 1], "3.000");
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"0:a:0".to_string()));
        assert!(position(&args, "-ss") < position(&args, "-i"));
        assert_eq!(args.last().unwrap(), "/tmp/work/vid.mp4");
    }

    #[test]
    fn test_gap_cut_keeps_audio_in_common_format() {
        let args = cut_args(
            &EncodingSettings::default(),
            Path::new("/videos/in.mp4"),
            0.0,
            2.0,
            AudioTrack::Keep,
            Path::new("/tmp/work/gap.mp4"),
        )
        .unwrap();

        assert!(args.contains(&"0:a:0".to_string()));
        assert_eq!(args[position(&args, "-ar") + 1], "48000");
        assert_eq!(args[position(&args, "-ac") + 1], "2");
        assert!(!args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_silent_gap_uses_generated_audio() {
        let args = cut_args(
            &EncodingSettings::default(),
            Path::new("/videos/in.mp4"),
            1.0,
            2.0,
            AudioTrack::Silence,
            Path::new("/tmp/work/gap.mp4"),
        )
        .unwrap();

        assert!(args.contains(&"anullsrc=r=48000:cl=stereo".to_string()));
        assert!(args.contains(&"1:a:0".to_string()));
    }

    #[test]
    fn test_cut_rejects_empty_range() {
        assert!(cut_args(
            &EncodingSettings::default(),
            Path::new("/in.mp4"),
            3.0,
            3.0,
            AudioTrack::Keep,
            Path::new("/out.mp4"),
        )
        .is_err());
    }

    #[test]
    fn test_stretch_chain() {
        let plan = TempoPlan::new(9.0, 2.0).unwrap();
        let args = stretch_args(
            &EncodingSettings::default(),
            Path::new("/tmp/tts.wav"),
            &plan,
            2.0,
            Path::new("/tmp/tts_stretch.wav"),
        )
        .unwrap();

        assert_eq!(
            args[position(&args, "-filter:a") + 1],
            "atempo=2.0,atempo=2.0,atempo=1.12500,apad"
        );
        assert_eq!(args[position(&args, "-t") + 1], "2.000");
    }

    #[test]
    fn test_matching_duration_skips_atempo() {
        let plan = TempoPlan::new(3.0, 3.0).unwrap();
        let args = stretch_args(
            &EncodingSettings::default(),
            Path::new("/tmp/tts.wav"),
            &plan,
            3.0,
            Path::new("/tmp/tts_stretch.wav"),
        )
        .unwrap();

        assert_eq!(args[position(&args, "-filter:a") + 1], "apad");
        assert_eq!(args[position(&args, "-t") + 1], "3.000");
    }

    #[test]
    fn test_mux_copies_video() {
        let args = mux_args(
            &EncodingSettings::default(),
            Path::new("/tmp/vid.mp4"),
            Path::new("/tmp/tts_stretch.wav"),
            Path::new("/tmp/dub.mp4"),
        )
        .unwrap();

        assert_eq!(args[position(&args, "-c:v") + 1], "copy");
        assert!(args.contains(&"1:a:0".to_string()));
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[
            PathBuf::from("/tmp/work/00000_gap/gap.mp4"),
            PathBuf::from("/tmp/it's here/dub.mp4"),
        ])
        .unwrap();

        assert_eq!(
            list,
            "file '/tmp/work/00000_gap/gap.mp4'\nfile '/tmp/it'\\''s here/dub.mp4'\n"
        );
    }

    #[test]
    fn test_probe_output_parsing() {
        assert_eq!(parse_duration("12.345000\n").unwrap(), 12.345);
        assert!(parse_duration("N/A").is_err());
        assert_eq!(parse_frame_rate("30000/1001"), Some(30000.0 / 1001.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate(""), None);
    }
}
