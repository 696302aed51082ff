pub mod audio;
pub mod ffmpeg;
pub mod tempo;

pub use audio::SynthesizedAudio;
pub use ffmpeg::{AudioTrack, FfmpegToolkit, MediaToolkit};
pub use tempo::TempoPlan;
