//! Внешние сервисы: распознавание, перевод и синтез речи

pub mod synthesis;
pub mod transcription;
pub mod translation;

pub use synthesis::{PiperSynthesizer, Synthesizer, Voice};
pub use transcription::{Transcriber, WhisperCli};
pub use translation::{ArgosTranslator, Translator};
