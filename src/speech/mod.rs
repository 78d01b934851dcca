//! Engine-agnostic speech input and output
//!
//! Both sides are pure state machines fed explicit instants and engine
//! events. They return actions for a driver to perform against a concrete
//! engine, which keeps the timing rules testable without audio hardware.

pub mod console;
pub mod input;
pub mod output;
pub mod voice;

pub use input::{
    Hint, InputAction, InputCommand, InputEvent, InputState, RecognitionEvent, RecognitionId,
    RecognitionOptions, Recognizer, SpeechInput, run_speech_input,
};
pub use output::{
    EngineStatus, OutputAction, OutputCommand, OutputEvent, SpeechQueue, SpeechSynthesizer,
    Utterance, run_speech_output,
};
pub use voice::{Voice, map_language_code, select_voice};

/// Errors reported by a recognition engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("no speech detected")]
    NoSpeech,

    #[error("recognition aborted")]
    Aborted,

    #[error("microphone permission denied")]
    NotAllowed,

    #[error("{0}")]
    Other(String),
}

impl RecognitionError {
    /// Map a Web Speech style error code
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "not-allowed" | "service-not-allowed" => Self::NotAllowed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Errors reported by a synthesis engine for one utterance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// Cut off by a cancel or a newer utterance
    #[error("utterance interrupted")]
    Interrupted,

    #[error("utterance canceled")]
    Canceled,

    #[error("{0}")]
    Other(String),
}
