//! Voice command capture and recognition
//!
//! The microphone is only opened while the joystick's voice activation
//! window is armed. A captured phrase goes to the remote recognizer first
//! and to the local one if that fails; the resulting transcript is matched
//! against the command vocabulary.

pub mod capture;
pub mod listen;
pub mod pipeline;
pub mod recognizer;

pub use capture::{AudioSource, CpalMicrophone, Microphone, TARGET_RATE};
pub use listen::{ListenParams, PhraseListener, Utterance};
pub use pipeline::{CycleOutcome, MicTestReport, StepOutcome, VoicePipeline, VoiceRequest};
pub use recognizer::{
    GoogleSpeechRecognizer, Recognition, RecognizeError, Recognizer, Transcript,
    WhisperServerRecognizer,
};

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("no input device")]
    NoInputDevice,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio stream closed")]
    StreamClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    #[default]
    Idle,
    Armed,
    Listening,
    RecognizingRemote,
    RecognizingLocal,
}

impl VoiceState {
    fn as_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => VoiceState::Armed,
            2 => VoiceState::Listening,
            3 => VoiceState::RecognizingRemote,
            4 => VoiceState::RecognizingLocal,
            _ => VoiceState::Idle,
        }
    }
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoiceState::Idle => "idle",
            VoiceState::Armed => "armed",
            VoiceState::Listening => "listening",
            VoiceState::RecognizingRemote => "recognizing (remote)",
            VoiceState::RecognizingLocal => "recognizing (local)",
        };
        f.write_str(s)
    }
}

/// Shared cell for the pipeline state so the status line can read it
#[derive(Debug, Default)]
pub struct VoiceStateCell(std::sync::atomic::AtomicU8);

impl VoiceStateCell {
    pub fn get(&self) -> VoiceState {
        VoiceState::from_u8(self.0.load(std::sync::atomic::Ordering::Relaxed))
    }

    pub fn set(&self, state: VoiceState) {
        self.0
            .store(state.as_u8(), std::sync::atomic::Ordering::Relaxed);
    }
}
