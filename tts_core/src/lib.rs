//! Speech side of the response pipeline: style tags, sentence
//! segmentation, remote synthesis and ordered playback.

mod audio;
mod playback;
mod segment;
mod voice;

pub use audio::{amplitude_envelope, decode_wav, encode_wav_base64, LIP_SYNC_HOP};
pub use playback::{
    drive_playback, AudioSink, PlaybackSequencer, SequencerState, SynthOutcome,
};
pub use segment::ResponseSegmenter;
pub use voice::{Synthesizer, VoicevoxSynthesizer, ANNOUNCE_BACKEND_DOWN};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Emotional style of a synthesized utterance.
///
/// Captured at most once per response from the bracketed prefix of the
/// model output; applies to every sentence unit of that response.
/// `Error` is never parsed from model output, it is reserved for the
/// spoken backend-failure announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleTag {
    Neutral,
    Happy,
    Angry,
    Sad,
    Surprised,
    Fearful,
    Error,
}

impl Default for StyleTag {
    fn default() -> Self {
        StyleTag::Neutral
    }
}

impl StyleTag {
    /// Parse the label found between the brackets of a response prefix.
    ///
    /// Unknown or malformed labels fall back to `Neutral`; the legacy
    /// labels `talk` and `fear` are still accepted.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "neutral" | "talk" => StyleTag::Neutral,
            "happy" => StyleTag::Happy,
            "angry" => StyleTag::Angry,
            "sad" => StyleTag::Sad,
            "surprised" => StyleTag::Surprised,
            "fearful" | "fear" => StyleTag::Fearful,
            _ => StyleTag::Neutral,
        }
    }
}

/// One speakable chunk of model output, in strict stream order.
///
/// The index is assigned at emission time, never reused, and is the
/// sole ordering key for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceUnit {
    pub index: u64,
    pub style: StyleTag,
    pub text: String,
}

/// A synthesized sentence, owned by the sequencer until played.
#[derive(Debug, Clone)]
pub struct SynthesizedClip {
    pub unit: SentenceUnit,
    /// Raw WAV payload as returned by the synthesis engine.
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    pub duration_ms: u64,
    /// RMS amplitude per `LIP_SYNC_HOP` samples, consumed by the
    /// external lip-sync animator.
    pub amplitude: Vec<f32>,
}

/// Synthesis error kinds.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("synthesis failed for unit {index}: {reason}")]
    SynthesisFailed { index: u64, reason: String },
}

impl SynthError {
    pub fn index(&self) -> u64 {
        match self {
            SynthError::SynthesisFailed { index, .. } => *index,
        }
    }
}
