//! Remote speech synthesis against a VOICEVOX-compatible engine.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::audio::{amplitude_envelope, decode_wav, LIP_SYNC_HOP};
use crate::{SentenceUnit, StyleTag, SynthError, SynthesizedClip};

/// Spoken when the chat backend cannot be reached.
pub const ANNOUNCE_BACKEND_DOWN: &str =
    "チャットジーピーティと接続できない不具合が発生しています";

/// Engine speaker id for a style.
fn speaker_for(style: StyleTag) -> i64 {
    match style {
        StyleTag::Neutral => 58,
        StyleTag::Happy => 58,
        StyleTag::Surprised => 58,
        StyleTag::Angry => 59,
        StyleTag::Error => 59,
        StyleTag::Sad => 60,
        StyleTag::Fearful => 60,
    }
}

/// Converts one sentence unit into a played-back clip. Memoryless, one
/// call per unit; retry policy belongs to the caller.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, unit: &SentenceUnit) -> Result<SynthesizedClip, SynthError>;
}

/// HTTP client for the VOICEVOX engine: one query call to prepare
/// synthesis parameters, one render call to produce audio.
pub struct VoicevoxSynthesizer {
    http: reqwest::Client,
    base_url: String,
}

impl VoicevoxSynthesizer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.into() })
    }

    async fn query_and_render(&self, unit: &SentenceUnit) -> anyhow::Result<Vec<u8>> {
        let speaker = speaker_for(unit.style).to_string();

        let query: serde_json::Value = self
            .http
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", unit.text.as_str()), ("speaker", &speaker)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let wav = self
            .http
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", &speaker)])
            .header("accept", "audio/wav")
            .json(&query)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        Ok(wav.to_vec())
    }
}

#[async_trait]
impl Synthesizer for VoicevoxSynthesizer {
    async fn synthesize(&self, unit: &SentenceUnit) -> Result<SynthesizedClip, SynthError> {
        let failed = |reason: String| SynthError::SynthesisFailed { index: unit.index, reason };

        let wav = self
            .query_and_render(unit)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let (samples, sample_rate) = decode_wav(&wav).map_err(|e| failed(e.to_string()))?;

        let duration_ms = (samples.len() as f32 / sample_rate as f32 * 1000.0) as u64;
        let amplitude = amplitude_envelope(&samples, LIP_SYNC_HOP);
        debug!(index = unit.index, duration_ms, "synthesized unit");

        Ok(SynthesizedClip {
            unit: unit.clone(),
            wav,
            sample_rate,
            duration_ms,
            amplitude,
        })
    }
}
