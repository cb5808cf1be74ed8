//! Hand-off point between the playback sequencer and the avatar
//! renderer process.
//!
//! The renderer consumes one clip at a time; `play` holds the audio
//! channel for the clip's duration so the sequencer cannot start the
//! next unit while this one is still sounding.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use tts_core::{encode_wav_base64, AudioSink, SynthesizedClip};

/// One spoken unit, packaged the way the renderer ingests it: audio as
/// a data URI plus the per-hop amplitude envelope that drives mouth
/// movement.
#[derive(Debug, Clone)]
pub struct AvatarClip {
    pub index: u64,
    pub audio_uri: String,
    pub amplitude: Vec<f32>,
    pub duration_ms: u64,
}

pub struct RendererBridge {
    tx: mpsc::UnboundedSender<AvatarClip>,
}

impl RendererBridge {
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<AvatarClip>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl AudioSink for RendererBridge {
    async fn play(&self, clip: &SynthesizedClip) -> anyhow::Result<()> {
        let frame = AvatarClip {
            index: clip.unit.index,
            audio_uri: encode_wav_base64(&clip.wav),
            amplitude: clip.amplitude.clone(),
            duration_ms: clip.duration_ms,
        };
        debug!(
            index = frame.index,
            duration_ms = frame.duration_ms,
            hops = frame.amplitude.len(),
            "clip to renderer"
        );
        // A closed renderer channel is not a pipeline failure; the
        // clip still occupies its playback slot.
        let _ = self.tx.send(frame);
        tokio::time::sleep(Duration::from_millis(clip.duration_ms)).await;
        Ok(())
    }
}
