//! Ordered playback of concurrently synthesized clips.
//!
//! Synthesis calls for different units race; the sequencer buffers
//! their results in a priority queue keyed by sequence index and only
//! releases a clip when the watermark reaches its index, so audio and
//! the transcript callback always follow generation order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{SentenceUnit, SynthesizedClip};

/// One synthesis result, arriving in arbitrary completion order.
#[derive(Debug)]
pub enum SynthOutcome {
    Clip(SynthesizedClip),
    /// Synthesis for this index failed for good; the slot is skipped.
    Failed { index: u64 },
    /// The segmenter finished; `count` units exist in total.
    Finished { count: u64 },
}

/// Lifecycle of one response's sequencer. `Drained` is terminal; a new
/// response gets a fresh sequencer with indices starting over at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Buffering,
    Playing(u64),
    Drained,
}

/// The single audio-output channel. Playing a clip must not return
/// until the clip has finished sounding; the sequencer never overlaps
/// two calls.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, clip: &SynthesizedClip) -> anyhow::Result<()>;
}

#[derive(Debug)]
struct Slot {
    index: u64,
    /// `None` marks a failed unit: an empty-duration placeholder.
    clip: Option<SynthesizedClip>,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl Eq for Slot {}
impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

/// Reordering core. Free of I/O so ordering properties are testable
/// without a runtime; `drive_playback` adds the audio side.
#[derive(Debug)]
pub struct PlaybackSequencer {
    /// Next index eligible for release.
    watermark: u64,
    buffered: BinaryHeap<Reverse<Slot>>,
    total: Option<u64>,
    state: SequencerState,
}

impl Default for PlaybackSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSequencer {
    pub fn new() -> Self {
        Self {
            watermark: 0,
            buffered: BinaryHeap::new(),
            total: None,
            state: SequencerState::Idle,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Record one synthesis outcome.
    pub fn accept(&mut self, outcome: SynthOutcome) {
        if self.state == SequencerState::Idle {
            self.state = SequencerState::Buffering;
        }
        match outcome {
            SynthOutcome::Clip(clip) => {
                if clip.unit.index < self.watermark {
                    warn!(index = clip.unit.index, "clip for an already released slot, dropping");
                    return;
                }
                self.buffered.push(Reverse(Slot { index: clip.unit.index, clip: Some(clip) }));
            }
            SynthOutcome::Failed { index } => {
                if index >= self.watermark {
                    self.buffered.push(Reverse(Slot { index, clip: None }));
                }
            }
            SynthOutcome::Finished { count } => {
                self.total = Some(count);
            }
        }
        self.settle();
    }

    /// Release the next clip if the watermark has reached it, advancing
    /// past failed slots on the way.
    pub fn next_ready(&mut self) -> Option<SynthesizedClip> {
        while let Some(Reverse(slot)) = self.buffered.peek() {
            if slot.index != self.watermark {
                return None;
            }
            let Reverse(slot) = self.buffered.pop()?;
            self.watermark += 1;
            match slot.clip {
                Some(clip) => {
                    self.state = SequencerState::Playing(clip.unit.index);
                    return Some(clip);
                }
                None => {
                    // Failure is final by the time it is reported; skip
                    // the slot rather than stall the queue.
                    debug!(index = slot.index, "skipping failed unit");
                    self.settle();
                }
            }
        }
        self.settle();
        None
    }

    pub fn is_drained(&self) -> bool {
        self.state == SequencerState::Drained
    }

    fn settle(&mut self) {
        if self.total == Some(self.watermark) && self.buffered.is_empty() {
            self.state = SequencerState::Drained;
        }
    }
}

/// Play a response's clips through the sink in index order.
///
/// `on_start` fires with the unit at the instant its playback begins,
/// never before, so the on-screen transcript matches the audio.
/// Returns when the response is drained or the channel closes
/// (cancellation).
pub async fn drive_playback<S>(
    mut rx: mpsc::Receiver<SynthOutcome>,
    sink: &S,
    on_start: impl Fn(&SentenceUnit),
) -> anyhow::Result<SequencerState>
where
    S: AudioSink + ?Sized,
{
    let mut seq = PlaybackSequencer::new();
    while !seq.is_drained() {
        let Some(outcome) = rx.recv().await else {
            break;
        };
        seq.accept(outcome);
        while let Some(clip) = seq.next_ready() {
            on_start(&clip.unit);
            sink.play(&clip).await?;
        }
    }
    Ok(seq.state())
}
