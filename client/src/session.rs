//! Per-turn orchestration of the response pipeline.
//!
//! One session owns the pipeline lifecycle: a turn streams the model
//! reply through the segmenter, fans each sentence unit out to a
//! concurrent synthesis task and funnels the outcomes into the
//! playback sequencer. Starting a new turn cancels the previous one so
//! no audio from an abandoned response can play after the new one
//! begins.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use llm_core::{ChatClient, ChatTurn};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};
use tts_core::{
    drive_playback, AudioSink, ResponseSegmenter, SentenceUnit, SequencerState, StyleTag,
    SynthOutcome, Synthesizer, ANNOUNCE_BACKEND_DOWN,
};

use crate::error::TurnError;

/// Pipeline-to-controller notifications. The controller alone mutates
/// the transcript, so assistant text travels up as an event instead of
/// being appended by the pipeline.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Playback of this unit just started; show it as the line being
    /// spoken.
    Speaking { index: u64, text: String },
    /// The full raw reply (style tag included) finished streaming.
    AssistantDone { text: String },
    /// The turn was aborted; `message` is assistant-facing.
    TurnFailed { message: String },
    /// Every unit of the response has been played or skipped.
    Drained,
}

struct ActiveTurn {
    driver: JoinHandle<()>,
    playback: JoinHandle<()>,
}

pub struct Session {
    synth: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    events: mpsc::UnboundedSender<TurnEvent>,
    active: Option<ActiveTurn>,
}

impl Session {
    pub fn new(
        synth: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        events: mpsc::UnboundedSender<TurnEvent>,
    ) -> Self {
        Self { synth, sink, events, active: None }
    }

    /// Start a full turn against the chat backend.
    ///
    /// Fails before any network call when no credential is configured.
    /// A stream that cannot be opened surfaces as a `TurnFailed` event
    /// plus a spoken announcement.
    pub fn begin_turn(
        &mut self,
        chat: Arc<ChatClient>,
        upstream: Vec<ChatTurn>,
    ) -> Result<(), TurnError> {
        if !chat.has_credential() {
            return Err(TurnError::MissingCredential);
        }

        self.cancel();
        let (out_tx, out_rx) = mpsc::channel(32);
        let playback = self.spawn_playback(out_rx);

        let synth = self.synth.clone();
        let events = self.events.clone();
        let driver = tokio::spawn(async move {
            match chat.stream_chat(&upstream).await {
                Ok(stream) => run_response(stream, synth, out_tx, events).await,
                Err(e) => {
                    let err = TurnError::from(e);
                    let _ = events.send(TurnEvent::TurnFailed { message: err.user_message() });
                    announce_backend_down(synth.as_ref(), &out_tx).await;
                }
            }
        });

        self.active = Some(ActiveTurn { driver, playback });
        Ok(())
    }

    /// Run the pipeline over an already open delta stream.
    pub fn begin_response<S>(&mut self, stream: S)
    where
        S: Stream<Item = String> + Send + Unpin + 'static,
    {
        self.cancel();
        let (out_tx, out_rx) = mpsc::channel(32);
        let playback = self.spawn_playback(out_rx);

        let synth = self.synth.clone();
        let events = self.events.clone();
        let driver = tokio::spawn(run_response(stream, synth, out_tx, events));

        self.active = Some(ActiveTurn { driver, playback });
    }

    /// Speak externally pushed text through the synthesis and playback
    /// path without a chat turn. A leading style tag is honored; the
    /// text never enters the transcript, so no `AssistantDone` fires.
    pub fn speak_text(&mut self, text: String) {
        self.cancel();
        let (out_tx, out_rx) = mpsc::channel(32);
        let playback = self.spawn_playback(out_rx);

        let synth = self.synth.clone();
        let driver = tokio::spawn(async move {
            let mut segmenter = ResponseSegmenter::new();
            let mut synth_tasks = JoinSet::new();
            for unit in segmenter.push(&text) {
                spawn_synth(&mut synth_tasks, synth.clone(), out_tx.clone(), unit);
            }
            for unit in segmenter.finish() {
                spawn_synth(&mut synth_tasks, synth.clone(), out_tx.clone(), unit);
            }
            let _ = out_tx
                .send(SynthOutcome::Finished { count: segmenter.emitted() })
                .await;
            while synth_tasks.join_next().await.is_some() {}
        });

        self.active = Some(ActiveTurn { driver, playback });
    }

    /// Abort the in-flight turn: pending synthesis calls are dropped
    /// and the sequencer stops without emitting further audio.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.driver.abort();
            active.playback.abort();
            debug!("cancelled previous turn");
        }
    }

    fn spawn_playback(&self, out_rx: mpsc::Receiver<SynthOutcome>) -> JoinHandle<()> {
        let sink = self.sink.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let speaking = events.clone();
            let result = drive_playback(out_rx, sink.as_ref(), move |unit| {
                let _ = speaking.send(TurnEvent::Speaking {
                    index: unit.index,
                    text: unit.text.clone(),
                });
            })
            .await;
            match result {
                Ok(SequencerState::Drained) => {
                    let _ = events.send(TurnEvent::Drained);
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = events.send(TurnEvent::TurnFailed {
                        message: format!("音声出力エラー: {e}"),
                    });
                }
            }
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Drive decoder output through the segmenter, fanning units out to
/// concurrent synthesis tasks. Outcomes join back in order inside the
/// sequencer; this function only guarantees they all get sent.
async fn run_response<S>(
    mut stream: S,
    synth: Arc<dyn Synthesizer>,
    out_tx: mpsc::Sender<SynthOutcome>,
    events: mpsc::UnboundedSender<TurnEvent>,
) where
    S: Stream<Item = String> + Send + Unpin,
{
    let mut segmenter = ResponseSegmenter::new();
    let mut full_text = String::new();
    let mut synth_tasks = JoinSet::new();

    while let Some(delta) = stream.next().await {
        full_text.push_str(&delta);
        for unit in segmenter.push(&delta) {
            spawn_synth(&mut synth_tasks, synth.clone(), out_tx.clone(), unit);
        }
    }
    for unit in segmenter.finish() {
        spawn_synth(&mut synth_tasks, synth.clone(), out_tx.clone(), unit);
    }

    let count = segmenter.emitted();
    debug!(count, "response segmented");
    let _ = out_tx.send(SynthOutcome::Finished { count }).await;
    let _ = events.send(TurnEvent::AssistantDone { text: full_text });

    // Keep the set alive until every outcome has been delivered;
    // dropping it would abort in-flight synthesis calls.
    while synth_tasks.join_next().await.is_some() {}
}

fn spawn_synth(
    tasks: &mut JoinSet<()>,
    synth: Arc<dyn Synthesizer>,
    out_tx: mpsc::Sender<SynthOutcome>,
    unit: SentenceUnit,
) {
    tasks.spawn(async move {
        let outcome = match synth.synthesize(&unit).await {
            Ok(clip) => SynthOutcome::Clip(clip),
            Err(e) => {
                warn!("{e}");
                SynthOutcome::Failed { index: e.index() }
            }
        };
        let _ = out_tx.send(outcome).await;
    });
}

/// Speak the backend-failure announcement through the regular playback
/// path so the audio channel stays owned by the sequencer.
async fn announce_backend_down(synth: &dyn Synthesizer, out_tx: &mpsc::Sender<SynthOutcome>) {
    let unit = SentenceUnit {
        index: 0,
        style: StyleTag::Error,
        text: ANNOUNCE_BACKEND_DOWN.to_string(),
    };
    let outcome = match synth.synthesize(&unit).await {
        Ok(clip) => SynthOutcome::Clip(clip),
        Err(e) => {
            warn!("announcement synthesis failed: {e}");
            SynthOutcome::Failed { index: 0 }
        }
    };
    let _ = out_tx.send(outcome).await;
    let _ = out_tx.send(SynthOutcome::Finished { count: 1 }).await;
}
