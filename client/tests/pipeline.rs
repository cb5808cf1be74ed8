//! End-to-end pipeline tests: delta stream in, ordered playback out.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;
use tts_core::{AudioSink, SentenceUnit, SynthError, SynthesizedClip, Synthesizer};

use client::session::{Session, TurnEvent};

/// Synthesizer with scripted per-index latency and failures, so tests
/// can force completions to arrive out of order.
struct FakeSynthesizer {
    delays_ms: Vec<u64>,
    fail_index: Option<u64>,
}

impl FakeSynthesizer {
    fn new(delays_ms: Vec<u64>) -> Arc<Self> {
        Arc::new(Self { delays_ms, fail_index: None })
    }

    fn failing_at(delays_ms: Vec<u64>, fail_index: u64) -> Arc<Self> {
        Arc::new(Self { delays_ms, fail_index: Some(fail_index) })
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, unit: &SentenceUnit) -> Result<SynthesizedClip, SynthError> {
        let delay = self.delays_ms.get(unit.index as usize).copied().unwrap_or(5);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        if self.fail_index == Some(unit.index) {
            return Err(SynthError::SynthesisFailed {
                index: unit.index,
                reason: "scripted failure".into(),
            });
        }
        Ok(SynthesizedClip {
            unit: unit.clone(),
            wav: Vec::new(),
            sample_rate: 24_000,
            duration_ms: 1,
            amplitude: Vec::new(),
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    played: Mutex<Vec<(u64, String)>>,
}

impl RecordingSink {
    fn played(&self) -> Vec<(u64, String)> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, clip: &SynthesizedClip) -> anyhow::Result<()> {
        self.played
            .lock()
            .unwrap()
            .push((clip.unit.index, clip.unit.text.clone()));
        Ok(())
    }
}

fn delta_stream(deltas: &[&str]) -> impl futures::Stream<Item = String> + Send + Unpin {
    stream::iter(deltas.iter().map(|d| d.to_string()).collect::<Vec<_>>())
}

/// Collect events until the turn drains.
async fn wait_for_drain(events: &mut mpsc::UnboundedReceiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("turn did not drain in time")
            .expect("event channel closed before drain");
        let done = matches!(event, TurnEvent::Drained);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn out_of_order_completions_play_in_index_order() {
    // Later units finish first.
    let synth = FakeSynthesizer::new(vec![60, 30, 5]);
    let sink = Arc::new(RecordingSink::default());
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut session = Session::new(synth, sink.clone(), event_tx);

    session.begin_response(delta_stream(&["First one. Second one. ", "Third one."]));
    let seen = wait_for_drain(&mut events).await;

    let indices: Vec<u64> = sink.played().iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let speaking: Vec<u64> = seen
        .iter()
        .filter_map(|e| match e {
            TurnEvent::Speaking { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(speaking, vec![0, 1, 2]);
}

#[tokio::test]
async fn failed_unit_is_skipped_without_stalling() {
    let synth = FakeSynthesizer::failing_at(vec![5, 5, 5], 1);
    let sink = Arc::new(RecordingSink::default());
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut session = Session::new(synth, sink.clone(), event_tx);

    session.begin_response(delta_stream(&["One. Two. Three."]));
    wait_for_drain(&mut events).await;

    let indices: Vec<u64> = sink.played().iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![0, 2]);
}

#[tokio::test]
async fn tagged_response_keeps_style_and_raw_text() {
    let synth = FakeSynthesizer::new(vec![5, 5]);
    let sink = Arc::new(RecordingSink::default());
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut session = Session::new(synth, sink.clone(), event_tx);

    session.begin_response(delta_stream(&["[angry] I am", " upset. ", "Really upset!"]));
    let seen = wait_for_drain(&mut events).await;

    let texts: Vec<String> = sink.played().into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, vec!["I am upset.".to_string(), "Really upset!".to_string()]);

    let raw = seen.iter().find_map(|e| match e {
        TurnEvent::AssistantDone { text } => Some(text.clone()),
        _ => None,
    });
    assert_eq!(raw.as_deref(), Some("[angry] I am upset. Really upset!"));
}

#[tokio::test]
async fn empty_response_still_drains() {
    let synth = FakeSynthesizer::new(vec![]);
    let sink = Arc::new(RecordingSink::default());
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut session = Session::new(synth, sink.clone(), event_tx);

    session.begin_response(delta_stream(&["[happy]"]));
    wait_for_drain(&mut events).await;

    assert!(sink.played().is_empty());
}

#[tokio::test]
async fn pushed_text_is_spoken_without_a_transcript_entry() {
    let synth = FakeSynthesizer::new(vec![5, 5]);
    let sink = Arc::new(RecordingSink::default());
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut session = Session::new(synth, sink.clone(), event_tx);

    session.speak_text("[happy] 外部からのお知らせです。続きもあります。".to_string());
    let seen = wait_for_drain(&mut events).await;

    let texts: Vec<String> = sink.played().into_iter().map(|(_, t)| t).collect();
    assert_eq!(
        texts,
        vec!["外部からのお知らせです。".to_string(), "続きもあります。".to_string()]
    );
    assert!(
        !seen.iter().any(|e| matches!(e, TurnEvent::AssistantDone { .. })),
        "pushed speech must not produce an assistant turn"
    );
}

#[tokio::test]
async fn new_turn_cancels_pending_playback_of_previous_turn() {
    // Turn A synthesis is slow enough that nothing has played when
    // turn B starts.
    let synth = FakeSynthesizer::new(vec![200, 200]);
    let sink = Arc::new(RecordingSink::default());
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut session = Session::new(synth.clone(), sink.clone(), event_tx);

    session.begin_response(delta_stream(&["Alpha first. Alpha second."]));
    tokio::time::sleep(Duration::from_millis(20)).await;

    session.begin_response(delta_stream(&["Beta line."]));
    wait_for_drain(&mut events).await;

    // Give any leaked turn-A task a chance to misbehave.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let texts: Vec<String> = sink.played().into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, vec!["Beta line.".to_string()]);
}
