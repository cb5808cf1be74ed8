use std::sync::Arc;

use anyhow::Result;
use llm_core::{ChatClient, ChatLog, ChatRequestOptions, ChatTurn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tts_core::{Synthesizer, VoicevoxSynthesizer};

use client::config::{ClientConfig, DEFAULT_SYSTEM_PROMPT};
use client::push::spawn_push_listener;
use client::render::RendererBridge;
use client::session::{Session, TurnEvent};
use client::store::{ParamsStore, PersistedParams};
use client::threshold::spawn_threshold_listener;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let _ = dotenv::dotenv();

    let config = ClientConfig::from_env();
    let store = ParamsStore::new(&config.state_dir);
    let (mut system_prompt, mut chat_log) = match store.load()? {
        Some(params) => (params.system_prompt, params.chat_log),
        None => {
            let prompt = config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
            (prompt, ChatLog::new())
        }
    };

    let chat = Arc::new(ChatClient::new(
        config.api_key.clone(),
        ChatRequestOptions {
            base_url: config.chat_base_url.clone(),
            model: config.chat_model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.request_timeout(),
        },
    )?);
    let synth: Arc<dyn Synthesizer> = Arc::new(VoicevoxSynthesizer::new(
        config.synth_base_url.clone(),
        config.request_timeout(),
    )?);

    let (sink, mut renderer_rx) = RendererBridge::channel();
    tokio::spawn(async move {
        while let Some(frame) = renderer_rx.recv().await {
            debug!(index = frame.index, hops = frame.amplitude.len(), "renderer consumed clip");
        }
    });

    if let Some(addr) = config.threshold_addr.clone() {
        let mut gate = spawn_threshold_listener(addr);
        tokio::spawn(async move {
            while gate.changed().await.is_ok() {
                debug!(gate = *gate.borrow(), "capture threshold updated");
            }
        });
    }

    let mut pushed = config.push_addr.clone().map(spawn_push_listener);

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let mut session = Session::new(synth, sink, event_tx);

    println!(
        "type a message and press enter (/reset clears history, /prompt <text> sets the system prompt, /edit <n> <text> rewrites turn n)"
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "/reset" {
                    session.cancel();
                    chat_log.reset();
                    persist(&store, &system_prompt, &chat_log, config.history_limit)?;
                    println!("history cleared");
                    continue;
                }
                if let Some(rest) = input.strip_prefix("/prompt") {
                    let rest = rest.trim();
                    system_prompt = if rest.is_empty() {
                        println!("system prompt reset to default");
                        DEFAULT_SYSTEM_PROMPT.to_string()
                    } else {
                        println!("system prompt updated");
                        rest.to_string()
                    };
                    persist(&store, &system_prompt, &chat_log, config.history_limit)?;
                    continue;
                }

                if let Some(rest) = input.strip_prefix("/edit") {
                    let mut parts = rest.trim().splitn(2, ' ');
                    let index = parts.next().and_then(|i| i.parse::<usize>().ok());
                    match (index, parts.next()) {
                        (Some(index), Some(content)) => {
                            chat_log.edit(index, content.trim().to_string());
                            persist(&store, &system_prompt, &chat_log, config.history_limit)?;
                            println!("turn {index} updated");
                        }
                        _ => println!("usage: /edit <index> <text>"),
                    }
                    continue;
                }

                chat_log.push(ChatTurn::user(input));
                persist(&store, &system_prompt, &chat_log, config.history_limit)?;

                let mut upstream = vec![ChatTurn::system(system_prompt.as_str())];
                upstream.extend(chat_log.recent(config.history_limit).iter().cloned());
                if let Err(e) = session.begin_turn(chat.clone(), upstream) {
                    println!("{}", e.user_message());
                }
            }
            text = async {
                match pushed.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match text {
                    Some(text) => session.speak_text(text),
                    None => pushed = None,
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    TurnEvent::Speaking { text, .. } => println!("… {text}"),
                    TurnEvent::AssistantDone { text } => {
                        chat_log.push(ChatTurn::assistant(text));
                        persist(&store, &system_prompt, &chat_log, config.history_limit)?;
                    }
                    TurnEvent::TurnFailed { message } => println!("{message}"),
                    TurnEvent::Drained => debug!("turn playback drained"),
                }
            }
        }
    }

    Ok(())
}

/// Persist the prompt and the trimmed tail of the transcript, matching
/// what the next turn will send upstream.
fn persist(store: &ParamsStore, system_prompt: &str, log: &ChatLog, limit: usize) -> Result<()> {
    let mut trimmed = ChatLog::new();
    for turn in log.recent(limit) {
        trimmed.push(turn.clone());
    }
    store.save(&PersistedParams {
        system_prompt: system_prompt.to_string(),
        chat_log: trimmed,
    })
}
