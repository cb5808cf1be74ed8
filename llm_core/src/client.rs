//! Streaming chat completion client.

use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::decode::FrameDecoder;
use crate::{ChatError, ChatTurn};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    stream: bool,
    max_tokens: u16,
}

/// Per-client request parameters.
#[derive(Debug, Clone)]
pub struct ChatRequestOptions {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u16,
    pub timeout: Duration,
}

impl Default for ChatRequestOptions {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 200,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Client for the streaming chat completion endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    options: ChatRequestOptions,
}

impl ChatClient {
    pub fn new(api_key: String, options: ChatRequestOptions) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()?;
        Ok(Self { http, api_key, options })
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Open a streaming completion for the given transcript window.
    ///
    /// Returns an ordered, finite stream of text deltas. Fails with
    /// `BackendUnavailable` before yielding anything when the request
    /// cannot be opened or the backend answers with a non-success
    /// status; mid-stream transport errors end the stream with a
    /// warning instead of aborting the surrounding turn.
    pub async fn stream_chat(
        &self,
        turns: &[ChatTurn],
    ) -> Result<impl Stream<Item = String> + Send + Unpin, ChatError> {
        if !self.has_credential() {
            return Err(ChatError::MissingCredential);
        }

        let url = format!("{}/v1/chat/completions", self.options.base_url);
        debug!(model = %self.options.model, turns = turns.len(), "opening chat stream");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.options.model,
                messages: turns,
                stream: true,
                max_tokens: self.options.max_tokens,
            })
            .send()
            .await
            .map_err(|e| ChatError::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::BackendUnavailable(format!(
                "chat endpoint returned status {status}"
            )));
        }

        let mut body = response.bytes_stream();
        let deltas = stream! {
            let mut decoder = FrameDecoder::new();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for delta in decoder.push_bytes(&bytes) {
                            yield delta;
                        }
                    }
                    Err(e) => {
                        warn!("chat stream ended early: {e}");
                        break;
                    }
                }
            }
            if let Some(delta) = decoder.finish() {
                yield delta;
            }
        };
        Ok(Box::pin(deltas))
    }
}
