//! Chat backend protocol: message types, transcript history and the
//! streaming completion client.

mod client;
mod decode;
mod history;

pub use client::{ChatClient, ChatRequestOptions};
pub use decode::FrameDecoder;
pub use history::ChatLog;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of one transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Chat backend error kinds.
///
/// `MalformedFrame` never aborts a response: the decoder logs and skips
/// the offending frame. The other kinds abort the whole turn.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no API key configured")]
    MissingCredential,

    #[error("chat backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("malformed stream frame: {0}")]
    MalformedFrame(String),
}
