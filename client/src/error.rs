use llm_core::ChatError;
use thiserror::Error;

/// Turn-level failures: these abort the whole turn, unlike frame- or
/// unit-level failures which are contained inside the pipeline.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("no API key configured")]
    MissingCredential,

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl TurnError {
    /// Assistant-facing message shown in place of a reply.
    pub fn user_message(&self) -> String {
        match self {
            TurnError::MissingCredential => "APIキーが入力されていません".to_string(),
            TurnError::Chat(ChatError::MissingCredential) => {
                "APIキーが入力されていません".to_string()
            }
            TurnError::Chat(e) => format!("チャットAPIエラー: {e}"),
            TurnError::Internal(e) => format!("内部エラー: {e}"),
        }
    }
}
