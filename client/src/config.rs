// Configuration for the avatar client

use std::path::PathBuf;
use std::time::Duration;

/// System prompt instructing the model to prefix replies with an
/// emotion tag the segmenter can pick up.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
あなたはユーザーと親しく会話するキャラクターです。\
返答の先頭に、感情を表すタグを必ず一つ付けてください。\
使えるタグは [neutral] [happy] [angry] [sad] [surprised] [fearful] の六種類です。\
例: [happy]今日も話せてうれしいです。\
返答は短い話し言葉でお願いします。";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub chat_base_url: String,
    pub chat_model: String,
    pub max_tokens: u16,
    pub api_key: String,
    pub synth_base_url: String,
    pub request_timeout_secs: u64,
    pub history_limit: usize,
    pub state_dir: PathBuf,
    pub threshold_addr: Option<String>,
    /// Socket pushing text to be spoken directly, bypassing the chat
    /// backend.
    pub push_addr: Option<String>,
    /// Overrides the default system prompt on first run; a persisted
    /// prompt still wins.
    pub system_prompt: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chat_base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-3.5-turbo".to_string(),
            max_tokens: 200,
            api_key: String::new(),
            synth_base_url: "http://127.0.0.1:50021".to_string(),
            request_timeout_secs: 60,
            history_limit: 10,
            state_dir: PathBuf::from("."),
            threshold_addr: None,
            push_addr: None,
            system_prompt: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let chat_base_url = std::env::var("CHAT_BASE_URL")
            .ok()
            .unwrap_or(defaults.chat_base_url);

        let chat_model = std::env::var("CHAT_MODEL").ok().unwrap_or(defaults.chat_model);

        let max_tokens = std::env::var("CHAT_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_tokens);

        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();

        let synth_base_url = std::env::var("VOICEVOX_BASE_URL")
            .ok()
            .unwrap_or(defaults.synth_base_url);

        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.request_timeout_secs);

        let history_limit = std::env::var("HISTORY_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.history_limit);

        let state_dir = std::env::var("STATE_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or(defaults.state_dir);

        let threshold_addr = std::env::var("THRESHOLD_ADDR").ok().filter(|v| !v.is_empty());

        let push_addr = std::env::var("PUSH_ADDR").ok().filter(|v| !v.is_empty());

        let system_prompt = std::env::var("SYSTEM_PROMPT").ok().filter(|v| !v.is_empty());

        Self {
            chat_base_url,
            chat_model,
            max_tokens,
            api_key,
            synth_base_url,
            request_timeout_secs,
            history_limit,
            state_dir,
            threshold_addr,
            push_addr,
            system_prompt,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_upstream_expectations() {
        let config = ClientConfig::default();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.max_tokens, 200);
        assert!(config.threshold_addr.is_none());
    }
}
