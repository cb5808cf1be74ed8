//! Persisted chat parameters.
//!
//! The trimmed transcript and the current system prompt are stored as
//! one JSON blob under a fixed key and reloaded verbatim on startup.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use llm_core::ChatLog;
use serde::{Deserialize, Serialize};

/// Storage key the blob lives under; also the file stem on disk.
pub const STORAGE_KEY: &str = "chatVRMParams";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedParams {
    pub system_prompt: String,
    pub chat_log: ChatLog,
}

pub struct ParamsStore {
    dir: PathBuf,
}

impl ParamsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(format!("{STORAGE_KEY}.json"))
    }

    /// Load the stored blob, or `None` on first run.
    pub fn load(&self) -> anyhow::Result<Option<PersistedParams>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let params = serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        Ok(Some(params))
    }

    pub fn save(&self, params: &PersistedParams) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path();
        let text = serde_json::to_string(params)?;
        fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_core::ChatTurn;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("avatar-client-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn round_trips_blob() {
        let store = ParamsStore::new(scratch_dir("roundtrip"));

        let mut chat_log = ChatLog::new();
        chat_log.push(ChatTurn::user("こんにちは"));
        chat_log.push(ChatTurn::assistant("[happy]やあ。"));
        let params = PersistedParams {
            system_prompt: "prompt".to_string(),
            chat_log,
        };

        store.save(&params).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.system_prompt, "prompt");
        assert_eq!(loaded.chat_log.turns(), params.chat_log.turns());
    }

    #[test]
    fn missing_file_is_first_run() {
        let store = ParamsStore::new(scratch_dir("fresh"));
        assert!(store.load().unwrap().is_none());
    }
}
