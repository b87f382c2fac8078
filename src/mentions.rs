use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Read-only mapping from Telegram user identity (first name or @username)
/// to Zulip handle. Loaded once at startup, never mutated afterwards.
#[derive(Debug, Default)]
pub struct MentionDirectory {
    map: HashMap<String, String>,
}

impl MentionDirectory {
    /// Load the directory from a JSON object file: `{"telegram name": "zulip handle"}`.
    /// A missing file is a startup error, not a runtime condition.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read users mapping file: {}", path.display()))?;
        let map: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid users mapping file: {}", path.display()))?;
        Ok(Self { map })
    }

    /// Resolve a source-platform identity to a Zulip handle.
    /// Unknown identities resolve to `None` and are dropped by the caller.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            map: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}
