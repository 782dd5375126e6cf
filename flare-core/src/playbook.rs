//! Operator playbook merged into outbound prompts
//!
//! A playbook is a flat key-value document of standing guidance ("fuzzer":
//! "use afl++ with -m none", ...). Only entries the user has not already
//! written into the message are appended.

use crate::error::{self, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Playbook {
    entries: BTreeMap<String, String>,
}

impl Playbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Load a playbook from a `.toml` or `.json` file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| error::io_at(path, e).with_operation("playbook::load"))?;

        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text).map_err(|e| Error::parse_failed(e.to_string()).set_source(e)),
            Some("toml") => toml::from_str(&text).map_err(|e| Error::parse_failed(e.to_string()).set_source(e)),
            _ => Err(Error::config_invalid("playbook must be a .toml or .json file")),
        };
        parsed.map_err(|e| {
            e.with_operation("playbook::load")
                .with_context("path", path.display().to_string())
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append the entries whose value does not already appear in `message`
    pub fn merge(&self, message: &str) -> String {
        let missing: Vec<(&String, &String)> = self
            .entries
            .iter()
            .filter(|(_, value)| !value.trim().is_empty() && !message.contains(value.trim()))
            .collect();

        if missing.is_empty() {
            return message.to_string();
        }

        let mut merged = String::from(message);
        merged.push_str("\n\nPlaybook:");
        for (key, value) in missing {
            merged.push_str(&format!("\n- {}: {}", key, value.trim()));
        }
        merged
    }
}
