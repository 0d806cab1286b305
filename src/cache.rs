//! Offline payload cache for tool responses
//!
//! Tools persist fresh payloads to disk so runs with AGENT_OFFLINE=1 can
//! replay earlier market data without network access.

use crate::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const MAX_PLAIN_KEY_LEN: usize = 64;

/// Return true when the agent should avoid live network calls.
/// Controlled via the AGENT_OFFLINE environment variable.
pub fn is_offline() -> bool {
    matches!(
        env::var("AGENT_OFFLINE").unwrap_or_default().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// JSON file cache keyed by (resource, key). Resource names the tool
/// (e.g. "price_history"); the key encodes the arguments that affect the
/// payload.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Cache rooted at AGENT_CACHE_DIR, or ./cache when unset.
    pub fn from_env() -> Self {
        let root = env::var("AGENT_CACHE_DIR").unwrap_or_else(|_| "cache".to_string());
        Self { root: PathBuf::from(root) }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn save(&self, resource: &str, key: &str, payload: &Value) -> Result<()> {
        let path = self.entry_path(resource, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec(payload)?)?;
        debug!(resource, key, path = %path.display(), "Cached payload");
        Ok(())
    }

    pub fn load(&self, resource: &str, key: &str) -> Option<Value> {
        let path = self.entry_path(resource, key);
        let bytes = fs::read(&path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn entry_path(&self, resource: &str, key: &str) -> PathBuf {
        self.root
            .join(sanitize_segment(resource))
            .join(format!("{}.json", file_key(key)))
    }
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '=' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sanitized key, with a sha256 fingerprint suffix when the key is too long
/// or got mangled by sanitization.
fn file_key(key: &str) -> String {
    let sanitized = sanitize_segment(key);
    if sanitized.len() <= MAX_PLAIN_KEY_LEN && sanitized == key {
        return sanitized;
    }
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    let prefix: String = sanitized.chars().take(40).collect();
    format!("{}-{}", prefix, &digest[..16])
}
