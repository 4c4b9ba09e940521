//! Best-effort fetch cache
//!
//! GitHub payloads land in `~/.specforge/cache/<owner>__<repo>/` as
//! JSON envelopes with a fetch timestamp. Every operation degrades to
//! a miss: a corrupt file, a write failure, or an expired entry just
//! means the data gets fetched again.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    fetched_at: DateTime<Utc>,
    payload: Value,
}

#[derive(Debug, Clone)]
pub struct FetchCache {
    root: PathBuf,
    ttl_hours: i64,
    enabled: bool,
}

impl FetchCache {
    pub fn new(root: PathBuf, ttl_hours: u64, enabled: bool) -> Self {
        Self { root, ttl_hours: ttl_hours.min(i64::MAX as u64) as i64, enabled }
    }

    /// Cache under `$SPECFORGE_HOME/cache`.
    pub fn for_home(config: &crate::config::CacheSection) -> Self {
        Self::new(
            specforge_logging::specforge_home().join("cache"),
            config.ttl_hours,
            config.enabled,
        )
    }

    /// Read a fresh entry, or None.
    pub fn get<T: DeserializeOwned>(&self, scope: &str, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }
        let path = self.entry_path(scope, key);
        let raw = fs::read_to_string(&path).ok()?;
        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding corrupt cache entry");
                return None;
            }
        };
        if Utc::now() - envelope.fetched_at > Duration::hours(self.ttl_hours) {
            debug!(scope, key, "cache entry expired");
            return None;
        }
        serde_json::from_value(envelope.payload).ok()
    }

    /// Write an entry; failures are logged and swallowed.
    pub fn put<T: Serialize>(&self, scope: &str, key: &str, value: &T) {
        if !self.enabled {
            return;
        }
        let payload = match serde_json::to_value(value) {
            Ok(p) => p,
            Err(e) => {
                warn!(scope, key, error = %e, "cache serialize failed");
                return;
            }
        };
        let envelope = Envelope { fetched_at: Utc::now(), payload };
        let path = self.entry_path(scope, key);
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, serde_json::to_vec(&envelope)?)?;
            Ok(())
        };
        if let Err(e) = write() {
            warn!(path = %path.display(), error = %e, "cache write failed");
        }
    }

    fn entry_path(&self, scope: &str, key: &str) -> PathBuf {
        self.root.join(sanitize(scope)).join(format!("{}.json", sanitize(key)))
    }
}

/// Turn `owner/name` into a filesystem-safe directory name.
pub fn cache_scope(repo_id: &str) -> String {
    sanitize(&repo_id.replace('/', "__"))
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
