//! Substitution and block rules, and the store that owns the active snapshot.
//!
//! The on-disk format is the `replacements.json` document:
//! `{"links":{},"texts":{},"stickers":{},"emojis":{},"blocked":[],
//!   "blocked_content":{"videos":[],"images":[],"texts":[],"paragraphs":[]}}`.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{ports::RuleSource, store, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub links: BTreeMap<String, String>,
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
    #[serde(default)]
    pub stickers: BTreeMap<String, String>,
    #[serde(default)]
    pub emojis: BTreeMap<String, String>,
    /// Chat or user ids whose content is suppressed outright.
    #[serde(default)]
    pub blocked: BTreeSet<i64>,
    #[serde(default)]
    pub blocked_content: BlockedContent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedContent {
    #[serde(default)]
    pub videos: BTreeSet<String>,
    #[serde(default)]
    pub images: BTreeSet<String>,
    #[serde(default)]
    pub texts: BTreeSet<String>,
    #[serde(default)]
    pub paragraphs: BTreeSet<String>,
}

impl RuleSet {
    /// Substitution categories in application order.
    pub fn substitution_passes(&self) -> [&BTreeMap<String, String>; 3] {
        [&self.links, &self.texts, &self.emojis]
    }

    pub fn sticker_for(&self, file_id: &str) -> Option<&str> {
        self.stickers.get(file_id).map(String::as_str)
    }

    pub fn is_blocked_id(&self, id: i64) -> bool {
        self.blocked.contains(&id)
    }
}

/// Owns the active [`RuleSet`] and hands out cheap snapshots.
///
/// Readers never block each other; a reload swaps the whole snapshot so an
/// event holding an older `Arc<RuleSet>` keeps a consistent view.
pub struct RuleStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<RuleSet>>,
    last_modified: Mutex<Option<SystemTime>>,
}

impl RuleStore {
    pub fn in_memory(rules: RuleSet) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(rules)),
            last_modified: Mutex::new(None),
        }
    }

    /// Load rules from `path`, creating an empty rule file if it is missing.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rules: RuleSet = store::load_or_init(&path, RuleSet::default)?;
        let modified = modified_at(&path);
        info!(
            path = %path.display(),
            links = rules.links.len(),
            texts = rules.texts.len(),
            emojis = rules.emojis.len(),
            stickers = rules.stickers.len(),
            "loaded rules"
        );
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(rules)),
            last_modified: Mutex::new(modified),
        })
    }

    pub fn current(&self) -> Arc<RuleSet> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap in a new rule set, persisting it first when file-backed.
    pub fn replace(&self, rules: RuleSet) -> Result<()> {
        if let Some(path) = &self.path {
            store::write_atomic(path, &rules)?;
            *self.last_modified.lock().unwrap_or_else(|e| e.into_inner()) = modified_at(path);
        }
        self.publish(rules);
        Ok(())
    }

    /// Re-read the rule file. On parse failure the previous snapshot stays active.
    pub fn reload(&self) -> Result<Arc<RuleSet>> {
        let Some(path) = &self.path else {
            return Ok(self.current());
        };
        let rules: RuleSet = store::load_existing(path)?;
        *self.last_modified.lock().unwrap_or_else(|e| e.into_inner()) = modified_at(path);
        self.publish(rules);
        Ok(self.current())
    }

    /// Reload if the file's mtime moved forward since the last load.
    /// Returns `true` when a new snapshot was published.
    pub fn reload_if_changed(&self) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        let Some(modified) = modified_at(path) else {
            return false;
        };
        let changed = {
            let mut last = self.last_modified.lock().unwrap_or_else(|e| e.into_inner());
            match *last {
                Some(prev) if modified <= prev => false,
                _ => {
                    *last = Some(modified);
                    true
                }
            }
        };
        if !changed {
            return false;
        }

        match store::load_existing::<RuleSet>(path) {
            Ok(rules) => {
                self.publish(rules);
                info!(path = %path.display(), "rules file changed, reloaded");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "rules reload failed, keeping previous rules");
                false
            }
        }
    }

    /// Poll the rule file for changes every `interval` until cancelled.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> RuleWatcher {
        let cancel = CancellationToken::new();
        let tok = cancel.clone();
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = tok.cancelled() => break,
                    _ = tick.tick() => {
                        store.reload_if_changed();
                    }
                }
            }
        });
        RuleWatcher { cancel, handle }
    }

    fn publish(&self, rules: RuleSet) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(rules);
    }
}

impl RuleSource for RuleStore {
    fn current(&self) -> Arc<RuleSet> {
        RuleStore::current(self)
    }
}

/// Handle to the background rule file watcher.
pub struct RuleWatcher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RuleWatcher {
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "rules watcher task failed");
        }
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok()?.modified().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_original_file_format_with_missing_keys() {
        let raw = r#"{"links":{"t.me/old":"t.me/new"},"blocked":[-100],"blocked_content":{"texts":["spam"]}}"#;
        let rules: RuleSet = serde_json::from_str(raw).unwrap();
        assert_eq!(rules.links.get("t.me/old").map(String::as_str), Some("t.me/new"));
        assert!(rules.texts.is_empty());
        assert!(rules.is_blocked_id(-100));
        assert!(rules.blocked_content.texts.contains("spam"));
        assert!(rules.blocked_content.paragraphs.is_empty());
    }

    #[test]
    fn load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replacements.json");
        let store = RuleStore::load(&path).unwrap();
        assert_eq!(*store.current(), RuleSet::default());

        let txt = fs::read_to_string(&path).unwrap();
        assert!(txt.contains("blocked_content"));
        assert!(txt.contains("paragraphs"));
    }

    #[test]
    fn replace_persists_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replacements.json");
        let store = RuleStore::load(&path).unwrap();
        let before = store.current();

        let mut rules = RuleSet::default();
        rules.emojis.insert(":)".into(), "🙂".into());
        store.replace(rules.clone()).unwrap();

        assert!(before.emojis.is_empty());
        assert_eq!(*store.current(), rules);
        assert_eq!(*RuleStore::load(&path).unwrap().current(), rules);
    }

    #[test]
    fn broken_reload_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replacements.json");
        fs::write(&path, r#"{"texts":{"a":"b"}}"#).unwrap();
        let store = RuleStore::load(&path).unwrap();

        fs::write(&path, "{broken").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.current().texts.get("a").map(String::as_str), Some("b"));
    }

    #[test]
    fn reload_if_changed_picks_up_newer_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replacements.json");
        fs::write(&path, r#"{"texts":{"a":"b"}}"#).unwrap();
        let store = RuleStore::load(&path).unwrap();
        assert!(!store.reload_if_changed());

        // Force the recorded mtime into the past so the rewrite counts as newer
        // even on filesystems with coarse timestamps.
        *store.last_modified.lock().unwrap() = Some(SystemTime::UNIX_EPOCH);
        fs::write(&path, r#"{"texts":{"a":"c"}}"#).unwrap();

        assert!(store.reload_if_changed());
        assert_eq!(store.current().texts.get("a").map(String::as_str), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_publishes_changes_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replacements.json");
        fs::write(&path, r#"{"texts":{"a":"b"}}"#).unwrap();
        let store = Arc::new(RuleStore::load(&path).unwrap());

        *store.last_modified.lock().unwrap() = Some(SystemTime::UNIX_EPOCH);
        fs::write(&path, r#"{"texts":{"a":"c"}}"#).unwrap();

        let watcher = store.spawn_watcher(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(store.current().texts.get("a").map(String::as_str), Some("c"));

        tokio::time::timeout(Duration::from_secs(1), watcher.stop())
            .await
            .expect("watcher did not stop");

        // Stopped watchers no longer pick up changes.
        *store.last_modified.lock().unwrap() = Some(SystemTime::UNIX_EPOCH);
        fs::write(&path, r#"{"texts":{"a":"d"}}"#).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.current().texts.get("a").map(String::as_str), Some("c"));
    }
}
