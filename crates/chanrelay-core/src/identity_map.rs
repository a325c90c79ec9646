//! Source message -> relayed target message mapping.
//!
//! Entries are keyed by `(source chat, source message)` and written only after
//! the target message exists, so a reader sees either no entry or a complete
//! one. The map is sharded (`DashMap`): records for different keys do not
//! contend, records for one key are linearizable.
//!
//! On disk the map is a flat JSON object `{"{chat}:{message}": target}`.

use std::{collections::BTreeMap, path::PathBuf};

use dashmap::DashMap;
use tracing::{info, warn};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    store, Result,
};

pub struct IdentityMap {
    entries: DashMap<MessageRef, MessageId>,
    path: Option<PathBuf>,
    // Serializes saves so a slower writer cannot overwrite a newer snapshot.
    persist_lock: tokio::sync::Mutex<()>,
}

impl IdentityMap {
    pub fn in_memory() -> Self {
        Self {
            entries: DashMap::new(),
            path: None,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the persisted map, creating an empty file if it is missing.
    ///
    /// Keys without a chat component (bare message ids) cannot be scoped to a
    /// source chat and are skipped.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw: BTreeMap<String, i32> = store::load_or_init(&path, BTreeMap::new)?;

        let entries = DashMap::with_capacity(raw.len());
        let mut skipped = 0usize;
        for (key, target) in raw {
            match parse_key(&key) {
                Some(source) => {
                    entries.insert(source, MessageId(target));
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                path = %path.display(),
                skipped,
                "ignored identity map entries without a source chat"
            );
        }
        info!(path = %path.display(), entries = entries.len(), "loaded identity map");

        Ok(Self {
            entries,
            path: Some(path),
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Idempotent upsert; the last write for a key wins.
    pub fn record(&self, source: MessageRef, target: MessageId) {
        self.entries.insert(source, target);
    }

    pub fn lookup(&self, source: MessageRef) -> Option<MessageId> {
        self.entries.get(&source).map(|e| *e.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the current contents to disk (no-op for in-memory maps).
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.to_flat();
        tokio::task::spawn_blocking(move || store::write_atomic(&path, &snapshot))
            .await
            .map_err(|e| Error::External(format!("identity map save task failed: {e}")))?
    }

    fn to_flat(&self) -> BTreeMap<String, i32> {
        self.entries
            .iter()
            .map(|e| (format_key(*e.key()), e.value().0))
            .collect()
    }
}

fn format_key(source: MessageRef) -> String {
    format!("{}:{}", source.chat_id.0, source.message_id.0)
}

fn parse_key(key: &str) -> Option<MessageRef> {
    let (chat, msg) = key.rsplit_once(':')?;
    Some(MessageRef {
        chat_id: ChatId(chat.trim().parse().ok()?),
        message_id: MessageId(msg.trim().parse().ok()?),
    })
}
