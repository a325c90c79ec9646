//! Channel registry: which chats are relayed, and where to.
//!
//! Persisted as `settings.json` (`{"SOURCE_CHAT_IDS":[..],"TARGET_CHAT_ID":..}`).
//! Mutations are serialized, written to disk, then published as a new
//! immutable snapshot, so an event never observes a half-applied change.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{Arc, Mutex, RwLock},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{domain::ChatId, errors::Error, ports::RegistrySource, store, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub source_chat_ids: HashSet<ChatId>,
    pub target_chat_id: Option<ChatId>,
}

impl RegistrySnapshot {
    pub fn is_source(&self, chat_id: ChatId) -> bool {
        self.source_chat_ids.contains(&chat_id)
    }

    /// Sources in ascending order, for display and persistence.
    pub fn sorted_sources(&self) -> Vec<ChatId> {
        let mut v: Vec<ChatId> = self.source_chat_ids.iter().copied().collect();
        v.sort();
        v
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(rename = "SOURCE_CHAT_IDS", default)]
    source_chat_ids: Vec<i64>,
    #[serde(rename = "TARGET_CHAT_ID", default)]
    target_chat_id: Option<i64>,
}

impl From<&RegistrySnapshot> for SettingsFile {
    fn from(s: &RegistrySnapshot) -> Self {
        Self {
            source_chat_ids: s.sorted_sources().into_iter().map(|c| c.0).collect(),
            target_chat_id: s.target_chat_id.map(|c| c.0),
        }
    }
}

impl From<SettingsFile> for RegistrySnapshot {
    fn from(f: SettingsFile) -> Self {
        Self {
            source_chat_ids: f.source_chat_ids.into_iter().map(ChatId).collect(),
            target_chat_id: f.target_chat_id.map(ChatId),
        }
    }
}

pub struct ChannelRegistry {
    path: Option<PathBuf>,
    current: RwLock<Arc<RegistrySnapshot>>,
    write_lock: Mutex<()>,
}

impl ChannelRegistry {
    pub fn in_memory(snapshot: RegistrySnapshot) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file: SettingsFile = store::load_or_init(&path, SettingsFile::default)?;
        let snapshot = RegistrySnapshot::from(file);
        info!(
            path = %path.display(),
            sources = snapshot.source_chat_ids.len(),
            target = ?snapshot.target_chat_id.map(|c| c.0),
            "loaded channel registry"
        );
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn current(&self) -> Arc<RegistrySnapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Add a source chat. Returns `false` if it was already registered.
    pub fn add_source(&self, chat_id: ChatId) -> Result<bool> {
        self.mutate(|s| {
            if s.target_chat_id == Some(chat_id) {
                return Err(Error::Registry(format!(
                    "chat {chat_id} is the target and cannot also be a source"
                )));
            }
            Ok(s.source_chat_ids.insert(chat_id))
        })
    }

    /// Remove a source chat. Returns `false` if it was not registered.
    pub fn remove_source(&self, chat_id: ChatId) -> Result<bool> {
        self.mutate(|s| Ok(s.source_chat_ids.remove(&chat_id)))
    }

    /// Set the target chat, returning the previous one.
    pub fn set_target(&self, chat_id: ChatId) -> Result<Option<ChatId>> {
        self.mutate(|s| {
            if s.is_source(chat_id) {
                return Err(Error::Registry(format!(
                    "chat {chat_id} is a source and cannot also be the target"
                )));
            }
            Ok(s.target_chat_id.replace(chat_id))
        })
    }

    /// Disable relaying by unsetting the target, returning the previous one.
    pub fn clear_target(&self) -> Result<Option<ChatId>> {
        self.mutate(|s| Ok(s.target_chat_id.take()))
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut RegistrySnapshot) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut next = (*self.current()).clone();
        let out = f(&mut next)?;

        if let Some(path) = &self.path {
            store::write_atomic(path, &SettingsFile::from(&next))?;
        }
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
        Ok(out)
    }
}

impl RegistrySource for ChannelRegistry {
    fn current(&self) -> Arc<RegistrySnapshot> {
        ChannelRegistry::current(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutations_persist_in_original_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let reg = ChannelRegistry::load(&path).unwrap();

        assert!(reg.add_source(ChatId(-1002)).unwrap());
        assert!(reg.add_source(ChatId(-1001)).unwrap());
        assert!(!reg.add_source(ChatId(-1001)).unwrap());
        assert_eq!(reg.set_target(ChatId(200)).unwrap(), None);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["SOURCE_CHAT_IDS"], serde_json::json!([-1002, -1001]));
        assert_eq!(raw["TARGET_CHAT_ID"], serde_json::json!(200));

        let reloaded = ChannelRegistry::load(&path).unwrap();
        assert_eq!(*reloaded.current(), *reg.current());
    }

    #[test]
    fn remove_and_clear() {
        let reg = ChannelRegistry::in_memory(RegistrySnapshot::default());
        reg.add_source(ChatId(1)).unwrap();
        reg.set_target(ChatId(2)).unwrap();

        assert!(reg.remove_source(ChatId(1)).unwrap());
        assert!(!reg.remove_source(ChatId(1)).unwrap());
        assert_eq!(reg.clear_target().unwrap(), Some(ChatId(2)));
        assert_eq!(reg.current().target_chat_id, None);
    }

    #[test]
    fn self_loop_configurations_are_rejected() {
        let reg = ChannelRegistry::in_memory(RegistrySnapshot::default());
        reg.add_source(ChatId(10)).unwrap();
        assert!(matches!(reg.set_target(ChatId(10)), Err(Error::Registry(_))));

        reg.set_target(ChatId(20)).unwrap();
        assert!(matches!(reg.add_source(ChatId(20)), Err(Error::Registry(_))));
        assert!(!reg.current().is_source(ChatId(20)));
    }

    #[test]
    fn snapshots_taken_before_a_mutation_are_unaffected() {
        let reg = ChannelRegistry::in_memory(RegistrySnapshot::default());
        let before = reg.current();
        reg.add_source(ChatId(5)).unwrap();
        assert!(!before.is_source(ChatId(5)));
        assert!(reg.current().is_source(ChatId(5)));
    }

    #[test]
    fn null_target_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"SOURCE_CHAT_IDS": [1, 2], "TARGET_CHAT_ID": null}"#).unwrap();
        let reg = ChannelRegistry::load(&path).unwrap();
        let snap = reg.current();
        assert_eq!(snap.sorted_sources(), vec![ChatId(1), ChatId(2)]);
        assert_eq!(snap.target_chat_id, None);
    }
}
