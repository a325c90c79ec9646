//! Read-side ports the relay engine is wired with.
//!
//! The engine only ever asks for a snapshot at the start of an event; the
//! stores behind these traits own mutation and persistence.

use std::sync::Arc;

use crate::{registry::RegistrySnapshot, rules::RuleSet};

/// Source of the active substitution/block rules.
pub trait RuleSource: Send + Sync {
    fn current(&self) -> Arc<RuleSet>;
}

/// Source of the eligible source chats and the target chat.
pub trait RegistrySource: Send + Sync {
    fn current(&self) -> Arc<RegistrySnapshot>;
}
