//! Core domain + application logic for the channel relay.
//!
//! This crate is framework-agnostic. Telegram lives behind the messaging port
//! implemented in the adapter crate.

pub mod config;
pub mod domain;
pub mod errors;
pub mod identity_map;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod registry;
pub mod relay;
pub mod rules;
pub mod security;
pub mod store;
pub mod transform;
pub mod utils;

pub use errors::{Error, Result};
