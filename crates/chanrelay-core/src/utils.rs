use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::MessageRef, errors::Error, Result};

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for logs/telemetry).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

// ============== Audit Logging ==============

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    pub source_chat_id: i64,
    pub source_message_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_message_id: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn base(event: &str, source: MessageRef) -> Self {
        Self {
            timestamp: String::new(),
            event: event.to_string(),
            source_chat_id: source.chat_id.0,
            source_message_id: source.message_id.0,
            target_message_id: None,
            content_type: None,
            content: None,
            reason: None,
        }
    }

    pub fn relayed(source: MessageRef, target: MessageRef, content_type: &str, content: &str) -> Self {
        Self {
            target_message_id: Some(target.message_id.0),
            content_type: Some(content_type.to_string()),
            content: Some(content.to_string()),
            ..Self::base("relay", source)
        }
    }

    pub fn edited(source: MessageRef, target: MessageRef, content_type: &str, content: &str) -> Self {
        Self {
            target_message_id: Some(target.message_id.0),
            content_type: Some(content_type.to_string()),
            content: Some(content.to_string()),
            ..Self::base("edit", source)
        }
    }

    pub fn dropped(source: MessageRef, content_type: &str, reason: &str) -> Self {
        Self {
            content_type: Some(content_type.to_string()),
            reason: Some(reason.to_string()),
            ..Self::base("drop", source)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if event.timestamp.is_empty() {
            event.timestamp = iso_timestamp_utc();
        }
        if let Some(s) = &event.content {
            event.content = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}
