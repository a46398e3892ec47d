//! Audit trail records.
//!
//! Every mutating command writes one structured record. The store owns
//! the table; this module only defines the record shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audit record: who did what, where, when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub module: String,
    pub action: String,
    pub description: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(module: &str, action: &str, description: impl Into<String>, actor: &str) -> Self {
        AuditEntry {
            module: module.to_string(),
            action: action.to_string(),
            description: description.into(),
            actor: actor.to_string(),
            timestamp: Utc::now(),
        }
    }
}
