//! Shared types for logsink
//!
//! This crate contains data structures and constants used across multiple logsink crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Maximum size in bytes of a single emitted message
pub const MAX_MESSAGE_SIZE: usize = 61440;

/// Source name used when none is supplied
pub const DEFAULT_LOG_SOURCE: &str = "LOG";

/// Tag carrying the workload guid
pub const SOURCE_ID_TAG: &str = "source_id";

/// Tag carrying the workload instance index
pub const INSTANCE_ID_TAG: &str = "instance_id";

/// Custom string tags attached to every message
pub type Tags = HashMap<String, String>;

// ============================================================================
// Output Channels
// ============================================================================

/// Which workload output stream a message came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "OUT")]
    Stdout,
    #[serde(rename = "ERR")]
    Stderr,
}

impl Channel {
    /// Short label matching the serialized form
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stdout => "OUT",
            Self::Stderr => "ERR",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Identity of the workload whose output is being captured
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadIdentity {
    pub guid: String,
    pub instance_index: i32,
    pub tags: Tags,
}

impl WorkloadIdentity {
    pub fn new(guid: impl Into<String>, instance_index: i32, tags: Tags) -> Self {
        Self {
            guid: guid.into(),
            instance_index,
            tags,
        }
    }

    /// An empty guid disables log shipping entirely
    pub fn is_enabled(&self) -> bool {
        !self.guid.is_empty()
    }

    /// Custom tags plus `source_id` and `instance_id`
    pub fn message_tags(&self) -> Tags {
        let mut tags = self.tags.clone();
        tags.insert(SOURCE_ID_TAG.to_string(), self.guid.clone());
        tags.insert(
            INSTANCE_ID_TAG.to_string(),
            self.instance_index.to_string(),
        );
        tags
    }
}

/// Resolve a requested source name, falling back when it is empty
pub fn source_or<'a>(requested: &'a str, fallback: &'a str) -> &'a str {
    if requested.is_empty() {
        fallback
    } else {
        requested
    }
}

// ============================================================================
// Envelopes
// ============================================================================

/// A tagged log message ready for delivery to a collector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEnvelope {
    pub timestamp: DateTime<Utc>,
    pub message_type: Channel,
    pub source_name: String,
    pub message: String,
    pub tags: Tags,
}

impl LogEnvelope {
    /// Build an envelope stamped with the current time.
    ///
    /// Message bytes are converted lossily; invalid sequences become U+FFFD.
    pub fn new(message_type: Channel, message: &[u8], source_name: &str, tags: &Tags) -> Self {
        Self {
            timestamp: Utc::now(),
            message_type,
            source_name: source_name.to_string(),
            message: String::from_utf8_lossy(message).into_owned(),
            tags: tags.clone(),
        }
    }
}
