//! Typed task messages exchanged between the API, the scheduler and workers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One field of a fixed-layout binary record: name plus a numpy-style
/// type code such as `<f8`, `>i4` or `u1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub dtype: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, dtype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dtype: dtype.into(),
        }
    }
}

/// Free-form processor parameters carried with a fetch job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorParams {
    /// Record layout for structured-binary payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_layout: Option<Vec<FieldSpec>>,
    /// Seconds between the unix epoch and the payload's time epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_offset: Option<f64>,
    /// TLS certificate verification for this job's network calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_tls: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProcessorParams {
    pub fn verify_tls(&self) -> bool {
        self.verify_tls.unwrap_or(true)
    }

    pub fn epoch_offset(&self) -> f64 {
        self.epoch_offset.unwrap_or(0.0)
    }
}

/// Fetch one dataset from one provider for one storm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchTask {
    pub storm_id: i64,
    pub provider_id: i64,
    pub url: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub params: ProcessorParams,
}

/// Work item scheduled onto the task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskMessage {
    Fetch(FetchTask),
    Archive {
        storm_id: i64,
        requirement_id: i64,
        log_id: i64,
    },
    Combine {
        run_id: i64,
    },
    Extract {
        run_id: i64,
    },
    FetchUrl {
        url: String,
        #[serde(default = "default_verify")]
        verify_tls: bool,
        #[serde(default)]
        write_to_path: Option<PathBuf>,
    },
}

fn default_verify() -> bool {
    true
}

impl TaskMessage {
    /// Short name used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskMessage::Fetch(_) => "fetch",
            TaskMessage::Archive { .. } => "archive",
            TaskMessage::Combine { .. } => "combine",
            TaskMessage::Extract { .. } => "extract",
            TaskMessage::FetchUrl { .. } => "fetch_url",
        }
    }
}

/// A message plus its queue bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub message: TaskMessage,
}

impl TaskEnvelope {
    pub fn new(message: TaskMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            message,
        }
    }
}
