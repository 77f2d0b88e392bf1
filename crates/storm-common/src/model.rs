//! Storm, covered-data and model-run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BoundingBox, TimeWindow};

/// A named storm event, i.e. "Harvey".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StormEvent {
    pub id: i64,
    pub name: String,
    pub geo: BoundingBox,
    pub window: TimeWindow,
}

impl std::fmt::Display for StormEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A class of covered data a storm's model run must be supplied with
/// (e.g. wind fields), with its own extent and time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRequirement {
    pub id: i64,
    pub storm_id: i64,
    pub name: String,
    pub geo: BoundingBox,
    pub window: TimeWindow,
    pub active: bool,
}

impl std::fmt::Display for CategoryRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// How a provider's payload is retrieved and filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessorKind {
    RawBinary,
    HierarchicalContainer,
    RemoteGrid,
    RemoteSequence,
}

impl ProcessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawBinary => "raw-binary",
            Self::HierarchicalContainer => "hierarchical-container",
            Self::RemoteGrid => "remote-grid",
            Self::RemoteSequence => "remote-sequence",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raw-binary" => Some(Self::RawBinary),
            "hierarchical-container" => Some(Self::HierarchicalContainer),
            "remote-grid" | "grid" => Some(Self::RemoteGrid),
            "remote-sequence" | "sequence" => Some(Self::RemoteSequence),
            _ => None,
        }
    }
}

/// Upstream protocol a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceProtocol {
    /// OPeNDAP-style access with server-side index-range slicing.
    RemoteSubsetting,
    /// Plain file feeds such as the National Data Buoy Center.
    GenericBuoyFeed,
}

impl SourceProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteSubsetting => "remote-subsetting",
            Self::GenericBuoyFeed => "generic-buoy-feed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "remote-subsetting" | "dap" => Some(Self::RemoteSubsetting),
            "generic-buoy-feed" | "ndbc" => Some(Self::GenericBuoyFeed),
            _ => None,
        }
    }
}

/// A concrete upstream endpoint supplying one category requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSource {
    pub id: i64,
    pub requirement_id: i64,
    pub name: String,
    pub processor: ProcessorKind,
    pub source: SourceProtocol,
    pub url: String,
    pub active: bool,
    /// Filename pattern used to discover datasets under `url`.
    #[serde(default)]
    pub data_regex: Option<String>,
}

impl std::fmt::Display for ProviderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One fetch attempt for a (storm, requirement, provider) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchLog {
    pub id: i64,
    pub storm_id: i64,
    pub requirement_id: i64,
    /// Requirement name, denormalized for per-category selection.
    pub requirement_name: String,
    pub provider_id: i64,
    pub date: DateTime<Utc>,
    pub success: bool,
    /// Stored snapshot path; empty until the archive stage completes.
    pub snapshot: String,
}

impl FetchLog {
    pub fn is_archived(&self) -> bool {
        !self.snapshot.is_empty()
    }
}

/// Insert form of a [`FetchLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFetchLog {
    pub storm_id: i64,
    pub requirement_id: i64,
    pub requirement_name: String,
    pub provider_id: i64,
    pub date: DateTime<Utc>,
    pub success: bool,
}

/// One versioned model execution ("NSEM") tied to a storm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRun {
    pub id: i64,
    pub storm_id: i64,
    /// Uploaded (later: versioned) model output path in storage.
    pub model_output_snapshot: String,
    pub model_output_snapshot_extracted: bool,
    /// Storage directory holding the combined covered-data snapshots.
    pub covered_data_snapshot: String,
    pub date_requested: DateTime<Utc>,
    pub date_returned: Option<DateTime<Utc>>,
}

impl ModelRun {
    pub fn new(id: i64, storm_id: i64) -> Self {
        Self {
            id,
            storm_id,
            model_output_snapshot: String::new(),
            model_output_snapshot_extracted: false,
            covered_data_snapshot: String::new(),
            date_requested: Utc::now(),
            date_returned: None,
        }
    }

    pub fn has_output(&self) -> bool {
        !self.model_output_snapshot.is_empty()
    }

    /// "v<id>" version directory name.
    pub fn version(&self) -> String {
        format!("v{}", self.id)
    }
}
