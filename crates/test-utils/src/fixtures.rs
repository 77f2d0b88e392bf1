//! Common test fixtures.
//!
//! The storm is Hurricane Harvey over the western Gulf of Mexico, the
//! extent the archival pipeline was first exercised against.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use storm_common::{
    ArchiveSettings, BoundingBox, CategoryRequirement, FetchLog, ModelRun, ProcessorKind,
    ProviderSource, SourceProtocol, StormEvent, TimeWindow,
};

/// Signed-longitude extent of the fixture storm.
pub const GULF_EXTENT: (f64, f64, f64, f64) = (-97.5, 28.2, -91.0, 33.3);

/// Midnight UTC on the given day.
pub fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn window() -> TimeWindow {
    TimeWindow::new(day(2017, 8, 20), day(2017, 9, 3))
}

pub fn storm() -> StormEvent {
    let (min_x, min_y, max_x, max_y) = GULF_EXTENT;
    StormEvent {
        id: 1,
        name: "Harvey".to_string(),
        geo: BoundingBox::new(min_x, min_y, max_x, max_y),
        window: window(),
    }
}

/// Requirement with id 1.
pub fn requirement(storm: &StormEvent, name: &str) -> CategoryRequirement {
    requirement_with_id(storm, 1, name)
}

pub fn requirement_with_id(storm: &StormEvent, id: i64, name: &str) -> CategoryRequirement {
    CategoryRequirement {
        id,
        storm_id: storm.id,
        name: name.to_string(),
        geo: storm.geo,
        window: storm.window,
        active: true,
    }
}

/// Provider with id 1 speaking the protocol its processor implies.
pub fn provider(requirement: &CategoryRequirement, processor: ProcessorKind) -> ProviderSource {
    provider_with_id(requirement, 1, processor)
}

pub fn provider_with_id(
    requirement: &CategoryRequirement,
    id: i64,
    processor: ProcessorKind,
) -> ProviderSource {
    let source = match processor {
        ProcessorKind::RemoteGrid | ProcessorKind::RemoteSequence => {
            SourceProtocol::RemoteSubsetting
        }
        _ => SourceProtocol::GenericBuoyFeed,
    };
    ProviderSource {
        id,
        requirement_id: requirement.id,
        name: format!("{} provider {}", requirement.name, id),
        processor,
        source,
        url: format!("https://data.example.org/{}/{}", requirement.name.to_lowercase(), id),
        active: true,
        data_regex: None,
    }
}

pub fn fetch_log(
    id: i64,
    requirement: &CategoryRequirement,
    date: DateTime<Utc>,
    success: bool,
    snapshot: &str,
) -> FetchLog {
    FetchLog {
        id,
        storm_id: requirement.storm_id,
        requirement_id: requirement.id,
        requirement_name: requirement.name.clone(),
        provider_id: 1,
        date,
        success,
        snapshot: snapshot.to_string(),
    }
}

pub fn model_run(id: i64, storm: &StormEvent) -> ModelRun {
    ModelRun::new(id, storm.id)
}

/// Settings rooted at a temporary directory.
pub fn archive_settings(root: &Path) -> ArchiveSettings {
    ArchiveSettings {
        data_dir: root.to_path_buf(),
        ..ArchiveSettings::default()
    }
}
