//! Gzipped tar snapshots of staging directories and model output.
//!
//! Everything here is blocking; callers run it under `spawn_blocking`.

use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use storm_common::{StormError, StormResult};

/// Archive `source` into `archive` with its contents under `arcname/`.
pub fn create_archive(source: &Path, arcname: &str, archive: &Path) -> StormResult<()> {
    if !source.is_dir() {
        return Err(StormError::NotFound(format!(
            "staging directory {}",
            source.display()
        )));
    }

    let file = File::create(archive)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.append_dir_all(arcname, source)?;
    builder.into_inner()?.finish()?;

    debug!(source = %source.display(), archive = %archive.display(), "Created archive");
    Ok(())
}

/// Unpack `archive` into `destination`.
pub fn extract_archive(archive: &Path, destination: &Path) -> StormResult<()> {
    std::fs::create_dir_all(destination)?;
    let file = File::open(archive)?;
    tar::Archive::new(GzDecoder::new(file)).unpack(destination)?;

    debug!(archive = %archive.display(), destination = %destination.display(), "Extracted archive");
    Ok(())
}
