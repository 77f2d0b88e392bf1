//! Hierarchical container (NetCDF4/HDF5) files: download, then re-open in
//! read/write mode and run a filter hook.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use storm_common::StormResult;

use crate::context::{ProcessorContext, ProcessorSummary};
use crate::error::ProcessorResult;
use crate::processor::{DatasetProcessor, FetchOutcome};
use crate::raw::RawFileProcessor;

/// In-place filter applied to a downloaded container.
pub trait ContainerFilter: Send + Sync {
    fn filter(&self, file: &mut netcdf::FileMut) -> ProcessorResult<()>;
}

/// Leaves the container untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFilter;

impl ContainerFilter for NoopFilter {
    fn filter(&self, _file: &mut netcdf::FileMut) -> ProcessorResult<()> {
        Ok(())
    }
}

pub struct ContainerProcessor {
    raw: RawFileProcessor,
    filter: Arc<dyn ContainerFilter>,
}

impl ContainerProcessor {
    pub fn new(ctx: ProcessorContext, filter: Arc<dyn ContainerFilter>) -> ProcessorResult<Self> {
        Ok(Self {
            raw: RawFileProcessor::new(ctx)?,
            filter,
        })
    }

    async fn run(&self) -> ProcessorResult<FetchOutcome> {
        self.raw.download().await?;

        let path = self.raw.output_path().to_path_buf();
        let filter = Arc::clone(&self.filter);
        let filtered = path.clone();
        tokio::task::spawn_blocking(move || -> ProcessorResult<()> {
            crate::artifact::silence_hdf5_errors();
            let mut file = netcdf::append(&filtered)?;
            filter.filter(&mut file)?;
            Ok(())
        })
        .await??;

        info!(path = %path.display(), "Fetched container");
        Ok(FetchOutcome::Written { path })
    }
}

#[async_trait]
impl DatasetProcessor for ContainerProcessor {
    async fn fetch(&mut self) -> StormResult<FetchOutcome> {
        let result = self.run().await;
        self.raw.settle(result)
    }

    fn summary(&self) -> ProcessorSummary {
        self.raw.summary()
    }
}
