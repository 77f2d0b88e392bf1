//! Whole-file download with temp-file-then-rename placement.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use storm_common::StormResult;

use crate::context::{ProcessorContext, ProcessorSummary};
use crate::error::ProcessorResult;
use crate::processor::{settle, DatasetProcessor, FetchOutcome};

/// Mode of every placed artifact: -rw-r--r--
const ARTIFACT_MODE: u32 = 0o644;

/// Streams a provider URL into the staging directory.
pub struct RawFileProcessor {
    ctx: ProcessorContext,
    client: Client,
    output_path: PathBuf,
    success: bool,
}

impl RawFileProcessor {
    pub fn new(ctx: ProcessorContext) -> ProcessorResult<Self> {
        Self::with_extension(ctx, None)
    }

    pub(crate) fn with_extension(
        ctx: ProcessorContext,
        extension: Option<&str>,
    ) -> ProcessorResult<Self> {
        let output_path = ctx.output_path(extension);
        ctx.prepare(&output_path)?;
        let client = ctx.client()?;

        Ok(Self {
            ctx,
            client,
            output_path,
            success: true,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn context(&self) -> &ProcessorContext {
        &self.ctx
    }

    /// Record the outcome of a fetch built on this download.
    pub(crate) fn settle<T>(&mut self, result: ProcessorResult<T>) -> StormResult<T> {
        settle(&self.ctx, &mut self.success, result)
    }

    pub(crate) fn summary(&self) -> ProcessorSummary {
        self.ctx.summary(&self.output_path, self.success)
    }

    /// Stream the URL to a temp file beside the destination, then rename it
    /// into place. Returns bytes written.
    #[instrument(skip(self), fields(url = %self.ctx.url, path = %self.output_path.display()))]
    pub(crate) async fn download(&self) -> ProcessorResult<u64> {
        let response = self
            .client
            .get(&self.ctx.url)
            .send()
            .await?
            .error_for_status()?;

        let dir = self
            .output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.ctx.staging_dir());
        let (file, temp_path) = NamedTempFile::new_in(&dir)?.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut stream = response.bytes_stream();
        let mut total = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        set_artifact_mode(&temp_path).await?;
        temp_path.persist(&self.output_path)?;

        debug!(bytes = total, "Download placed");
        Ok(total)
    }
}

#[cfg(unix)]
async fn set_artifact_mode(path: &Path) -> ProcessorResult<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(ARTIFACT_MODE)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_artifact_mode(_path: &Path) -> ProcessorResult<()> {
    let _ = ARTIFACT_MODE;
    Ok(())
}

#[async_trait]
impl DatasetProcessor for RawFileProcessor {
    async fn fetch(&mut self) -> StormResult<FetchOutcome> {
        let result = self.download().await.map(|bytes| {
            info!(url = %self.ctx.url, bytes, "Fetched raw file");
            FetchOutcome::Written {
                path: self.output_path.clone(),
            }
        });
        self.settle(result)
    }

    fn summary(&self) -> ProcessorSummary {
        RawFileProcessor::summary(self)
    }
}
