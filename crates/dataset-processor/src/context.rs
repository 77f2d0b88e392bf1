//! Per-job processor binding: which storm, requirement and provider a fetch
//! serves, where its artifact lands, and how its HTTP session is configured.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use storm_common::{
    ArchiveSettings, CategoryRequirement, ProcessorParams, ProviderSource, StoragePath,
    StormEvent,
};

use crate::error::ProcessorResult;

/// File name used when a job carries no label.
pub const DEFAULT_LABEL: &str = "data";

/// Network timeouts applied to every provider call.
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    /// Connection establishment ceiling
    pub connect_timeout: Duration,
    /// Whole-request ceiling, body transfer included
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl HttpSettings {
    /// Build a client with certificate verification set per job.
    pub fn client(&self, verify_tls: bool) -> ProcessorResult<Client> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;
        Ok(client)
    }
}

/// Everything a processor is bound to for one fetch.
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    pub storm: StormEvent,
    pub requirement: CategoryRequirement,
    pub provider: ProviderSource,
    pub url: String,
    pub label: Option<String>,
    pub group: Option<String>,
    pub params: ProcessorParams,
    pub settings: ArchiveSettings,
    pub http: HttpSettings,
}

impl ProcessorContext {
    /// Staging directory of this storm/category pair.
    pub fn staging_dir(&self) -> PathBuf {
        StoragePath::staging_category(&self.settings, &self.storm.name, &self.requirement.name)
    }

    /// Artifact path: the provider's directory under the category staging
    /// dir, optional group dir, label plus optional extension.
    pub fn output_path(&self, extension: Option<&str>) -> PathBuf {
        let mut path = StoragePath::staging_provider(
            &self.settings,
            &self.storm.name,
            &self.requirement.name,
            self.provider.id,
        );
        if let Some(group) = self.group.as_deref().filter(|g| !g.is_empty()) {
            path.push(group);
        }

        let label = self
            .label
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LABEL);
        match extension {
            Some(ext) => path.push(format!("{}.{}", label, ext)),
            None => path.push(label),
        }
        path
    }

    /// Create the staging directory and the artifact's parent directory.
    pub fn prepare(&self, output_path: &Path) -> ProcessorResult<()> {
        std::fs::create_dir_all(self.staging_dir())?;
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// HTTP client honouring this job's TLS verification flag.
    pub fn client(&self) -> ProcessorResult<Client> {
        self.http.client(self.params.verify_tls())
    }

    pub fn summary(&self, output_path: &Path, success: bool) -> ProcessorSummary {
        ProcessorSummary {
            output_path: output_path.to_path_buf(),
            url: self.url.clone(),
            label: self.label.clone().unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            group: self.group.clone(),
            storm: self.storm.to_string(),
            category: self.requirement.to_string(),
            provider: self.provider.to_string(),
            success,
        }
    }
}

/// Serializable report of one processor run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSummary {
    pub output_path: PathBuf,
    pub url: String,
    pub label: String,
    pub group: Option<String>,
    pub storm: String,
    pub category: String,
    pub provider: String,
    pub success: bool,
}
