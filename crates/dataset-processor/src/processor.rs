//! Processor selection and the common fetch interface.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use storm_common::{
    ProcessorKind, ProcessorParams, ProviderSource, SourceProtocol, StormError, StormResult,
};

use crate::binary::StructuredBinaryProcessor;
use crate::container::{ContainerFilter, ContainerProcessor, NoopFilter};
use crate::context::{ProcessorContext, ProcessorSummary};
use crate::error::ProcessorResult;
use crate::raw::RawFileProcessor;
use crate::remote::{RemoteLayout, RemoteProcessor};

/// What a fetch left behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// An artifact was placed in staging.
    Written { path: PathBuf },
    /// Nothing within the requirement's window or extent.
    Skipped { reason: String },
}

impl FetchOutcome {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            FetchOutcome::Written { path } => Some(path),
            FetchOutcome::Skipped { .. } => None,
        }
    }
}

/// One provider fetch bound to a [`ProcessorContext`].
#[async_trait]
pub trait DatasetProcessor: Send {
    /// Retrieve, subset and place the artifact.
    async fn fetch(&mut self) -> StormResult<FetchOutcome>;

    /// Report of the run so far; `success` turns false after a failed fetch.
    fn summary(&self) -> ProcessorSummary;
}

/// Log a failed fetch against its context and flip the success flag.
pub(crate) fn settle<T>(
    ctx: &ProcessorContext,
    success: &mut bool,
    result: ProcessorResult<T>,
) -> StormResult<T> {
    result.map_err(|e| {
        *success = false;
        error!(
            storm = %ctx.storm,
            category = %ctx.requirement,
            provider = %ctx.provider,
            url = %ctx.url,
            error = %e,
            "Fetch failed"
        );
        StormError::from(e)
    })
}

/// Concrete processor implementation a provider resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorVariant {
    RawFile,
    StructuredBinary,
    Container,
    RemoteGrid,
    RemoteSequence,
}

/// Pick the implementation for a provider and job parameters.
pub fn select_variant(
    provider: &ProviderSource,
    params: &ProcessorParams,
) -> StormResult<ProcessorVariant> {
    let remote = |variant| {
        if provider.source == SourceProtocol::RemoteSubsetting {
            Ok(variant)
        } else {
            Err(StormError::Configuration(format!(
                "Provider {} uses {} processing over {}, which cannot subset remotely",
                provider.name,
                provider.processor.as_str(),
                provider.source.as_str()
            )))
        }
    };

    match provider.processor {
        ProcessorKind::RemoteGrid => remote(ProcessorVariant::RemoteGrid),
        ProcessorKind::RemoteSequence => remote(ProcessorVariant::RemoteSequence),
        ProcessorKind::HierarchicalContainer => Ok(ProcessorVariant::Container),
        ProcessorKind::RawBinary if params.record_layout.is_some() => {
            Ok(ProcessorVariant::StructuredBinary)
        }
        ProcessorKind::RawBinary => Ok(ProcessorVariant::RawFile),
    }
}

/// Any of the processor implementations, ready to fetch.
pub enum Processor {
    Raw(RawFileProcessor),
    Binary(StructuredBinaryProcessor),
    Container(ContainerProcessor),
    Remote(RemoteProcessor),
}

impl Processor {
    /// Open the processor selected for `ctx`'s provider.
    pub async fn open(ctx: ProcessorContext) -> StormResult<Self> {
        Self::open_with(ctx, Arc::new(NoopFilter)).await
    }

    /// Like [`Processor::open`], with a custom container filter.
    pub async fn open_with(
        ctx: ProcessorContext,
        filter: Arc<dyn ContainerFilter>,
    ) -> StormResult<Self> {
        let variant = select_variant(&ctx.provider, &ctx.params)?;
        let processor = match variant {
            ProcessorVariant::RawFile => Processor::Raw(RawFileProcessor::new(ctx)?),
            ProcessorVariant::StructuredBinary => {
                Processor::Binary(StructuredBinaryProcessor::new(ctx)?)
            }
            ProcessorVariant::Container => {
                Processor::Container(ContainerProcessor::new(ctx, filter)?)
            }
            ProcessorVariant::RemoteGrid => {
                Processor::Remote(RemoteProcessor::open(ctx, RemoteLayout::Grid).await?)
            }
            ProcessorVariant::RemoteSequence => {
                Processor::Remote(RemoteProcessor::open(ctx, RemoteLayout::Sequence).await?)
            }
        };
        Ok(processor)
    }

    pub fn variant(&self) -> ProcessorVariant {
        match self {
            Processor::Raw(_) => ProcessorVariant::RawFile,
            Processor::Binary(_) => ProcessorVariant::StructuredBinary,
            Processor::Container(_) => ProcessorVariant::Container,
            Processor::Remote(p) => match p.layout() {
                RemoteLayout::Grid => ProcessorVariant::RemoteGrid,
                RemoteLayout::Sequence => ProcessorVariant::RemoteSequence,
            },
        }
    }
}

#[async_trait]
impl DatasetProcessor for Processor {
    async fn fetch(&mut self) -> StormResult<FetchOutcome> {
        match self {
            Processor::Raw(p) => p.fetch().await,
            Processor::Binary(p) => p.fetch().await,
            Processor::Container(p) => p.fetch().await,
            Processor::Remote(p) => p.fetch().await,
        }
    }

    fn summary(&self) -> ProcessorSummary {
        match self {
            Processor::Raw(p) => p.summary(),
            Processor::Binary(p) => p.summary(),
            Processor::Container(p) => p.summary(),
            Processor::Remote(p) => p.summary(),
        }
    }
}
