//! Remote-subsettable datasets: slices are resolved from the axis values
//! and evaluated server-side, so only the requirement's window and extent
//! are transferred.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use storm_common::{BoundingBox, CfTimeUnits, StormResult};

use crate::artifact::write_artifact;
use crate::context::{ProcessorContext, ProcessorSummary};
use crate::dap::{AttrValue, DapClient, Das, Decl, DecodedVar, Dds};
use crate::error::{ProcessorError, ProcessorResult};
use crate::processor::{settle, DatasetProcessor, FetchOutcome};
use crate::range::{resolve_range, AxisSlice};

pub const DIMENSION_TIME: &str = "time";
pub const DIMENSION_LATITUDE: &str = "latitude";
pub const DIMENSION_LONGITUDE: &str = "longitude";
pub const DEFAULT_DIMENSIONS: [&str; 3] = [DIMENSION_TIME, DIMENSION_LATITUDE, DIMENSION_LONGITUDE];

/// Extension of remote-subset artifacts.
pub const ARTIFACT_EXTENSION: &str = "nc";

/// How the remote dataset exposes its variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteLayout {
    /// Top-level arrays and grids sharing the time/latitude/longitude axes.
    Grid,
    /// One top-level sequence whose fields are the variables.
    Sequence,
}

/// Requested window in the dataset's own coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubsetBounds {
    pub time: (f64, f64),
    pub extent: BoundingBox,
}

/// Server-side request resolved at open time.
#[derive(Debug, Clone, PartialEq)]
enum SubsetPlan {
    /// Constraint expression, or `None` when a dimension slice is empty.
    Grid { constraint: Option<String> },
    Sequence { constraint: String },
}

pub struct RemoteProcessor {
    ctx: ProcessorContext,
    layout: RemoteLayout,
    client: DapClient,
    das: Das,
    variables: Vec<String>,
    plan: SubsetPlan,
    output_path: PathBuf,
    success: bool,
}

impl RemoteProcessor {
    /// Open the remote dataset and resolve the subset to request.
    #[instrument(skip(ctx), fields(url = %ctx.url, category = %ctx.requirement.name))]
    pub async fn open(ctx: ProcessorContext, layout: RemoteLayout) -> ProcessorResult<Self> {
        let output_path = ctx.output_path(Some(ARTIFACT_EXTENSION));
        ctx.prepare(&output_path)?;

        let client = DapClient::new(ctx.client()?, ctx.url.clone());
        let dds = client.dds().await?;
        let das = client.das().await?;

        let all = all_variables(&dds, layout)?;
        verify_dimensions(&ctx.url, &all)?;
        let variables: Vec<String> = all
            .iter()
            .filter(|v| !DEFAULT_DIMENSIONS.contains(&v.as_str()))
            .cloned()
            .collect();

        let bounds = subset_bounds(&ctx, &das);
        if bounds.extent.crosses_seam() {
            warn!(
                extent = ?bounds.extent.as_tuple(),
                "Extent crosses the 0/360 seam; longitude slice will likely be empty"
            );
        }

        let plan = match layout {
            RemoteLayout::Grid => {
                let axes = client.data(&DEFAULT_DIMENSIONS.join(",")).await?;
                let slices = axis_slices(&axes, &bounds)?;
                SubsetPlan::Grid {
                    constraint: slices.and_then(|s| grid_constraint(&dds, &variables, &s)),
                }
            }
            RemoteLayout::Sequence => {
                let (sequence, fields) = dds.sequence().ok_or_else(|| {
                    ProcessorError::Dap(format!("{} exposes no sequence", ctx.url))
                })?;
                SubsetPlan::Sequence {
                    constraint: sequence_constraint(sequence, &fields, &bounds),
                }
            }
        };

        Ok(Self {
            ctx,
            layout,
            client,
            das,
            variables,
            plan,
            output_path,
            success: true,
        })
    }

    pub fn layout(&self) -> RemoteLayout {
        self.layout
    }

    /// Data variables, axes excluded.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    async fn run(&self) -> ProcessorResult<FetchOutcome> {
        let constraint = match &self.plan {
            SubsetPlan::Grid { constraint: None } => {
                info!(url = %self.ctx.url, "Skipping dataset with no values for a dimension");
                return Ok(skipped());
            }
            SubsetPlan::Grid {
                constraint: Some(c),
            }
            | SubsetPlan::Sequence { constraint: c } => c.clone(),
        };

        let vars = self.client.data(&constraint).await?;
        if !has_values(&vars) {
            info!(url = %self.ctx.url, "Skipping dataset with no values for a dimension");
            return Ok(skipped());
        }

        let path = self.output_path.clone();
        let das = self.das.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_artifact(&target, &vars, &das)).await??;

        info!(path = %path.display(), "Stored remote subset");
        Ok(FetchOutcome::Written { path })
    }
}

fn skipped() -> FetchOutcome {
    FetchOutcome::Skipped {
        reason: "no values for a dimension after subsetting".to_string(),
    }
}

#[async_trait]
impl DatasetProcessor for RemoteProcessor {
    async fn fetch(&mut self) -> StormResult<FetchOutcome> {
        let result = self.run().await;
        settle(&self.ctx, &mut self.success, result)
    }

    fn summary(&self) -> ProcessorSummary {
        self.ctx.summary(&self.output_path, self.success)
    }
}

fn all_variables(dds: &Dds, layout: RemoteLayout) -> ProcessorResult<Vec<String>> {
    match layout {
        RemoteLayout::Grid => Ok(dds.variable_names().into_iter().map(String::from).collect()),
        RemoteLayout::Sequence => {
            let (_, fields) = dds
                .sequence()
                .ok_or_else(|| ProcessorError::Dap("dataset exposes no sequence".to_string()))?;
            Ok(fields.into_iter().map(String::from).collect())
        }
    }
}

fn verify_dimensions(url: &str, variables: &[String]) -> ProcessorResult<()> {
    let missing: Vec<String> = DEFAULT_DIMENSIONS
        .iter()
        .filter(|d| !variables.iter().any(|v| v == *d))
        .map(|d| d.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProcessorError::MissingDimensions {
            url: url.to_string(),
            missing,
        })
    }
}

/// Requirement window in the dataset's raw time units and its extent in
/// unsigned longitude.
fn subset_bounds(ctx: &ProcessorContext, das: &Das) -> SubsetBounds {
    let window = &ctx.requirement.window;
    let units = das
        .variable(DIMENSION_TIME)
        .and_then(|t| t.get("units"))
        .and_then(AttrValue::as_text)
        .and_then(CfTimeUnits::parse);

    let time = match units {
        Some(units) => (units.encode(&window.start), units.encode(&window.end)),
        None => window.unix_bounds(0.0),
    };

    SubsetBounds {
        time,
        extent: ctx.requirement.geo.to_unsigned_longitude(),
    }
}

/// Resolved slices for the three axes, or `None` if any axis is empty.
fn axis_slices(
    axes: &[DecodedVar],
    bounds: &SubsetBounds,
) -> ProcessorResult<Option<[(String, AxisSlice); 3]>> {
    let values = |name: &str| -> ProcessorResult<Vec<f64>> {
        axes.iter()
            .find_map(|v| match v {
                DecodedVar::Array(a) if a.name == name => a.values.to_f64(),
                _ => None,
            })
            .ok_or_else(|| ProcessorError::Dap(format!("axis {} not returned as numbers", name)))
    };

    let e = &bounds.extent;
    let time = resolve_range(&values(DIMENSION_TIME)?, bounds.time.0, bounds.time.1);
    let lat = resolve_range(&values(DIMENSION_LATITUDE)?, e.min_y, e.max_y);
    let lon = resolve_range(&values(DIMENSION_LONGITUDE)?, e.min_x, e.max_x);

    Ok(match (time, lat, lon) {
        (Some(t), Some(la), Some(lo)) => Some([
            (DIMENSION_TIME.to_string(), t),
            (DIMENSION_LATITUDE.to_string(), la),
            (DIMENSION_LONGITUDE.to_string(), lo),
        ]),
        _ => None,
    })
}

/// Hyperslab constraint over the axes and every data variable, or `None`
/// when a slice selects nothing.
fn grid_constraint(
    dds: &Dds,
    variables: &[String],
    slices: &[(String, AxisSlice); 3],
) -> Option<String> {
    let slice_for = |dim: &str| slices.iter().find(|(n, _)| n == dim).map(|(_, s)| *s);

    let mut parts = Vec::new();
    for name in DEFAULT_DIMENSIONS.iter().map(|s| s.to_string()).chain(variables.iter().cloned()) {
        let Some(decl) = dds.find(&name) else {
            continue;
        };
        if matches!(decl, Decl::Structure { .. } | Decl::Sequence { .. }) {
            parts.push(name);
            continue;
        }

        let mut projection = name.clone();
        for dim in decl.dims() {
            let slice = slice_for(&dim.name).unwrap_or_else(AxisSlice::full);
            projection.push_str(&slice.hyperslab(dim.size)?);
        }
        parts.push(projection);
    }

    Some(parts.join(","))
}

fn sequence_constraint(sequence: &str, fields: &[&str], bounds: &SubsetBounds) -> String {
    let projection: Vec<String> = fields
        .iter()
        .map(|f| format!("{}.{}", sequence, f))
        .collect();

    let e = &bounds.extent;
    let selections = [
        (DIMENSION_TIME, bounds.time.0, bounds.time.1),
        (DIMENSION_LATITUDE, e.min_y, e.max_y),
        (DIMENSION_LONGITUDE, e.min_x, e.max_x),
    ];

    let mut constraint = projection.join(",");
    for (field, lo, hi) in selections {
        constraint.push_str(&format!("&{s}.{f}>={lo}&{s}.{f}<={hi}", s = sequence, f = field));
    }
    constraint
}

fn has_values(vars: &[DecodedVar]) -> bool {
    !vars.is_empty()
        && vars.iter().all(|v| match v {
            DecodedVar::Array(a) => !a.dims.iter().any(|d| d.size == 0),
            DecodedVar::Grid { array, .. } => !array.dims.iter().any(|d| d.size == 0),
            DecodedVar::Sequence { rows, .. } => *rows > 0,
            DecodedVar::Structure { .. } => true,
        })
}
