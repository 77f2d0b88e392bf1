//! Dataset processors for storm covered data.
//!
//! A processor is bound to one (storm, category requirement, provider, URL)
//! job. It retrieves the provider's payload, subsets it to the requirement's
//! time window and geographic extent where the source allows, and places the
//! artifact in the storm's staging directory:
//!
//! - [`RawFileProcessor`]: whole-file download
//! - [`StructuredBinaryProcessor`]: fixed-layout records filtered locally
//! - [`ContainerProcessor`]: NetCDF4/HDF5 files re-opened for a filter hook
//! - [`RemoteProcessor`]: OPeNDAP grids and sequences sliced server-side

pub mod artifact;
pub mod binary;
pub mod container;
pub mod context;
pub mod dap;
pub mod error;
pub mod processor;
pub mod range;
pub mod raw;
pub mod remote;

pub use artifact::{silence_hdf5_errors, write_artifact};
pub use binary::{RecordBounds, RecordLayout, StructuredBinaryProcessor};
pub use container::{ContainerFilter, ContainerProcessor, NoopFilter};
pub use context::{HttpSettings, ProcessorContext, ProcessorSummary, DEFAULT_LABEL};
pub use error::{ProcessorError, ProcessorResult};
pub use processor::{select_variant, DatasetProcessor, FetchOutcome, Processor, ProcessorVariant};
pub use range::{resolve_range, AxisSlice};
pub use raw::RawFileProcessor;
pub use remote::{RemoteLayout, RemoteProcessor};
