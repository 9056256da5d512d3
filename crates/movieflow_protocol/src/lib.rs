//! Shared vocabulary for the movieflow pipeline.
//!
//! Everything that more than one crate needs to agree on lives here:
//! - validated run parameters and the per-run context
//! - canonical file names and object-storage keys
//! - the relational column layout
//! - task identities of the pipeline graph

pub mod context;
pub mod defaults;
pub mod naming;
pub mod params;
pub mod schema;
pub mod task;

pub use context::RunContext;
pub use naming::{object_key, partition_filename, processed_filename, ObjectLayer};
pub use params::{ParamsError, RequestedParams, RunParams, SortBy};
pub use schema::{ColumnKind, MovieColumn, MOVIE_COLUMNS};
pub use task::TaskId;
