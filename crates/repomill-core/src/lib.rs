#![deny(clippy::all, warnings)]

mod core;

pub use crate::core::config::{
    CatalogConfig, Config, LimitsConfig, Overrides, PathsConfig, ToolsConfig, DEFAULT_CONFIG_PATH,
};
pub use crate::core::error::{
    FleetError, PipelineError, ResolveError, EXIT_CATALOG, EXIT_CONFIG, EXIT_CONTENTION,
    EXIT_EMPTY, EXIT_FAILURES, EXIT_OK, EXIT_USAGE,
};
pub use crate::core::fleet::{run_fleet, FleetSummary, TagFailure};
pub use crate::core::lockfile::LockFile;
pub use crate::core::materialize::{materialize_all, materialize_one, MaterializeSummary};
pub use crate::core::merger::{merge_external, MergeOutcome, Subset};
pub use crate::core::outcome::{CommandStatus, ExecutionOutcome};
pub use crate::core::pipeline::{promote_tag, repo_rel};
pub use crate::core::process::RunOutput;
pub use crate::core::report::TagReport;
pub use crate::core::resolver::{load_persisted, load_tag_file, resolve_tags};
pub use crate::core::transfer::{FetchSpec, Transfer};
