use std::path::PathBuf;

use repomill_domain::TagParseError;

// Process exit codes, shared by every subcommand.
pub const EXIT_OK: i32 = 0;
pub const EXIT_CONTENTION: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_CONFIG: i32 = 3;
pub const EXIT_CATALOG: i32 = 4;
pub const EXIT_FAILURES: i32 = 5;
pub const EXIT_EMPTY: i32 = 6;

/// Failure of a single tag's promotion attempt. Never aborts sibling tags;
/// the fleet isolates these and aggregates them into its exit status.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Usage(#[from] TagParseError),
    #[error("timed out waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf },
    #[error("assemble failed: {0}")]
    AssembleFailed(String),
    #[error("external package merge failed: {0}")]
    MergeFailed(String),
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

/// Failure of the tag-set refresh. A failed or empty catalog fetch never
/// replaces the previously persisted set.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("tag catalog unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("no persisted tag set at {}; run `repomill resolve` first", path.display())]
    NoPersistedSet { path: PathBuf },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("another full run is active (lock {} is held)", path.display())]
    AlreadyRunning { path: PathBuf },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl PipelineError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Usage(_) => EXIT_USAGE,
            PipelineError::LockTimeout { .. } => EXIT_CONTENTION,
            PipelineError::AssembleFailed(_)
            | PipelineError::MergeFailed(_)
            | PipelineError::Fatal(_) => EXIT_FAILURES,
        }
    }
}

impl ResolveError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            ResolveError::CatalogUnavailable(_) => EXIT_CATALOG,
            ResolveError::NoPersistedSet { .. } => EXIT_CONFIG,
            ResolveError::Io(_) => EXIT_FAILURES,
        }
    }
}

impl FleetError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            FleetError::AlreadyRunning { .. } => EXIT_CONTENTION,
            FleetError::Resolve(err) => err.exit_code(),
            FleetError::Io(_) => EXIT_FAILURES,
        }
    }
}
