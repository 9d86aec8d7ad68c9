#![deny(clippy::all, warnings)]

//! Pure decision logic for the repository pipeline: tag grammar, external
//! channel mapping, signing-key selection, version ordering, and the
//! persisted tag-set value type. No I/O lives here.

mod condor;
mod keys;
mod tag;
mod tagset;
mod version;

pub use condor::{condor_mapping, remote_dir, ChannelPlan, CondorMapping, MappingError};
pub use keys::SigningKeySet;
pub use tag::{Branch, Channel, RepoDescriptor, TagParseError};
pub use tagset::{match_globlist, TagSet};
pub use version::{compare_package_files, compare_versions, PackageName};
