use std::{
    fs,
    path::{Path, PathBuf},
};

use repomill_domain::{compare_package_files, condor_mapping, remote_dir, RepoDescriptor};

use crate::core::report::TagReport;
use crate::core::transfer::{FetchSpec, Transfer};

/// One slice of a repository that external packages are merged into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subset {
    Binary(&'static str),
    Debug(&'static str),
    Source,
}

impl Subset {
    /// All subsets for a tag: binary and debug per arch, source once.
    #[must_use]
    pub fn for_descriptor(desc: &RepoDescriptor) -> Vec<Subset> {
        let mut subsets = Vec::new();
        for &arch in desc.arches() {
            subsets.push(Subset::Binary(arch));
            subsets.push(Subset::Debug(arch));
        }
        subsets.push(Subset::Source);
        subsets
    }

    /// Remote directory for one external channel, relative to the external
    /// rsync root. Source packages are published under the first arch only.
    fn remote_rel(
        self,
        mapping: &repomill_domain::CondorMapping,
        channel: &str,
        first_arch: &str,
    ) -> String {
        match self {
            Subset::Binary(arch) => remote_dir(mapping, channel, arch),
            Subset::Debug(arch) => format!("{}/debug", remote_dir(mapping, channel, arch)),
            Subset::Source => format!("{}/SRPMS", remote_dir(mapping, channel, first_arch)),
        }
    }

    /// Where merged files land inside a tag's repo directory. Keeping them
    /// in their own subtree lets the package list generation pick them up
    /// without special cases.
    #[must_use]
    pub fn local_rel(self) -> PathBuf {
        match self {
            Subset::Binary(arch) => Path::new(arch).join("Packages").join("external"),
            Subset::Debug(arch) => Path::new(arch)
                .join("debug")
                .join("Packages")
                .join("external"),
            Subset::Source => Path::new("src").join("Packages").join("external"),
        }
    }

    /// Directory holding the subset's index metadata, relative to the tag's
    /// repo directory.
    #[must_use]
    pub fn index_rel(self) -> PathBuf {
        match self {
            Subset::Binary(arch) => PathBuf::from(arch),
            Subset::Debug(arch) => Path::new(arch).join("debug"),
            Subset::Source => PathBuf::from("src"),
        }
    }

    /// Debug packages are not published for every build, so an empty or
    /// missing remote listing is expected there.
    fn optional(self) -> bool {
        matches!(self, Subset::Debug(_))
    }

    #[must_use]
    pub fn describe(self) -> String {
        match self {
            Subset::Binary(arch) => format!("{arch} binaries"),
            Subset::Debug(arch) => format!("{arch} debug"),
            Subset::Source => "sources".to_string(),
        }
    }
}

/// Result of merging one subset. `NotApplicable` is a clean skip and never
/// counts against the tag; `Failed` does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged { files: usize },
    NotApplicable,
    Failed(String),
}

/// Merge external packages for one subset of a tag's working directory.
///
/// Channels are listed remotely; a listing failure on one channel
/// contributes zero matches instead of failing the merge. With a
/// latest-only plan a single newest file survives across every channel,
/// compared by raw version, never by channel priority.
pub fn merge_external(
    transfer: &Transfer,
    condor_rsync: &str,
    desc: &RepoDescriptor,
    subset: Subset,
    working_dir: &Path,
    link_dir: Option<&Path>,
    report: &mut TagReport,
) -> MergeOutcome {
    let mapping = match condor_mapping(desc) {
        Ok(Some(mapping)) => mapping,
        Ok(None) => return MergeOutcome::NotApplicable,
        Err(err) => return MergeOutcome::Failed(err.to_string()),
    };
    let first_arch = desc.arches()[0];

    let mut candidates: Vec<(String, String)> = Vec::new();
    for channel in &mapping.plan.channels {
        let url = format!(
            "{condor_rsync}/{}",
            subset.remote_rel(&mapping, channel, first_arch)
        );
        match transfer.list_packages(&url) {
            Ok(files) => {
                for file in files {
                    candidates.push(((*channel).to_string(), file));
                }
            }
            Err(err) => {
                report.info(format!(
                    "listing {} for {} returned nothing: {err}",
                    channel,
                    subset.describe()
                ));
            }
        }
    }

    if mapping.plan.latest_only {
        candidates = candidates
            .into_iter()
            .max_by(|(_, a), (_, b)| compare_package_files(a, b))
            .into_iter()
            .collect();
    }

    if candidates.is_empty() {
        if subset.optional() {
            return MergeOutcome::NotApplicable;
        }
        return MergeOutcome::Failed(format!(
            "no external packages found for {}",
            subset.describe()
        ));
    }

    let dest = working_dir.join(subset.local_rel());
    if let Err(err) = fs::create_dir_all(&dest) {
        return MergeOutcome::Failed(format!("could not create {}: {err}", dest.display()));
    }
    let link = link_dir.map(|dir| dir.join(subset.local_rel()));

    let mut merged = 0;
    for (channel, file) in &candidates {
        let spec = FetchSpec {
            source: format!(
                "{condor_rsync}/{}/{file}",
                subset.remote_rel(&mapping, channel, first_arch)
            ),
            dest: dest.join(file),
            link: link.clone(),
            not_found_ok: false,
        };
        match transfer.fetch(&spec) {
            Ok(output) if output.ok() => {
                report.command(&format!("fetch {file}"), &output, true);
                merged += 1;
            }
            Ok(output) => {
                report.command(&format!("fetch {file}"), &output, false);
                return MergeOutcome::Failed(format!(
                    "fetching {file} failed with rsync exit {}",
                    output.code
                ));
            }
            Err(err) => return MergeOutcome::Failed(err.to_string()),
        }
    }
    MergeOutcome::Merged { files: merged }
}
