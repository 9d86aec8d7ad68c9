use std::{
    fs,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use repomill_domain::{compare_package_files, RepoDescriptor, TagSet};
use walkdir::WalkDir;

use crate::core::config::Config;
use crate::core::error::PipelineError;
use crate::core::lockfile::LockFile;
use crate::core::merger::{merge_external, MergeOutcome, Subset};
use crate::core::process::run_command;
use crate::core::report::TagReport;
use crate::core::transfer::{FetchSpec, Transfer};

/// A tag's directory below each generation root:
/// `family[/series]/dver[/channel]`.
#[must_use]
pub fn repo_rel(desc: &RepoDescriptor) -> PathBuf {
    let mut path = PathBuf::from(&desc.family);
    if let Some(series) = desc.series() {
        path.push(series);
    }
    path.push(&desc.dver);
    if let Some(channel) = desc.channel {
        path.push(channel.as_str());
    }
    path
}

/// Run the full pipeline for one tag: assemble the working generation from
/// the build system, merge external packages, index, then atomically cycle
/// working -> release -> previous.
///
/// Serialized against other runs of the same series and dist version by a
/// tag-scoped lock; everything before the final renames happens in the
/// working generation, so readers of the release tree never see a partial
/// repo.
///
/// # Errors
///
/// `Usage` for an unrecognized tag, `LockTimeout` on lock contention,
/// `AssembleFailed`/`MergeFailed` for recoverable per-tag failures, and
/// `Fatal` for filesystem errors.
pub fn promote_tag(
    config: &Config,
    tag: &str,
    create_only: &TagSet,
    report: &mut TagReport,
) -> Result<(), PipelineError> {
    let desc = RepoDescriptor::parse(tag)?;
    let transfer = Transfer::from_config(config);

    let lock_path = config.paths.lock_dir.join(lock_key(&desc));
    let _lock = LockFile::acquire_wait(
        &lock_path,
        Duration::from_secs(config.limits.lock_timeout_secs),
    )?;

    let rel = repo_rel(&desc);
    let release_dir = config.paths.dest_root.join(&rel);
    let working_dir = config.working_root().join(&rel);
    let previous_dir = config.previous_root().join(&rel);

    if create_only.contains(tag) && release_dir.exists() {
        report.info(format!("{tag}: exists and is create-only, skipping"));
        return Ok(());
    }

    report.info(format!("{tag}: assembling into {}", working_dir.display()));
    assemble(config, &transfer, &desc, &working_dir, &release_dir, report)?;

    let link_dir = release_dir.exists().then_some(release_dir.as_path());
    for subset in Subset::for_descriptor(&desc) {
        match merge_external(
            &transfer,
            &config.tools.condor_rsync,
            &desc,
            subset,
            &working_dir,
            link_dir,
            report,
        ) {
            MergeOutcome::Merged { files } => {
                report.info(format!(
                    "{tag}: merged {files} external package(s) into {}",
                    subset.describe()
                ));
            }
            MergeOutcome::NotApplicable => {}
            MergeOutcome::Failed(reason) => {
                report.error(format!("{tag}: {reason}"));
                return Err(PipelineError::MergeFailed(reason));
            }
        }
    }

    write_package_lists(&desc, &working_dir)?;
    for subset in Subset::for_descriptor(&desc) {
        build_index(config, &working_dir.join(subset.index_rel()), report)?;
        if matches!(subset, Subset::Binary(_)) {
            generate_view(config, &working_dir.join(subset.index_rel()), report)?;
        }
    }
    write_compat_symlink(&working_dir)?;

    promote_directories(&working_dir, &release_dir, &previous_dir, report)?;

    if desc.latest_eligible() {
        update_latest_alias(&desc, &release_dir, report)?;
    }
    report.info(format!("{tag}: promoted to {}", release_dir.display()));
    Ok(())
}

/// Tags sharing a series and dist version publish into overlapping trees,
/// so they share one lock.
fn lock_key(desc: &RepoDescriptor) -> String {
    match desc.series() {
        Some(series) => format!("{}-{}-{}", desc.family, series, desc.dver),
        None => format!("{}-{}", desc.family, desc.dver),
    }
}

/// Mirror the build system's current snapshot for the tag into the working
/// generation, hardlinking unchanged files against the live release.
fn assemble(
    config: &Config,
    transfer: &Transfer,
    desc: &RepoDescriptor,
    working_dir: &Path,
    release_dir: &Path,
    report: &mut TagReport,
) -> Result<(), PipelineError> {
    let latest_url = format!("{}/{}/latest", config.tools.build_rsync, desc.name);
    let latest = transfer
        .read_remote_symlink(&latest_url)
        .map_err(|err| PipelineError::AssembleFailed(err.to_string()))?;
    let snapshot = latest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            PipelineError::AssembleFailed(format!("latest symlink {latest_url} has no target name"))
        })?;
    report.info(format!("{}: snapshot is {snapshot}", desc.name));

    fs::create_dir_all(working_dir)
        .with_context(|| format!("failed to create {}", working_dir.display()))?;
    let spec = FetchSpec {
        source: format!("{}/{}/{snapshot}/", config.tools.build_rsync, desc.name),
        dest: working_dir.to_path_buf(),
        link: Some(release_dir.to_path_buf()),
        not_found_ok: false,
    };
    let output = transfer
        .fetch(&spec)
        .map_err(|err| PipelineError::AssembleFailed(err.to_string()))?;
    let ok = output.ok();
    report.command(&format!("fetch snapshot {snapshot}"), &output, ok);
    if !ok {
        return Err(PipelineError::AssembleFailed(format!(
            "snapshot transfer exited with code {}",
            output.code
        )));
    }
    Ok(())
}

/// Regenerate the `pkglist` file for every subset. Debuginfo and
/// debugsource packages living in the main arch tree are routed into the
/// debug subset's list via `../` relative paths, so the index for each
/// subset sees exactly its own packages.
fn write_package_lists(desc: &RepoDescriptor, working_dir: &Path) -> Result<()> {
    for &arch in desc.arches() {
        let arch_dir = working_dir.join(arch);
        let debug_dir = arch_dir.join("debug");
        let mut main_list = Vec::new();
        let mut debug_list = collect_rpms(&debug_dir, &debug_dir, None)?;
        for rel in collect_rpms(&arch_dir, &arch_dir, Some(debug_dir.as_path()))? {
            if is_debug_package(&rel) {
                debug_list.push(format!("../{rel}"));
            } else {
                main_list.push(rel);
            }
        }
        main_list.sort();
        debug_list.sort();
        fs::create_dir_all(&debug_dir)
            .with_context(|| format!("failed to create {}", debug_dir.display()))?;
        write_pkglist(&arch_dir.join("pkglist"), &main_list)?;
        write_pkglist(&debug_dir.join("pkglist"), &debug_list)?;
    }

    let src_dir = working_dir.join("src");
    if src_dir.is_dir() {
        let mut src_list = collect_rpms(&src_dir, &src_dir, None)?;
        src_list.sort();
        write_pkglist(&src_dir.join("pkglist"), &src_list)?;
    }
    Ok(())
}

fn is_debug_package(rel: &str) -> bool {
    rel.rsplit('/')
        .next()
        .is_some_and(|name| name.contains("-debuginfo-") || name.contains("-debugsource-"))
}

/// RPM paths under `root`, relative to `base`, skipping the `skip` subtree.
fn collect_rpms(root: &Path, base: &Path, skip: Option<&Path>) -> Result<Vec<String>> {
    let mut found = Vec::new();
    if !root.is_dir() {
        return Ok(found);
    }
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| skip != Some(entry.path()));
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "rpm") {
            let rel = path
                .strip_prefix(base)
                .with_context(|| format!("{} outside {}", path.display(), base.display()))?;
            found.push(rel.to_string_lossy().into_owned());
        }
    }
    Ok(found)
}

/// Write atomically so an index run never reads a half-written list.
fn write_pkglist(path: &Path, entries: &[String]) -> Result<()> {
    let mut text = entries.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    let tmp = path.with_extension("new");
    fs::write(&tmp, text).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", tmp.display()))?;
    Ok(())
}

fn build_index(config: &Config, dir: &Path, report: &mut TagReport) -> Result<(), PipelineError> {
    let pkglist = dir.join("pkglist");
    let args = vec![
        dir.display().to_string(),
        format!("--pkglist={}", pkglist.display()),
    ];
    let output = run_command(&config.tools.index_builder, &args, None)
        .map_err(|err| PipelineError::AssembleFailed(err.to_string()))?;
    let ok = output.ok();
    report.command(&format!("index {}", dir.display()), &output, ok);
    if !ok {
        return Err(PipelineError::AssembleFailed(format!(
            "index build for {} exited with code {}",
            dir.display(),
            output.code
        )));
    }
    Ok(())
}

fn generate_view(config: &Config, dir: &Path, report: &mut TagReport) -> Result<(), PipelineError> {
    let Some((program, prefix)) = config.tools.view_generator.split_first() else {
        return Ok(());
    };
    let mut args = prefix.to_vec();
    args.push(dir.display().to_string());
    let output = run_command(program, &args, None)
        .map_err(|err| PipelineError::AssembleFailed(err.to_string()))?;
    let ok = output.ok();
    report.command(&format!("view {}", dir.display()), &output, ok);
    if !ok {
        return Err(PipelineError::AssembleFailed(format!(
            "view generation for {} exited with code {}",
            dir.display(),
            output.code
        )));
    }
    Ok(())
}

/// Old consumers fetch sources from `source/SRPMS`; keep that path working.
fn write_compat_symlink(working_dir: &Path) -> Result<()> {
    if !working_dir.join("src").is_dir() {
        return Ok(());
    }
    let source_dir = working_dir.join("source");
    fs::create_dir_all(&source_dir)
        .with_context(|| format!("failed to create {}", source_dir.display()))?;
    let link = source_dir.join("SRPMS");
    if link.symlink_metadata().is_ok() {
        fs::remove_file(&link).with_context(|| format!("failed to replace {}", link.display()))?;
    }
    symlink("../src", &link).with_context(|| format!("failed to link {}", link.display()))?;
    Ok(())
}

/// Cycle the generations with plain renames. If moving working into place
/// fails after release was displaced, the old release is restored, so the
/// published tree is never left missing.
fn promote_directories(
    working_dir: &Path,
    release_dir: &Path,
    previous_dir: &Path,
    report: &mut TagReport,
) -> Result<(), PipelineError> {
    if previous_dir.exists() {
        fs::remove_dir_all(previous_dir)
            .with_context(|| format!("failed to clear {}", previous_dir.display()))?;
    }
    if let Some(parent) = previous_dir.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if let Some(parent) = release_dir.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let displaced = release_dir.exists();
    if displaced {
        fs::rename(release_dir, previous_dir).with_context(|| {
            format!(
                "failed to move {} aside to {}",
                release_dir.display(),
                previous_dir.display()
            )
        })?;
    }
    if let Err(err) = fs::rename(working_dir, release_dir) {
        if displaced {
            if let Err(rollback) = fs::rename(previous_dir, release_dir) {
                report.error(format!(
                    "rollback of {} failed: {rollback}",
                    release_dir.display()
                ));
            } else {
                report.error(format!("restored previous {}", release_dir.display()));
            }
        }
        return Err(PipelineError::Fatal(anyhow::Error::new(err).context(
            format!("failed to publish {}", release_dir.display()),
        )));
    }
    Ok(())
}

/// Repoint `<family>-release-latest.rpm` at the newest release package in
/// the freshly published tree. Symlink-then-rename keeps the alias valid at
/// every instant.
fn update_latest_alias(
    desc: &RepoDescriptor,
    release_dir: &Path,
    report: &mut TagReport,
) -> Result<()> {
    let prefix = format!("{}-release-", desc.family);
    let mut newest: Option<(String, PathBuf)> = None;
    for entry in WalkDir::new(release_dir) {
        let entry = entry.with_context(|| format!("failed to walk {}", release_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) || !name.ends_with(".rpm") || is_debug_package(&name) {
            continue;
        }
        let newer = newest
            .as_ref()
            .is_none_or(|(best, _)| compare_package_files(&name, best).is_gt());
        if newer {
            newest = Some((name, entry.path().to_path_buf()));
        }
    }
    let Some((name, path)) = newest else {
        report.info(format!("no {prefix}*.rpm found, leaving latest alias alone"));
        return Ok(());
    };

    let target = path
        .strip_prefix(release_dir)
        .with_context(|| format!("{} outside release tree", path.display()))?;
    let alias = release_dir.join(format!("{prefix}latest.rpm"));
    let staging = release_dir.join(format!(".{prefix}latest.rpm.new"));
    if staging.symlink_metadata().is_ok() {
        fs::remove_file(&staging)
            .with_context(|| format!("failed to clear {}", staging.display()))?;
    }
    symlink(target, &staging)
        .with_context(|| format!("failed to link {}", staging.display()))?;
    fs::rename(&staging, &alias)
        .with_context(|| format!("failed to move {} into place", staging.display()))?;
    report.info(format!("latest alias now points at {name}"));
    Ok(())
}
