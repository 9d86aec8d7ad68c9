use std::fs;

use anyhow::{Context, Result};
use rayon::prelude::*;
use repomill_domain::{match_globlist, TagSet};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::core::config::Config;
use crate::core::error::{FleetError, ResolveError};
use crate::core::lockfile::LockFile;
use crate::core::pipeline::promote_tag;
use crate::core::report::TagReport;
use crate::core::resolver::{load_persisted, load_tag_file};
use crate::core::transfer::Transfer;

#[derive(Debug, Clone, Serialize)]
pub struct TagFailure {
    pub tag: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct FleetSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<TagFailure>,
}

impl FleetSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Promote every tag in the persisted set, optionally narrowed by globs.
///
/// Exactly one fleet runs at a time per host; within a run, tag failures
/// are isolated and collected rather than aborting the remaining tags.
/// Tags are dispatched in reverse resolution order so neighbours that
/// share a series lock spread out across the worker pool.
///
/// # Errors
///
/// `AlreadyRunning` when another fleet holds the global lock, `Resolve`
/// errors for a missing tag set or unreachable build endpoint, and I/O
/// errors for everything the run cannot start without.
pub fn run_fleet(config: &Config, tag_globs: &[String]) -> Result<FleetSummary, FleetError> {
    let fleet_lock_path = config.paths.lock_dir.join("fleet");
    let Some(_fleet_lock) = LockFile::try_acquire(&fleet_lock_path)? else {
        return Err(FleetError::AlreadyRunning {
            path: fleet_lock_path,
        });
    };

    for tool in [&config.tools.rsync, &config.tools.index_builder] {
        which::which(tool)
            .map_err(|err| anyhow::anyhow!("required tool {tool} not found: {err}"))?;
    }

    let mut tags = load_persisted(config)?;
    if !tag_globs.is_empty() {
        tags = TagSet::from_iter(
            tags.iter()
                .filter(|tag| match_globlist(tag, tag_globs))
                .map(ToString::to_string),
        );
    }
    if tags.is_empty() {
        tracing::warn!("no tags to promote");
        return Ok(FleetSummary::default());
    }

    let transfer = Transfer::from_config(config);
    transfer
        .check_endpoint(&config.tools.build_rsync)
        .map_err(|err| ResolveError::CatalogUnavailable(err.to_string()))?;

    let create_only = load_tag_file(&config.create_only_path())?;
    let ordered: Vec<&str> = tags.iter_rev().collect();
    tracing::info!(tags = ordered.len(), workers = config.limits.workers, "fleet starting");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.limits.workers)
        .build()
        .context("failed to build worker pool")?;
    let results: Vec<(String, Result<(), String>)> = pool.install(|| {
        ordered
            .par_iter()
            .map(|tag| {
                let mut report = TagReport::new();
                let result = promote_tag(config, tag, &create_only, &mut report)
                    .map_err(|err| err.to_string());
                if let Err(reason) = &result {
                    report.error(format!("{tag}: {reason}"));
                }
                if let Err(err) = report.write_to(&config.paths.log_dir, tag) {
                    tracing::error!(tag = %tag, %err, "could not write tag logs");
                }
                ((*tag).to_string(), result)
            })
            .collect()
    });

    let mut summary = FleetSummary::default();
    for (tag, result) in results {
        match result {
            Ok(()) => summary.succeeded.push(tag),
            Err(reason) => summary.failed.push(TagFailure { tag, reason }),
        }
    }

    if summary.failed.is_empty() {
        write_timestamp(config)?;
        tracing::info!(succeeded = summary.succeeded.len(), "fleet finished clean");
    } else {
        for failure in &summary.failed {
            tracing::error!(tag = %failure.tag, reason = %failure.reason, "tag failed");
        }
        tracing::warn!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "fleet finished with failures"
        );
    }
    Ok(summary)
}

/// Recorded only after a fully clean run; monitoring alarms on staleness.
fn write_timestamp(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.paths.state_dir).with_context(|| {
        format!(
            "failed to create state dir {}",
            config.paths.state_dir.display()
        )
    })?;
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("failed to format timestamp")?;
    let path = config.timestamp_path();
    fs::write(&path, format!("{now}\n"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn write_script(path: &Path, body: &str) -> Result<()> {
        fs::write(path, body)?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    fn fake_rsync(dir: &Path) -> Result<PathBuf> {
        let script = dir.join("fake-rsync");
        write_script(
            &script,
            r#"#!/bin/sh
case "$1" in
-l)
    ln -s "20250502-0001" "${3}latest"
    exit 0
    ;;
esac
case "$@" in
*--list-only*)
    exit 0
    ;;
esac
for last; do :; done
mkdir -p "$last/x86_64/Packages" "$last/src/Packages"
touch "$last/x86_64/Packages/foo-1.0-1.el9.x86_64.rpm"
exit 0
"#,
        )?;
        Ok(script)
    }

    fn test_config(root: &Path) -> Result<Config> {
        let mut config = Config::default();
        config.paths.dest_root = root.join("repo");
        config.paths.state_dir = root.join("state");
        config.paths.lock_dir = root.join("locks");
        config.paths.log_dir = root.join("logs");
        config.tools.rsync = fake_rsync(root)?.display().to_string();
        let index = root.join("fake-createrepo");
        write_script(&index, "#!/bin/sh\nmkdir -p \"$1/repodata\"\nexit 0\n")?;
        config.tools.index_builder = index.display().to_string();
        config.limits.workers = 2;
        config.limits.transfer_retries = 0;
        config.limits.retry_delay_ms = 1;
        config.limits.lock_timeout_secs = 5;
        Ok(config)
    }

    fn seed_tags(config: &Config, tags: &str) -> Result<()> {
        fs::create_dir_all(&config.paths.state_dir)?;
        fs::write(config.tagset_path(), tags)?;
        Ok(())
    }

    #[test]
    fn fleet_promotes_every_persisted_tag() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path())?;
        seed_tags(&config, "devops-el9-itb\ndevops-el8-itb\n")?;

        let summary = run_fleet(&config, &[]).map_err(|err| anyhow::anyhow!(err.to_string()))?;
        assert_eq!(summary.succeeded.len(), 2);
        assert!(summary.failed.is_empty());
        assert!(config.paths.dest_root.join("devops/el9/itb/x86_64").exists());
        assert!(config.paths.log_dir.join("devops-el9-itb.log").exists());
        assert!(config.timestamp_path().exists());
        Ok(())
    }

    #[test]
    fn tag_failures_are_isolated_and_skip_the_timestamp() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path())?;
        seed_tags(&config, "not-a-real-tag\ndevops-el9-itb\n")?;

        let summary = run_fleet(&config, &[]).map_err(|err| anyhow::anyhow!(err.to_string()))?;
        assert_eq!(summary.succeeded, vec!["devops-el9-itb".to_string()]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].tag, "not-a-real-tag");
        assert!(!config.timestamp_path().exists());
        assert!(config.paths.log_dir.join("not-a-real-tag.err.log").exists());
        Ok(())
    }

    #[test]
    fn glob_filter_narrows_the_run() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path())?;
        seed_tags(&config, "devops-el9-itb\ndevops-el8-itb\n")?;

        let summary = run_fleet(&config, &["*-el8-*".to_string()])
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
        assert_eq!(summary.succeeded, vec!["devops-el8-itb".to_string()]);
        assert!(!config.paths.dest_root.join("devops/el9/itb").exists());
        Ok(())
    }

    #[test]
    fn concurrent_fleet_runs_are_refused() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path())?;
        seed_tags(&config, "devops-el9-itb\n")?;

        let held = LockFile::try_acquire(&config.paths.lock_dir.join("fleet"))?
            .context("seed lock")?;
        let err = run_fleet(&config, &[]).err().context("expected refusal")?;
        assert!(matches!(err, FleetError::AlreadyRunning { .. }));
        drop(held);
        Ok(())
    }

    #[test]
    fn missing_tag_set_is_a_resolve_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path())?;
        let err = run_fleet(&config, &[]).err().context("expected failure")?;
        assert!(matches!(
            err,
            FleetError::Resolve(ResolveError::NoPersistedSet { .. })
        ));
        Ok(())
    }

    #[test]
    fn empty_filter_result_is_an_empty_summary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path())?;
        seed_tags(&config, "devops-el9-itb\n")?;
        let summary = run_fleet(&config, &["osg-*".to_string()])
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
        assert_eq!(summary.total(), 0);
        Ok(())
    }
}
