use std::{fs, path::Path};

use anyhow::{Context, Result};
use repomill_domain::{match_globlist, TagSet};

use crate::core::config::Config;
use crate::core::error::ResolveError;
use crate::core::process::run_command;

/// Query the build-system tag catalog, filter it down to the families this
/// host publishes, and persist the result. A failed or empty query leaves
/// the previously persisted set untouched.
///
/// # Errors
///
/// `CatalogUnavailable` when the query fails or matches nothing; I/O errors
/// when the state directory cannot be updated.
pub fn resolve_tags(config: &Config) -> Result<TagSet, ResolveError> {
    let Some((program, args)) = config.catalog.command.split_first() else {
        return Err(ResolveError::CatalogUnavailable(
            "catalog command not configured".to_string(),
        ));
    };
    let output = run_command(program, args, None)
        .with_context(|| format!("failed to run catalog command {program}"))?;
    if !output.ok() {
        return Err(ResolveError::CatalogUnavailable(format!(
            "{program} exited with code {}: {}",
            output.code,
            output.stderr.trim()
        )));
    }

    let mut excludes = config.catalog.exclude.clone();
    excludes.extend(
        load_tag_file(&config.exclude_path())?
            .iter()
            .map(ToString::to_string),
    );

    let mut tags = TagSet::new();
    for line in output.stdout.lines() {
        let tag = line.trim();
        if tag.is_empty() {
            continue;
        }
        if !match_globlist(tag, &config.catalog.patterns) {
            continue;
        }
        if match_globlist(tag, &excludes) {
            tracing::debug!(tag, "excluded");
            continue;
        }
        tags.insert(tag);
    }
    if tags.is_empty() {
        return Err(ResolveError::CatalogUnavailable(
            "catalog returned no matching tags".to_string(),
        ));
    }

    persist(config, &tags)?;
    Ok(tags)
}

/// Load the persisted tag set from the previous successful resolve.
///
/// # Errors
///
/// `NoPersistedSet` when nothing has been resolved yet.
pub fn load_persisted(config: &Config) -> Result<TagSet, ResolveError> {
    let path = config.tagset_path();
    if !path.exists() {
        return Err(ResolveError::NoPersistedSet { path });
    }
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(TagSet::parse(&text))
}

/// Read an optional state file of tag names or globs, one per line. A
/// missing file is an empty set.
///
/// # Errors
///
/// Returns an error when an existing file cannot be read.
pub fn load_tag_file(path: &Path) -> Result<TagSet> {
    if !path.exists() {
        return Ok(TagSet::new());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(TagSet::parse(&text))
}

/// Write the new set only when it differs from what is on disk, keeping the
/// superseded set as a one-deep backup.
fn persist(config: &Config, tags: &TagSet) -> Result<()> {
    let path = config.tagset_path();
    let rendered = tags.to_string();
    if let Ok(existing) = fs::read_to_string(&path) {
        if existing == rendered {
            tracing::debug!("tag set unchanged");
            return Ok(());
        }
        fs::rename(&path, config.tagset_backup_path())
            .with_context(|| format!("failed to back up {}", path.display()))?;
    }
    fs::create_dir_all(&config.paths.state_dir).with_context(|| {
        format!(
            "failed to create state dir {}",
            config.paths.state_dir.display()
        )
    })?;
    let tmp = path.with_extension("new");
    fs::write(&tmp, rendered).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("failed to move {} into place", tmp.display()))?;
    tracing::info!(count = tags.len(), "persisted tag set");
    Ok(())
}
