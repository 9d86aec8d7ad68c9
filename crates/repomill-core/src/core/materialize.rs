use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use repomill_domain::{RepoDescriptor, SigningKeySet, TagSet};

use crate::core::config::Config;

/// Default repo definition template. `${latest_marker}` expands to a whole
/// line on stable channels and disappears on churny ones.
const DEFAULT_TEMPLATE: &str = "\
# Generated file; edits are overwritten on the next materialize run.
[${repo_id}]
title=${title}
series=${series}
dver=${dver}
channel=${channel}
arches=${arches}
keys=${keys}
key_namespace=${key_namespace}
strict_keys=${strict}
${latest_marker}";

#[derive(Debug, Default, serde::Serialize)]
pub struct MaterializeSummary {
    pub written: usize,
    pub pruned: usize,
    pub skipped: Vec<String>,
}

/// Render one tag's repo definition from a template.
#[must_use]
pub fn materialize_one(desc: &RepoDescriptor, template: &str) -> String {
    let keys = SigningKeySet::for_descriptor(desc);
    let channel = desc.channel.map(|c| c.as_str().to_string()).unwrap_or_default();
    let latest_marker = if desc.channel.is_some_and(|c| c.is_stable()) {
        "latest=false"
    } else {
        ""
    };

    let mut text = template
        .replace("${repo_id}", &desc.name)
        .replace("${title}", &desc.title())
        .replace("${series}", desc.series().as_deref().unwrap_or_default())
        .replace("${dver}", &desc.dver)
        .replace("${channel}", &channel)
        .replace("${arches}", &desc.arches().join(" "))
        .replace("${keys}", &keys.accepted().join(" "))
        .replace("${key_namespace}", &desc.key_namespace())
        .replace("${strict}", if desc.strict_keys() { "true" } else { "false" });
    if latest_marker.is_empty() {
        text = text.replace("${latest_marker}\n", "").replace("${latest_marker}", "");
    } else {
        text = text.replace("${latest_marker}", latest_marker);
    }
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Write a repo definition per tag into the repo config dir, after copying
/// the current definitions into a `.bak` sibling. With `prune`, definitions
/// whose tag has left the set are removed.
///
/// # Errors
///
/// Returns an error when the template cannot be read or the config dir
/// cannot be updated.
pub fn materialize_all(config: &Config, tags: &TagSet, prune: bool) -> Result<MaterializeSummary> {
    let template = match &config.paths.template {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read template {}", path.display()))?,
        None => DEFAULT_TEMPLATE.to_string(),
    };

    let dir = &config.paths.repo_config_dir;
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create config dir {}", dir.display()))?;
    backup_definitions(dir)?;

    let mut summary = MaterializeSummary::default();
    let mut expected: BTreeSet<String> = BTreeSet::new();
    for tag in tags.iter() {
        let desc = match RepoDescriptor::parse(tag) {
            Ok(desc) => desc,
            Err(err) => {
                tracing::warn!(tag, %err, "skipping unrecognized tag");
                summary.skipped.push(tag.to_string());
                continue;
            }
        };
        let path = dir.join(format!("{tag}.config"));
        fs::write(&path, materialize_one(&desc, &template))
            .with_context(|| format!("failed to write {}", path.display()))?;
        expected.insert(format!("{tag}.config"));
        summary.written += 1;
    }

    if prune {
        summary.pruned = prune_definitions(dir, &expected)?;
    }
    Ok(summary)
}

/// Copy the existing `*.config` files into `<dir>.bak`, replacing the
/// previous backup.
fn backup_definitions(dir: &Path) -> Result<()> {
    let backup = backup_dir(dir);
    if backup.exists() {
        fs::remove_dir_all(&backup)
            .with_context(|| format!("failed to clear backup {}", backup.display()))?;
    }
    fs::create_dir_all(&backup)
        .with_context(|| format!("failed to create backup {}", backup.display()))?;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(".config") {
            fs::copy(entry.path(), backup.join(&name))
                .with_context(|| format!("failed to back up {}", entry.path().display()))?;
        }
    }
    Ok(())
}

fn prune_definitions(dir: &Path, expected: &BTreeSet<String>) -> Result<usize> {
    let mut pruned = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".config") && !expected.contains(&name) {
            fs::remove_file(entry.path())
                .with_context(|| format!("failed to prune {}", entry.path().display()))?;
            tracing::info!(file = %name, "pruned repo definition");
            pruned += 1;
        }
    }
    Ok(pruned)
}

fn backup_dir(dir: &Path) -> PathBuf {
    let mut name = dir
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    name.push_str(".bak");
    dir.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(tag: &str) -> String {
        materialize_one(&RepoDescriptor::parse(tag).unwrap(), DEFAULT_TEMPLATE)
    }

    #[test]
    fn stable_channels_carry_the_latest_marker() {
        let text = render("osg-24-main-el9-release");
        assert!(text.contains("[osg-24-main-el9-release]"));
        assert!(text.contains("series=24-main"));
        assert!(text.contains("arches=x86_64 aarch64"));
        assert!(text.contains("keys=osg-24-developer"));
        assert!(text.contains("strict_keys=true"));
        assert!(text.contains("latest=false"));
    }

    #[test]
    fn churny_channels_drop_the_marker_line() {
        let text = render("osg-24-main-el9-development");
        assert!(!text.contains("latest="));
        assert!(!text.contains("${latest_marker}"));
        assert!(text.contains("keys=osg-24-auto osg-24-developer"));
    }

    #[test]
    fn meta_repos_render_without_a_channel() {
        let text = render("osg-23-el9-empty");
        assert!(text.contains("series=23-empty"));
        assert!(text.contains("channel=\n"));
    }

    #[test]
    fn materialize_writes_backs_up_and_prunes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = Config::default();
        config.paths.repo_config_dir = dir.path().join("repomill.d");
        fs::create_dir_all(&config.paths.repo_config_dir)?;
        fs::write(
            config.paths.repo_config_dir.join("osg-old-el7-release.config"),
            "[osg-old-el7-release]\n",
        )?;

        let tags = TagSet::parse("osg-24-main-el9-release\nnot-a-tag\n");
        let summary = materialize_all(&config, &tags, true)?;
        assert_eq!(summary.written, 1);
        assert_eq!(summary.pruned, 1);
        assert_eq!(summary.skipped, vec!["not-a-tag".to_string()]);

        assert!(config
            .paths
            .repo_config_dir
            .join("osg-24-main-el9-release.config")
            .exists());
        assert!(!config
            .paths
            .repo_config_dir
            .join("osg-old-el7-release.config")
            .exists());
        assert!(dir
            .path()
            .join("repomill.d.bak")
            .join("osg-old-el7-release.config")
            .exists());
        Ok(())
    }

    #[test]
    fn custom_template_is_used() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let template_path = dir.path().join("template");
        fs::write(&template_path, "id=${repo_id} ns=${key_namespace}\n")?;
        let mut config = Config::default();
        config.paths.repo_config_dir = dir.path().join("out");
        config.paths.template = Some(template_path);

        let tags = TagSet::parse("devops-el9-itb\n");
        materialize_all(&config, &tags, false)?;
        let text = fs::read_to_string(config.paths.repo_config_dir.join("devops-el9-itb.config"))?;
        assert_eq!(text, "id=devops-el9-itb ns=devopsel9itb\n");
        Ok(())
    }
}
