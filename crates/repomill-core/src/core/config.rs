use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/repomill.toml";

const DEFAULT_BUILD_RSYNC: &str = "rsync://kojihub2000.chtc.wisc.edu/repos-dist";
const DEFAULT_CONDOR_RSYNC: &str = "rsync://rsync.cs.wisc.edu/htcondor";
const DEFAULT_DEST_ROOT: &str = "/data/repo";
const DEFAULT_LOCK_DIR: &str = "/var/lock/repomill";

/// Everything a run needs, loaded from the TOML config file with
/// command-line overrides layered on top.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub paths: PathsConfig,
    pub catalog: CatalogConfig,
    pub tools: ToolsConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PathsConfig {
    /// Top of the published tree; working and previous generations live in
    /// sibling roots derived from it unless set explicitly.
    pub dest_root: PathBuf,
    pub working_root: Option<PathBuf>,
    pub previous_root: Option<PathBuf>,
    /// Persisted tag set, exclude list, create-only list, timestamp marker.
    pub state_dir: PathBuf,
    pub lock_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Destination for generated per-tag repo definition files.
    pub repo_config_dir: PathBuf,
    /// Optional template override for generated repo definitions.
    pub template: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            dest_root: PathBuf::from(DEFAULT_DEST_ROOT),
            working_root: None,
            previous_root: None,
            state_dir: PathBuf::from("/var/lib/repomill"),
            lock_dir: PathBuf::from(DEFAULT_LOCK_DIR),
            log_dir: PathBuf::from("/var/log/repomill"),
            repo_config_dir: PathBuf::from("/etc/repomill.d"),
            template: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CatalogConfig {
    /// Argv of the tag catalog query; its stdout is one tag per line.
    pub command: Vec<String>,
    /// Family-specific glob patterns a candidate tag must match.
    pub patterns: Vec<String>,
    /// Extra exclude globs, merged with the state-dir exclude file.
    pub exclude: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            command: vec!["osg-koji".into(), "list-tags".into(), "--quiet".into()],
            patterns: vec![
                "osg-2?-*-el*-*".into(),
                "osg-2?-el*-*".into(),
                "osg-3.?-el*-*".into(),
                "osg-3.?-*-el*-*".into(),
                "devops-el*-*".into(),
            ],
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ToolsConfig {
    pub rsync: String,
    /// IndexBuilder: `<index_builder> DIR --pkglist=FILE [--update]`.
    pub index_builder: String,
    /// ViewGenerator argv prefix; empty disables listing-page generation.
    pub view_generator: Vec<String>,
    /// Build-system dist-repo rsync root.
    pub build_rsync: String,
    /// External (Condor) package rsync root.
    pub condor_rsync: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        ToolsConfig {
            rsync: "rsync".into(),
            index_builder: "createrepo_c".into(),
            view_generator: Vec::new(),
            build_rsync: DEFAULT_BUILD_RSYNC.into(),
            condor_rsync: DEFAULT_CONDOR_RSYNC.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LimitsConfig {
    /// Fleet worker pool size.
    pub workers: usize,
    /// Bounded wait for a tag-scoped lock, in seconds.
    pub lock_timeout_secs: u64,
    /// Fixed retry count for transfer operations.
    pub transfer_retries: u32,
    /// Delay between transfer retries, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            workers: 12,
            lock_timeout_secs: 300,
            transfer_retries: 10,
            retry_delay_ms: 1000,
        }
    }
}

/// Command-line overrides applied after the file is parsed.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub dest_root: Option<PathBuf>,
    pub lock_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                toml_edit::de::from_str(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                let text = fs::read_to_string(DEFAULT_CONFIG_PATH)
                    .with_context(|| format!("failed to read config {DEFAULT_CONFIG_PATH}"))?;
                toml_edit::de::from_str(&text)
                    .with_context(|| format!("invalid config {DEFAULT_CONFIG_PATH}"))?
            }
            None => Config::default(),
        };

        if let Some(dest_root) = &overrides.dest_root {
            config.paths.dest_root = dest_root.clone();
            // A dest override moves the whole generation cycle with it.
            config.paths.working_root = None;
            config.paths.previous_root = None;
        }
        if let Some(lock_dir) = &overrides.lock_dir {
            config.paths.lock_dir = lock_dir.clone();
        }
        if let Some(log_dir) = &overrides.log_dir {
            config.paths.log_dir = log_dir.clone();
        }
        Ok(config)
    }

    #[must_use]
    pub fn working_root(&self) -> PathBuf {
        self.paths
            .working_root
            .clone()
            .unwrap_or_else(|| sibling_root(&self.paths.dest_root, "working"))
    }

    #[must_use]
    pub fn previous_root(&self) -> PathBuf {
        self.paths
            .previous_root
            .clone()
            .unwrap_or_else(|| sibling_root(&self.paths.dest_root, "previous"))
    }

    #[must_use]
    pub fn tagset_path(&self) -> PathBuf {
        self.paths.state_dir.join("tags")
    }

    #[must_use]
    pub fn tagset_backup_path(&self) -> PathBuf {
        self.paths.state_dir.join("tags.prev")
    }

    #[must_use]
    pub fn exclude_path(&self) -> PathBuf {
        self.paths.state_dir.join("exclude")
    }

    #[must_use]
    pub fn create_only_path(&self) -> PathBuf {
        self.paths.state_dir.join("create-only")
    }

    #[must_use]
    pub fn timestamp_path(&self) -> PathBuf {
        self.paths.state_dir.join("last-successful-run")
    }
}

fn sibling_root(dest_root: &Path, suffix: &str) -> PathBuf {
    let mut name = dest_root
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    name.push('.');
    name.push_str(suffix);
    dest_root.with_file_name(name)
}
