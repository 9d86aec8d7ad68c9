use std::{
    fs,
    path::PathBuf,
    thread,
    time::Duration,
};

use anyhow::{bail, Context, Result};

use crate::core::config::Config;
use crate::core::process::{run_command, RunOutput};

/// rsync's "some files vanished / not found" exit code. Acceptable for
/// sources that legitimately may not exist, such as debug subsets.
pub const RSYNC_NOT_FOUND: i32 = 23;

/// One remote fetch. `link` enables hardlink dedup against a previous
/// generation when that directory exists locally.
#[derive(Debug, Clone)]
pub struct FetchSpec {
    pub source: String,
    pub dest: PathBuf,
    pub link: Option<PathBuf>,
    pub not_found_ok: bool,
}

/// Thin wrapper over the configured rsync binary with a fixed retry policy.
#[derive(Debug, Clone)]
pub struct Transfer {
    rsync: String,
    retries: u32,
    retry_delay: Duration,
}

impl Transfer {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Transfer {
            rsync: config.tools.rsync.clone(),
            retries: config.limits.transfer_retries,
            retry_delay: Duration::from_millis(config.limits.retry_delay_ms),
        }
    }

    /// Cheap reachability probe, run once before a fleet run so an outage
    /// fails fast instead of once per tag.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint does not answer a listing request.
    pub fn check_endpoint(&self, url: &str) -> Result<()> {
        let output = run_command(
            &self.rsync,
            &["--list-only".to_string(), ensure_trailing_slash(url)],
            None,
        )?;
        if !output.ok() {
            bail!(
                "endpoint {url} is unreachable (rsync exit {}): {}",
                output.code,
                output.stderr.trim()
            );
        }
        Ok(())
    }

    /// List package file names directly under a remote directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the listing command fails; callers that treat a
    /// missing directory as empty handle that themselves.
    pub fn list_packages(&self, url: &str) -> Result<Vec<String>> {
        let output = run_command(
            &self.rsync,
            &["--list-only".to_string(), ensure_trailing_slash(url)],
            None,
        )?;
        if !output.ok() {
            bail!(
                "listing {url} failed (rsync exit {}): {}",
                output.code,
                output.stderr.trim()
            );
        }
        Ok(parse_listing(&output.stdout))
    }

    /// Mirror a remote tree or file, retrying transient failures a fixed
    /// number of times. The returned output is the last attempt's; callers
    /// decide what its exit code means.
    ///
    /// # Errors
    ///
    /// Returns an error only when rsync itself cannot be spawned.
    pub fn fetch(&self, spec: &FetchSpec) -> Result<RunOutput> {
        let mut args = vec![
            "--times".to_string(),
            "--stats".to_string(),
            "--delete".to_string(),
            "--recursive".to_string(),
        ];
        if let Some(link) = &spec.link {
            if link.exists() {
                args.push(format!("--link-dest={}", link.display()));
            }
        }
        args.push(spec.source.clone());
        args.push(spec.dest.display().to_string());

        let acceptable: &[i32] = if spec.not_found_ok {
            &[RSYNC_NOT_FOUND]
        } else {
            &[]
        };
        let mut output = run_command(&self.rsync, &args, None)?;
        for attempt in 1..=self.retries {
            if output.ok_or(acceptable) {
                break;
            }
            tracing::warn!(
                source = %spec.source,
                code = output.code,
                attempt,
                "transfer failed, retrying"
            );
            thread::sleep(self.retry_delay);
            output = run_command(&self.rsync, &args, None)?;
        }
        Ok(output)
    }

    /// Resolve a remote symlink by copying the link itself (rsync -l) into a
    /// scratch directory and reading its target locally.
    ///
    /// # Errors
    ///
    /// Returns an error when the link cannot be copied or is not a symlink.
    pub fn read_remote_symlink(&self, url: &str) -> Result<PathBuf> {
        let name = url
            .rsplit('/')
            .find(|part| !part.is_empty())
            .context("remote symlink url has no file name")?
            .to_string();
        let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
        let args = vec![
            "-l".to_string(),
            url.to_string(),
            format!("{}/", scratch.path().display()),
        ];
        let mut output = run_command(&self.rsync, &args, None)?;
        for _ in 1..=self.retries {
            if output.ok() {
                break;
            }
            thread::sleep(self.retry_delay);
            output = run_command(&self.rsync, &args, None)?;
        }
        if !output.ok() {
            bail!(
                "could not fetch symlink {url} (rsync exit {}): {}",
                output.code,
                output.stderr.trim()
            );
        }
        let copied = scratch.path().join(name);
        fs::read_link(&copied).with_context(|| format!("{url} is not a symlink"))
    }
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

/// Pull regular-file names out of `rsync --list-only` output.
fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.starts_with('-'))
        .filter_map(|line| line.split_whitespace().last())
        .filter(|name| name.ends_with(".rpm"))
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
drwxr-xr-x          4,096 2025/05/02 10:11:12 .
-rw-r--r--      1,234,567 2025/05/02 10:11:12 condor-24.0.5-1.el9.x86_64.rpm
-rw-r--r--          2,345 2025/05/02 10:11:12 repodata.json
lrwxrwxrwx             11 2025/05/02 10:11:12 current
-rw-r--r--        987,654 2025/05/02 10:11:13 condor-24.0.6-1.el9.x86_64.rpm
";

    #[test]
    fn listing_keeps_only_regular_rpm_files() {
        assert_eq!(
            parse_listing(LISTING),
            vec![
                "condor-24.0.5-1.el9.x86_64.rpm".to_string(),
                "condor-24.0.6-1.el9.x86_64.rpm".to_string(),
            ]
        );
    }

    #[test]
    fn trailing_slash_is_added_once() {
        assert_eq!(ensure_trailing_slash("rsync://host/mod"), "rsync://host/mod/");
        assert_eq!(ensure_trailing_slash("rsync://host/mod/"), "rsync://host/mod/");
    }

    #[cfg(unix)]
    #[test]
    fn fetch_retries_until_acceptable() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let counter = dir.path().join("count");
        let script = dir.path().join("fake-rsync");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\nn=0\n[ -f {c} ] && n=$(cat {c})\nn=$((n+1))\necho $n > {c}\n[ $n -ge 3 ] && exit 0\nexit 30\n",
                c = counter.display()
            ),
        )?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;

        let transfer = Transfer {
            rsync: script.display().to_string(),
            retries: 5,
            retry_delay: Duration::from_millis(1),
        };
        let spec = FetchSpec {
            source: "rsync://host/mod/".to_string(),
            dest: dir.path().join("dest"),
            link: None,
            not_found_ok: false,
        };
        let output = transfer.fetch(&spec)?;
        assert!(output.ok());
        assert_eq!(fs::read_to_string(&counter)?.trim(), "3");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn not_found_is_acceptable_without_retries() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let counter = dir.path().join("count");
        let script = dir.path().join("fake-rsync");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\nn=0\n[ -f {c} ] && n=$(cat {c})\necho $((n+1)) > {c}\nexit 23\n",
                c = counter.display()
            ),
        )?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;

        let transfer = Transfer {
            rsync: script.display().to_string(),
            retries: 5,
            retry_delay: Duration::from_millis(1),
        };
        let spec = FetchSpec {
            source: "rsync://host/mod/debug/".to_string(),
            dest: dir.path().join("dest"),
            link: None,
            not_found_ok: true,
        };
        let output = transfer.fetch(&spec)?;
        assert_eq!(output.code, RSYNC_NOT_FOUND);
        assert_eq!(fs::read_to_string(&counter)?.trim(), "1");
        Ok(())
    }
}
