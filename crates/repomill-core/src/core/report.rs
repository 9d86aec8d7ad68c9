use std::{fs, path::Path};

use anyhow::{Context, Result};

use crate::core::process::{describe_output, RunOutput};

/// Per-tag run transcript. Informational entries go to the main log,
/// failures additionally to the error log, so a quick scan of `*.err.log`
/// shows exactly which tags went wrong and why.
#[derive(Debug, Default)]
pub struct TagReport {
    out: Vec<String>,
    err: Vec<String>,
}

impl TagReport {
    #[must_use]
    pub fn new() -> Self {
        TagReport::default()
    }

    pub fn info(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{line}");
        self.out.push(line);
    }

    pub fn error(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::error!("{line}");
        self.out.push(line.clone());
        self.err.push(line);
    }

    /// Record a finished external command, ellipsized, on the side matching
    /// its outcome.
    pub fn command(&mut self, description: &str, output: &RunOutput, ok: bool) {
        let block = describe_output(description, output, ok);
        if ok {
            tracing::debug!("{block}");
            self.out.push(block);
        } else {
            tracing::error!("{block}");
            self.out.push(block.clone());
            self.err.push(block);
        }
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.err.is_empty()
    }

    /// Write `{tag}.log` and, when anything failed, `{tag}.err.log`. A clean
    /// run removes any stale error log from an earlier attempt.
    ///
    /// # Errors
    ///
    /// Returns an error when the log directory or files cannot be written.
    pub fn write_to(&self, log_dir: &Path, tag: &str) -> Result<()> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
        let out_path = log_dir.join(format!("{tag}.log"));
        fs::write(&out_path, join_lines(&self.out))
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        let err_path = log_dir.join(format!("{tag}.err.log"));
        if self.err.is_empty() {
            if err_path.exists() {
                fs::remove_file(&err_path)
                    .with_context(|| format!("failed to remove {}", err_path.display()))?;
            }
        } else {
            fs::write(&err_path, join_lines(&self.err))
                .with_context(|| format!("failed to write {}", err_path.display()))?;
        }
        Ok(())
    }
}

fn join_lines(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_entries_land_in_both_logs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut report = TagReport::new();
        report.info("assembling osg-24-main-el9-release");
        report.error("index build failed");
        assert!(report.has_errors());
        report.write_to(dir.path(), "osg-24-main-el9-release")?;

        let out = fs::read_to_string(dir.path().join("osg-24-main-el9-release.log"))?;
        let err = fs::read_to_string(dir.path().join("osg-24-main-el9-release.err.log"))?;
        assert!(out.contains("assembling"));
        assert!(out.contains("index build failed"));
        assert_eq!(err, "index build failed\n");
        Ok(())
    }

    #[test]
    fn clean_run_clears_stale_error_log() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let stale = dir.path().join("devops-el9-itb.err.log");
        fs::write(&stale, "old failure\n")?;

        let mut report = TagReport::new();
        report.info("all good");
        report.write_to(dir.path(), "devops-el9-itb")?;
        assert!(!stale.exists());
        Ok(())
    }

    #[test]
    fn failed_command_output_is_recorded() {
        let mut report = TagReport::new();
        let output = RunOutput {
            code: 23,
            stdout: String::new(),
            stderr: "rsync: link_stat failed".to_string(),
        };
        report.command("fetch debug subset", &output, false);
        assert!(report.has_errors());
    }
}
