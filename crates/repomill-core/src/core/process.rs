use std::{
    io::Read,
    path::Path,
    process::{Command, Stdio},
    thread,
};

use anyhow::{Context, Result};

const MAX_CAPTURE_BYTES: usize = 1024 * 1024;
const STDOUT_MAX_LINES: usize = 24;
const STDERR_MAX_LINES: usize = 40;

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[must_use]
    pub fn ok(&self) -> bool {
        self.code == 0
    }

    #[must_use]
    pub fn ok_or(&self, extra_ok: &[i32]) -> bool {
        self.code == 0 || extra_ok.contains(&self.code)
    }
}

/// Execute a program and capture stdout/stderr, bounded so a chatty tool
/// cannot balloon memory.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or the I/O streams
/// cannot be read entirely.
pub fn run_command(program: &str, args: &[String], cwd: Option<&Path>) -> Result<RunOutput> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    tracing::debug!(program, ?args, "running");

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("stdout missing for {program}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("stderr missing for {program}"))?;
    let stdout_handle = thread::spawn(move || read_to_string_limited(stdout, MAX_CAPTURE_BYTES));
    let stderr_handle = thread::spawn(move || read_to_string_limited(stderr, MAX_CAPTURE_BYTES));

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {program}"))?;
    let code = status.code().unwrap_or(-1);
    let (mut stdout, stdout_truncated) = stdout_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stdout thread panicked"))??;
    let (mut stderr, stderr_truncated) = stderr_handle
        .join()
        .map_err(|_| anyhow::anyhow!("stderr thread panicked"))??;
    if stdout_truncated {
        stdout.push_str("\n[...truncated...]\n");
    }
    if stderr_truncated {
        stderr.push_str("\n[...truncated...]\n");
    }
    Ok(RunOutput {
        code,
        stdout,
        stderr,
    })
}

fn read_to_string_limited(mut reader: impl Read, limit: usize) -> Result<(String, bool)> {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        if buffer.len().saturating_add(read) <= limit {
            buffer.extend_from_slice(&chunk[..read]);
        } else {
            let room = limit.saturating_sub(buffer.len());
            buffer.extend_from_slice(&chunk[..room.min(read)]);
            truncated = true;
        }
    }
    Ok((String::from_utf8_lossy(&buffer).to_string(), truncated))
}

/// Replace the middle of an over-long line list with a single "..." line.
#[must_use]
pub fn ellipsize_lines(text: &str, max_lines: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let half = max_lines / 2;
    if lines.len() > max_lines {
        let mut out: Vec<String> = lines[..half].iter().map(ToString::to_string).collect();
        out.push("...".to_string());
        out.extend(lines[lines.len() - half..].iter().map(ToString::to_string));
        out
    } else {
        lines.iter().map(ToString::to_string).collect()
    }
}

/// One formatted block describing a finished process, with stdout/stderr
/// ellipsized; appended to the per-tag report and logged at a level chosen
/// by success or failure.
#[must_use]
pub fn describe_output(description: &str, output: &RunOutput, ok: bool) -> String {
    let mut lines = vec![format!(
        "{description} {} with exit code {}",
        if ok { "succeeded" } else { "failed" },
        output.code
    )];
    if !output.stdout.is_empty() {
        lines.push("-----".to_string());
        lines.push("Stdout:".to_string());
        lines.extend(ellipsize_lines(&output.stdout, STDOUT_MAX_LINES));
    }
    if !output.stderr.is_empty() {
        lines.push("-----".to_string());
        lines.push("Stderr:".to_string());
        lines.extend(ellipsize_lines(&output.stderr, STDERR_MAX_LINES));
    }
    lines.push("-----".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn run_command_captures_output_and_status() -> Result<()> {
        let output = run_command(
            "/bin/sh",
            &[
                "-c".to_string(),
                "printf out && printf err >&2; exit 7".to_string(),
            ],
            None,
        )?;
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert!(!output.ok());
        assert!(output.ok_or(&[7]));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn run_command_truncates_large_output() -> Result<()> {
        let bytes = MAX_CAPTURE_BYTES + 1024;
        let output = run_command(
            "/bin/sh",
            &[
                "-c".to_string(),
                format!("head -c {bytes} /dev/zero | tr '\\0' a"),
            ],
            None,
        )?;
        assert!(output.stdout.contains("[...truncated...]"));
        assert!(output.stdout.len() <= MAX_CAPTURE_BYTES + 64);
        Ok(())
    }

    #[test]
    fn ellipsize_keeps_head_and_tail() {
        let text = (0..10).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let lines = ellipsize_lines(&text, 4);
        assert_eq!(lines, vec!["0", "1", "...", "8", "9"]);
    }

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(ellipsize_lines("a\nb", 4), vec!["a", "b"]);
    }
}
