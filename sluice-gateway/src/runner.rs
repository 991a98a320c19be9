//! Runner invocation and process plumbing
//!
//! The backend is an opaque executable given a model name and a prompt; it
//! eventually yields an exit code and captured output. Dispatch is detached:
//! the sweep spawns a worker process (this binary's hidden `worker`
//! subcommand) and moves on, and the worker claims the job, runs the backend
//! synchronously, and reports the outcome back to the store.

use std::process::Stdio;

use anyhow::{Context, Result};
use sluice_core::config::GatewayConfig;
use sluice_core::domain::job::Job;

/// Captured result of one backend invocation.
#[derive(Debug)]
pub struct RunnerOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// Spawns the detached worker that will claim and execute `job_id`.
///
/// The worker is a fresh invocation of this binary so it survives the
/// sweeping process exiting; it is placed in its own process group to keep
/// terminal signals aimed at the user's command from reaching it. The store
/// location travels through the environment so a `--db` override on the
/// sweeping command reaches the worker too.
pub fn spawn_worker(config: &GatewayConfig, job_id: i64) -> Result<u32> {
    let exe = std::env::current_exe().context("Failed to locate the sluice executable")?;

    let mut command = std::process::Command::new(exe);
    command
        .arg("worker")
        .arg(job_id.to_string())
        .env("SLUICE_DB", &config.db_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command
        .spawn()
        .with_context(|| format!("Failed to spawn worker for job {}", job_id))?;

    tracing::debug!(job_id, pid = child.id(), "worker spawned");
    Ok(child.id())
}

/// Runs the backend for one job and captures its output.
pub async fn invoke(config: &GatewayConfig, job: &Job) -> Result<RunnerOutput> {
    let mut command = tokio::process::Command::new(&config.runner_program);
    command
        .args(&config.runner_args)
        .arg("-m")
        .arg(&job.model)
        .arg("-p")
        .arg(&job.prompt_text)
        .stdin(Stdio::null());

    if !job.cwd.is_empty() {
        command.current_dir(&job.cwd);
    }

    let output = command.output().await.with_context(|| {
        format!(
            "Failed to execute '{}'. Is it installed?",
            config.runner_program
        )
    })?;

    Ok(RunnerOutput {
        // A signal-killed backend has no code; treat it as a plain failure
        exit_code: output.status.code().map(i64::from).unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Non-destructive liveness probe: signal 0 checks existence without
/// delivering anything. EPERM and ESRCH both report "not alive" — a pid the
/// gateway cannot signal is not a worker it owns, and treating it as dead
/// keeps an orphaned row from staying `running` forever.
pub fn pid_alive(pid: i64) -> bool {
    if pid <= 0 {
        return false;
    }
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Best-effort termination of a cancelled job's worker. The job row is
/// already failed by the time this runs; delivery failures are ignored.
pub fn terminate(pid: i64) {
    if pid <= 0 {
        return;
    }
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!(pid, "SIGTERM not delivered (process already gone?)");
    }
}

/// Keeps the last `limit` characters of captured output for the job row.
pub fn tail(text: &str, limit: usize) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    let start = text
        .char_indices()
        .rev()
        .nth(limit.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    Some(text[start..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(pid_alive(std::process::id() as i64));
    }

    #[test]
    fn nonexistent_pid_is_not_alive() {
        assert!(!pid_alive(999_999_999));
        assert!(!pid_alive(0));
        assert!(!pid_alive(-4));
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("", 4), None);
        assert_eq!(tail("abc", 4).as_deref(), Some("abc"));
        assert_eq!(tail("abcdef", 4).as_deref(), Some("cdef"));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("héllo", 4).as_deref(), Some("éllo"));
    }
}
