//! Child process helpers shared by the exec bridge and the gcloud provider
//!
//! Output is always fully captured into memory; nothing is streamed live.

use std::ffi::OsStr;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::trace;

use crate::error::{CoreError, Result};

/// Run `program` with `args` and capture stdout and stderr separately
///
/// Only a failure to launch is an error; a non-zero exit is returned in the
/// [`Output`] for the caller to interpret.
pub async fn run_captured<I, S>(program: &str, args: I, envs: &[(&str, &OsStr)]) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        command.env(key, value);
    }

    trace!("Spawning {:?}", command.as_std());

    command
        .output()
        .await
        .map_err(|source| CoreError::Subprocess {
            program: program.to_string(),
            source,
        })
}

/// Run a tool that must succeed, returning its trimmed stdout
///
/// A non-zero exit becomes a provider error carrying the tool's stderr.
pub async fn run_checked<I, S>(
    operation: &'static str,
    program: &str,
    args: I,
    envs: &[(&str, &OsStr)],
) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_captured(program, args, envs).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CoreError::provider(
            operation,
            format!("{program} exited with {}: {}", output.status, stderr.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captured_keeps_streams_apart() {
        let output = run_captured("sh", ["-c", "echo out; echo err >&2; exit 3"], &[])
            .await
            .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_subprocess_error() {
        let err = run_captured("datacol-no-such-tool", ["--help"], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Subprocess { .. }));
    }

    #[tokio::test]
    async fn test_run_checked_surfaces_stderr() {
        let err = run_checked("describe", "sh", ["-c", "echo denied >&2; exit 1"], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("denied"));

        let out = run_checked("describe", "sh", ["-c", "echo '  10.0.0.1 '"], &[])
            .await
            .unwrap();
        assert_eq!(out, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let out = run_checked(
            "env",
            "sh",
            ["-c", "echo $KUBECONFIG"],
            &[("KUBECONFIG", OsStr::new("/tmp/kc"))],
        )
        .await
        .unwrap();
        assert_eq!(out, "/tmp/kc");
    }
}
