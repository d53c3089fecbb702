//! Remote exec through the external cluster tool
//!
//! The bridge finds a running pod for an app through the [`Provider`], then
//! runs `<tool> --kubeconfig <path> -n <stack> --pod <pod> exec <args...>`.
//! Both output streams are buffered until the tool exits. A non-zero exit is
//! a result, not an error: only a failure to launch the tool is an error.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::{Config, Paths};
use crate::error::{CoreError, Result};
use crate::process::run_captured;
use crate::provider::Provider;

/// Captured result of one exec run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Exit status to hand to the caller's process
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Write the buffer matching the status: stdout on success, stderr otherwise
    pub fn emit<O: Write, E: Write>(&self, out: &mut O, err: &mut E) -> Result<()> {
        if self.success() {
            write_buffer(out, &self.stdout, "command output")
        } else {
            write_buffer(err, &self.stderr, "command error output")
        }
    }
}

fn write_buffer<W: Write>(sink: &mut W, bytes: &[u8], context: &str) -> Result<()> {
    sink.write_all(bytes)
        .and_then(|()| sink.flush())
        .map_err(|source| CoreError::Output {
            context: context.to_string(),
            source,
        })
}

/// Runs commands inside a stack's pods via the cluster tool
#[derive(Debug, Clone)]
pub struct ExecBridge {
    tool: String,
    paths: Paths,
}

impl ExecBridge {
    pub fn new(tool: impl Into<String>, paths: Paths) -> Self {
        Self {
            tool: tool.into(),
            paths,
        }
    }

    pub fn from_config(config: &Config, paths: Paths) -> Self {
        Self::new(config.exec_tool.clone(), paths)
    }

    /// Connection config the tool is pointed at for `stack`
    pub fn kubeconfig(&self, stack: &str) -> PathBuf {
        self.paths.kubeconfig_file(stack)
    }

    /// Argument vector for the tool, in fixed order
    pub fn command_args(&self, stack: &str, pod: &str, args: &[String]) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::with_capacity(args.len() + 7);
        argv.push("--kubeconfig".into());
        argv.push(self.kubeconfig(stack).into_os_string());
        argv.push("-n".into());
        argv.push(stack.into());
        argv.push("--pod".into());
        argv.push(pod.into());
        argv.push("exec".into());
        argv.extend(args.iter().map(OsString::from));
        argv
    }

    /// Run `args` in a running pod of `app`
    ///
    /// Pod lookup failures abort before anything is spawned. An exit
    /// without a status code (killed by a signal) maps to status 0.
    pub async fn run(
        &self,
        provider: &dyn Provider,
        stack: &str,
        app: &str,
        args: &[String],
    ) -> Result<ExecOutcome> {
        let pod = provider.get_running_pods(app).await?;
        info!("Running {:?} in pod {} of app {}", args, pod, app);

        let argv = self.command_args(stack, &pod, args);
        let output = run_captured(&self.tool, &argv, &[]).await?;

        let status = match output.status.code() {
            Some(code) => code,
            None => {
                debug!("{} ended without an exit code: {}", self.tool, output.status);
                0
            }
        };
        debug!("{} exited with status {}", self.tool, status);

        Ok(ExecOutcome {
            status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args_order() {
        let bridge = ExecBridge::new("kubectl", Paths::new("/home/op/.datacol"));
        let argv = bridge.command_args("demo", "web-7f", &["ls".to_string(), "-la".to_string()]);

        let expected: Vec<OsString> = [
            "--kubeconfig",
            "/home/op/.datacol/demo/kubeconfig",
            "-n",
            "demo",
            "--pod",
            "web-7f",
            "exec",
            "ls",
            "-la",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        assert_eq!(argv, expected);
    }

    #[test]
    fn test_emit_success_writes_stdout_only() {
        let outcome = ExecOutcome {
            status: 0,
            stdout: b"ok".to_vec(),
            stderr: b"noise".to_vec(),
        };
        let (mut out, mut err) = (Vec::new(), Vec::new());
        outcome.emit(&mut out, &mut err).unwrap();
        assert_eq!(out, b"ok");
        assert!(err.is_empty());
    }

    #[test]
    fn test_emit_failure_writes_stderr_only() {
        let outcome = ExecOutcome {
            status: 2,
            stdout: b"partial".to_vec(),
            stderr: b"boom".to_vec(),
        };
        let (mut out, mut err) = (Vec::new(), Vec::new());
        outcome.emit(&mut out, &mut err).unwrap();
        assert!(out.is_empty());
        assert_eq!(err, b"boom");
    }
}
