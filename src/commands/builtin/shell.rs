use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as Process;

use crate::commands::{Command, CommandContext, ParameterKind, ParameterSpec};

/// Runs a shell command line through `sh -c`.
///
/// Stdout lines are logged at INFO and stderr lines at WARN, each as its own
/// message. A non-zero exit status fails the action.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellCommand;

#[async_trait]
impl Command for ShellCommand {
    fn name(&self) -> &'static str {
        "Shell"
    }

    fn description(&self) -> &'static str {
        "Run a shell command and capture its output"
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::new("Command", ParameterKind::Text)
                .describe("Command line passed to sh -c"),
            ParameterSpec::new("WorkingDirectory", ParameterKind::Filename)
                .describe("Directory to run in; inherits the daemon's when empty"),
        ]
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> anyhow::Result<()> {
        let command_line = ctx.params.require("Command")?;
        if command_line.trim().is_empty() {
            anyhow::bail!("Parameter 'Command' is empty");
        }

        let mut process = Process::new("sh");
        process
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = ctx.params.get("WorkingDirectory").filter(|d| !d.trim().is_empty()) {
            process.current_dir(dir);
        }

        tracing::debug!(job_id = ctx.job_id, command = command_line, "Spawning shell command");
        let mut child = process
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", command_line))?;

        let stdout = child.stdout.take().context("stdout not captured")?;
        let stderr = child.stderr.take().context("stderr not captured")?;
        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);
        let (mut out_line, mut err_line) = (Vec::new(), Vec::new());
        let (mut stdout_open, mut stderr_open) = (true, true);

        // Output is not required to be UTF-8; each line is decoded lossily.
        while stdout_open || stderr_open {
            tokio::select! {
                read = stdout.read_until(b'\n', &mut out_line), if stdout_open => {
                    if read? == 0 {
                        stdout_open = false;
                    } else {
                        ctx.log.info(&decode_line(&out_line)).await;
                        out_line.clear();
                    }
                },
                read = stderr.read_until(b'\n', &mut err_line), if stderr_open => {
                    if read? == 0 {
                        stderr_open = false;
                    } else {
                        ctx.log.warn(&decode_line(&err_line)).await;
                        err_line.clear();
                    }
                },
            }
        }

        let status = child.wait().await.context("failed to wait for shell command")?;
        if !status.success() {
            anyhow::bail!("'{}' exited with {}", command_line, status);
        }
        Ok(())
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let line = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::commands::ParameterMap;
    use crate::commands::builtin::testing::context;
    use crate::jobs::log_sink::testing::RecordingSink;
    use crate::models::LogLevel;

    #[tokio::test]
    async fn test_stdout_and_stderr_are_logged() {
        let mut params = ParameterMap::new();
        params.insert("Command", "echo out; echo err 1>&2");
        let sink = RecordingSink::default();

        ShellCommand.execute(&context(&params, &sink)).await.unwrap();

        let mut messages = sink.messages().await;
        messages.sort();
        assert_eq!(
            messages,
            vec![
                (LogLevel::Info, "out".to_string()),
                (LogLevel::Warn, "err".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_utf8_output_is_logged_lossily() {
        let mut params = ParameterMap::new();
        params.insert("Command", r"printf 'ok\n\377\n'");
        let sink = RecordingSink::default();

        ShellCommand.execute(&context(&params, &sink)).await.unwrap();

        assert_eq!(
            sink.messages().await,
            vec![
                (LogLevel::Info, "ok".to_string()),
                (LogLevel::Info, "\u{FFFD}".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_line_strips_line_endings() {
        assert_eq!(decode_line(b"done\r\n"), "done");
        assert_eq!(decode_line(b"tail"), "tail");
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let mut params = ParameterMap::new();
        params.insert("Command", "exit 3");
        let sink = RecordingSink::default();

        let err = ShellCommand.execute(&context(&params, &sink)).await.unwrap_err();
        assert!(err.to_string().contains("exit"));
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().canonicalize().unwrap();
        let mut params = ParameterMap::new();
        params.insert("Command", "pwd -P");
        params.insert("WorkingDirectory", dir.path().to_string_lossy());
        let sink = RecordingSink::default();

        ShellCommand.execute(&context(&params, &sink)).await.unwrap();

        assert_eq!(
            sink.messages().await,
            vec![(LogLevel::Info, expected.to_string_lossy().into_owned())]
        );
    }

    #[tokio::test]
    async fn test_missing_command_parameter() {
        let params = ParameterMap::new();
        let sink = RecordingSink::default();
        assert!(ShellCommand.execute(&context(&params, &sink)).await.is_err());
    }
}
