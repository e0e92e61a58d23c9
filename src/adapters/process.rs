//! Child-process execution with line-by-line output streaming into `tracing`.

use crate::domain::ports::{CommandOutput, CommandRunner, CommandSpec};
use crate::utils::error::Result;
use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

const STDERR_TAIL_LINES: usize = 20;
/// Upper bound on captured stdout. Callers only parse short status output;
/// the full stream still goes to the log.
const STDOUT_CAPTURE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::info!("▶️  {}", spec);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("failed to spawn '{}': {}", spec.program, e),
            )
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stderr"))?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_closed = false;
        let mut stderr_closed = false;

        let mut captured = String::new();
        let mut truncated = false;
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        while !(stdout_closed && stderr_closed) {
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_closed => {
                    match line? {
                        Some(line) => {
                            tracing::debug!("[{}] {}", spec.program, line);
                            if captured.len() + line.len() < STDOUT_CAPTURE_BYTES {
                                captured.push_str(&line);
                                captured.push('\n');
                            } else if !truncated {
                                truncated = true;
                                tracing::debug!("[{}] stdout capture truncated", spec.program);
                            }
                        }
                        None => stdout_closed = true,
                    }
                }
                line = stderr_lines.next_line(), if !stderr_closed => {
                    match line? {
                        Some(line) => {
                            tracing::debug!("[{}] {}", spec.program, line);
                            if stderr_tail.len() == STDERR_TAIL_LINES {
                                stderr_tail.pop_front();
                            }
                            stderr_tail.push_back(line);
                        }
                        None => stderr_closed = true,
                    }
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            tracing::warn!("❌ {} exited with {:?}", spec.program, status.code());
            for line in &stderr_tail {
                tracing::warn!("[{}] {}", spec.program, line);
            }
        }

        Ok(CommandOutput {
            code: status.code(),
            stdout: captured,
        })
    }
}
