//! The script-running capability owned by the home context.
//!
//! An [`Executor`] lives on the home thread and is only ever invoked through a
//! [`Dispatcher`](crate::dispatcher::Dispatcher), so it does not need to be `Send`.
//! Embedding hosts implement the trait over their own engine; the standalone binary
//! ships [`LogExecutor`] and [`CommandExecutor`].

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context};
use tracing::{debug, info, instrument, warn};

use crate::logging;

/// Runs submitted source text against the host's script engine
pub trait Executor {
    fn execute(&mut self, source: &str) -> anyhow::Result<()>;
}

impl<F> Executor for F
where
    F: FnMut(&str) -> anyhow::Result<()>,
{
    fn execute(&mut self, source: &str) -> anyhow::Result<()> {
        self(source)
    }
}

/// Echoes every submission to the log sink. Used when no interpreter is configured.
#[derive(Debug, Default)]
pub struct LogExecutor {
    executed: usize,
}

impl LogExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> usize {
        self.executed
    }
}

impl Executor for LogExecutor {
    fn execute(&mut self, source: &str) -> anyhow::Result<()> {
        self.executed += 1;
        logging::write_line(&format!(
            "Received script #{} ({} bytes)",
            self.executed,
            source.len()
        ));
        for line in source.lines() {
            logging::write_line(&format!("  {}", line));
        }
        Ok(())
    }
}

/// Pipes each submission into a fresh interpreter process on stdin and waits for it.
/// Non-zero exit is reported as an error.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from `[program, args...]`; `None` for an empty command line
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Executor for CommandExecutor {
    #[instrument(name = "command_execute", skip(self, source), fields(program = %self.program))]
    fn execute(&mut self, source: &str) -> anyhow::Result<()> {
        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn interpreter '{}'", self.program))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Interpreter stdin was not captured")?;

        // stdin is fed from its own thread while stdout/stderr drain here: interpreters may
        // write output before they have read all of their input.
        let (written, output) = thread::scope(|scope| -> anyhow::Result<_> {
            let writer = thread::Builder::new()
                .name("interpreter-stdin".to_string())
                .spawn_scoped(scope, move || stdin.write_all(source.as_bytes()))
                .context("Failed to spawn interpreter stdin writer")?;
            let output = child
                .wait_with_output()
                .context("Failed to wait for interpreter")?;
            Ok((writer.join(), output))
        })?;

        match written {
            Ok(Ok(())) => {}
            // Interpreter exited without reading everything; its status tells the story.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("Interpreter closed stdin early");
            }
            Ok(Err(e)) => {
                return Err(e).context("Failed to write script to interpreter stdin");
            }
            Err(_) => bail!("Interpreter stdin writer panicked"),
        }

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            logging::write_line(line);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            logging::write_line(line);
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        if !output.status.success() {
            warn!(status = %output.status, duration_ms, "Interpreter exited with failure");
            bail!(
                "interpreter '{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        info!(duration_ms, "Interpreter finished");
        debug!(stdout_bytes = output.stdout.len(), "Interpreter output collected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_an_executor() {
        let mut seen = Vec::new();
        {
            let mut exec = |source: &str| -> anyhow::Result<()> {
                seen.push(source.to_string());
                Ok(())
            };
            exec.execute("sphere()").unwrap();
            exec.execute("").unwrap();
        }
        assert_eq!(seen, vec!["sphere()".to_string(), String::new()]);
    }

    #[test]
    fn test_log_executor_counts_submissions() {
        let mut exec = LogExecutor::new();
        exec.execute("a\nb").unwrap();
        exec.execute("").unwrap();
        assert_eq!(exec.executed(), 2);
    }

    #[test]
    fn test_command_executor_from_empty_command_line() {
        assert!(CommandExecutor::from_command_line(&[]).is_none());
        let exec =
            CommandExecutor::from_command_line(&["python3".to_string(), "-".to_string()]).unwrap();
        assert_eq!(exec.program(), "python3");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_executor_success() {
        let mut exec = CommandExecutor::new("cat", vec![]);
        exec.execute("print 1\n").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_command_executor_large_script_through_echoing_interpreter() {
        // Far more than a pipe buffer, echoed back while it is still being written
        let source = format!("{}\n", "x".repeat(1023)).repeat(512);
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let mut exec = CommandExecutor::new("cat", vec![]);
            let _ = tx.send(exec.execute(&source).map_err(|e| e.to_string()));
        });

        let result = rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("interpreter did not finish");
        assert_eq!(result, Ok(()));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_executor_reports_failure() {
        let mut exec = CommandExecutor::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);
        let err = exec.execute("ignored").unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[test]
    fn test_command_executor_missing_program() {
        let mut exec = CommandExecutor::new("definitely-not-a-real-interpreter-xyz", vec![]);
        let err = exec.execute("x").unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }
}
