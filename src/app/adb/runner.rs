use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::app::error::AppError;
use crate::app::models::CommandResult;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: f64,
}

impl From<CommandOutput> for CommandResult {
    fn from(output: CommandOutput) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            duration_ms: output.duration_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    pub capture_stdout: bool,
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            capture_stdout: true,
            cancel_flag: None,
        }
    }
}

impl RunOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// A zero-second timeout means no timeout.
    pub fn from_secs(timeout_secs: u64) -> Self {
        Self {
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            ..Self::default()
        }
    }
}

/// Whitespace split with no quoting support: `flash system "my file.img"`
/// yields four arguments, quotes included.
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

pub fn elapsed_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}

pub fn run_command_line(
    program: &str,
    command: &str,
    options: &RunOptions,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    run_command(program, &split_command(command), options, trace_id)
}

pub fn run_command(
    program: &str,
    args: &[String],
    options: &RunOptions,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    let start = Instant::now();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::system(format!("Failed to spawn {program}: {err}"), trace_id))?;

    // Drain stdout/stderr in parallel; otherwise, a chatty child process can block once the pipe
    // buffer fills, and we will incorrectly hit the timeout.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;

    let stdout_handle = std::thread::spawn(move || drain(stdout));
    let stderr_handle = std::thread::spawn(move || drain(stderr));

    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                let cancelled = options
                    .cancel_flag
                    .as_ref()
                    .map(|flag| flag.load(Ordering::Relaxed))
                    .unwrap_or(false);
                let timed_out = options
                    .timeout
                    .map(|timeout| start.elapsed() > timeout)
                    .unwrap_or(false);
                if cancelled || timed_out {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(if cancelled {
                        AppError::cancelled("Command cancelled", trace_id)
                    } else {
                        AppError::timeout("Command timed out", trace_id)
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();
    let duration_ms = elapsed_millis(start.elapsed());
    debug!(
        trace_id = %trace_id,
        program = %program,
        args = ?args,
        exit_code = ?exit_code,
        elapsed_ms = duration_ms,
        "command finished"
    );

    Ok(CommandOutput {
        stdout: if options.capture_stdout {
            String::from_utf8_lossy(&stdout_bytes).to_string()
        } else {
            String::new()
        },
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
        duration_ms,
    })
}

fn drain(mut reader: impl Read) -> Vec<u8> {
    let mut buffer = Vec::<u8>::new();
    let mut temp = [0u8; 4096];
    loop {
        match reader.read(&mut temp) {
            Ok(0) => break,
            Ok(count) => buffer.extend_from_slice(&temp[..count]),
            Err(_) => break,
        }
    }
    buffer
}
