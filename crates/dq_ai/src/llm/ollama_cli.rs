use std::ffi::OsString;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use dq_core::error::{codes, AppError};
use tracing::{debug, warn};

use super::Llm;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs `ollama run <model>` with the prompt on stdin and the answer on stdout.
#[derive(Debug, Clone)]
pub struct OllamaCliLlm {
    program: OsString,
    args: Vec<OsString>,
    timeout: Duration,
}

impl OllamaCliLlm {
    pub fn new(model: &str, timeout: Duration) -> Self {
        Self::with_command("ollama", ["run", model], timeout)
    }

    /// Any command that reads a prompt on stdin and writes the answer to stdout.
    pub fn with_command<P, I, S>(program: P, args: I, timeout: Duration) -> Self
    where
        P: Into<OsString>,
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
        }
    }
}

/// Kills and reaps the child on every exit path that did not already reap it.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn wait_with_deadline(&mut self, deadline: Instant) -> Result<Option<ExitStatus>, AppError> {
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.reaped = true;
                    return Ok(Some(status));
                }
                Ok(None) if Instant::now() >= deadline => return Ok(None),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(AppError::new(
                        codes::GENERATION_FAILED,
                        "Failed to poll generation process",
                    )
                    .with_details(e.to_string()))
                }
            }
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut r) = reader {
            let _ = r.read_to_string(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

/// Wait for a drained pipe until `deadline`. A descendant that inherited the pipe
/// can hold it open after the child exits.
fn collect_output(
    rx: &Receiver<String>,
    deadline: Instant,
    stream: &str,
    timeout: Duration,
) -> Result<String, AppError> {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(buf) => Ok(buf),
        Err(RecvTimeoutError::Disconnected) => Ok(String::new()),
        Err(RecvTimeoutError::Timeout) => {
            warn!(stream, "generation output pipe still open at deadline");
            Err(
                AppError::new(codes::GENERATION_FAILED, "Generation process timed out")
                    .with_details(format!(
                        "stream={stream}; timeout_ms={}",
                        timeout.as_millis()
                    ))
                    .with_retryable(true),
            )
        }
    }
}

impl Llm for OllamaCliLlm {
    fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AppError::new(codes::GENERATION_FAILED, "Failed to start generation process")
                    .with_details(format!("program={:?}; err={e}", self.program))
            })?;
        let mut guard = ChildGuard {
            child,
            reaped: false,
        };
        let deadline = Instant::now() + self.timeout;

        // Feed stdin from its own thread so a child that stops reading cannot block us.
        let stdin = guard.child.stdin.take();
        let payload = prompt.as_bytes().to_vec();
        thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(&payload);
            }
        });
        let stdout = drain(guard.child.stdout.take());
        let stderr = drain(guard.child.stderr.take());

        let status = match guard.wait_with_deadline(deadline)? {
            Some(status) => status,
            None => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "generation process timed out");
                // Dropping the guard kills and reaps the child.
                drop(guard);
                return Err(AppError::new(
                    codes::GENERATION_FAILED,
                    "Generation process timed out",
                )
                .with_details(format!("timeout_ms={}", self.timeout.as_millis()))
                .with_retryable(true));
            }
        };

        let out = collect_output(&stdout, deadline, "stdout", self.timeout)?;
        let err = collect_output(&stderr, deadline, "stderr", self.timeout)?;
        debug!(code = ?status.code(), stdout_chars = out.len(), "generation process exited");

        if !status.success() {
            return Err(
                AppError::new(codes::GENERATION_FAILED, "Generation process failed")
                    .with_details(format!("status={status}; stderr={}", err.trim())),
            );
        }
        let text = out.trim();
        if text.is_empty() {
            return Err(AppError::new(
                codes::GENERATION_FAILED,
                "Generation process produced no output",
            ));
        }
        Ok(text.to_string())
    }
}
