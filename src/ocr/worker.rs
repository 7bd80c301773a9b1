//! Recognition worker process transport.
//!
//! The worker is an external program reading JSON requests from stdin and
//! answering on stdout, one line each. Requests are sent one at a time; a
//! reply whose id does not match the outstanding request is a late answer to
//! an earlier, timed-out request and is dropped.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::protocol::{OcrRequest, OcrResponse};
use crate::config::WorkerConfig;
use crate::error::RecognitionError;

/// Characters that have meaning to a shell and never belong in a program path.
const FORBIDDEN_PROGRAM_CHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>', '!', '#', '*', '?', '~',
    '\n', '\r',
];

/// Checks that `program` is an absolute path or a bare command name.
pub fn validate_program(program: &str) -> Result<(), RecognitionError> {
    let invalid = |reason: &str| RecognitionError::InvalidProgram {
        program: program.to_string(),
        reason: reason.to_string(),
    };

    if program.trim().is_empty() {
        return Err(invalid("must be a non-empty string"));
    }
    if program.contains(FORBIDDEN_PROGRAM_CHARS) {
        return Err(invalid("contains forbidden characters"));
    }

    let bare_command = program
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !Path::new(program).is_absolute() && !bare_command {
        return Err(invalid("must be an absolute path or a bare command name"));
    }
    Ok(())
}

/// A live connection to one worker process.
#[async_trait]
pub trait WorkerConnection: Send {
    /// Sends one request and waits for its reply.
    async fn request(
        &mut self,
        request: &OcrRequest,
        timeout: Duration,
    ) -> Result<OcrResponse, RecognitionError>;

    /// Stops the worker. Safe to call on an already dead worker.
    async fn shutdown(&mut self);
}

/// Starts worker processes.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self) -> Result<Box<dyn WorkerConnection>, RecognitionError>;
}

/// Spawns the configured program as a child process.
pub struct ProcessSpawner {
    config: WorkerConfig,
}

impl ProcessSpawner {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self) -> Result<Box<dyn WorkerConnection>, RecognitionError> {
        validate_program(&self.config.program)?;

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RecognitionError::Spawn(format!("{}: {}", self.config.program, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecognitionError::Spawn("worker stdin not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecognitionError::Spawn("worker stdout not piped".to_string()))?;

        log::info!(
            "[ocr] worker spawned: {} (pid {:?})",
            self.config.program,
            child.id()
        );
        Ok(Box::new(ProcessConnection {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        }))
    }
}

/// JSON-lines connection over a child's stdin/stdout.
pub struct ProcessConnection {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessConnection {
    async fn send(&mut self, request: &OcrRequest) -> Result<(), RecognitionError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| RecognitionError::Protocol(e.to_string()))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn receive(&mut self, id: u64) -> Result<OcrResponse, RecognitionError> {
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.stdout.read_line(&mut buf).await? == 0 {
                return Err(RecognitionError::Exited);
            }
            let line = buf.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<OcrResponse>(line) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(resp) => {
                    log::debug!("[ocr] dropping late response id={} (waiting for {})", resp.id, id);
                }
                Err(e) => {
                    log::warn!("[ocr] ignoring malformed worker line: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl WorkerConnection for ProcessConnection {
    async fn request(
        &mut self,
        request: &OcrRequest,
        timeout: Duration,
    ) -> Result<OcrResponse, RecognitionError> {
        let id = request.id;
        let exchange = async {
            self.send(request).await?;
            self.receive(id).await
        };
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| RecognitionError::Timeout(timeout))?
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.child.kill().await {
            log::debug!("[ocr] worker kill: {}", e);
        }
    }
}
