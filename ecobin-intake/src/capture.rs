use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::debug;

use crate::error::{CaptureError, IntakeError};

/// One encoded camera frame, opaque to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, captured_at: Utc::now() }
    }
}

#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Result<Frame, CaptureError>;
}

/// Splits a configured command line into program + arguments.
pub(crate) fn split_command(command: &str) -> Result<(String, Vec<String>), IntakeError> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts
        .next()
        .ok_or_else(|| IntakeError::Config("command must not be empty".into()))?;
    Ok((program, parts.collect()))
}

/// Runs an external grabber (e.g. `fswebcam -q -`) that writes one frame to stdout.
pub struct CommandFrameSource {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandFrameSource {
    pub fn new(command: &str, timeout: Duration) -> Result<Self, IntakeError> {
        let (program, args) = split_command(command)?;
        Ok(Self { program, args, timeout })
    }
}

#[async_trait]
impl FrameSource for CommandFrameSource {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| CaptureError::Timeout)?
            .map_err(|e| CaptureError::Unavailable(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::EmptyFrame);
        }
        debug!("Captured frame of {} bytes", output.stdout.len());
        Ok(Frame::new(output.stdout))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_as_frame() {
        let src = CommandFrameSource::new("echo frame-bytes", Duration::from_secs(5)).unwrap();
        let frame = src.capture().await.unwrap();
        assert_eq!(frame.bytes, b"frame-bytes\n");
    }

    #[tokio::test]
    async fn failing_or_silent_grabbers_are_errors() {
        let fails = CommandFrameSource::new("false", Duration::from_secs(5)).unwrap();
        assert!(matches!(fails.capture().await, Err(CaptureError::Unavailable(_))));

        let silent = CommandFrameSource::new("true", Duration::from_secs(5)).unwrap();
        assert!(matches!(silent.capture().await, Err(CaptureError::EmptyFrame)));

        let missing = CommandFrameSource::new("/nonexistent/grabber", Duration::from_secs(5)).unwrap();
        assert!(matches!(missing.capture().await, Err(CaptureError::Unavailable(_))));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandFrameSource::new("   ", Duration::from_secs(1)).is_err());
    }
}
