use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use ecobin_common::models::MaterialKind;

use crate::capture::{Frame, split_command};
use crate::error::{ClassifyError, IntakeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Material(MaterialKind),
    Uncertain,
}

/// Material recognition is supplied by the environment (heuristic or model).
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, frame: &Frame) -> Result<Classification, ClassifyError>;
}

/// Maps a classifier's printed answer onto a classification. Anything that
/// is not a known material name counts as uncertain.
pub fn parse_verdict(output: &str) -> Classification {
    match output.trim().parse::<MaterialKind>() {
        Ok(material) => Classification::Material(material),
        Err(_) => Classification::Uncertain,
    }
}

/// Pipes the frame into an external program and reads one word back.
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(command: &str, timeout: Duration) -> Result<Self, IntakeError> {
        let (program, args) = split_command(command)?;
        Ok(Self { program, args, timeout })
    }

    async fn run(&self, frame: &Frame) -> Result<String, ClassifyError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClassifyError::Failed(format!("{}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A classifier that exits without reading everything is not our problem.
            let _ = stdin.write_all(&frame.bytes).await;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ClassifyError::Failed(e.to_string()))?;
        if !output.status.success() {
            return Err(ClassifyError::Failed(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Classifier for CommandClassifier {
    async fn classify(&self, frame: &Frame) -> Result<Classification, ClassifyError> {
        let verdict = tokio::time::timeout(self.timeout, self.run(frame))
            .await
            .map_err(|_| ClassifyError::Failed("classifier timed out".into()))??;
        let classification = parse_verdict(&verdict);
        debug!("Classifier said {:?} -> {:?}", verdict.trim(), classification);
        Ok(classification)
    }
}
