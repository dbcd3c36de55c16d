//! Resolution of uncertain classifications.
//!
//! An uncertain frame is never silently mapped to a material. Depending on
//! the configured policy it is either answered by the operator, replaced by
//! an explicitly configured material, or the deposit is given up.

use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use ecobin_common::models::MaterialKind;

use crate::capture::Frame;
use crate::config::FallbackPolicy;
use crate::error::IntakeError;

#[async_trait]
pub trait MaterialResolver: Send + Sync {
    /// `None` means the cycle ends without a reward.
    async fn resolve(&self, frame: &Frame) -> Option<MaterialKind>;
}

pub struct DefaultMaterial(pub MaterialKind);

#[async_trait]
impl MaterialResolver for DefaultMaterial {
    async fn resolve(&self, _frame: &Frame) -> Option<MaterialKind> {
        info!("Classification uncertain; using configured default {}", self.0);
        Some(self.0)
    }
}

pub struct AbortResolver;

#[async_trait]
impl MaterialResolver for AbortResolver {
    async fn resolve(&self, _frame: &Frame) -> Option<MaterialKind> {
        info!("Classification uncertain; abandoning deposit");
        None
    }
}

/// One line typed by the operator, stamped when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorLine {
    pub at: Instant,
    pub text: String,
}

impl OperatorLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self { at: Instant::now(), text: text.into() }
    }
}

/// Reads stdin on a plain OS thread. A blocked read there never holds up
/// runtime shutdown; the thread ends with the process or when the receiver
/// is dropped.
pub fn spawn_stdin_reader() -> Result<mpsc::Receiver<OperatorLine>, IntakeError> {
    let (tx, rx) = mpsc::channel(16);
    thread::Builder::new()
        .name("operator-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(text) => {
                        if tx.blocking_send(OperatorLine::new(text)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Operator stdin failed: {}", e);
                        break;
                    }
                }
            }
            debug!("Operator stdin reader finished");
        })?;
    Ok(rx)
}

type PromptOutput = Box<dyn AsyncWrite + Unpin + Send>;

/// Asks the operator on a console. Timeout, end of input, or an answer that
/// is not a material all resolve to `None`. Only lines typed after the
/// question was asked count as its answer.
pub struct OperatorPrompt {
    input: Mutex<mpsc::Receiver<OperatorLine>>,
    output: Mutex<PromptOutput>,
    timeout: Duration,
}

impl OperatorPrompt {
    pub fn new(input: mpsc::Receiver<OperatorLine>, output: PromptOutput, timeout: Duration) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
            timeout,
        }
    }

    pub fn stdio(timeout: Duration) -> Result<Self, IntakeError> {
        Ok(Self::new(spawn_stdin_reader()?, Box::new(tokio::io::stdout()), timeout))
    }

    async fn ask(&self) {
        let mut out = self.output.lock().await;
        let question = format!(
            "Material unclear. Type bottle (b) or paper (p) within {}s: ",
            self.timeout.as_secs()
        );
        if let Err(e) = out.write_all(question.as_bytes()).await {
            warn!("Could not write operator prompt: {}", e);
        }
        let _ = out.flush().await;
    }

    /// Next line read after `asked`; older lines are answers to an
    /// earlier prompt and are thrown away. `None` once the input is closed.
    async fn fresh_line(input: &mut mpsc::Receiver<OperatorLine>, asked: Instant) -> Option<String> {
        while let Some(line) = input.recv().await {
            if line.at > asked {
                return Some(line.text);
            }
            debug!("Discarding stale operator input {:?}", line.text.trim());
        }
        None
    }
}

/// Accepts full material names or their first letter.
pub fn parse_answer(answer: &str) -> Option<MaterialKind> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "b" => Some(MaterialKind::Bottle),
        "p" => Some(MaterialKind::Paper),
        other => other.parse().ok(),
    }
}

#[async_trait]
impl MaterialResolver for OperatorPrompt {
    async fn resolve(&self, _frame: &Frame) -> Option<MaterialKind> {
        let mut input = self.input.lock().await;
        let asked = Instant::now();
        self.ask().await;

        let answer = match tokio::time::timeout(self.timeout, Self::fresh_line(&mut input, asked)).await {
            Err(_) => {
                info!("No operator answer within {:?}; abandoning deposit", self.timeout);
                return None;
            }
            Ok(None) => {
                info!("Operator input closed; abandoning deposit");
                return None;
            }
            Ok(Some(line)) => line,
        };

        let material = parse_answer(&answer);
        match material {
            Some(m) => info!("Operator chose {}", m),
            None => info!("Operator answer {:?} is not a material; abandoning deposit", answer.trim()),
        }
        material
    }
}

pub fn resolver_for(policy: FallbackPolicy, prompt_timeout: Duration) -> Result<Arc<dyn MaterialResolver>, IntakeError> {
    Ok(match policy {
        FallbackPolicy::Prompt => Arc::new(OperatorPrompt::stdio(prompt_timeout)?),
        FallbackPolicy::Default(material) => Arc::new(DefaultMaterial(material)),
        FallbackPolicy::Abort => Arc::new(AbortResolver),
    })
}
