use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Failed to open trigger channel {channel}: {reason}")]
    Open { channel: String, reason: String },

    #[error("Trigger transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture device unavailable: {0}")]
    Unavailable(String),

    #[error("Capture produced no frame")]
    EmptyFrame,

    #[error("Capture timed out")]
    Timeout,
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Classifier failed: {0}")]
    Failed(String),
}

/// Outcome taxonomy of one mint request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MintError {
    #[error("Server rejected the bin credential")]
    Unauthorized,

    #[error("Server does not accept material: {0}")]
    InvalidMaterial(String),

    #[error("Reward server unavailable: {0}")]
    Unavailable(String),

    /// The request may or may not have minted a token. Never retried.
    #[error("Mint outcome unknown: {0}")]
    Indeterminate(String),

    #[error("Server rejected mint request with status {0}: {1}")]
    Rejected(u16, String),
}

impl MintError {
    /// Only failures where the server provably did not mint are retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MintError::Unavailable(_))
    }
}

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] ecobin_common::Error),
}

pub type Result<T> = std::result::Result<T, IntakeError>;
