// ================================================================
// File: ecobin-common/src/error.rs
// ================================================================

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found error: {0}")]
    NotFound(String),

    /// The losing side of a redemption race. Not a fault, callers report it
    /// separately from `NotFound`.
    #[error("Reward already redeemed: {0}")]
    AlreadyRedeemed(String),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Invalid material: {0}")]
    InvalidMaterial(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Uuid error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("QR encoding error: {0}")]
    Qr(String),

    #[error("Token generation error: {0}")]
    TokenGeneration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// A stored record broke one of its own consistency rules.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
