//! Device-side intake: sensor trigger -> capture -> classify -> mint.

pub mod agent;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fallback;
pub mod reward_client;
pub mod trigger;

pub use agent::{CycleOutcome, IntakeAgent, LogSink, RewardSink};
pub use error::{CaptureError, ClassifyError, IntakeError, MintError, Result, TriggerError};
