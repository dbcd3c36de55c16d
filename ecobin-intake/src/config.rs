use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use ecobin_common::models::MaterialKind;

use crate::error::IntakeError;

/// Command-line arguments for the bin-side agent. Every flag can also come
/// from the environment (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(name = "ecobin-intake")]
#[command(author, version, about = "EcoBin intake agent - sensor trigger to reward code")]
pub struct IntakeArgs {
    /// Serial device the sensor board writes to
    #[arg(long, env = "ECOBIN_SERIAL_PORT", default_value = "/dev/ttyACM0")]
    pub serial_port: String,

    #[arg(long, env = "ECOBIN_BAUDRATE", default_value_t = 9600)]
    pub baud_rate: u32,

    /// Line value that means "deposit detected"; other lines are ignored
    #[arg(long, env = "ECOBIN_TRIGGER", default_value = "1")]
    pub trigger_value: String,

    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    #[arg(long, default_value_t = 1000)]
    pub reconnect_delay_ms: u64,

    /// Command that writes one encoded frame to stdout, e.g. "fswebcam -q -"
    #[arg(long, env = "ECOBIN_CAPTURE_COMMAND", default_value = "fswebcam -q --no-banner -")]
    pub capture_command: String,

    #[arg(long, default_value_t = 5000)]
    pub capture_timeout_ms: u64,

    /// Command that reads a frame on stdin and prints a material name
    #[arg(long, env = "ECOBIN_CLASSIFIER_COMMAND", default_value = "ecobin-classify")]
    pub classifier_command: String,

    #[arg(long, env = "ECOBIN_API_URL", default_value = "http://localhost:5000/api/reward")]
    pub api_url: String,

    #[arg(long, env = "ECOBIN_API_TOKEN")]
    pub api_token: String,

    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    #[arg(long, default_value_t = 500)]
    pub base_backoff_ms: u64,

    #[arg(long, default_value_t = 4000)]
    pub max_backoff_ms: u64,

    #[arg(long, default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// What to do when the classifier is unsure: prompt | default:<material> | abort
    #[arg(long, env = "ECOBIN_FALLBACK", default_value = "prompt")]
    pub fallback: FallbackPolicy,

    #[arg(long, default_value_t = 30)]
    pub prompt_timeout_secs: u64,

    /// Triggers arriving mid-cycle: drop | queue:<n>
    #[arg(long, env = "ECOBIN_OVERFLOW", default_value = "drop")]
    pub overflow: OverflowPolicy,

    /// Pause after each cycle before taking the next trigger
    #[arg(long, default_value_t = 500)]
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    pub port: String,
    pub baud_rate: u32,
    pub trigger_value: String,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
}

/// Retry schedule for `Unavailable` mint failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Upper bound on one whole mint call including backoff sleeps.
    pub fn total_budget(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let mut total = self.request_timeout.saturating_mul(attempts);
        for attempt in 1..attempts {
            total = total.saturating_add(self.backoff(attempt));
        }
        total
    }
}

/// Resolution path for an `Uncertain` classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackPolicy {
    /// Ask the operator on the console; no answer aborts the cycle.
    Prompt,
    /// Use a configured material without asking.
    Default(MaterialKind),
    /// Give up on the deposit.
    Abort,
}

impl FromStr for FallbackPolicy {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "prompt" => return Ok(FallbackPolicy::Prompt),
            "abort" => return Ok(FallbackPolicy::Abort),
            _ => {}
        }
        match s.split_once(':') {
            Some((kind, material)) if kind.eq_ignore_ascii_case("default") => {
                let material = material.parse::<MaterialKind>()?;
                Ok(FallbackPolicy::Default(material))
            }
            _ => Err(IntakeError::Config(format!(
                "unknown fallback '{}': expected prompt, abort or default:<material>",
                s
            ))),
        }
    }
}

/// What happens to triggers that arrive while a cycle is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    Drop,
    Queue(usize),
}

impl OverflowPolicy {
    pub fn channel_capacity(&self) -> usize {
        match self {
            OverflowPolicy::Drop => 1,
            OverflowPolicy::Queue(n) => (*n).max(1),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("drop") {
            return Ok(OverflowPolicy::Drop);
        }
        match s.split_once(':') {
            Some((kind, n)) if kind.eq_ignore_ascii_case("queue") => n
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(OverflowPolicy::Queue)
                .ok_or_else(|| IntakeError::Config(format!("queue size must be a positive integer, got '{}'", n))),
            _ => Err(IntakeError::Config(format!(
                "unknown overflow policy '{}': expected drop or queue:<n>",
                s
            ))),
        }
    }
}

impl IntakeArgs {
    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig {
            port: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            trigger_value: self.trigger_value.trim().to_string(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}
