// src/repositories/memory/mod.rs
//! DashMap-backed stores for tests and `--memory` development runs.

pub mod accounts;
pub mod reward_tokens;

pub use accounts::InMemoryPointsLedger;
pub use reward_tokens::InMemoryTokenRegistry;
