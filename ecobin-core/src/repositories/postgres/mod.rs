// src/repositories/postgres/mod.rs

pub mod accounts;
pub mod reward_tokens;

pub use accounts::PostgresPointsLedger;
pub use reward_tokens::PostgresTokenRegistry;
