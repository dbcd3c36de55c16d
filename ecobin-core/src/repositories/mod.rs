// src/repositories/mod.rs

pub use ecobin_common::traits::repository_traits::{PointsLedger, TokenRegistry};

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryPointsLedger, InMemoryTokenRegistry};
pub use postgres::{PostgresPointsLedger, PostgresTokenRegistry};
