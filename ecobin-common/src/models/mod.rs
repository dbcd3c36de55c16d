// File: ecobin-common/src/models/mod.rs
pub mod reward;
pub mod tariff;

pub use reward::{IssuedReward, MaterialKind, RedeemedReward, RewardToken, RewardView};
pub use tariff::Tariff;
