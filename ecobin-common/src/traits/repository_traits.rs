use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{MaterialKind, RewardToken};

/// Durable store of reward tokens.
///
/// Implementations own the exactly-once guarantee: under any number of
/// concurrent `redeem` calls for one token, exactly one returns `Ok`, and
/// only that call credits the account. The others get
/// `Error::AlreadyRedeemed`. Locking is per token, never global.
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Persists a fresh, unredeemed token. The token string is generated here.
    async fn create(&self, material: MaterialKind, points: i32) -> Result<RewardToken, Error>;

    /// `Error::NotFound` if no such token string exists.
    async fn find(&self, token: &str) -> Result<RewardToken, Error>;

    /// Flips `redeemed` and credits `points` to `account` as one unit.
    /// If the credit fails the token stays unredeemed.
    async fn redeem(&self, token: &str, account: Uuid) -> Result<RewardToken, Error>;

    /// Most recent unredeemed tokens, newest first.
    async fn list_unredeemed(&self, limit: i64) -> Result<Vec<RewardToken>, Error>;

    async fn count(&self) -> Result<i64, Error>;
}

/// Boundary of the external account store.
#[async_trait]
pub trait PointsLedger: Send + Sync {
    /// Adds `points` to the account balance. `Error::AccountNotFound` for unknown accounts.
    async fn credit(&self, account: Uuid, points: i32) -> Result<i64, Error>;

    async fn balance(&self, account: Uuid) -> Result<i64, Error>;
}
