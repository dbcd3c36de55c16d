// File: ecobin-core/src/repositories/postgres/accounts.rs

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use ecobin_common::error::Error;
use ecobin_common::traits::repository_traits::PointsLedger;

/// Balances live in the account store's `accounts` table. Reward redemption
/// credits it directly inside its own transaction; this type serves everyone else.
pub struct PostgresPointsLedger {
    pub pool: Pool<Postgres>,
}

impl PostgresPointsLedger {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Registers an account with a zero balance. No-op if it already exists.
    pub async fn open_account(&self, account: Uuid) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, points)
            VALUES ($1, 0)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
            .bind(account)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PointsLedger for PostgresPointsLedger {
    async fn credit(&self, account: Uuid, points: i32) -> Result<i64, Error> {
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET points = points + $2
            WHERE account_id = $1
            RETURNING points
            "#,
        )
            .bind(account)
            .bind(i64::from(points))
            .fetch_optional(&self.pool)
            .await?;

        balance.ok_or(Error::AccountNotFound(account))
    }

    async fn balance(&self, account: Uuid) -> Result<i64, Error> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT points FROM accounts WHERE account_id = $1")
                .bind(account)
                .fetch_optional(&self.pool)
                .await?;

        balance.ok_or(Error::AccountNotFound(account))
    }
}
