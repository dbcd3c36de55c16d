// File: ecobin-core/src/repositories/postgres/reward_tokens.rs

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use ecobin_common::error::Error;
use ecobin_common::models::{MaterialKind, RewardToken};
use ecobin_common::traits::repository_traits::TokenRegistry;

use crate::crypto::generate_token_string;

/// Postgres-backed registry. Redemption is a compare-and-set on the row
/// (`WHERE redeemed = FALSE`) plus the account credit, in one transaction.
pub struct PostgresTokenRegistry {
    pub pool: Pool<Postgres>,
}

impl PostgresTokenRegistry {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_token(r: &PgRow) -> Result<RewardToken, Error> {
    let material: String = r.try_get("material")?;
    Ok(RewardToken {
        token_id: r.try_get("token_id")?,
        token: r.try_get("token")?,
        material: material.parse::<MaterialKind>()?,
        points: r.try_get("points")?,
        created_at: r.try_get("created_at")?,
        redeemed: r.try_get("redeemed")?,
        redeemed_at: r.try_get("redeemed_at")?,
        redeemed_by: r.try_get("redeemed_by")?,
    })
}

#[async_trait]
impl TokenRegistry for PostgresTokenRegistry {
    async fn create(&self, material: MaterialKind, points: i32) -> Result<RewardToken, Error> {
        let token = RewardToken::new(generate_token_string()?, material, points);

        sqlx::query(
            r#"
            INSERT INTO reward_tokens (
                token_id,
                token,
                material,
                points,
                created_at,
                redeemed
            )
            VALUES ($1, $2, $3, $4, $5, FALSE)
            "#,
        )
            .bind(token.token_id)
            .bind(&token.token)
            .bind(token.material.as_str())
            .bind(token.points)
            .bind(token.created_at)
            .execute(&self.pool)
            .await?;

        debug!("Stored reward token_id={} material={}", token.token_id, token.material);
        Ok(token)
    }

    async fn find(&self, token: &str) -> Result<RewardToken, Error> {
        let row_opt = sqlx::query(
            r#"
            SELECT token_id, token, material, points, created_at,
                   redeemed, redeemed_at, redeemed_by
            FROM reward_tokens
            WHERE token = $1
            "#,
        )
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        match row_opt {
            Some(r) => row_to_token(&r),
            None => Err(Error::NotFound(format!("reward token '{}'", token))),
        }
    }

    async fn redeem(&self, token: &str, account: Uuid) -> Result<RewardToken, Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // Concurrent updates of the same row serialize on the row lock; the
        // loser re-evaluates the predicate after the winner commits and matches nothing.
        let updated = sqlx::query(
            r#"
            UPDATE reward_tokens
            SET redeemed = TRUE,
                redeemed_at = $2,
                redeemed_by = $3
            WHERE token = $1
              AND redeemed = FALSE
            RETURNING token_id, token, material, points, created_at,
                      redeemed, redeemed_at, redeemed_by
            "#,
        )
            .bind(token)
            .bind(now)
            .bind(account)
            .fetch_optional(&mut *tx)
            .await;

        let row = match updated {
            Ok(Some(row)) => row,
            Ok(None) => {
                let exists = sqlx::query("SELECT 1 FROM reward_tokens WHERE token = $1")
                    .bind(token)
                    .fetch_optional(&mut *tx)
                    .await?;
                tx.rollback().await?;
                return match exists {
                    Some(_) => Err(Error::AlreadyRedeemed(token.to_string())),
                    None => Err(Error::NotFound(format!("reward token '{}'", token))),
                };
            }
            // redeemed_by references accounts; an unknown account trips the FK.
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                return Err(Error::AccountNotFound(account));
            }
            Err(e) => return Err(e.into()),
        };
        let redeemed = row_to_token(&row)?;

        let credited = sqlx::query(
            r#"
            UPDATE accounts
            SET points = points + $2
            WHERE account_id = $1
            "#,
        )
            .bind(account)
            .bind(i64::from(redeemed.points))
            .execute(&mut *tx)
            .await?;

        if credited.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::AccountNotFound(account));
        }

        tx.commit().await?;
        info!(
            "Redeemed token_id={} for account={} (+{} points)",
            redeemed.token_id, account, redeemed.points
        );
        Ok(redeemed)
    }

    async fn list_unredeemed(&self, limit: i64) -> Result<Vec<RewardToken>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT token_id, token, material, points, created_at,
                   redeemed, redeemed_at, redeemed_by
            FROM reward_tokens
            WHERE redeemed = FALSE
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_token).collect()
    }

    async fn count(&self) -> Result<i64, Error> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reward_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
