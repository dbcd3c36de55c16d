// File: ecobin-core/src/test_utils/helpers.rs

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use ecobin_common::models::Tariff;

use crate::Error;
use crate::db::Database;
use crate::qr::{DEFAULT_QR_CACHE_CAPACITY, QrCache, SvgQrEncoder};
use crate::repositories::{InMemoryPointsLedger, InMemoryTokenRegistry};
use crate::services::RedemptionService;

pub const TEST_API_TOKEN: &str = "test-secret";
pub const TEST_BASE_URL: &str = "http://bin.test";

/// Create a connection pool to the test DB.
/// By default looks for `TEST_DATABASE_URL` in env,
/// else uses `postgres://ecobin@localhost/ecobin_test`.
pub async fn create_test_db_pool() -> Result<Pool<Postgres>, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://ecobin@localhost/ecobin_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await?;

    Ok(pool)
}

/// Wipes test data so each test starts fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query("TRUNCATE TABLE reward_tokens, accounts RESTART IDENTITY CASCADE")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn setup_test_database() -> Result<Database, Error> {
    let pool = create_test_db_pool().await?;
    let db = Database::from_pool(pool);
    db.migrate().await?;
    clean_database(db.pool()).await?;
    Ok(db)
}

/// Service wired to in-memory stores with one open account.
pub struct MemoryHarness {
    pub service: Arc<RedemptionService>,
    pub registry: Arc<InMemoryTokenRegistry>,
    pub ledger: Arc<InMemoryPointsLedger>,
    pub account: Uuid,
}

pub fn memory_harness() -> Result<MemoryHarness, Error> {
    let ledger = Arc::new(InMemoryPointsLedger::new());
    let account = Uuid::new_v4();
    ledger.open_account(account);

    let registry = Arc::new(InMemoryTokenRegistry::new(ledger.clone()));
    let service = Arc::new(RedemptionService::new(
        registry.clone(),
        Tariff::default(),
        TEST_API_TOKEN,
        TEST_BASE_URL,
        QrCache::new(Arc::new(SvgQrEncoder::default()), DEFAULT_QR_CACHE_CAPACITY),
    )?);

    Ok(MemoryHarness { service, registry, ledger, account })
}
