use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use ecobin_common::models::Tariff;
use ecobin_core::qr::{QrCache, SvgQrEncoder};
use ecobin_core::repositories::{InMemoryPointsLedger, InMemoryTokenRegistry, PostgresTokenRegistry, TokenRegistry};
use ecobin_core::services::RedemptionService;
use ecobin_core::{Database, Error};

use crate::Args;

/// Everything the HTTP layer needs, built once at startup.
pub struct ServerContext {
    pub service: Arc<RedemptionService>,
}

impl ServerContext {
    pub async fn build(args: &Args) -> Result<Self, Error> {
        let tariff = load_tariff(args.tariff_file.as_deref()).await?;
        for material in tariff.materials() {
            info!("Tariff: {} -> {} points", material, tariff.points_for(material)?);
        }

        let registry: Arc<dyn TokenRegistry> = if args.memory {
            warn!("--memory set: tokens and balances are lost on restart");
            let ledger = Arc::new(InMemoryPointsLedger::new());
            for raw in &args.open_accounts {
                let account = Uuid::parse_str(raw.trim())?;
                ledger.open_account(account);
                info!("Opened in-memory account {}", account);
            }
            Arc::new(InMemoryTokenRegistry::new(ledger))
        } else {
            let db = Database::new(&args.database_url).await?;
            db.migrate().await?;
            Arc::new(PostgresTokenRegistry::new(db.pool().clone()))
        };

        let service = RedemptionService::new(
            registry,
            tariff,
            args.api_token.clone(),
            &args.public_base_url,
            QrCache::new(Arc::new(SvgQrEncoder::default()), args.qr_cache_size),
        )?;

        Ok(Self { service: Arc::new(service) })
    }
}

async fn load_tariff(path: Option<&str>) -> Result<Tariff, Error> {
    match path {
        Some(p) => {
            let raw = tokio::fs::read_to_string(p).await?;
            info!("Loading tariff from {}", p);
            Tariff::from_json_str(&raw)
        }
        None => Ok(Tariff::default()),
    }
}
