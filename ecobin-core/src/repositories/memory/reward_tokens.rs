// File: ecobin-core/src/repositories/memory/reward_tokens.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use ecobin_common::error::Error;
use ecobin_common::models::{MaterialKind, RewardToken};
use ecobin_common::traits::repository_traits::{PointsLedger, TokenRegistry};

use crate::crypto::generate_token_string;

/// Each token sits behind its own async mutex, so redemption of one token
/// never blocks another. The DashMap shard lock is only held long enough to
/// clone the `Arc`.
pub struct InMemoryTokenRegistry {
    tokens: DashMap<String, Arc<Mutex<RewardToken>>>,
    ledger: Arc<dyn PointsLedger>,
}

impl InMemoryTokenRegistry {
    pub fn new(ledger: Arc<dyn PointsLedger>) -> Self {
        Self {
            tokens: DashMap::new(),
            ledger,
        }
    }

    fn slot(&self, token: &str) -> Result<Arc<Mutex<RewardToken>>, Error> {
        self.tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotFound(format!("reward token '{}'", token)))
    }
}

#[async_trait]
impl TokenRegistry for InMemoryTokenRegistry {
    async fn create(&self, material: MaterialKind, points: i32) -> Result<RewardToken, Error> {
        let token = RewardToken::new(generate_token_string()?, material, points);
        self.tokens
            .insert(token.token.clone(), Arc::new(Mutex::new(token.clone())));
        debug!("Stored reward token_id={} material={}", token.token_id, token.material);
        Ok(token)
    }

    async fn find(&self, token: &str) -> Result<RewardToken, Error> {
        let slot = self.slot(token)?;
        let guard = slot.lock().await;
        Ok(guard.clone())
    }

    async fn redeem(&self, token: &str, account: Uuid) -> Result<RewardToken, Error> {
        let slot = self.slot(token)?;
        let mut guard = slot.lock().await;

        if guard.redeemed {
            return Err(Error::AlreadyRedeemed(token.to_string()));
        }

        // Credit first; the flag flips only once the points have landed.
        self.ledger.credit(account, guard.points).await?;
        guard.mark_redeemed(account, Utc::now())?;

        info!(
            "Redeemed token_id={} for account={} (+{} points)",
            guard.token_id, account, guard.points
        );
        Ok(guard.clone())
    }

    async fn list_unredeemed(&self, limit: i64) -> Result<Vec<RewardToken>, Error> {
        let slots: Vec<Arc<Mutex<RewardToken>>> =
            self.tokens.iter().map(|e| e.value().clone()).collect();

        let mut open = Vec::new();
        for slot in slots {
            let t = slot.lock().await;
            if !t.redeemed {
                open.push(t.clone());
            }
        }
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open.truncate(usize::try_from(limit.max(0)).unwrap_or(0));
        Ok(open)
    }

    async fn count(&self) -> Result<i64, Error> {
        Ok(self.tokens.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::InMemoryPointsLedger;

    fn registry_with_account() -> (InMemoryTokenRegistry, Arc<InMemoryPointsLedger>, Uuid) {
        let ledger = Arc::new(InMemoryPointsLedger::new());
        let account = Uuid::new_v4();
        ledger.open_account(account);
        (InMemoryTokenRegistry::new(ledger.clone()), ledger, account)
    }

    #[tokio::test]
    async fn create_then_find() -> Result<(), Error> {
        let (registry, _, _) = registry_with_account();
        let created = registry.create(MaterialKind::Bottle, 100).await?;
        let found = registry.find(&created.token).await?;
        assert_eq!(created, found);
        assert!(!found.redeemed);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (registry, _, account) = registry_with_account();
        assert!(matches!(registry.find("nope").await, Err(Error::NotFound(_))));
        assert!(matches!(registry.redeem("nope", account).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_credit_leaves_token_unredeemed() -> Result<(), Error> {
        let (registry, _, _) = registry_with_account();
        let created = registry.create(MaterialKind::Paper, 50).await?;

        let stranger = Uuid::new_v4();
        let err = registry.redeem(&created.token, stranger).await.unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(a) if a == stranger));

        let after = registry.find(&created.token).await?;
        assert!(!after.redeemed);
        assert!(after.redeemed_at.is_none() && after.redeemed_by.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn list_unredeemed_is_newest_first_and_limited() -> Result<(), Error> {
        let (registry, _, account) = registry_with_account();
        let first = registry.create(MaterialKind::Paper, 50).await?;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = registry.create(MaterialKind::Bottle, 100).await?;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let third = registry.create(MaterialKind::Bottle, 100).await?;
        registry.redeem(&third.token, account).await?;

        let open = registry.list_unredeemed(5).await?;
        let tokens: Vec<&str> = open.iter().map(|t| t.token.as_str()).collect();
        assert_eq!(tokens, vec![second.token.as_str(), first.token.as_str()]);

        assert_eq!(registry.list_unredeemed(1).await?.len(), 1);
        Ok(())
    }
}
