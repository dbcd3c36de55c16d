// File: ecobin-core/src/repositories/memory/accounts.rs

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use ecobin_common::error::Error;
use ecobin_common::traits::repository_traits::PointsLedger;

#[derive(Default)]
pub struct InMemoryPointsLedger {
    balances: DashMap<Uuid, i64>,
}

impl InMemoryPointsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_account(&self, account: Uuid) {
        self.balances.entry(account).or_insert(0);
    }
}

#[async_trait]
impl PointsLedger for InMemoryPointsLedger {
    async fn credit(&self, account: Uuid, points: i32) -> Result<i64, Error> {
        match self.balances.get_mut(&account) {
            Some(mut balance) => {
                *balance += i64::from(points);
                Ok(*balance)
            }
            None => Err(Error::AccountNotFound(account)),
        }
    }

    async fn balance(&self, account: Uuid) -> Result<i64, Error> {
        self.balances
            .get(&account)
            .map(|b| *b.value())
            .ok_or(Error::AccountNotFound(account))
    }
}
