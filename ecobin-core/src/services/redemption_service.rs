use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use ecobin_common::models::{IssuedReward, MaterialKind, RedeemedReward, RewardView, Tariff};
use ecobin_common::traits::repository_traits::TokenRegistry;

use crate::Error;
use crate::qr::QrCache;

pub const DEFAULT_RECENT_LIMIT: i64 = 5;
pub const MAX_RECENT_LIMIT: i64 = 50;

/// Codes arrive from paths, forms and scanners; surrounding whitespace is noise.
fn reward_code(token: &str) -> Result<&str, Error> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::Parse("reward code must not be empty".into()));
    }
    Ok(token)
}

/// Issue / view / redeem operations over a `TokenRegistry`.
///
/// The tariff and the machine credential are fixed at construction.
pub struct RedemptionService {
    registry: Arc<dyn TokenRegistry>,
    tariff: Tariff,
    api_token: String,
    public_base_url: String,
    qr: QrCache,
}

impl RedemptionService {
    pub fn new(
        registry: Arc<dyn TokenRegistry>,
        tariff: Tariff,
        api_token: impl Into<String>,
        public_base_url: &str,
        qr: QrCache,
    ) -> Result<Self, Error> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::Config("API token must not be empty".into()));
        }
        let parsed = Url::parse(public_base_url)
            .map_err(|e| Error::Config(format!("invalid public base URL '{}': {}", public_base_url, e)))?;

        Ok(Self {
            registry,
            tariff,
            api_token,
            public_base_url: parsed.as_str().trim_end_matches('/').to_string(),
            qr,
        })
    }

    pub fn redeem_url(&self, token: &str) -> String {
        format!("{}/reward/{}", self.public_base_url, token)
    }

    pub fn qr_url(&self, token: &str) -> String {
        format!("{}/reward/{}/qrcode", self.public_base_url, token)
    }

    fn check_credential(&self, credential: Option<&str>) -> Result<(), Error> {
        match credential {
            Some(c) if bool::from(c.as_bytes().ct_eq(self.api_token.as_bytes())) => Ok(()),
            _ => Err(Error::Unauthorized),
        }
    }

    /// Machine-facing mint. Credential and material are validated before the
    /// registry is touched, so a rejected call never creates a row.
    pub async fn issue_reward(
        &self,
        material: &str,
        credential: Option<&str>,
    ) -> Result<IssuedReward, Error> {
        self.check_credential(credential)?;
        let material = material.parse::<MaterialKind>()?;
        let points = self.tariff.points_for(material)?;

        let token = self.registry.create(material, points).await?;
        let redeem_url = self.redeem_url(&token.token);

        // Lazy regeneration in get_qr covers a failure here.
        if let Err(e) = self.qr.get_or_render(&token.token, &redeem_url) {
            warn!("QR pre-render failed for token_id={}: {}", token.token_id, e);
        }

        info!("Issued reward token_id={} material={} points={}", token.token_id, material, points);
        Ok(IssuedReward {
            qr_url: self.qr_url(&token.token),
            token: token.token,
            material,
            points,
            redeem_url,
        })
    }

    pub async fn view_reward(&self, token: &str) -> Result<RewardView, Error> {
        let token = self.registry.find(reward_code(token)?).await?;
        Ok(token.into())
    }

    /// Exactly-once: concurrent callers for the same token see one `Ok`
    /// and `Error::AlreadyRedeemed` for the rest. After a cancelled or
    /// timed-out call, re-query with `view_reward` instead of retrying.
    pub async fn redeem_reward(&self, token: &str, account: Uuid) -> Result<RedeemedReward, Error> {
        let redeemed = self.registry.redeem(reward_code(token)?, account).await?;
        RedeemedReward::try_from(redeemed)
    }

    /// Returns `(content_type, bytes)`; renders on first request.
    pub async fn get_qr(&self, token: &str) -> Result<(&'static str, Arc<Vec<u8>>), Error> {
        let token = self.registry.find(reward_code(token)?).await?;
        let image = self.qr.get_or_render(&token.token, &self.redeem_url(&token.token))?;
        Ok((self.qr.content_type(), image))
    }

    pub async fn recent_unredeemed(&self, limit: Option<i64>) -> Result<Vec<RewardView>, Error> {
        let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT).clamp(1, MAX_RECENT_LIMIT);
        let tokens = self.registry.list_unredeemed(limit).await?;
        Ok(tokens.into_iter().map(RewardView::from).collect())
    }
}
