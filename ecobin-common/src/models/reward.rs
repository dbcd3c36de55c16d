// File: ecobin-common/src/models/reward.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// Material a deposit was classified as. Drives the tariff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Bottle,
    Paper,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialKind::Bottle => "bottle",
            MaterialKind::Paper => "paper",
        }
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaterialKind {
    type Err = Error;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bottle" => Ok(MaterialKind::Bottle),
            "paper" => Ok(MaterialKind::Paper),
            other => Err(Error::InvalidMaterial(other.to_string())),
        }
    }
}

/// One reward grant. Never deleted; a redeemed row is the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardToken {
    pub token_id: Uuid,
    pub token: String,
    pub material: MaterialKind,
    pub points: i32,
    pub created_at: DateTime<Utc>,
    pub redeemed: bool,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<Uuid>,
}

impl RewardToken {
    pub fn new(token: String, material: MaterialKind, points: i32) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            token,
            material,
            points,
            created_at: Utc::now(),
            redeemed: false,
            redeemed_at: None,
            redeemed_by: None,
        }
    }

    /// One-way transition. All three redemption fields change together or not at all.
    pub fn mark_redeemed(&mut self, account: Uuid, at: DateTime<Utc>) -> Result<(), Error> {
        if self.redeemed {
            return Err(Error::AlreadyRedeemed(self.token.clone()));
        }
        self.redeemed = true;
        self.redeemed_at = Some(at);
        self.redeemed_by = Some(account);
        Ok(())
    }
}

/// Payload returned to the device by `POST /api/reward`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedReward {
    pub token: String,
    pub material: MaterialKind,
    pub points: i32,
    pub redeem_url: String,
    pub qr_url: String,
}

/// Read-only view rendered by `GET /reward/{token}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardView {
    pub token: String,
    pub material: MaterialKind,
    pub points: i32,
    pub created_at: DateTime<Utc>,
    pub redeemed: bool,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<Uuid>,
}

impl From<RewardToken> for RewardView {
    fn from(t: RewardToken) -> Self {
        Self {
            token: t.token,
            material: t.material,
            points: t.points,
            created_at: t.created_at,
            redeemed: t.redeemed,
            redeemed_at: t.redeemed_at,
            redeemed_by: t.redeemed_by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedReward {
    pub token: String,
    pub material: MaterialKind,
    pub points: i32,
    pub redeemed_at: DateTime<Utc>,
    pub redeemed_by: Uuid,
}

impl TryFrom<RewardToken> for RedeemedReward {
    type Error = Error;

    fn try_from(t: RewardToken) -> Result<Self, Self::Error> {
        match (t.redeemed, t.redeemed_at, t.redeemed_by) {
            (true, Some(at), Some(by)) => Ok(Self {
                token: t.token,
                material: t.material,
                points: t.points,
                redeemed_at: at,
                redeemed_by: by,
            }),
            _ => Err(Error::Internal(format!("token {} is not in a redeemed state", t.token))),
        }
    }
}
