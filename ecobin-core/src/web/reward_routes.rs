use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::debug;

use ecobin_common::models::{IssuedReward, RedeemedReward, RewardView};

use crate::web::error::ApiError;
use crate::web::extract::{ActingAccount, api_key};
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    material: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    limit: Option<i64>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn issue_reward(
    State(service): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<MintRequest>, JsonRejection>,
) -> Result<Json<IssuedReward>, ApiError> {
    // A malformed body still has to clear the credential check first,
    // so it degrades to an empty material instead of rejecting early.
    let material = match payload {
        Ok(Json(req)) => req.material.unwrap_or_default(),
        Err(rejection) => {
            debug!("Unparseable mint body: {}", rejection);
            String::new()
        }
    };
    let issued = service.issue_reward(&material, api_key(&headers)).await?;
    Ok(Json(issued))
}

pub async fn view_reward(
    State(service): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<RewardView>, ApiError> {
    Ok(Json(service.view_reward(&token).await?))
}

pub async fn redeem_reward(
    State(service): State<AppState>,
    ActingAccount(account): ActingAccount,
    Path(token): Path<String>,
) -> Result<Json<RedeemedReward>, ApiError> {
    Ok(Json(service.redeem_reward(&token, account).await?))
}

/// Manual code entry; same semantics as the redeem route.
pub async fn scan_code(
    State(service): State<AppState>,
    ActingAccount(account): ActingAccount,
    Json(req): Json<ScanRequest>,
) -> Result<Json<RedeemedReward>, ApiError> {
    let token = req.token.unwrap_or_default();
    Ok(Json(service.redeem_reward(&token, account).await?))
}

pub async fn reward_qr(
    State(service): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let (content_type, image) = service.get_qr(&token).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        image.as_ref().clone(),
    )
        .into_response())
}

pub async fn recent_rewards(
    State(service): State<AppState>,
    ActingAccount(_account): ActingAccount,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<RewardView>>, ApiError> {
    Ok(Json(service.recent_unredeemed(query.limit).await?))
}
