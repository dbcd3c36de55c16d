//! HTTP boundary: the machine mint API and the human redemption routes.

pub mod error;
pub mod extract;
pub mod reward_routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::services::RedemptionService;

pub use error::ApiError;
pub use extract::{ActingAccount, API_KEY_HEADER, ACCOUNT_HEADER};

pub type AppState = Arc<RedemptionService>;

pub fn build_router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(reward_routes::health))
        .route("/api/reward", post(reward_routes::issue_reward))
        .route("/reward/{token}", get(reward_routes::view_reward))
        .route("/reward/{token}/redeem", post(reward_routes::redeem_reward))
        .route("/reward/{token}/qrcode", get(reward_routes::reward_qr))
        .route("/scan", post(reward_routes::scan_code))
        .route("/rewards/recent", get(reward_routes::recent_rewards))
        .with_state(service)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
