//! 계좌 조회 및 설정 endpoint.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/balances` - 모든 계좌의 USDT 잔고
//! - `GET /api/v1/positions` - 모든 계좌의 오픈 포지션 (`category`, `symbol` 필터)
//! - `POST /api/v1/position-mode` - 활성 계좌의 포지션 모드 변경

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use relay_core::{DispatchEnvelope, PositionModeRequest, PositionQuery};
use std::sync::Arc;

use crate::error::{json_rejection, query_rejection, relay_error, ApiResult};
use crate::state::AppState;

/// 잔고 조회.
///
/// GET /api/v1/balances
pub async fn get_balances(State(state): State<Arc<AppState>>) -> ApiResult<Json<DispatchEnvelope>> {
    let envelope = state.dispatcher.get_balances().await.map_err(relay_error)?;
    Ok(Json(envelope))
}

/// 포지션 조회.
///
/// GET /api/v1/positions?category=linear&symbol=BTCUSDT
pub async fn get_positions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PositionQuery>, QueryRejection>,
) -> ApiResult<Json<DispatchEnvelope>> {
    let Query(query) = query.map_err(query_rejection)?;
    let envelope = state
        .dispatcher
        .get_positions(query)
        .await
        .map_err(relay_error)?;
    Ok(Json(envelope))
}

/// 포지션 모드 변경.
///
/// POST /api/v1/position-mode
pub async fn switch_position_mode(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PositionModeRequest>, JsonRejection>,
) -> ApiResult<Json<DispatchEnvelope>> {
    let Json(request) = payload.map_err(json_rejection)?;
    let envelope = state
        .dispatcher
        .switch_position_mode(request)
        .await
        .map_err(relay_error)?;
    Ok(Json(envelope))
}

/// 계좌 라우터 생성.
pub fn accounts_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/balances", get(get_balances))
        .route("/positions", get(get_positions))
        .route("/position-mode", post(switch_position_mode))
}
