//! 주문 관리 endpoint.
//!
//! # 엔드포인트
//!
//! - `POST /api/v1/orders` - 활성 계좌 전체에 시장가 주문
//! - `POST /api/v1/orders/close` - 활성 계좌 전체의 심볼 포지션 청산
//! - `POST /api/v1/leverage` - 레버리지 변경 (성공 계좌는 오버라이드 기록)
//! - `POST /api/v1/tp-sl` - 오픈 포지션 TP/SL 변경

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use relay_core::{
    AccountOutcome, CloseRequest, DispatchEnvelope, LeverageRequest, OutcomePayload,
    TradingIntent, TradingStopRequest,
};
use std::sync::Arc;
use tracing::warn;

use crate::error::{json_rejection, relay_error, ApiResult};
use crate::state::AppState;

/// 시장가 주문.
///
/// POST /api/v1/orders
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TradingIntent>, JsonRejection>,
) -> ApiResult<Json<DispatchEnvelope>> {
    let Json(intent) = payload.map_err(json_rejection)?;
    let envelope = state
        .dispatcher
        .place_order(intent)
        .await
        .map_err(relay_error)?;
    Ok(Json(envelope))
}

/// 포지션 청산.
///
/// POST /api/v1/orders/close
pub async fn close_order(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CloseRequest>, JsonRejection>,
) -> ApiResult<Json<DispatchEnvelope>> {
    let Json(request) = payload.map_err(json_rejection)?;
    let envelope = state
        .dispatcher
        .close_order(request)
        .await
        .map_err(relay_error)?;
    Ok(Json(envelope))
}

/// 레버리지 변경.
///
/// 성공한 계좌(이미 같은 값이었던 경우 포함)의 심볼 오버라이드를
/// 계좌 저장소에 기록합니다. 기록 실패는 응답에 영향을 주지 않습니다.
///
/// POST /api/v1/leverage
pub async fn set_leverage(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LeverageRequest>, JsonRejection>,
) -> ApiResult<Json<DispatchEnvelope>> {
    let Json(request) = payload.map_err(json_rejection)?;
    let envelope = state
        .dispatcher
        .set_leverage(request)
        .await
        .map_err(relay_error)?;

    for outcome in &envelope.outcomes {
        if let AccountOutcome::Success {
            account_id,
            payload: OutcomePayload::Leverage(change),
        } = outcome
        {
            if let Err(e) = state
                .registry
                .record_leverage(account_id, &change.symbol, change.leverage)
                .await
            {
                warn!(account_id = %account_id, error = %e, "Failed to record leverage override");
            }
        }
    }

    Ok(Json(envelope))
}

/// TP/SL 변경.
///
/// POST /api/v1/tp-sl
pub async fn adjust_tp_sl(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TradingStopRequest>, JsonRejection>,
) -> ApiResult<Json<DispatchEnvelope>> {
    let Json(request) = payload.map_err(json_rejection)?;
    let envelope = state
        .dispatcher
        .adjust_tp_sl(request)
        .await
        .map_err(relay_error)?;
    Ok(Json(envelope))
}

/// 주문 라우터 생성.
pub fn orders_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(place_order))
        .route("/orders/close", post(close_order))
        .route("/leverage", post(set_leverage))
        .route("/tp-sl", post(adjust_tp_sl))
}
