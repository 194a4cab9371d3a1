//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크
//! - `/api/v1/balances`, `/api/v1/positions`, `/api/v1/position-mode` - 계좌 조회/설정
//! - `/api/v1/orders`, `/api/v1/orders/close`, `/api/v1/leverage`, `/api/v1/tp-sl` - 주문

pub mod accounts;
pub mod health;
pub mod orders;

pub use accounts::accounts_router;
pub use health::{health_router, ComponentStatus, HealthResponse};
pub use orders::orders_router;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터 생성.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/api/v1", accounts_router().merge(orders_router()))
}
