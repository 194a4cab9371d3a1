//! 다중 계좌 주문 릴레이 REST API.
//!
//! 라우터는 요청을 디코딩해 디스패처에 넘기고 집계 응답을 JSON으로 돌려줍니다.
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`routes`]: REST API 엔드포인트
//! - [`error`]: API 에러 응답

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiErrorResponse, ApiResult};
pub use routes::*;
pub use state::AppState;
