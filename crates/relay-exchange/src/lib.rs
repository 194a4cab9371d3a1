//! 거래소 연결 어댑터.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - ExchangeClient trait: 계좌 하나에 묶인 거래소 인터페이스
//! - Bybit V5 REST 커넥터
//! - 시뮬레이션 거래소 (장애 주입 및 지연 테스트용)
//! - 조회 단계 재시도

pub mod connector;
pub mod error;
pub mod retry;
pub mod simulated;
pub mod traits;

pub use connector::{BybitClient, BybitClientFactory, BybitConfig};
pub use error::*;
pub use retry::{with_retry, RetryConfig};
pub use simulated::{SimulatedExchange, SimulatedExchangeFactory, SimulatedVenue, VenueStage};
pub use traits::*;
