//! 시뮬레이션 거래소.
//!
//! 계좌마다 독립된 인메모리 상태를 가지며 단계별 장애와 지연을 주입할 수 있습니다.

pub mod exchange;
pub mod venue;

pub use exchange::{SimulatedExchange, SimulatedExchangeFactory};
pub use venue::{SimulatedVenue, VenueStage};
