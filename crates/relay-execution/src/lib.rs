//! 다중 계좌 주문 디스패치.
//!
//! 제공 기능:
//! - AccountRegistry: 계좌 목록 조회와 레버리지 오버라이드 기록
//! - OrderDispatcher: 계좌별 파이프라인 동시 실행 (계좌 격리, 개별 타임아웃)
//! - ResultAggregator: 계좌별 결과를 하나의 응답으로 집계

pub mod aggregator;
pub mod dispatcher;
pub mod registry;

pub use aggregator::ResultAggregator;
pub use dispatcher::OrderDispatcher;
pub use registry::{AccountRegistry, AccountSelection, InMemoryAccountRegistry, RegistryError};
