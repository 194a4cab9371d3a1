//! # Relay Core
//!
//! 다중 계좌 주문 릴레이의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 릴레이 전반에서 사용되는 기본 타입을 제공합니다:
//! - 계좌 및 거래 의도(intent) 타입
//! - 종목 제약 조건과 포지션 스냅샷
//! - 계좌별 결과(outcome)와 집계 응답(envelope)
//! - 에러 분류 체계
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use self::config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
