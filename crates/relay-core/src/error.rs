//! 릴레이의 에러 타입.
//!
//! 계좌별 파이프라인에서 발생하는 에러는 세 가지로 분류됩니다:
//! - [`RelayError::InvalidInput`]: 호출자가 전달한 값이 전제 조건을 위반
//! - [`RelayError::Exchange`]: 원격 거래소와의 통신 실패 ([`ExchangeError`])
//! - [`RelayError::NotFound`]: 작업에 필요한 오픈 포지션이 없음
//!
//! 호출자는 문자열 비교 없이 [`RelayError::kind`]로 분류를 구분할 수 있습니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 거래소 어댑터 작업 식별자.
///
/// [`ExchangeError`]가 어느 단계에서 실패했는지 기록합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeOperation {
    /// 계좌별 클라이언트 생성
    Connect,
    /// USDT 잔고 조회
    GetBalance,
    /// 최종 체결가 조회
    GetPrice,
    /// 종목 제약 조건 조회
    GetInstrument,
    /// 시장가 주문 제출
    PlaceOrder,
    /// 오픈 포지션 조회
    GetPositions,
    /// 레버리지 변경
    SetLeverage,
    /// TP/SL 변경
    SetTradingStop,
    /// 포지션 청산
    ClosePosition,
    /// 포지션 모드 변경
    SwitchPositionMode,
    /// 계좌 파이프라인 전체 (타임아웃 등)
    Dispatch,
}

impl ExchangeOperation {
    /// snake_case 이름 반환.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeOperation::Connect => "connect",
            ExchangeOperation::GetBalance => "get_balance",
            ExchangeOperation::GetPrice => "get_price",
            ExchangeOperation::GetInstrument => "get_instrument",
            ExchangeOperation::PlaceOrder => "place_order",
            ExchangeOperation::GetPositions => "get_positions",
            ExchangeOperation::SetLeverage => "set_leverage",
            ExchangeOperation::SetTradingStop => "set_trading_stop",
            ExchangeOperation::ClosePosition => "close_position",
            ExchangeOperation::SwitchPositionMode => "switch_position_mode",
            ExchangeOperation::Dispatch => "dispatch",
        }
    }
}

impl fmt::Display for ExchangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 거래소 호출 실패 원인.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeFault {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 요청 또는 파이프라인 타임아웃
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 인증/권한 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// 거래소가 "변경 없음"으로 거부 (레버리지/TP/SL 동일 값)
    #[error("Not modified: {0}")]
    NotModified(String),

    /// 잔고 부족 등 업무 규칙 거부
    #[error("Rejected: {0}")]
    Rejected(String),

    /// 기타 API 에러 코드
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    /// 응답 형식 오류 (필드 누락, 빈 리스트, 파싱 실패)
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// 지갑 응답에 요청한 코인 항목이 없음
    #[error("balance_not_found: {asset}")]
    BalanceNotFound { asset: String },

    /// 심볼에 오픈 포지션이 없음
    #[error("position_not_found: {symbol}")]
    PositionNotFound { symbol: String },
}

/// 원격 거래소 호출 에러.
///
/// 어댑터는 전송 계층 에러를 그대로 노출하지 않고 항상 이 타입으로 정규화합니다.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation}: {cause}")]
pub struct ExchangeError {
    /// 실패한 작업
    pub operation: ExchangeOperation,
    /// 실패 원인
    pub cause: ExchangeFault,
}

impl ExchangeError {
    /// 새 거래소 에러 생성.
    pub fn new(operation: ExchangeOperation, cause: ExchangeFault) -> Self {
        Self { operation, cause }
    }

    /// 응답 형식 오류 생성.
    pub fn malformed(operation: ExchangeOperation, detail: impl Into<String>) -> Self {
        Self::new(operation, ExchangeFault::MalformedResponse(detail.into()))
    }

    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.cause,
            ExchangeFault::Network(_) | ExchangeFault::Timeout(_) | ExchangeFault::RateLimited(_)
        )
    }

    /// 권장 재시도 대기 시간(밀리초) 반환.
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self.cause {
            ExchangeFault::RateLimited(_) => Some(1000),
            ExchangeFault::Network(_) => Some(500),
            ExchangeFault::Timeout(_) => Some(250),
            _ => None,
        }
    }

    /// 거래소의 "변경 없음" 응답인지 확인.
    ///
    /// 레버리지/TP/SL이 이미 요청한 값일 때 거래소가 돌려주는 거부이며,
    /// 호출자는 이를 성공으로 취급합니다.
    pub fn is_not_modified(&self) -> bool {
        matches!(self.cause, ExchangeFault::NotModified(_))
    }

    /// 인증 에러인지 확인.
    pub fn is_auth_error(&self) -> bool {
        matches!(self.cause, ExchangeFault::Unauthorized(_))
    }
}

/// 에러 분류.
///
/// 계좌별 실패 결과에 함께 실려 호출자가 프로그램적으로 분기할 수 있게 합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Exchange,
    NotFound,
    Internal,
}

/// 핵심 릴레이 에러.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 거래소 에러
    #[error("거래소 에러: {0}")]
    Exchange(ExchangeError),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 계좌 저장소 에러
    #[error("계좌 저장소 에러: {0}")]
    Registry(String),

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 내부 에러 (작업 패닉 등)
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 릴레이 작업을 위한 Result 타입.
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// 에러 분류 반환.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::InvalidInput(_) => ErrorKind::InvalidInput,
            RelayError::Exchange(_) => ErrorKind::Exchange,
            RelayError::NotFound(_) => ErrorKind::NotFound,
            RelayError::Registry(_) | RelayError::Config(_) | RelayError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// 거래소 에러라면 참조 반환.
    pub fn as_exchange(&self) -> Option<&ExchangeError> {
        match self {
            RelayError::Exchange(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ExchangeError> for RelayError {
    fn from(err: ExchangeError) -> Self {
        match err.cause {
            ExchangeFault::PositionNotFound { symbol } => {
                RelayError::NotFound(format!("{} 포지션 없음", symbol))
            }
            _ => RelayError::Exchange(err),
        }
    }
}
