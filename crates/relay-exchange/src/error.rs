//! 거래소 에러 타입.
//!
//! 에러 타입 자체는 `relay-core`에 정의되어 있고, 여기서는 전송 계층 에러를
//! [`ExchangeError`]로 정규화하는 변환 함수를 제공합니다.

pub use relay_core::{ExchangeError, ExchangeFault, ExchangeOperation};

/// reqwest 에러를 거래소 에러로 변환.
pub fn from_transport(operation: ExchangeOperation, err: &reqwest::Error) -> ExchangeError {
    let cause = if err.is_timeout() {
        ExchangeFault::Timeout(err.to_string())
    } else if err.is_decode() {
        ExchangeFault::MalformedResponse(err.to_string())
    } else {
        ExchangeFault::Network(err.to_string())
    };
    ExchangeError::new(operation, cause)
}

/// HTTP 상태 코드를 거래소 에러로 변환.
pub fn from_http_status(operation: ExchangeOperation, status: u16, body: &str) -> ExchangeError {
    let cause = match status {
        401 | 403 => ExchangeFault::Unauthorized(format!("HTTP {}", status)),
        429 => ExchangeFault::RateLimited(format!("HTTP {}", status)),
        408 | 504 => ExchangeFault::Timeout(format!("HTTP {}", status)),
        500..=599 => ExchangeFault::Network(format!("HTTP {}: {}", status, body)),
        _ => ExchangeFault::Api {
            code: i64::from(status),
            message: body.to_string(),
        },
    };
    ExchangeError::new(operation, cause)
}
