//! API 에러 응답 타입.
//!
//! 디스패치 자체는 계좌 실패가 있어도 항상 200으로 응답합니다.
//! 이 모듈의 에러는 요청 디코딩/검증 실패와 계좌 저장소 실패에만 쓰입니다.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::Json;
use relay_core::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 통합 API 에러 응답.
///
/// # 예시
///
/// ```json
/// {
///   "code": "INVALID_INPUT",
///   "message": "잘못된 입력: symbol이 비어 있습니다",
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "INVALID_INPUT", "NOT_FOUND")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 에러 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 타임스탬프 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;

/// 릴레이 에러를 HTTP 상태와 응답 본문으로 변환.
pub fn relay_error(err: RelayError) -> (StatusCode, Json<ApiErrorResponse>) {
    let (status, code) = match &err {
        RelayError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        RelayError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        RelayError::Exchange(_) => (StatusCode::BAD_GATEWAY, "EXCHANGE_ERROR"),
        RelayError::Registry(_) => (StatusCode::INTERNAL_SERVER_ERROR, "REGISTRY_ERROR"),
        RelayError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        RelayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };

    (status, Json(ApiErrorResponse::new(code, err.to_string())))
}

/// JSON 본문 디코딩 실패 (필드 누락, 타입 불일치) → 400.
pub fn json_rejection(rejection: JsonRejection) -> (StatusCode, Json<ApiErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse::new("INVALID_INPUT", rejection.body_text())),
    )
}

/// 쿼리 문자열 디코딩 실패 → 400.
pub fn query_rejection(rejection: QueryRejection) -> (StatusCode, Json<ApiErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse::new("INVALID_INPUT", rejection.body_text())),
    )
}
