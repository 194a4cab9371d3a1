//! 설정 관리.
//!
//! 기본값 → TOML 파일 → `RELAY__` 환경 변수 순서로 덮어씁니다.
//! 예: `RELAY__DISPATCH__ACCOUNT_TIMEOUT_MS=5000`

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 디스패치 설정
    pub dispatch: DispatchConfig,
    /// 거래소 설정
    pub exchange: ExchangeConfig,
    /// 계좌 저장소 설정
    pub registry: RegistryConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// HTTP 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_secs: 60,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 디스패치 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 계좌별 파이프라인 타임아웃 (밀리초)
    pub account_timeout_ms: u64,
    /// 조회 단계 재시도 횟수 (0이면 재시도 없음)
    pub read_retries: u32,
    /// 재시도 기본 대기 시간 (밀리초)
    pub retry_base_delay_ms: u64,
    /// 재시도 최대 대기 시간 (밀리초)
    pub retry_max_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            account_timeout_ms: 15_000,
            read_retries: 0,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 2_000,
        }
    }
}

impl DispatchConfig {
    pub fn account_timeout(&self) -> Duration {
        Duration::from_millis(self.account_timeout_ms)
    }
}

/// 거래소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// 실계좌 REST 기본 URL
    pub live_base_url: String,
    /// 샌드박스(데모) REST 기본 URL
    pub sandbox_base_url: String,
    /// 수신 윈도우 (밀리초)
    pub recv_window_ms: u64,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            live_base_url: "https://api.bybit.com".to_string(),
            sandbox_base_url: "https://api-demo.bybit.com".to_string(),
            recv_window_ms: 5000,
            request_timeout_secs: 10,
        }
    }
}

/// 계좌 저장소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// 계좌 목록 TOML 파일 경로
    pub accounts_file: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            accounts_file: "config/accounts.toml".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }
}
