//! 조회 단계 재시도.
//!
//! 잔고/가격/종목/포지션 조회처럼 부작용이 없는 호출에만 사용합니다.
//! 주문 제출과 상태 변경 호출은 중복 실행 위험 때문에 재시도하지 않습니다.

use std::future::Future;
use std::time::Duration;

use relay_core::DispatchConfig;
use tracing::warn;

use crate::traits::ExchangeResult;
use crate::ExchangeError;

/// 재시도 설정.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// 최대 재시도 횟수 (0이면 한 번만 시도)
    pub max_retries: u32,
    /// 첫 재시도 대기 시간 (밀리초)
    pub base_delay_ms: u64,
    /// 대기 시간 상한 (밀리초)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// 디스패치 설정에서 생성.
    pub fn from_dispatch(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.read_retries,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// `attempt`번째 재시도 전 대기 시간.
    ///
    /// 지수 백오프 값과 에러가 권장하는 대기 시간 중 큰 값을 상한으로 자릅니다.
    pub fn delay_for(&self, attempt: u32, err: &ExchangeError) -> Duration {
        let backoff = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let hinted = err.retry_delay_ms().unwrap_or(0);
        Duration::from_millis(backoff.max(hinted).min(self.max_delay_ms))
    }
}

/// 재시도 가능한 에러에 한해 `op`를 다시 실행합니다.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> ExchangeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExchangeResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay_for(attempt, &err);
                attempt += 1;
                warn!(
                    operation = %err.operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying read after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
