//! 모든 핸들러에서 공유되는 애플리케이션 상태.

use chrono::{DateTime, Utc};
use relay_core::DispatchConfig;
use relay_exchange::ExchangeClientFactory;
use relay_execution::{AccountRegistry, OrderDispatcher};
use std::sync::Arc;

/// 애플리케이션 공유 상태.
///
/// Axum의 State extractor를 통해 핸들러에 주입됩니다.
#[derive(Clone)]
pub struct AppState {
    /// 다중 계좌 디스패처
    pub dispatcher: Arc<OrderDispatcher>,

    /// 계좌 저장소 (레버리지 오버라이드 기록용)
    pub registry: Arc<dyn AccountRegistry>,

    /// API 버전
    pub version: String,

    /// 서버 시작 시간
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn AccountRegistry>,
        factory: Arc<dyn ExchangeClientFactory>,
        config: &DispatchConfig,
    ) -> Self {
        let dispatcher = OrderDispatcher::new(Arc::clone(&registry), factory, config);

        Self {
            dispatcher: Arc::new(dispatcher),
            registry,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
