//! 결과 집계기.

use chrono::Utc;
use relay_core::{AccountOutcome, DispatchAction, DispatchEnvelope, DispatchStatus};
use tracing::info;

/// 계좌별 결과를 도착 순서대로 모아 [`DispatchEnvelope`]를 만듭니다.
///
/// 요약 값은 도착 순서와 무관하게 결정됩니다.
#[derive(Debug)]
pub struct ResultAggregator {
    action: DispatchAction,
    total_count: usize,
    outcomes: Vec<AccountOutcome>,
}

impl ResultAggregator {
    /// `total_count`는 필터링 전 고려한 계좌 수입니다.
    pub fn new(action: DispatchAction, total_count: usize) -> Self {
        Self {
            action,
            total_count,
            outcomes: Vec::with_capacity(total_count),
        }
    }

    pub fn record(&mut self, outcome: AccountOutcome) {
        self.outcomes.push(outcome);
    }

    /// 지금까지 기록된 결과 수.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// 집계 응답 생성.
    pub fn finish(self) -> DispatchEnvelope {
        let success_count = self.outcomes.iter().filter(|o| o.is_success()).count();

        info!(
            action = %self.action,
            total = self.total_count,
            dispatched = self.outcomes.len(),
            succeeded = success_count,
            "Dispatch completed"
        );

        DispatchEnvelope {
            action: self.action,
            status: DispatchStatus::Completed,
            outcomes: self.outcomes,
            total_count: self.total_count,
            success_count,
            completed_at: Utc::now(),
        }
    }
}
