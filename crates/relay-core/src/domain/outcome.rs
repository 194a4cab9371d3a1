//! 계좌별 결과와 집계 응답.
//!
//! 디스패치 한 번에 계좌마다 정확히 하나의 [`AccountOutcome`]이 생성되고,
//! 결과 집계기가 이를 [`DispatchEnvelope`]로 묶습니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::account::MarketEnvironment;
use super::intent::{PositionMode, Side};
use super::market::{OrderReceipt, Position};
use super::sizing::SizingResult;
use crate::error::{ErrorKind, RelayError};

/// 디스패치 액션.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchAction {
    PlaceOrder,
    CloseOrder,
    SetLeverage,
    AdjustTpSl,
    GetBalance,
    GetPositions,
    SwitchPositionMode,
}

impl DispatchAction {
    /// 주문 상태를 변경하는 액션인지 확인.
    ///
    /// 변경 액션은 활성 계좌에만, 조회 액션은 등록된 모든 계좌에 실행됩니다.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, DispatchAction::GetBalance | DispatchAction::GetPositions)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchAction::PlaceOrder => "place_order",
            DispatchAction::CloseOrder => "close_order",
            DispatchAction::SetLeverage => "set_leverage",
            DispatchAction::AdjustTpSl => "adjust_tp_sl",
            DispatchAction::GetBalance => "get_balance",
            DispatchAction::GetPositions => "get_positions",
            DispatchAction::SwitchPositionMode => "switch_position_mode",
        }
    }
}

impl fmt::Display for DispatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 주문 제출 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlacement {
    pub symbol: String,
    pub side: Side,
    /// 적용된 레버리지
    pub leverage: u32,
    pub sizing: SizingResult,
    pub receipt: OrderReceipt,
}

/// 포지션 청산 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    /// 청산 직전 포지션
    pub position: Position,
    /// 청산 시점 미실현 손익
    pub pnl: Decimal,
    /// reduce-only 주문 확인
    pub receipt: OrderReceipt,
}

/// 레버리지 변경 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageChange {
    pub symbol: String,
    pub leverage: u32,
    /// false면 이미 같은 값이었음
    pub changed: bool,
}

/// TP/SL 변경 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingStopChange {
    pub symbol: String,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub changed: bool,
}

/// 잔고 조회 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// USDT 지갑 잔고
    pub balance: Decimal,
    pub environment: MarketEnvironment,
    pub active: bool,
}

/// 포지션 조회 결과. 포지션이 없으면 빈 맵입니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionsSnapshot {
    pub positions: BTreeMap<String, Position>,
}

/// 포지션 모드 변경 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionModeChange {
    pub mode: PositionMode,
    pub changed: bool,
}

/// 성공 결과 페이로드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomePayload {
    OrderPlaced(OrderPlacement),
    PositionClosed(ClosedPosition),
    Leverage(LeverageChange),
    TradingStop(TradingStopChange),
    Balance(BalanceSnapshot),
    Positions(PositionsSnapshot),
    PositionMode(PositionModeChange),
}

/// 계좌 하나의 결과.
///
/// 계좌당 작업당 정확히 하나의 variant만 존재합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AccountOutcome {
    Success {
        account_id: String,
        payload: OutcomePayload,
    },
    Failure {
        account_id: String,
        error_kind: ErrorKind,
        error_message: String,
    },
}

impl AccountOutcome {
    pub fn success(account_id: impl Into<String>, payload: OutcomePayload) -> Self {
        AccountOutcome::Success {
            account_id: account_id.into(),
            payload,
        }
    }

    pub fn failure(account_id: impl Into<String>, error: &RelayError) -> Self {
        AccountOutcome::Failure {
            account_id: account_id.into(),
            error_kind: error.kind(),
            error_message: error.to_string(),
        }
    }

    /// 파이프라인 결과를 계좌 결과로 변환.
    pub fn from_result(
        account_id: impl Into<String>,
        result: Result<OutcomePayload, RelayError>,
    ) -> Self {
        match result {
            Ok(payload) => Self::success(account_id, payload),
            Err(e) => Self::failure(account_id, &e),
        }
    }

    pub fn account_id(&self) -> &str {
        match self {
            AccountOutcome::Success { account_id, .. } | AccountOutcome::Failure { account_id, .. } => {
                account_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AccountOutcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&OutcomePayload> {
        match self {
            AccountOutcome::Success { payload, .. } => Some(payload),
            AccountOutcome::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            AccountOutcome::Failure { error_message, .. } => Some(error_message),
            AccountOutcome::Success { .. } => None,
        }
    }
}

/// 디스패치 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// 모든 계좌가 종료 상태에 도달
    Completed,
}

/// 집계 응답.
///
/// `success_count`는 항상 성공 결과 수와 같고, `outcomes`의 길이는
/// `total_count`를 넘지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    pub action: DispatchAction,
    pub status: DispatchStatus,
    /// 완료 순서의 계좌별 결과
    pub outcomes: Vec<AccountOutcome>,
    /// 고려한 계좌 수
    pub total_count: usize,
    pub success_count: usize,
    pub completed_at: DateTime<Utc>,
}

impl DispatchEnvelope {
    /// 실패 결과 수.
    pub fn failure_count(&self) -> usize {
        self.outcomes.len().saturating_sub(self.success_count)
    }

    /// 계좌 ID로 결과 조회.
    pub fn outcome_for(&self, account_id: &str) -> Option<&AccountOutcome> {
        self.outcomes.iter().find(|o| o.account_id() == account_id)
    }

    /// 실패한 계좌 ID 목록 (재시도 대상).
    pub fn failed_accounts(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.account_id())
            .collect()
    }
}
