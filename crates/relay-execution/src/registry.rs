//! 계좌 저장소.
//!
//! 코어는 계좌 레코드를 읽기만 합니다. 레버리지 오버라이드 기록은
//! 라우터가 `set_leverage` 성공 결과를 받은 뒤 호출합니다.

use async_trait::async_trait;
use relay_core::{Account, DispatchAction, RelayError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// 계좌 저장소 에러.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("계좌 파일 읽기 실패: {0}")]
    Io(#[from] std::io::Error),

    #[error("계좌 파일 파싱 실패: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("중복된 계좌 ID: {0}")]
    DuplicateId(String),

    #[error("계좌를 찾을 수 없음: {0}")]
    UnknownAccount(String),
}

impl From<RegistryError> for RelayError {
    fn from(err: RegistryError) -> Self {
        RelayError::Registry(err.to_string())
    }
}

/// 디스패치 대상 계좌 선택 기준.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSelection {
    /// 등록된 모든 계좌 (조회 작업)
    All,
    /// 활성 계좌만 (주문 변경 작업)
    ActiveOnly,
}

impl AccountSelection {
    /// 액션에 맞는 선택 기준.
    pub fn for_action(action: DispatchAction) -> Self {
        if action.is_mutating() {
            AccountSelection::ActiveOnly
        } else {
            AccountSelection::All
        }
    }

    pub fn includes(&self, account: &Account) -> bool {
        match self {
            AccountSelection::All => true,
            AccountSelection::ActiveOnly => account.active,
        }
    }
}

/// 계좌 저장소 인터페이스.
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    /// 등록된 모든 계좌를 등록 순서대로 반환.
    async fn accounts(&self) -> Result<Vec<Account>, RegistryError>;

    /// 심볼 레버리지 오버라이드 기록.
    async fn record_leverage(
        &self,
        account_id: &str,
        symbol: &str,
        leverage: u32,
    ) -> Result<(), RegistryError>;
}

/// TOML 계좌 파일 형식.
///
/// ```toml
/// [[accounts]]
/// id = "alice"
/// api_key = "..."
/// api_secret = "..."
/// environment = "sandbox"
/// leverage = { BTCUSDT = 5 }
/// ```
#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Account>,
}

/// 인메모리 계좌 저장소.
#[derive(Debug, Default)]
pub struct InMemoryAccountRegistry {
    accounts: RwLock<Vec<Account>>,
}

impl InMemoryAccountRegistry {
    /// 계좌 목록으로 생성. ID가 중복되면 실패합니다.
    pub fn new(accounts: Vec<Account>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for account in &accounts {
            if !seen.insert(account.id.as_str()) {
                return Err(RegistryError::DuplicateId(account.id.clone()));
            }
        }

        Ok(Self {
            accounts: RwLock::new(accounts),
        })
    }

    /// TOML 문자열에서 로드.
    pub fn from_toml_str(content: &str) -> Result<Self, RegistryError> {
        let file: AccountsFile = toml::from_str(content)?;
        Self::new(file.accounts)
    }

    /// TOML 파일에서 로드.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let file: AccountsFile = toml::from_str(&content)?;
        info!(
            path = %path.as_ref().display(),
            accounts = file.accounts.len(),
            "Account registry loaded"
        );
        Self::new(file.accounts)
    }
}

#[async_trait]
impl AccountRegistry for InMemoryAccountRegistry {
    async fn accounts(&self) -> Result<Vec<Account>, RegistryError> {
        Ok(self.accounts.read().await.clone())
    }

    async fn record_leverage(
        &self,
        account_id: &str,
        symbol: &str,
        leverage: u32,
    ) -> Result<(), RegistryError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| RegistryError::UnknownAccount(account_id.to_string()))?;

        account.leverage.insert(symbol.to_string(), leverage);
        info!(account_id, symbol, leverage, "Leverage override recorded");
        Ok(())
    }
}
