//! Bybit V5 거래소 커넥터.
//!
//! 통합 계좌(UNIFIED) 기준 REST API 구현.
//! 실계좌와 데모 트레이딩 환경을 모두 지원.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use relay_core::{
    mask_key, Account, Category, ExchangeConfig, InstrumentConstraints, MarketEnvironment,
    OrderReceipt, Position, PositionMode, Side,
};
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{from_http_status, from_transport};
use crate::traits::{
    ExchangeClient, ExchangeClientFactory, ExchangeResult, MarketOrder, PositionMap,
};
use crate::{ExchangeError, ExchangeFault, ExchangeOperation};

type HmacSha256 = Hmac<Sha256>;

const LIVE_BASE_URL: &str = "https://api.bybit.com";
const SETTLE_COIN: &str = "USDT";

// ============================================================================
// 설정
// ============================================================================

/// Bybit 클라이언트 설정.
///
/// # 보안
/// - `Debug` 구현은 민감 정보(`api_key`, `api_secret`)를 마스킹합니다.
#[derive(Clone)]
pub struct BybitConfig {
    /// API 키
    pub api_key: String,
    /// API 시크릿
    pub api_secret: String,
    /// REST 기본 URL (실계좌 또는 데모)
    pub base_url: String,
    /// 수신 윈도우 (밀리초)
    pub recv_window_ms: u64,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl fmt::Debug for BybitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BybitConfig")
            .field("api_key", &mask_key(&self.api_key))
            .field("api_secret", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("recv_window_ms", &self.recv_window_ms)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl BybitConfig {
    /// 실계좌 URL로 새 설정 생성.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: LIVE_BASE_URL.to_string(),
            recv_window_ms: 5000,
            timeout_secs: 10,
        }
    }

    /// REST 기본 URL 설정 (후행 `/` 제거).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// 수신 윈도우 설정.
    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    /// 계좌 자격증명과 환경으로 설정 생성.
    pub fn from_account(account: &Account, settings: &ExchangeConfig) -> Self {
        let base_url = match account.environment {
            MarketEnvironment::Live => &settings.live_base_url,
            MarketEnvironment::Sandbox => &settings.sandbox_base_url,
        };

        let mut config = Self::new(account.api_key.clone(), account.api_secret.clone())
            .with_base_url(base_url.clone())
            .with_recv_window(settings.recv_window_ms);
        config.timeout_secs = settings.request_timeout_secs;
        config
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

/// 모든 V5 응답의 공통 래퍼.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitEnvelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct WalletAccount {
    #[serde(default)]
    coin: Vec<WalletCoin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletCoin {
    coin: String,
    #[serde(default)]
    wallet_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerEntry {
    last_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentEntry {
    price_filter: PriceFilter,
    lot_size_filter: LotSizeFilter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceFilter {
    tick_size: String,
}

/// 선물은 `qtyStep`, 현물은 `basePrecision`을 사용합니다.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LotSizeFilter {
    #[serde(default)]
    qty_step: Option<String>,
    #[serde(default)]
    base_precision: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreateResult {
    order_id: String,
    #[serde(default)]
    order_link_id: String,
}

/// 포지션 항목. `symbol`이 없으면 응답 형식 오류입니다.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionEntry {
    symbol: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    avg_price: String,
    #[serde(default)]
    leverage: String,
    #[serde(default)]
    liq_price: String,
    #[serde(default)]
    take_profit: String,
    #[serde(default)]
    stop_loss: String,
    #[serde(default)]
    position_value: String,
    #[serde(default)]
    cum_realised_pnl: String,
    #[serde(default)]
    unrealised_pnl: String,
    #[serde(default)]
    mark_price: String,
}

impl PositionEntry {
    /// 포지션으로 변환. 방향이 비어 있거나 수량이 0이면 `None`.
    fn into_position(self, category: Category) -> ExchangeResult<Option<Position>> {
        let Some(side) = Side::from_order_side(&self.side) else {
            return Ok(None);
        };
        let size = parse_decimal(ExchangeOperation::GetPositions, "size", &self.size)?;
        if size.is_zero() {
            return Ok(None);
        }

        Ok(Some(Position {
            avg_price: parse_decimal(ExchangeOperation::GetPositions, "avgPrice", &self.avg_price)?,
            leverage: parse_or_zero(&self.leverage),
            liq_price: parse_level(&self.liq_price),
            take_profit: parse_level(&self.take_profit),
            stop_loss: parse_level(&self.stop_loss),
            position_value: parse_or_zero(&self.position_value),
            realised_pnl: parse_or_zero(&self.cum_realised_pnl),
            unrealised_pnl: parse_or_zero(&self.unrealised_pnl),
            mark_price: parse_or_zero(&self.mark_price),
            symbol: self.symbol,
            category,
            side,
            size,
        }))
    }
}

fn parse_decimal(operation: ExchangeOperation, field: &str, raw: &str) -> ExchangeResult<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|_| ExchangeError::malformed(operation, format!("invalid {}: '{}'", field, raw)))
}

/// 미설정 값은 빈 문자열이나 "0"으로 옵니다.
fn parse_level(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw.trim()).ok().filter(|v| !v.is_zero())
}

fn parse_or_zero(raw: &str) -> Decimal {
    Decimal::from_str(raw.trim()).unwrap_or(Decimal::ZERO)
}

fn first<T>(operation: ExchangeOperation, result: ListResult<T>, what: &str) -> ExchangeResult<T> {
    result
        .list
        .into_iter()
        .next()
        .ok_or_else(|| ExchangeError::malformed(operation, format!("empty {} list", what)))
}

// ============================================================================
// Bybit 클라이언트
// ============================================================================

/// 계좌 하나에 묶인 Bybit 클라이언트.
pub struct BybitClient {
    config: BybitConfig,
    client: Client,
}

impl BybitClient {
    /// 새 Bybit 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `Network` 에러를 반환합니다.
    pub fn new(config: BybitConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ExchangeError::new(
                    ExchangeOperation::Connect,
                    ExchangeFault::Network(format!("HTTP 클라이언트 생성 실패: {}", e)),
                )
            })?;

        Ok(Self { config, client })
    }

    /// 공유 HTTP 커넥션 풀로 생성.
    pub fn with_http_client(config: BybitConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &BybitConfig {
        &self.config
    }

    /// 현재 타임스탬프(밀리초) 반환.
    fn timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// HMAC-SHA256 서명: `timestamp + api_key + recv_window + payload`.
    ///
    /// payload는 GET이면 쿼리 문자열, POST면 JSON 본문입니다.
    fn sign(
        &self,
        operation: ExchangeOperation,
        timestamp: &str,
        payload: &str,
    ) -> ExchangeResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes()).map_err(|e| {
            ExchangeError::new(operation, ExchangeFault::Unauthorized(e.to_string()))
        })?;
        mac.update(timestamp.as_bytes());
        mac.update(self.config.api_key.as_bytes());
        mac.update(self.config.recv_window_ms.to_string().as_bytes());
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// 파라미터에서 쿼리 문자열 생성.
    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn url(&self, endpoint: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query)
        }
    }

    /// 인증 헤더 추가.
    fn authenticate(&self, request: RequestBuilder, timestamp: &str, signature: &str) -> RequestBuilder {
        request
            .header("X-BAPI-API-KEY", &self.config.api_key)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-TIMESTAMP", timestamp)
            .header("X-BAPI-RECV-WINDOW", self.config.recv_window_ms.to_string())
    }

    /// 공개 API 요청 (인증 불필요).
    async fn public_get<T: DeserializeOwned>(
        &self,
        operation: ExchangeOperation,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = self.url(endpoint, &Self::build_query(params));
        debug!(%operation, endpoint, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| from_transport(operation, &e))?;

        self.handle_response(operation, response).await
    }

    /// 서명된 GET 요청.
    async fn signed_get<T: DeserializeOwned>(
        &self,
        operation: ExchangeOperation,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let query = Self::build_query(params);
        let timestamp = Self::timestamp_ms().to_string();
        let signature = self.sign(operation, &timestamp, &query)?;

        debug!(%operation, endpoint, "GET (signed)");

        let response = self
            .authenticate(self.client.get(self.url(endpoint, &query)), &timestamp, &signature)
            .send()
            .await
            .map_err(|e| from_transport(operation, &e))?;

        self.handle_response(operation, response).await
    }

    /// 서명된 POST 요청 (JSON 본문).
    async fn signed_post<T: DeserializeOwned>(
        &self,
        operation: ExchangeOperation,
        endpoint: &str,
        body: &Value,
    ) -> ExchangeResult<T> {
        let payload = body.to_string();
        let timestamp = Self::timestamp_ms().to_string();
        let signature = self.sign(operation, &timestamp, &payload)?;

        debug!(%operation, endpoint, "POST (signed)");

        let response = self
            .authenticate(self.client.post(self.url(endpoint, "")), &timestamp, &signature)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| from_transport(operation, &e))?;

        self.handle_response(operation, response).await
    }

    /// API 응답 처리.
    ///
    /// HTTP 200이어도 `retCode`가 0이 아니면 실패입니다.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        operation: ExchangeOperation,
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| from_transport(operation, &e))?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<BybitEnvelope>(&body) {
                if envelope.ret_code != 0 {
                    return Err(Self::map_error_code(operation, envelope.ret_code, &envelope.ret_msg));
                }
            }
            warn!(%operation, status = status.as_u16(), "HTTP error from Bybit");
            return Err(from_http_status(operation, status.as_u16(), &body));
        }

        let envelope: BybitEnvelope = serde_json::from_str(&body).map_err(|e| {
            error!(%operation, "Failed to parse response: {} - Body: {}", e, body);
            ExchangeError::malformed(operation, e.to_string())
        })?;

        if envelope.ret_code != 0 {
            return Err(Self::map_error_code(operation, envelope.ret_code, &envelope.ret_msg));
        }

        serde_json::from_value(envelope.result).map_err(|e| {
            error!(%operation, "Unexpected result shape: {}", e);
            ExchangeError::malformed(operation, e.to_string())
        })
    }

    /// Bybit retCode를 ExchangeError로 매핑.
    fn map_error_code(operation: ExchangeOperation, code: i64, msg: &str) -> ExchangeError {
        let msg = msg.to_string();
        let cause = match code {
            10003 | 10004 | 10005 | 10010 | 33004 => ExchangeFault::Unauthorized(msg),
            10006 | 10018 => ExchangeFault::RateLimited(msg),
            10016 => ExchangeFault::Network(msg),
            // 레버리지/TP/SL/포지션 모드가 이미 요청한 값
            110043 | 34040 | 110025 => ExchangeFault::NotModified(msg),
            110004 | 110007 | 110012 | 170131 => ExchangeFault::Rejected(msg),
            _ => ExchangeFault::Api { code, message: msg },
        };
        ExchangeError::new(operation, cause)
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    fn name(&self) -> &str {
        "bybit"
    }

    async fn get_usdt_balance(&self) -> ExchangeResult<Decimal> {
        let operation = ExchangeOperation::GetBalance;
        let result: ListResult<WalletAccount> = self
            .signed_get(
                operation,
                "/v5/account/wallet-balance",
                &[("accountType", "UNIFIED".to_string())],
            )
            .await?;

        let account = first(operation, result, "wallet")?;
        let coin = account
            .coin
            .into_iter()
            .find(|c| c.coin == SETTLE_COIN)
            .ok_or_else(|| {
                ExchangeError::new(
                    operation,
                    ExchangeFault::BalanceNotFound {
                        asset: SETTLE_COIN.to_string(),
                    },
                )
            })?;

        parse_decimal(operation, "walletBalance", &coin.wallet_balance)
    }

    async fn get_last_price(&self, category: Category, symbol: &str) -> ExchangeResult<Decimal> {
        let operation = ExchangeOperation::GetPrice;
        let result: ListResult<TickerEntry> = self
            .public_get(
                operation,
                "/v5/market/tickers",
                &[
                    ("category", category.as_str().to_string()),
                    ("symbol", symbol.to_string()),
                ],
            )
            .await?;

        let ticker = first(operation, result, "ticker")?;
        parse_decimal(operation, "lastPrice", &ticker.last_price)
    }

    async fn get_instrument_constraints(
        &self,
        category: Category,
        symbol: &str,
    ) -> ExchangeResult<InstrumentConstraints> {
        let operation = ExchangeOperation::GetInstrument;
        let result: ListResult<InstrumentEntry> = self
            .public_get(
                operation,
                "/v5/market/instruments-info",
                &[
                    ("category", category.as_str().to_string()),
                    ("symbol", symbol.to_string()),
                ],
            )
            .await?;

        let instrument = first(operation, result, "instrument")?;
        let tick_size = parse_decimal(operation, "tickSize", &instrument.price_filter.tick_size)?;
        let lot = instrument.lot_size_filter;
        let qty_step = lot
            .qty_step
            .or(lot.base_precision)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ExchangeError::malformed(operation, "missing qtyStep"))?;
        let qty_step = parse_decimal(operation, "qtyStep", &qty_step)?;

        Ok(InstrumentConstraints::from_steps(tick_size, qty_step))
    }

    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<OrderReceipt> {
        let mut body = Map::new();
        body.insert("category".into(), json!(order.category.as_str()));
        body.insert("symbol".into(), json!(order.symbol));
        body.insert("side".into(), json!(order.side.order_side()));
        body.insert("orderType".into(), json!("Market"));
        body.insert("qty".into(), json!(order.quantity.to_string()));
        body.insert("orderLinkId".into(), json!(order.order_link_id));
        if order.category == Category::Spot {
            body.insert("marketUnit".into(), json!("baseCoin"));
        }
        if order.reduce_only {
            body.insert("reduceOnly".into(), json!(true));
        }
        if let Some(tp) = order.take_profit {
            body.insert("takeProfit".into(), json!(tp.to_string()));
        }
        if let Some(sl) = order.stop_loss {
            body.insert("stopLoss".into(), json!(sl.to_string()));
        }

        let result: OrderCreateResult = self
            .signed_post(ExchangeOperation::PlaceOrder, "/v5/order/create", &Value::Object(body))
            .await?;

        info!(
            symbol = %order.symbol,
            side = order.side.order_side(),
            qty = %order.quantity,
            order_id = %result.order_id,
            "Market order accepted"
        );

        let order_link_id = if result.order_link_id.is_empty() {
            order.order_link_id.clone()
        } else {
            result.order_link_id
        };
        Ok(OrderReceipt {
            order_id: result.order_id,
            order_link_id,
        })
    }

    async fn get_open_positions(
        &self,
        category: Option<Category>,
        symbol: Option<&str>,
    ) -> ExchangeResult<PositionMap> {
        let category = category.unwrap_or_default();
        let mut params = vec![("category", category.as_str().to_string())];
        match symbol {
            Some(symbol) => params.push(("symbol", symbol.to_string())),
            None if category == Category::Linear => {
                params.push(("settleCoin", SETTLE_COIN.to_string()))
            }
            None => {}
        }
        params.push(("limit", "200".to_string()));

        let result: ListResult<PositionEntry> = self
            .signed_get(ExchangeOperation::GetPositions, "/v5/position/list", &params)
            .await?;

        // 원웨이 모드에서는 심볼당 포지션이 하나뿐입니다.
        let mut positions = PositionMap::new();
        for entry in result.list {
            if let Some(position) = entry.into_position(category)? {
                let symbol = position.symbol.clone();
                if positions.insert(symbol.clone(), position).is_some() {
                    return Err(ExchangeError::malformed(
                        ExchangeOperation::GetPositions,
                        format!("{} 포지션이 여러 개입니다 (헤지 모드 계좌)", symbol),
                    ));
                }
            }
        }
        Ok(positions)
    }

    async fn set_leverage(
        &self,
        category: Category,
        symbol: &str,
        leverage: u32,
    ) -> ExchangeResult<()> {
        let body = json!({
            "category": category.as_str(),
            "symbol": symbol,
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });

        let _: Value = self
            .signed_post(ExchangeOperation::SetLeverage, "/v5/position/set-leverage", &body)
            .await?;
        Ok(())
    }

    async fn adjust_tp_sl(
        &self,
        category: Category,
        symbol: &str,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> ExchangeResult<()> {
        let mut body = Map::new();
        body.insert("category".into(), json!(category.as_str()));
        body.insert("symbol".into(), json!(symbol));
        body.insert("positionIdx".into(), json!(0));
        body.insert("tpslMode".into(), json!("Full"));
        if let Some(tp) = take_profit {
            body.insert("takeProfit".into(), json!(tp.to_string()));
            body.insert("tpTriggerBy".into(), json!("LastPrice"));
        }
        if let Some(sl) = stop_loss {
            body.insert("stopLoss".into(), json!(sl.to_string()));
            body.insert("slTriggerBy".into(), json!("LastPrice"));
        }

        let _: Value = self
            .signed_post(
                ExchangeOperation::SetTradingStop,
                "/v5/position/trading-stop",
                &Value::Object(body),
            )
            .await?;
        Ok(())
    }

    async fn switch_position_mode(
        &self,
        category: Category,
        mode: PositionMode,
    ) -> ExchangeResult<()> {
        let body = json!({
            "category": category.as_str(),
            "coin": SETTLE_COIN,
            "mode": mode.code(),
        });

        let _: Value = self
            .signed_post(
                ExchangeOperation::SwitchPositionMode,
                "/v5/position/switch-mode",
                &body,
            )
            .await?;
        Ok(())
    }
}

// ============================================================================
// 팩토리
// ============================================================================

/// 계좌별 Bybit 클라이언트 생성기.
///
/// HTTP 커넥션 풀만 공유하고 자격증명은 클라이언트마다 따로 보관합니다.
pub struct BybitClientFactory {
    http: Client,
    settings: ExchangeConfig,
}

impl BybitClientFactory {
    pub fn new(settings: ExchangeConfig) -> ExchangeResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| {
                ExchangeError::new(
                    ExchangeOperation::Connect,
                    ExchangeFault::Network(format!("HTTP 클라이언트 생성 실패: {}", e)),
                )
            })?;

        Ok(Self { http, settings })
    }
}

impl ExchangeClientFactory for BybitClientFactory {
    fn create(&self, account: &Account) -> ExchangeResult<Box<dyn ExchangeClient>> {
        if account.api_key.trim().is_empty() || account.api_secret.trim().is_empty() {
            return Err(ExchangeError::new(
                ExchangeOperation::Connect,
                ExchangeFault::Unauthorized(format!("계좌 {}의 자격증명이 비어 있습니다", account.id)),
            ));
        }

        let config = BybitConfig::from_account(account, &self.settings);
        Ok(Box::new(BybitClient::with_http_client(config, self.http.clone())))
    }
}
