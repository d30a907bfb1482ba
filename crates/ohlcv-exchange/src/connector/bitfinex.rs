//! Bitfinex 거래소 커넥터.
//!
//! 공개 v2 캔들 API(`/v2/candles/trade:{tf}:{symbol}/hist`) 구현.
//! 응답 행은 `[MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]` 순서입니다.

use crate::gate::RateGate;
use crate::traits::{CandleFetcher, ExchangeResult};
use crate::ExchangeError;
use async_trait::async_trait;
use chrono::DateTime;
use ohlcv_core::{Candle, Timeframe};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Number, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Bitfinex 기본 요청 간격.
pub const BITFINEX_RATE_LIMIT: Duration = Duration::from_millis(2000);

/// 요청 한도 초과 에러 코드.
const ERR_RATE_LIMIT_CODE: i64 = 11010;

/// 캔들 요청당 최대 행 수.
const MAX_CANDLES_PER_REQUEST: u32 = 10_000;

/// Bitfinex 클라이언트 설정.
#[derive(Debug, Clone)]
pub struct BitfinexConfig {
    /// REST API 기본 URL 재정의 (테스트용)
    pub base_url: Option<String>,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for BitfinexConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
        }
    }
}

impl BitfinexConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn rest_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or("https://api-pub.bitfinex.com")
    }
}

#[derive(Debug, Deserialize)]
struct BitfinexCandle(
    i64,    // 0: MTS
    Number, // 1: Open
    Number, // 2: Close
    Number, // 3: High
    Number, // 4: Low
    Number, // 5: Volume
);

/// Bitfinex 캔들 조회 클라이언트.
pub struct BitfinexClient {
    config: BitfinexConfig,
    client: Client,
    gate: Arc<RateGate>,
}

impl BitfinexClient {
    /// 새 Bitfinex 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::NetworkError`를 반환합니다.
    pub fn new(config: BitfinexConfig, gate: Arc<RateGate>) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ExchangeError::NetworkError(format!("HTTP 클라이언트 생성 실패: {}", e))
            })?;
        Ok(Self {
            config,
            client,
            gate,
        })
    }

    /// 거래소 심볼 형식.
    ///
    /// `USDT`는 `UST`로 표기하고, 어느 한쪽이 3글자를 넘으면 콜론으로 구분합니다.
    /// 예: `tBTCUST`, `tMATIC:UST`
    pub fn format_symbol(base: &str, quote: &str) -> String {
        let norm = |s: &str| match s.to_uppercase().as_str() {
            "USDT" => "UST".to_string(),
            other => other.to_string(),
        };
        let (base, quote) = (norm(base), norm(quote));
        if base.len() > 3 || quote.len() > 3 {
            format!("t{}:{}", base, quote)
        } else {
            format!("t{}{}", base, quote)
        }
    }

    fn timeframe_code(tf: Timeframe) -> &'static str {
        match tf {
            Timeframe::Minute => "1m",
            Timeframe::Hour => "1h",
            Timeframe::Day => "1D",
        }
    }

    async fn public_get(&self, path: &str) -> ExchangeResult<Value> {
        let url = format!("{}{}", self.config.rest_base_url(), path);

        self.gate.throttle().await;
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExchangeError::RateLimited);
        }

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) if status.is_server_error() => {
                return Err(ExchangeError::ExchangeUnavailable(format!(
                    "HTTP {}",
                    status.as_u16()
                )));
            }
            Err(e) => {
                error!("Failed to parse response: {} - Body: {}", e, body);
                return Err(ExchangeError::ParseError(e.to_string()));
            }
        };

        if let Some(err) = Self::map_error_payload(&value) {
            return Err(err);
        }
        if status.is_server_error() {
            return Err(ExchangeError::ExchangeUnavailable(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: body,
            });
        }
        Ok(value)
    }

    /// `["error", code, msg]` 또는 `{"error": "..."}` 형태의 에러를 매핑합니다.
    fn map_error_payload(value: &Value) -> Option<ExchangeError> {
        if let Some(items) = value.as_array() {
            if items.first().and_then(Value::as_str) != Some("error") {
                return None;
            }
            let code = items.get(1).and_then(Value::as_i64).unwrap_or_default();
            let msg = items
                .get(2)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Some(if code == ERR_RATE_LIMIT_CODE || msg.contains("ratelimit") {
                ExchangeError::RateLimited
            } else if msg.contains("symbol") {
                ExchangeError::SymbolNotFound(msg)
            } else {
                ExchangeError::ApiError {
                    code: code as i32,
                    message: msg,
                }
            });
        }

        let msg = value.get("error").and_then(Value::as_str)?;
        Some(if msg == "ERR_RATE_LIMIT" {
            ExchangeError::RateLimited
        } else {
            ExchangeError::Unknown(msg.to_string())
        })
    }

    fn parse_number(n: &Number) -> ExchangeResult<Decimal> {
        let s = n.to_string();
        Decimal::from_str(&s)
            .or_else(|_| Decimal::from_scientific(&s))
            .map_err(|e| ExchangeError::ParseError(format!("{}: {}", s, e)))
    }

    fn to_candle(c: BitfinexCandle) -> ExchangeResult<Candle> {
        let open_time = DateTime::from_timestamp_millis(c.0)
            .ok_or_else(|| ExchangeError::ParseError(format!("잘못된 시각: {}", c.0)))?;
        Ok(Candle::new(
            open_time,
            Self::parse_number(&c.1)?,
            Self::parse_number(&c.3)?,
            Self::parse_number(&c.4)?,
            Self::parse_number(&c.2)?,
            Self::parse_number(&c.5)?,
        ))
    }
}

#[async_trait]
impl CandleFetcher for BitfinexClient {
    fn name(&self) -> &str {
        "bitfinex"
    }

    fn max_limit(&self) -> u32 {
        MAX_CANDLES_PER_REQUEST
    }

    async fn test_connection(&self) -> ExchangeResult<()> {
        let value = self.public_get("/v2/platform/status").await?;
        match value.get(0).and_then(Value::as_i64) {
            Some(1) => Ok(()),
            _ => Err(ExchangeError::ExchangeUnavailable(format!(
                "platform status: {}",
                value
            ))),
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>> {
        let path = format!(
            "/v2/candles/trade:{}:{}/hist?start={}&limit={}&sort=1",
            Self::timeframe_code(timeframe),
            symbol,
            since_ms,
            limit.min(MAX_CANDLES_PER_REQUEST)
        );
        let value = self.public_get(&path).await?;
        let rows: Vec<BitfinexCandle> = serde_json::from_value(value)?;
        rows.into_iter().map(Self::to_candle).collect()
    }
}
