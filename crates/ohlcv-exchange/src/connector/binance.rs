//! Binance 거래소 커넥터.
//!
//! 현물(`/api/v3/klines`)과 USDⓈ-M 무기한 선물(`/fapi/v1/klines`)의 공개 캔들
//! REST API 구현. 인증이 필요 없는 엔드포인트만 사용합니다.

use crate::gate::RateGate;
use crate::traits::{CandleFetcher, ExchangeResult};
use crate::ExchangeError;
use async_trait::async_trait;
use chrono::DateTime;
use ohlcv_core::{Candle, Timeframe};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Binance 기본 요청 간격.
pub const BINANCE_RATE_LIMIT: Duration = Duration::from_millis(500);

// ============================================================================
// 설정
// ============================================================================

/// Binance 시장 구분.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinanceMarket {
    /// 현물
    Spot,
    /// USDⓈ-M 무기한 선물
    UsdM,
}

impl BinanceMarket {
    fn default_base_url(&self) -> &'static str {
        match self {
            BinanceMarket::Spot => "https://api.binance.com",
            BinanceMarket::UsdM => "https://fapi.binance.com",
        }
    }

    /// 캔들 요청당 최대 행 수.
    pub fn max_limit(&self) -> u32 {
        match self {
            BinanceMarket::Spot => 1000,
            BinanceMarket::UsdM => 1500,
        }
    }

    fn klines_endpoint(&self) -> &'static str {
        match self {
            BinanceMarket::Spot => "/api/v3/klines",
            BinanceMarket::UsdM => "/fapi/v1/klines",
        }
    }
}

/// Binance 클라이언트 설정.
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    /// 시장 구분
    pub market: BinanceMarket,
    /// REST API 기본 URL 재정의 (테스트용)
    pub base_url: Option<String>,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl BinanceConfig {
    /// 새 설정 생성.
    pub fn new(market: BinanceMarket) -> Self {
        Self {
            market,
            base_url: None,
            timeout_secs: 30,
        }
    }

    pub fn spot() -> Self {
        Self::new(BinanceMarket::Spot)
    }

    pub fn usd_m() -> Self {
        Self::new(BinanceMarket::UsdM)
    }

    /// 기본 URL 재정의.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.market.default_base_url())
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct BinanceKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    i64,    // 8: Number of trades
    String, // 9: Taker buy base asset volume
    String, // 10: Taker buy quote asset volume
    String, // 11: Ignore
);

#[derive(Debug, Deserialize)]
struct BinanceSystemStatus {
    status: i32,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i32,
    msg: String,
}

// ============================================================================
// Binance 클라이언트
// ============================================================================

/// Binance 캔들 조회 클라이언트.
pub struct BinanceClient {
    config: BinanceConfig,
    client: Client,
    gate: Arc<RateGate>,
    name: String,
}

impl BinanceClient {
    /// 새 Binance 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::NetworkError`를 반환합니다.
    pub fn new(config: BinanceConfig, gate: Arc<RateGate>) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ExchangeError::NetworkError(format!("HTTP 클라이언트 생성 실패: {}", e))
            })?;

        let name = match config.market {
            BinanceMarket::Spot => "binance",
            BinanceMarket::UsdM => "binance-usdm",
        }
        .to_string();

        Ok(Self {
            config,
            client,
            gate,
            name,
        })
    }

    pub fn market(&self) -> BinanceMarket {
        self.config.market
    }

    /// 거래소 심볼 형식 (예: `BTCUSDT`).
    pub fn format_symbol(base: &str, quote: &str) -> String {
        format!("{}{}", base.to_uppercase(), quote.to_uppercase())
    }

    /// 파라미터에서 쿼리 문자열 생성.
    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 공개 API 요청 (인증 불필요).
    async fn public_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.rest_base_url(), endpoint);
        let query = Self::build_query(params);

        let full_url = if query.is_empty() {
            url
        } else {
            format!("{}?{}", url, query)
        };

        self.gate.throttle().await;
        debug!("GET {}", full_url);

        let response = self.client.get(&full_url).send().await?;

        self.handle_response(response).await
    }

    /// API 응답 처리.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                error!("Failed to parse response: {} - Body: {}", e, body);
                ExchangeError::ParseError(e.to_string())
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            return Err(ExchangeError::RateLimited);
        }

        // 에러 응답 파싱 시도
        if let Ok(error) = serde_json::from_str::<BinanceError>(&body) {
            return Err(Self::map_error_code(error.code, &error.msg));
        }

        if status.is_server_error() {
            Err(ExchangeError::ExchangeUnavailable(format!("HTTP {}", status.as_u16())))
        } else {
            Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: body,
            })
        }
    }

    /// Binance 에러 코드를 ExchangeError로 매핑.
    fn map_error_code(code: i32, msg: &str) -> ExchangeError {
        match code {
            -1000 => ExchangeError::Unknown(msg.to_string()),
            -1001 => ExchangeError::Disconnected(msg.to_string()),
            -1003 => ExchangeError::RateLimited,
            -1121 => ExchangeError::SymbolNotFound(msg.to_string()),
            _ => ExchangeError::ApiError {
                code,
                message: msg.to_string(),
            },
        }
    }

    fn parse_decimal(s: &str) -> ExchangeResult<Decimal> {
        Decimal::from_str(s).map_err(|e| ExchangeError::ParseError(format!("{}: {}", s, e)))
    }

    fn to_candle(k: BinanceKline) -> ExchangeResult<Candle> {
        let open_time = DateTime::from_timestamp_millis(k.0)
            .ok_or_else(|| ExchangeError::ParseError(format!("잘못된 시각: {}", k.0)))?;
        Ok(Candle::new(
            open_time,
            Self::parse_decimal(&k.1)?,
            Self::parse_decimal(&k.2)?,
            Self::parse_decimal(&k.3)?,
            Self::parse_decimal(&k.4)?,
            Self::parse_decimal(&k.5)?,
        ))
    }
}

#[async_trait]
impl CandleFetcher for BinanceClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_limit(&self) -> u32 {
        self.config.market.max_limit()
    }

    async fn test_connection(&self) -> ExchangeResult<()> {
        match self.config.market {
            BinanceMarket::Spot => {
                let status: BinanceSystemStatus =
                    self.public_get("/sapi/v1/system/status", &[]).await?;
                if status.status == 0 {
                    Ok(())
                } else {
                    Err(ExchangeError::ExchangeUnavailable(status.msg))
                }
            }
            BinanceMarket::UsdM => {
                let _: serde_json::Value = self.public_get("/fapi/v1/ping", &[]).await?;
                Ok(())
            }
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>> {
        let resp: Vec<BinanceKline> = self
            .public_get(
                self.config.market.klines_endpoint(),
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.code().to_string()),
                    ("startTime", since_ms.to_string()),
                    ("limit", limit.min(self.max_limit()).to_string()),
                ],
            )
            .await?;

        resp.into_iter().map(Self::to_candle).collect()
    }
}
