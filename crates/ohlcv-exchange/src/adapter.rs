//! 거래소별 시장 어댑터.
//!
//! 동기화 엔진은 거래소 종류를 직접 알지 않고 `(거래소, 자산 유형)` 조합으로
//! 찾은 `MarketAdapter`를 통해 심볼 변환, 다운로더 생성, 최초 시각 탐색을 수행합니다.

use crate::connector::{BinanceClient, BitfinexClient};
use crate::discovery::{self, DiscoveryError};
use crate::downloader::{ResilientDownloader, RetryPolicy};
use crate::traits::CandleFetcher;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_core::{AssetClass, Clock, SyncSettings, TickerId};
use std::fmt;
use std::sync::Arc;

/// 기본 지원 통화쌍.
pub const DEFAULT_PAIRS: [(&str, &str); 2] = [("BTC", "USDT"), ("ETH", "USDT")];

/// 시장 어댑터 능력.
#[async_trait]
pub trait MarketAdapter: Send + Sync {
    /// 거래소 이름 (소문자).
    fn exchange(&self) -> &str;

    fn asset_class(&self) -> AssetClass;

    /// 기준/호가 코인을 거래소 심볼로 변환합니다.
    fn format_symbol(&self, base: &str, quote: &str) -> String;

    /// 지원하는 통화쌍 목록.
    fn supported_pairs(&self) -> &[(String, String)];

    /// 원격 조회자.
    fn fetcher(&self) -> Arc<dyn CandleFetcher>;

    fn supports_pair(&self, base: &str, quote: &str) -> bool {
        self.supported_pairs()
            .iter()
            .any(|(b, q)| b.eq_ignore_ascii_case(base) && q.eq_ignore_ascii_case(quote))
    }

    /// 티커 하나를 위한 다운로더를 만듭니다.
    fn downloader(
        &self,
        ticker: &TickerId,
        clock: Arc<dyn Clock>,
        settings: &SyncSettings,
    ) -> ResilientDownloader {
        ResilientDownloader::new(
            self.fetcher(),
            clock,
            self.format_symbol(&ticker.base, &ticker.quote),
            ticker.timeframe,
            settings.rows_per_window,
        )
        .with_policy(RetryPolicy::from(settings))
    }

    /// 티커의 최초 제공 시각을 탐색합니다.
    async fn resolve_first_available(
        &self,
        ticker: &TickerId,
        clock: &dyn Clock,
    ) -> Result<DateTime<Utc>, DiscoveryError> {
        let symbol = self.format_symbol(&ticker.base, &ticker.quote);
        let fetcher = self.fetcher();
        discovery::resolve_first_available(fetcher.as_ref(), &symbol, ticker.timeframe, clock)
            .await
    }
}

/// 거래소 심볼 표기 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolStyle {
    /// `BTCUSDT`
    Concatenated,
    /// `tBTCUST`
    Bitfinex,
}

impl SymbolStyle {
    pub fn format(&self, base: &str, quote: &str) -> String {
        match self {
            SymbolStyle::Concatenated => BinanceClient::format_symbol(base, quote),
            SymbolStyle::Bitfinex => BitfinexClient::format_symbol(base, quote),
        }
    }
}

/// 조회자 하나를 감싼 기본 어댑터 구현.
#[derive(Clone)]
pub struct CandleMarket {
    exchange: String,
    asset_class: AssetClass,
    style: SymbolStyle,
    pairs: Vec<(String, String)>,
    fetcher: Arc<dyn CandleFetcher>,
}

impl CandleMarket {
    pub fn new(
        exchange: impl Into<String>,
        asset_class: AssetClass,
        fetcher: Arc<dyn CandleFetcher>,
    ) -> Self {
        Self {
            exchange: exchange.into().to_lowercase(),
            asset_class,
            style: SymbolStyle::Concatenated,
            pairs: DEFAULT_PAIRS
                .iter()
                .map(|(b, q)| (b.to_string(), q.to_string()))
                .collect(),
            fetcher,
        }
    }

    pub fn with_symbol_style(mut self, style: SymbolStyle) -> Self {
        self.style = style;
        self
    }

    /// 지원 통화쌍을 교체합니다.
    pub fn with_pairs<I, S>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        self.pairs = pairs
            .into_iter()
            .map(|(b, q)| (b.into().to_uppercase(), q.into().to_uppercase()))
            .collect();
        self
    }
}

impl fmt::Debug for CandleMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandleMarket")
            .field("exchange", &self.exchange)
            .field("asset_class", &self.asset_class)
            .field("style", &self.style)
            .field("pairs", &self.pairs)
            .field("fetcher", &self.fetcher.name())
            .finish()
    }
}

#[async_trait]
impl MarketAdapter for CandleMarket {
    fn exchange(&self) -> &str {
        &self.exchange
    }

    fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    fn format_symbol(&self, base: &str, quote: &str) -> String {
        self.style.format(base, quote)
    }

    fn supported_pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    fn fetcher(&self) -> Arc<dyn CandleFetcher> {
        Arc::clone(&self.fetcher)
    }
}
