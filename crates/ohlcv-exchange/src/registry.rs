//! 어댑터 레지스트리.
//!
//! `(거래소, 자산 유형)` 키로 `MarketAdapter`를 보관합니다. `main`에서 한 번 만들어
//! `Arc`로 러너에 전달합니다. 같은 거래소의 클라이언트들은 `RateGate` 하나를 공유합니다.

use crate::adapter::{CandleMarket, MarketAdapter, SymbolStyle};
use crate::connector::{
    BinanceClient, BinanceConfig, BitfinexClient, BitfinexConfig, BINANCE_RATE_LIMIT,
    BITFINEX_RATE_LIMIT,
};
use crate::gate::RateGate;
use crate::traits::ExchangeResult;
use crate::ExchangeError;
use ohlcv_core::{AssetClass, TickerId};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 거래소 설정 (`exchange.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSettings {
    /// 거래소 이름
    pub name: String,
    /// 활성화 여부
    #[serde(default = "default_enable")]
    pub enable: bool,
    /// 요청 간격 (밀리초)
    #[serde(default)]
    pub rate_limit_ms: Option<u64>,
    /// 요청 타임아웃 (초)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// REST 기본 URL 재정의
    #[serde(default)]
    pub base_url: Option<String>,
    /// 선물 REST 기본 URL 재정의
    #[serde(default)]
    pub futures_base_url: Option<String>,
    /// 지원 통화쌍 재정의 (`BTC/USDT` 형식)
    #[serde(default)]
    pub pairs: Option<Vec<String>>,
}

fn default_enable() -> bool {
    true
}

impl ExchangeSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enable: true,
            rate_limit_ms: None,
            timeout_secs: None,
            base_url: None,
            futures_base_url: None,
            pairs: None,
        }
    }

    fn rate_limit(&self, default: Duration) -> Duration {
        self.rate_limit_ms.map_or(default, Duration::from_millis)
    }

    fn parsed_pairs(&self) -> ExchangeResult<Option<Vec<(String, String)>>> {
        let Some(pairs) = &self.pairs else {
            return Ok(None);
        };
        pairs
            .iter()
            .map(|p| match p.split_once('/') {
                Some((b, q)) if !b.is_empty() && !q.is_empty() => {
                    Ok((b.to_uppercase(), q.to_uppercase()))
                }
                _ => Err(ExchangeError::ParseError(format!("잘못된 통화쌍: {}", p))),
            })
            .collect::<ExchangeResult<Vec<_>>>()
            .map(Some)
    }
}

type AdapterKey = (String, AssetClass);

/// 어댑터 레지스트리.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<AdapterKey, Arc<dyn MarketAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정 목록으로 레지스트리를 구성합니다. 비활성 거래소는 건너뜁니다.
    ///
    /// # Errors
    /// 알 수 없는 거래소 이름이면 `ExchangeError::NotSupported`.
    pub fn from_settings(settings: &[ExchangeSettings]) -> ExchangeResult<Self> {
        let mut registry = Self::new();
        for exchange in settings {
            if !exchange.enable {
                info!(exchange = %exchange.name, "비활성 거래소, 건너뜀");
                continue;
            }
            registry.register_exchange(exchange)?;
        }
        Ok(registry)
    }

    fn register_exchange(&mut self, settings: &ExchangeSettings) -> ExchangeResult<()> {
        let pairs = settings.parsed_pairs()?;
        let apply_pairs = |market: CandleMarket| match &pairs {
            Some(pairs) => market.with_pairs(pairs.iter().map(|(b, q)| (b.clone(), q.clone()))),
            None => market,
        };

        match settings.name.to_lowercase().as_str() {
            "binance" => {
                let gate = Arc::new(RateGate::new(
                    "binance",
                    settings.rate_limit(BINANCE_RATE_LIMIT),
                ));

                let mut spot = BinanceConfig::spot();
                let mut futures = BinanceConfig::usd_m();
                if let Some(url) = &settings.base_url {
                    spot = spot.with_base_url(url.clone());
                }
                if let Some(url) = &settings.futures_base_url {
                    futures = futures.with_base_url(url.clone());
                }
                if let Some(secs) = settings.timeout_secs {
                    spot = spot.with_timeout_secs(secs);
                    futures = futures.with_timeout_secs(secs);
                }

                let spot = BinanceClient::new(spot, Arc::clone(&gate))?;
                let futures = BinanceClient::new(futures, gate)?;
                self.register(apply_pairs(CandleMarket::new(
                    "binance",
                    AssetClass::Spot,
                    Arc::new(spot),
                )));
                self.register(apply_pairs(CandleMarket::new(
                    "binance",
                    AssetClass::Perpetual,
                    Arc::new(futures),
                )));
            }
            "bitfinex" => {
                let gate = Arc::new(RateGate::new(
                    "bitfinex",
                    settings.rate_limit(BITFINEX_RATE_LIMIT),
                ));
                let mut config = BitfinexConfig::default();
                if let Some(url) = &settings.base_url {
                    config = config.with_base_url(url.clone());
                }
                if let Some(secs) = settings.timeout_secs {
                    config = config.with_timeout_secs(secs);
                }
                let client = BitfinexClient::new(config, gate)?;
                self.register(apply_pairs(
                    CandleMarket::new("bitfinex", AssetClass::Spot, Arc::new(client))
                        .with_symbol_style(SymbolStyle::Bitfinex),
                ));
            }
            other => {
                return Err(ExchangeError::NotSupported(format!(
                    "지원하지 않는 거래소: {}",
                    other
                )));
            }
        }
        Ok(())
    }

    /// 어댑터를 등록합니다. 같은 키가 있으면 교체합니다.
    pub fn register(&mut self, adapter: impl MarketAdapter + 'static) {
        self.register_arc(Arc::new(adapter));
    }

    pub fn register_arc(&mut self, adapter: Arc<dyn MarketAdapter>) {
        let key = (adapter.exchange().to_lowercase(), adapter.asset_class());
        debug!(exchange = %key.0, asset_class = %key.1, "어댑터 등록");
        self.adapters.insert(key, adapter);
    }

    pub fn get(&self, exchange: &str, asset_class: AssetClass) -> Option<Arc<dyn MarketAdapter>> {
        self.adapters
            .get(&(exchange.to_lowercase(), asset_class))
            .cloned()
    }

    /// 티커에 맞는 어댑터를 찾고 통화쌍 지원 여부를 확인합니다.
    ///
    /// # Errors
    /// 조합이 없거나 통화쌍을 지원하지 않으면 `ExchangeError::NotSupported`.
    pub fn resolve(&self, ticker: &TickerId) -> ExchangeResult<Arc<dyn MarketAdapter>> {
        let adapter = self.get(&ticker.exchange, ticker.asset_class).ok_or_else(|| {
            ExchangeError::NotSupported(format!(
                "{} {} 조합을 지원하지 않습니다",
                ticker.exchange, ticker.asset_class
            ))
        })?;
        if !adapter.supports_pair(&ticker.base, &ticker.quote) {
            return Err(ExchangeError::NotSupported(format!(
                "{} {}에서 {} 통화쌍을 지원하지 않습니다",
                ticker.exchange,
                ticker.asset_class,
                ticker.pair()
            )));
        }
        Ok(adapter)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MarketAdapter>> {
        self.adapters.values()
    }

    /// 등록된 거래소 이름 (중복 제거, 정렬).
    pub fn exchanges(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().map(|(name, _)| name.clone()).collect();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ohlcv_core::Timeframe;

    #[test]
    fn test_from_settings() {
        let mut bitfinex = ExchangeSettings::new("bitfinex");
        bitfinex.pairs = Some(vec!["BTC/USDT".into()]);
        let mut disabled = ExchangeSettings::new("binance");
        disabled.enable = false;

        let registry = AdapterRegistry::from_settings(&[bitfinex, disabled]).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.exchanges(), vec!["bitfinex".to_string()]);
        assert!(registry.get("bitfinex", AssetClass::Perpetual).is_none());

        let ok = TickerId::new("bitfinex", "BTC", "USDT", AssetClass::Spot, Timeframe::Hour);
        assert!(registry.resolve(&ok).is_ok());
        let eth = TickerId::new("bitfinex", "ETH", "USDT", AssetClass::Spot, Timeframe::Hour);
        assert!(matches!(
            registry.resolve(&eth),
            Err(ExchangeError::NotSupported(_))
        ));
    }

    #[test]
    fn test_binance_registers_both_markets() {
        let registry =
            AdapterRegistry::from_settings(&[ExchangeSettings::new("Binance")]).unwrap();
        assert_eq!(registry.len(), 2);
        let perp = registry.get("binance", AssetClass::Perpetual).unwrap();
        assert_eq!(perp.format_symbol("eth", "usdt"), "ETHUSDT");
    }

    #[test]
    fn test_unknown_exchange() {
        assert!(matches!(
            AdapterRegistry::from_settings(&[ExchangeSettings::new("kraken")]),
            Err(ExchangeError::NotSupported(_))
        ));
    }

    #[test]
    fn test_settings_deserialize() {
        let settings: ExchangeSettings =
            serde_json::from_str(r#"{"name": "binance", "rate_limit_ms": 250}"#).unwrap();
        assert!(settings.enable);
        assert_eq!(
            settings.rate_limit(BINANCE_RATE_LIMIT),
            Duration::from_millis(250)
        );
    }
}
