//! 티커 식별자와 자산 유형 정의.
//!
//! - `AssetClass` - 현물 / 무기한 선물
//! - `TickerId` - 하나의 동기화 시계열과 그 저장 위치를 식별

use crate::error::CoreError;
use crate::types::Timeframe;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 자산 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    /// 현물
    Spot,
    /// 무기한 선물
    #[serde(alias = "futureperp", alias = "perp")]
    Perpetual,
}

impl AssetClass {
    pub const ALL: [AssetClass; 2] = [AssetClass::Spot, AssetClass::Perpetual];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Spot => "spot",
            AssetClass::Perpetual => "perpetual",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spot" => Ok(AssetClass::Spot),
            "perpetual" | "futureperp" | "perp" => Ok(AssetClass::Perpetual),
            _ => Err(CoreError::InvalidInput(format!("알 수 없는 자산 유형: {}", s))),
        }
    }
}

/// 동기화 시계열 식별자.
///
/// (거래소, 기준 코인, 호가 코인, 자산 유형, 타임프레임)으로 구성되며
/// 저장 테이블 이름을 결정합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TickerId {
    /// 거래소 이름 (소문자)
    pub exchange: String,
    /// 기준 코인 (예: BTC)
    pub base: String,
    /// 호가 코인 (예: USDT)
    pub quote: String,
    /// 자산 유형
    pub asset_class: AssetClass,
    /// 타임프레임
    pub timeframe: Timeframe,
}

impl TickerId {
    /// 새 티커 식별자를 생성합니다.
    pub fn new(
        exchange: impl Into<String>,
        base: impl Into<String>,
        quote: impl Into<String>,
        asset_class: AssetClass,
        timeframe: Timeframe,
    ) -> Self {
        Self {
            exchange: exchange.into().to_lowercase(),
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
            asset_class,
            timeframe,
        }
    }

    /// 저장 키 (예: `binance_spot_BTC_USDT_1h`).
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.exchange, self.asset_class, self.base, self.quote, self.timeframe
        )
    }

    /// 통화쌍 표기 (예: `BTC/USDT`).
    pub fn pair(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl fmt::Display for TickerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.exchange,
            self.asset_class,
            self.pair(),
            self.timeframe
        )
    }
}

impl FromStr for TickerId {
    type Err = CoreError;

    /// `exchange_asset_BASE_QUOTE_tf` 형식의 키를 파싱합니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        let [exchange, asset, base, quote, tf] = parts.as_slice() else {
            return Err(CoreError::InvalidInput(format!("잘못된 티커 키: {}", s)));
        };
        Ok(Self::new(
            *exchange,
            *base,
            *quote,
            asset.parse()?,
            tf.parse()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_key_roundtrip() {
        let id = TickerId::new("Binance", "btc", "usdt", AssetClass::Spot, Timeframe::Hour);
        assert_eq!(id.key(), "binance_spot_BTC_USDT_1h");
        assert_eq!(id.key().parse::<TickerId>().unwrap(), id);
        assert_eq!(id.pair(), "BTC/USDT");
    }

    #[test]
    fn test_ticker_key_legacy_asset_name() {
        let id: TickerId = "binance_futureperp_ETH_USDT_1d".parse().unwrap();
        assert_eq!(id.asset_class, AssetClass::Perpetual);
        assert_eq!(id.timeframe, Timeframe::Day);
    }

    #[test]
    fn test_ticker_key_invalid() {
        assert!("binance_spot_BTC".parse::<TickerId>().is_err());
        assert!(matches!(
            "binance_spot_BTC_USDT_5m".parse::<TickerId>(),
            Err(CoreError::UnsupportedTimeframe(_))
        ));
    }

    #[test]
    fn test_asset_class_serde_alias() {
        let parsed: AssetClass = serde_json::from_str("\"futureperp\"").unwrap();
        assert_eq!(parsed, AssetClass::Perpetual);
    }
}
