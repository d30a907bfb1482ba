//! 캔들 동기화를 위한 타임프레임 정의.
//!
//! 동기화 엔진은 분봉, 시간봉, 일봉 세 가지 기본 단위만 지원합니다.
//! 하나의 시계열은 정확히 하나의 타임프레임을 가집니다.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 캔들스틱 타임프레임.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1분봉
    #[serde(rename = "1m")]
    Minute,
    /// 1시간봉
    #[serde(rename = "1h")]
    Hour,
    /// 일봉
    #[serde(rename = "1d")]
    Day,
}

impl Timeframe {
    /// 지원하는 모든 타임프레임 (세밀한 단위 → 큰 단위).
    pub const ALL: [Timeframe; 3] = [Timeframe::Minute, Timeframe::Hour, Timeframe::Day];

    /// 한 스텝의 길이를 반환합니다.
    pub fn step(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.as_secs())
    }

    /// 한 스텝의 초 단위 값을 반환합니다.
    pub fn as_secs(&self) -> i64 {
        match self {
            Timeframe::Minute => 60,
            Timeframe::Hour => 60 * 60,
            Timeframe::Day => 24 * 60 * 60,
        }
    }

    /// 한 스텝의 밀리초 단위 값을 반환합니다.
    pub fn as_millis(&self) -> i64 {
        self.as_secs() * 1000
    }

    /// 표준 간격 코드 (`1m`, `1h`, `1d`).
    pub fn code(&self) -> &'static str {
        match self {
            Timeframe::Minute => "1m",
            Timeframe::Hour => "1h",
            Timeframe::Day => "1d",
        }
    }

    /// 간격 코드에서 파싱합니다. `1D` 표기도 허용합니다.
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Timeframe::Minute),
            "1h" => Some(Timeframe::Hour),
            "1d" | "1D" => Some(Timeframe::Day),
            _ => None,
        }
    }

    /// 다음으로 세밀한 타임프레임 (일 → 시 → 분).
    pub fn finer(&self) -> Option<Self> {
        match self {
            Timeframe::Day => Some(Timeframe::Hour),
            Timeframe::Hour => Some(Timeframe::Minute),
            Timeframe::Minute => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| CoreError::UnsupportedTimeframe(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_step() {
        assert_eq!(Timeframe::Minute.as_secs(), 60);
        assert_eq!(Timeframe::Hour.as_secs(), 3600);
        assert_eq!(Timeframe::Day.as_secs(), 86400);
        assert_eq!(Timeframe::Hour.as_millis(), 3_600_000);
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("1m".parse::<Timeframe>().unwrap(), Timeframe::Minute);
        assert_eq!("1D".parse::<Timeframe>().unwrap(), Timeframe::Day);
        assert!(matches!(
            "4h".parse::<Timeframe>(),
            Err(CoreError::UnsupportedTimeframe(_))
        ));
    }

    #[test]
    fn test_timeframe_serde() {
        let json = serde_json::to_string(&Timeframe::Hour).unwrap();
        assert_eq!(json, "\"1h\"");
        let parsed: Timeframe = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(parsed, Timeframe::Day);
    }

    #[test]
    fn test_timeframe_finer() {
        assert_eq!(Timeframe::Day.finer(), Some(Timeframe::Hour));
        assert_eq!(Timeframe::Minute.finer(), None);
    }
}
