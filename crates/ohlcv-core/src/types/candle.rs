//! 캔들 행과 체크포인트.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLCV 캔들 행.
///
/// `open_time`은 항상 버킷의 왼쪽 경계입니다. `sequence_id`는 저장 시점에
/// 부여되며 거래소에서 받은 직후에는 `None`입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// 저장소 행 ID
    pub sequence_id: Option<i64>,
    /// 시가 시각 (UTC)
    pub open_time: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량
    pub volume: Decimal,
}

impl Candle {
    /// ID 없는 새 캔들을 생성합니다.
    pub fn new(
        open_time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            sequence_id: None,
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 시가 시각의 밀리초 타임스탬프.
    pub fn timestamp_ms(&self) -> i64 {
        self.open_time.timestamp_millis()
    }
}

/// 연속된 ID를 부여합니다.
///
/// 첫 행은 `last_id + 1`, 저장된 행이 없으면 1부터 시작합니다.
/// 부여된 마지막 ID를 반환합니다.
pub fn assign_sequence_ids(rows: &mut [Candle], last_id: Option<i64>) -> Option<i64> {
    let start = last_id.map_or(1, |id| id + 1);
    for (i, row) in rows.iter_mut().enumerate() {
        row.sequence_id = Some(start + i as i64);
    }
    rows.last().and_then(|row| row.sequence_id)
}

/// 저장된 진행 상태: 마지막 타임스탬프와 마지막 행 ID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_ts: Option<DateTime<Utc>>,
    pub last_id: Option<i64>,
}

impl Checkpoint {
    pub fn new(last_ts: DateTime<Utc>, last_id: i64) -> Self {
        Self {
            last_ts: Some(last_ts),
            last_id: Some(last_id),
        }
    }

    /// 저장된 행이 없는 체크포인트인지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.last_ts.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(s: &str) -> Candle {
        Candle::new(s.parse().unwrap(), dec!(1), dec!(2), dec!(0.5), dec!(1.5), dec!(10))
    }

    #[test]
    fn test_assign_sequence_ids_from_empty() {
        let mut rows = vec![candle("2023-01-01T00:00:00Z"), candle("2023-01-01T01:00:00Z")];
        let last = assign_sequence_ids(&mut rows, None);
        assert_eq!(rows[0].sequence_id, Some(1));
        assert_eq!(last, Some(2));
    }

    #[test]
    fn test_assign_sequence_ids_continues() {
        let mut rows = vec![candle("2023-01-01T00:00:00Z")];
        assert_eq!(assign_sequence_ids(&mut rows, Some(41)), Some(42));
        assert_eq!(assign_sequence_ids(&mut [], Some(41)), None);
    }

    #[test]
    fn test_timestamp_ms() {
        assert_eq!(candle("1970-01-01T00:00:01Z").timestamp_ms(), 1000);
    }
}
