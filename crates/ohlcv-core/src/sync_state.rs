//! 티커별 동기화 상태와 일관성 검사.
//!
//! # 주요 기능
//!
//! - **유효 시작 시각**: 요청 시작과 최초 제공 시각 중 늦은 값
//! - **다음 기대 틱**: 마지막 저장 시각 + 1 스텝
//! - **연속성 검사**: 인접 행이 정확히 한 스텝 차이인지 확인하고 끊긴 위치를 보고
//! - **시작 일치 검사**: 일치 / 갭 / 중첩 3분류
//! - **체크포인트 갱신**: 저장소 값으로 매 루프 재적재, 단조 증가 보장
//!
//! 저장소의 체크포인트가 영속적인 기준이며 이 구조체는 그 캐시입니다.

use crate::calendar::{align, offset, step_count};
use crate::error::{CoreError, CoreResult};
use crate::types::{Candle, Checkpoint, Timeframe};
use chrono::{DateTime, Utc};

/// 다운로드된 첫 행과 기대 시작 틱의 비교 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMatch {
    /// 기대한 틱에서 시작
    Match,
    /// 기대보다 늦게 시작 (저장소에 구멍이 생김)
    Gap {
        expected: DateTime<Utc>,
        detected: DateTime<Utc>,
        missing: i64,
    },
    /// 기대보다 이르게 시작 (이력 중복 위험)
    Overlap {
        expected: DateTime<Utc>,
        detected: DateTime<Utc>,
    },
}

/// 인접 행 사이의 간격이 정확히 한 스텝이 아닌 위치 `(i - 1, i)` 목록.
pub fn consecutive_breaks(rows: &[Candle], tf: Timeframe) -> Vec<(usize, usize)> {
    rows.windows(2)
        .enumerate()
        .filter(|(_, pair)| offset(pair[0].open_time, 1, tf) != pair[1].open_time)
        .map(|(i, _)| (i, i + 1))
        .collect()
}

/// 첫 행을 기대 시작 틱과 비교합니다. 행이 없으면 `None`.
pub fn classify_start(
    rows: &[Candle],
    expected: DateTime<Utc>,
    tf: Timeframe,
) -> Option<StartMatch> {
    let detected = rows.first()?.open_time;
    Some(if detected == expected {
        StartMatch::Match
    } else if detected > expected {
        StartMatch::Gap {
            expected,
            detected,
            missing: step_count(expected, detected, tf),
        }
    } else {
        StartMatch::Overlap { expected, detected }
    })
}

/// 티커 하나의 동기화 상태.
#[derive(Debug, Clone)]
pub struct SyncState {
    timeframe: Timeframe,
    first_available: Option<DateTime<Utc>>,
    requested_start: Option<DateTime<Utc>>,
    requested_end: Option<DateTime<Utc>>,
    last_persisted_ts: Option<DateTime<Utc>>,
    last_persisted_id: Option<i64>,
}

impl SyncState {
    /// 새 상태를 생성합니다.
    ///
    /// # Errors
    /// 요청 시작이 요청 종료보다 늦으면 `CoreError::InvalidRange`.
    pub fn new(
        timeframe: Timeframe,
        requested_start: Option<DateTime<Utc>>,
        requested_end: Option<DateTime<Utc>>,
    ) -> CoreResult<Self> {
        let requested_start = requested_start.map(|t| align(t, timeframe));
        let requested_end = requested_end.map(|t| align(t, timeframe));
        if let (Some(start), Some(end)) = (requested_start, requested_end) {
            if start > end {
                return Err(CoreError::InvalidRange { start, end });
            }
        }
        Ok(Self {
            timeframe,
            first_available: None,
            requested_start,
            requested_end,
            last_persisted_ts: None,
            last_persisted_id: None,
        })
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn first_available(&self) -> Option<DateTime<Utc>> {
        self.first_available
    }

    pub fn requested_start(&self) -> Option<DateTime<Utc>> {
        self.requested_start
    }

    pub fn requested_end(&self) -> Option<DateTime<Utc>> {
        self.requested_end
    }

    pub fn last_persisted_ts(&self) -> Option<DateTime<Utc>> {
        self.last_persisted_ts
    }

    pub fn last_persisted_id(&self) -> Option<i64> {
        self.last_persisted_id
    }

    /// 탐색된 최초 제공 시각을 캐시합니다.
    pub fn set_first_available(&mut self, ts: DateTime<Utc>) {
        self.first_available = Some(align(ts, self.timeframe));
    }

    /// `max(requested_start, first_available)` 또는 설정된 쪽.
    pub fn effective_start(&self) -> Option<DateTime<Utc>> {
        match (self.requested_start, self.first_available) {
            (Some(start), Some(first)) => Some(start.max(first)),
            (start, first) => start.or(first),
        }
    }

    /// 다음으로 받아야 할 틱.
    pub fn next_expected(&self) -> Option<DateTime<Utc>> {
        match self.last_persisted_ts {
            Some(last) => Some(offset(last, 1, self.timeframe)),
            None => self.effective_start(),
        }
    }

    /// 요청 종료 시각까지 저장을 마쳤는지 확인합니다.
    pub fn end_reached(&self) -> bool {
        match (self.requested_end, self.last_persisted_ts) {
            (Some(end), Some(last)) => last >= end,
            _ => false,
        }
    }

    /// 요청 종료 시각이 최초 제공 시각보다 이른지 확인합니다.
    pub fn end_predates_first_available(&self) -> bool {
        matches!(
            (self.requested_end, self.first_available),
            (Some(end), Some(first)) if end < first
        )
    }

    /// 마지막 저장 시각이 `now` 기준 한 스텝 이내인지 확인합니다.
    pub fn is_caught_up(&self, now: DateTime<Utc>) -> bool {
        self.last_persisted_ts
            .is_some_and(|last| last >= offset(align(now, self.timeframe), -1, self.timeframe))
    }

    /// 저장소 체크포인트로 캐시를 갱신합니다.
    ///
    /// # Errors
    /// 저장소 값이 캐시보다 뒤로 가 있으면 `CoreError::CheckpointRegression`.
    pub fn refresh(&mut self, checkpoint: Checkpoint) -> CoreResult<()> {
        if let Some(cached) = self.last_persisted_ts {
            if checkpoint.last_ts.map_or(true, |stored| stored < cached) {
                return Err(CoreError::CheckpointRegression {
                    cached,
                    stored: checkpoint.last_ts,
                });
            }
        }
        self.last_persisted_ts = checkpoint.last_ts;
        self.last_persisted_id = checkpoint.last_id;
        Ok(())
    }

    /// 쓰기가 받아들여진 뒤 체크포인트를 전진시킵니다.
    pub fn advance(&mut self, ts: DateTime<Utc>, id: i64) -> CoreResult<()> {
        if let Some(cached) = self.last_persisted_ts {
            if ts < cached {
                return Err(CoreError::CheckpointRegression {
                    cached,
                    stored: Some(ts),
                });
            }
        }
        if self.last_persisted_id.is_some_and(|last| id < last) {
            return Err(CoreError::InvalidInput(format!(
                "행 ID가 감소했습니다: {:?} -> {}",
                self.last_persisted_id, id
            )));
        }
        self.last_persisted_ts = Some(ts);
        self.last_persisted_id = Some(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn candle(t: DateTime<Utc>) -> Candle {
        Candle::new(t, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1))
    }

    #[test]
    fn test_consecutive_breaks_single_gap() {
        let start = ts("2023-01-01T00:00:00Z");
        let rows = vec![
            candle(start),
            candle(offset(start, 1, Timeframe::Hour)),
            candle(offset(start, 3, Timeframe::Hour)),
        ];
        assert_eq!(consecutive_breaks(&rows, Timeframe::Hour), vec![(1, 2)]);
        assert!(consecutive_breaks(&rows[..2], Timeframe::Hour).is_empty());
        assert!(consecutive_breaks(&[], Timeframe::Hour).is_empty());
    }

    #[test]
    fn test_classify_start() {
        let expected = ts("2023-01-01T05:00:00Z");
        let tf = Timeframe::Hour;

        assert_eq!(
            classify_start(&[candle(expected)], expected, tf),
            Some(StartMatch::Match)
        );
        assert_eq!(
            classify_start(&[candle(ts("2023-01-01T08:00:00Z"))], expected, tf),
            Some(StartMatch::Gap {
                expected,
                detected: ts("2023-01-01T08:00:00Z"),
                missing: 3,
            })
        );
        assert!(matches!(
            classify_start(&[candle(ts("2023-01-01T04:00:00Z"))], expected, tf),
            Some(StartMatch::Overlap { .. })
        ));
        assert_eq!(classify_start(&[], expected, tf), None);
    }

    #[test]
    fn test_new_rejects_inverted_range() {
        let result = SyncState::new(
            Timeframe::Day,
            Some(ts("2023-02-01T00:00:00Z")),
            Some(ts("2023-01-01T00:00:00Z")),
        );
        assert!(matches!(result, Err(CoreError::InvalidRange { .. })));
    }

    #[test]
    fn test_effective_start() {
        let mut state = SyncState::new(Timeframe::Hour, None, None).unwrap();
        assert_eq!(state.effective_start(), None);

        state.set_first_available(ts("2020-06-01T10:00:00Z"));
        assert_eq!(state.effective_start(), Some(ts("2020-06-01T10:00:00Z")));

        let mut state =
            SyncState::new(Timeframe::Hour, Some(ts("2021-01-01T00:00:00Z")), None).unwrap();
        state.set_first_available(ts("2020-06-01T10:00:00Z"));
        assert_eq!(state.effective_start(), Some(ts("2021-01-01T00:00:00Z")));
    }

    #[test]
    fn test_next_expected_follows_checkpoint() {
        let mut state =
            SyncState::new(Timeframe::Hour, Some(ts("2023-01-01T00:00:00Z")), None).unwrap();
        assert_eq!(state.next_expected(), Some(ts("2023-01-01T00:00:00Z")));

        state
            .refresh(Checkpoint::new(ts("2023-01-09T07:00:00Z"), 200))
            .unwrap();
        assert_eq!(state.next_expected(), Some(ts("2023-01-09T08:00:00Z")));
    }

    #[test]
    fn test_refresh_rejects_regression() {
        let mut state = SyncState::new(Timeframe::Day, None, None).unwrap();
        state.advance(ts("2023-01-10T00:00:00Z"), 10).unwrap();

        let result = state.refresh(Checkpoint::new(ts("2023-01-05T00:00:00Z"), 5));
        assert!(matches!(result, Err(CoreError::CheckpointRegression { .. })));
        assert!(state.refresh(Checkpoint::default()).is_err());
        assert!(state
            .refresh(Checkpoint::new(ts("2023-01-10T00:00:00Z"), 10))
            .is_ok());
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut state = SyncState::new(Timeframe::Day, None, None).unwrap();
        state.advance(ts("2023-01-10T00:00:00Z"), 10).unwrap();
        assert!(state.advance(ts("2023-01-09T00:00:00Z"), 11).is_err());
        assert!(state.advance(ts("2023-01-11T00:00:00Z"), 9).is_err());
        assert_eq!(state.last_persisted_id(), Some(10));
    }

    #[test]
    fn test_end_conditions() {
        let mut state = SyncState::new(
            Timeframe::Day,
            Some(ts("2019-01-01T00:00:00Z")),
            Some(ts("2019-12-31T00:00:00Z")),
        )
        .unwrap();
        state.set_first_available(ts("2020-03-01T00:00:00Z"));
        assert!(state.end_predates_first_available());
        assert!(!state.end_reached());

        state.advance(ts("2019-12-31T00:00:00Z"), 1).unwrap();
        assert!(state.end_reached());
    }

    #[test]
    fn test_is_caught_up() {
        let mut state = SyncState::new(Timeframe::Hour, None, None).unwrap();
        let now = ts("2023-01-01T10:20:00Z");
        assert!(!state.is_caught_up(now));
        state.advance(ts("2023-01-01T08:00:00Z"), 1).unwrap();
        assert!(!state.is_caught_up(now));
        state.advance(ts("2023-01-01T09:00:00Z"), 2).unwrap();
        assert!(state.is_caught_up(now));
    }
}
