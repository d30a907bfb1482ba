//! 조회 윈도우 계획.
//!
//! 시간 범위를 거래소의 요청당 행 수 제한에 맞는 윈도우들로 분할합니다.
//!
//! # 주요 기능
//!
//! - **plan_windows**: 닫힌 범위를 인접한 윈도우로 분할 (오래된 순)
//! - **next_window_from**: 증분 수집용 다음 윈도우 (현재 형성 중인 캔들 제외)
//! - **most_recent_windows**: 최초 데이터 탐색용 윈도우 (최신 순)
//!
//! 분할은 `last`에서 뒤로 걸어가며 만들어지므로, 가장 최근 윈도우는 항상 가득 차고
//! 남는 부분 윈도우는 가장 오래된 쪽에 위치합니다.

use crate::calendar::{align, offset, step_count};
use crate::types::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 양 끝을 포함하는 정렬된 조회 윈도우.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// 첫 틱 (포함)
    pub from: DateTime<Utc>,
    /// 마지막 틱 (포함)
    pub to: DateTime<Utc>,
}

impl Window {
    /// `from <= to`일 때만 윈도우를 생성합니다.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// 윈도우에 포함된 틱 수.
    pub fn len(&self, tf: Timeframe) -> usize {
        usize::try_from(step_count(self.from, self.to, tf) + 1).unwrap_or(0)
    }

    /// 윈도우 내 모든 틱.
    pub fn ticks(&self, tf: Timeframe) -> impl Iterator<Item = DateTime<Utc>> {
        let from = self.from;
        (0..=step_count(self.from, self.to, tf)).map(move |i| offset(from, i, tf))
    }

    /// 끝을 `end` 이하로 자릅니다. 비게 되면 `None`.
    pub fn clamp_end(&self, end: DateTime<Utc>) -> Option<Self> {
        Self::new(self.from, self.to.min(end))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} ~ {}]", self.from.to_rfc3339(), self.to.to_rfc3339())
    }
}

/// `[first, last]`를 최대 `max_per_window` 틱 크기의 윈도우로 분할합니다.
///
/// 결과는 오래된 순(오름차순)입니다. `first > last`이거나 `max_per_window == 0`이면
/// 빈 목록을 반환합니다.
pub fn plan_windows(
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    tf: Timeframe,
    max_per_window: usize,
) -> Vec<Window> {
    let (first, last) = (align(first, tf), align(last, tf));
    if first > last || max_per_window == 0 {
        return Vec::new();
    }

    let budget = max_per_window as i64;
    let mut remaining = step_count(first, last, tf) + 1;
    let mut windows = Vec::with_capacity(((remaining + budget - 1) / budget) as usize);

    let mut end = last;
    while remaining > 0 {
        let size = remaining.min(budget);
        let start = offset(end, -(size - 1), tf);
        windows.push(Window { from: start, to: end });
        end = offset(start, -1, tf);
        remaining -= size;
    }

    windows.reverse();
    windows
}

/// `from`부터 시작하는 다음 증분 수집 윈도우.
///
/// 끝은 `from + max_per_window` 스텝과 정렬된 `now` 중 작은 값에서 한 스텝 뺀
/// 시각입니다. 아직 형성 중인 현재 캔들은 절대 요청하지 않습니다.
/// 윈도우가 비게 되면 (실시간을 따라잡음) `None`을 반환합니다.
pub fn next_window_from(
    from: DateTime<Utc>,
    tf: Timeframe,
    max_per_window: usize,
    now: DateTime<Utc>,
) -> Option<Window> {
    if max_per_window == 0 {
        return None;
    }
    let first = align(from, tf);
    let tentative = offset(first, max_per_window as i64, tf);
    let end = offset(tentative.min(align(now, tf)), -1, tf);
    Window::new(first, end)
}

/// 최초 데이터 탐색용 윈도우 목록 (최신 순).
///
/// `now - 1 스텝`부터 `from`까지 뒤로 걸어가며 `n` 크기의 윈도우를 만듭니다.
pub fn most_recent_windows(
    from: DateTime<Utc>,
    tf: Timeframe,
    n: usize,
    now: DateTime<Utc>,
) -> Vec<Window> {
    let last = offset(align(now, tf), -1, tf);
    let mut windows = plan_windows(from, last, tf, n);
    windows.reverse();
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_plan_windows_partial_at_oldest_edge() {
        let first = ts("2023-01-01T00:00:00Z");
        let last = offset(first, 249, Timeframe::Hour);
        let windows = plan_windows(first, last, Timeframe::Hour, 100);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].from, first);
        assert_eq!(windows[0].len(Timeframe::Hour), 50);
        assert_eq!(windows[1].len(Timeframe::Hour), 100);
        assert_eq!(windows[2].len(Timeframe::Hour), 100);
        assert_eq!(windows[2].to, last);
    }

    #[test]
    fn test_plan_windows_empty() {
        let a = ts("2023-01-02T00:00:00Z");
        let b = ts("2023-01-01T00:00:00Z");
        assert!(plan_windows(a, b, Timeframe::Day, 10).is_empty());
        assert!(plan_windows(b, a, Timeframe::Day, 0).is_empty());
    }

    #[test]
    fn test_plan_windows_single_tick() {
        let a = ts("2023-01-01T00:00:00Z");
        let windows = plan_windows(a, a, Timeframe::Minute, 5);
        assert_eq!(windows, vec![Window { from: a, to: a }]);
    }

    #[test]
    fn test_next_window_from_full() {
        let now = ts("2023-02-01T00:00:00Z");
        let window =
            next_window_from(ts("2023-01-01T00:00:00Z"), Timeframe::Hour, 200, now).unwrap();
        assert_eq!(window.from, ts("2023-01-01T00:00:00Z"));
        assert_eq!(window.to, ts("2023-01-09T07:00:00Z"));
        assert_eq!(window.len(Timeframe::Hour), 200);
    }

    #[test]
    fn test_next_window_from_clamped_to_now() {
        let now = ts("2023-01-01T05:30:00Z");
        let window =
            next_window_from(ts("2023-01-01T00:00:00Z"), Timeframe::Hour, 200, now).unwrap();
        assert_eq!(window.to, ts("2023-01-01T04:00:00Z"));
    }

    #[test]
    fn test_next_window_from_caught_up() {
        let now = ts("2023-01-01T05:30:00Z");
        assert!(next_window_from(ts("2023-01-01T05:00:00Z"), Timeframe::Hour, 200, now).is_none());
    }

    #[test]
    fn test_most_recent_windows_newest_first() {
        let now = ts("2023-01-11T12:00:00Z");
        let windows = most_recent_windows(ts("2023-01-01T00:00:00Z"), Timeframe::Day, 4, now);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].to, ts("2023-01-10T00:00:00Z"));
        assert_eq!(windows[0].len(Timeframe::Day), 4);
        assert_eq!(windows[2].from, ts("2023-01-01T00:00:00Z"));
        assert_eq!(windows[2].len(Timeframe::Day), 2);
    }

    #[test]
    fn test_window_ticks_and_clamp() {
        let window = Window::new(ts("2023-01-01T00:00:00Z"), ts("2023-01-01T02:00:00Z")).unwrap();
        let ticks: Vec<_> = window.ticks(Timeframe::Hour).collect();
        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[1], ts("2023-01-01T01:00:00Z"));

        let clamped = window.clamp_end(ts("2023-01-01T01:00:00Z")).unwrap();
        assert_eq!(clamped.len(Timeframe::Hour), 2);
        assert!(window.clamp_end(ts("2022-12-31T00:00:00Z")).is_none());
    }
}
