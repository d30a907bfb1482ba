//! 타임프레임 정렬 날짜 연산.
//!
//! 모든 시각은 UTC이며, 격자는 Unix epoch 기준으로 스텝 길이로 나누어 떨어지는
//! 시각들입니다. 일봉 격자는 UTC 자정에 맞춰집니다.

use crate::error::{CoreError, CoreResult};
use crate::types::Timeframe;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// 날짜 생성자가 허용하는 가장 이른 연도.
pub const MIN_YEAR: i32 = 2010;

/// `t`를 타임프레임 격자의 왼쪽 경계로 내림합니다.
pub fn align(t: DateTime<Utc>, tf: Timeframe) -> DateTime<Utc> {
    let step = tf.as_secs();
    let secs = t.timestamp().div_euclid(step) * step;
    Utc.timestamp_opt(secs, 0).single().unwrap_or(t)
}

/// `t`를 `n` 스텝만큼 이동합니다. `n`은 음수일 수 있습니다.
pub fn offset(t: DateTime<Utc>, n: i64, tf: Timeframe) -> DateTime<Utc> {
    t + chrono::Duration::seconds(tf.as_secs() * n)
}

/// 두 시각 사이의 스텝 수 (0 방향으로 절삭).
///
/// `step_count(a, b) == -step_count(b, a)`가 항상 성립합니다.
pub fn step_count(from: DateTime<Utc>, to: DateTime<Utc>, tf: Timeframe) -> i64 {
    (to - from).num_seconds() / tf.as_secs()
}

/// `t`가 격자 위에 있는지 확인합니다.
pub fn is_aligned(t: DateTime<Utc>, tf: Timeframe) -> bool {
    t.timestamp_subsec_nanos() == 0 && t.timestamp().rem_euclid(tf.as_secs()) == 0
}

/// `now` 이후의 다음 격자 경계.
pub fn next_boundary(now: DateTime<Utc>, tf: Timeframe) -> DateTime<Utc> {
    offset(align(now, tf), 1, tf)
}

/// 연/월/일로 UTC 자정 시각을 생성합니다.
///
/// # Errors
/// 2010년 이전이거나 존재하지 않는 날짜이면 `CoreError::InvalidDate`를 반환합니다.
pub fn date_from_ymd(year: i32, month: u32, day: u32) -> CoreResult<DateTime<Utc>> {
    let invalid = || CoreError::InvalidDate { year, month, day };
    if year < MIN_YEAR {
        return Err(invalid());
    }
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&midnight))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_align() {
        let t = ts("2023-03-14T15:09:26.535Z");
        assert_eq!(align(t, Timeframe::Minute), ts("2023-03-14T15:09:00Z"));
        assert_eq!(align(t, Timeframe::Hour), ts("2023-03-14T15:00:00Z"));
        assert_eq!(align(t, Timeframe::Day), ts("2023-03-14T00:00:00Z"));
    }

    #[test]
    fn test_offset_signs() {
        let t = ts("2023-01-01T00:00:00Z");
        assert_eq!(offset(t, 0, Timeframe::Hour), t);
        assert_eq!(offset(t, -1, Timeframe::Hour), ts("2022-12-31T23:00:00Z"));
        assert_eq!(offset(t, 199, Timeframe::Hour), ts("2023-01-09T07:00:00Z"));
    }

    #[test]
    fn test_step_count() {
        let a = ts("2023-01-01T00:00:00Z");
        let b = ts("2023-01-02T00:00:00Z");
        assert_eq!(step_count(a, b, Timeframe::Hour), 24);
        assert_eq!(step_count(b, a, Timeframe::Hour), -24);
        assert_eq!(step_count(a, b, Timeframe::Day), 1);
        assert_eq!(step_count(a, a, Timeframe::Minute), 0);
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(ts("2023-01-01T05:00:00Z"), Timeframe::Hour));
        assert!(!is_aligned(ts("2023-01-01T05:00:00Z"), Timeframe::Day));
        assert!(!is_aligned(ts("2023-01-01T05:00:00.5Z"), Timeframe::Minute));
    }

    #[test]
    fn test_next_boundary() {
        let now = ts("2023-01-01T05:42:10Z");
        assert_eq!(next_boundary(now, Timeframe::Hour), ts("2023-01-01T06:00:00Z"));
        assert_eq!(next_boundary(now, Timeframe::Day), ts("2023-01-02T00:00:00Z"));
    }

    #[test]
    fn test_date_from_ymd() {
        assert_eq!(date_from_ymd(2015, 1, 1).unwrap(), ts("2015-01-01T00:00:00Z"));
        assert!(matches!(
            date_from_ymd(2009, 12, 31),
            Err(CoreError::InvalidDate { year: 2009, .. })
        ));
        assert!(date_from_ymd(2023, 2, 30).is_err());
    }
}
