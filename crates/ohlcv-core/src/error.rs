//! 동기화 코어의 에러 타입.
//!
//! 설정 및 일관성 에러는 해당 티커 태스크에만 치명적입니다.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// 코어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 지원하지 않는 타임프레임
    #[error("지원하지 않는 타임프레임: {0}")]
    UnsupportedTimeframe(String),

    /// 잘못된 날짜 (2010년 이전 또는 존재하지 않는 날짜)
    #[error("잘못된 날짜: {year}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    /// 시작 시각이 종료 시각보다 늦음
    #[error("시작 시각({start})이 종료 시각({end})보다 늦습니다")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// 저장소 체크포인트가 이전 값보다 뒤로 이동
    #[error("체크포인트 역행: 캐시 {cached}, 저장소 {stored:?}")]
    CheckpointRegression {
        cached: DateTime<Utc>,
        stored: Option<DateTime<Utc>>,
    },

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),
}

/// 코어 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_date_message() {
        let err = CoreError::InvalidDate {
            year: 2009,
            month: 1,
            day: 3,
        };
        assert_eq!(err.to_string(), "잘못된 날짜: 2009-01-03");
    }
}
