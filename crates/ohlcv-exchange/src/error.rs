//! 거래소 에러 타입과 실패 분류.

use std::time::Duration;
use thiserror::Error;

/// 거래소 관련 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크/전송 에러
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 거래소 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded")]
    RateLimited,

    /// API 에러 코드
    #[error("API error {code}: {message}")]
    ApiError { code: i32, message: String },

    /// 거래소 점검 또는 서버 측 장애
    #[error("Exchange unavailable: {0}")]
    ExchangeUnavailable(String),

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 심볼을 찾을 수 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 알 수 없는 에러
    #[error("Unknown error: {0}")]
    Unknown(String),

    /// 지원되지 않는 작업
    #[error("Not supported: {0}")]
    NotSupported(String),
}

/// 다운로더가 재시도 방식을 결정하기 위한 실패 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 타임아웃 또는 거래소 측 에러
    Connection,
    /// 일반 전송 실패
    Network,
    /// 요청 한도 초과
    RateLimited,
    /// 재시도해도 결과가 같은 에러 (잘못된 심볼, 응답 형식 등)
    Fatal,
}

impl ExchangeError {
    /// 실패 분류를 반환합니다.
    pub fn classify(&self) -> FailureKind {
        match self {
            ExchangeError::Timeout(_)
            | ExchangeError::ApiError { .. }
            | ExchangeError::ExchangeUnavailable(_)
            | ExchangeError::Disconnected(_) => FailureKind::Connection,
            ExchangeError::NetworkError(_) | ExchangeError::Unknown(_) => FailureKind::Network,
            ExchangeError::RateLimited => FailureKind::RateLimited,
            ExchangeError::ParseError(_)
            | ExchangeError::SymbolNotFound(_)
            | ExchangeError::NotSupported(_) => FailureKind::Fatal,
        }
    }

    /// 다음 시도 전 권장 대기 시간.
    ///
    /// 요청 한도 초과는 `rate_limit_backoff`를 따릅니다.
    pub fn retry_delay(&self, rate_limit_backoff: Duration) -> Option<Duration> {
        match self.classify() {
            FailureKind::RateLimited => Some(rate_limit_backoff),
            FailureKind::Connection => Some(Duration::from_millis(500)),
            FailureKind::Network => Some(Duration::from_secs(1)),
            FailureKind::Fatal => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else {
            ExchangeError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            ExchangeError::Timeout("t".into()).classify(),
            FailureKind::Connection
        );
        assert_eq!(
            ExchangeError::ApiError {
                code: -1000,
                message: "x".into()
            }
            .classify(),
            FailureKind::Connection
        );
        assert_eq!(
            ExchangeError::NetworkError("reset".into()).classify(),
            FailureKind::Network
        );
        assert_eq!(ExchangeError::RateLimited.classify(), FailureKind::RateLimited);
        assert_eq!(
            ExchangeError::SymbolNotFound("XYZ".into()).classify(),
            FailureKind::Fatal
        );
    }

    #[test]
    fn test_retry_delay() {
        let backoff = Duration::from_secs(7);
        assert_eq!(ExchangeError::RateLimited.retry_delay(backoff), Some(backoff));
        assert_eq!(ExchangeError::ParseError("x".into()).retry_delay(backoff), None);
    }
}
