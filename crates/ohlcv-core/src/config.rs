//! 설정 관리.
//!
//! `main.json`(동기화할 티커 목록과 실행 설정)을 읽고 `OHLCV__` 접두사
//! 환경 변수로 덮어씁니다.

use crate::error::CoreResult;
use crate::logging::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 동기화할 티커 키 목록 (예: `binance_spot_BTC_USDT_1h`)
    #[serde(default)]
    pub tickers: Vec<String>,
    /// 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 동기화 루프 설정
    #[serde(default)]
    pub sync: SyncSettings,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 저장소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// 티커별 DB 파일의 루트 디렉터리
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// 쓰기 잠금 시 재시도 횟수
    #[serde(default = "default_busy_retries")]
    pub busy_retries: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            busy_retries: default_busy_retries(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("db")
}

fn default_busy_retries() -> u32 {
    10
}

/// 동기화 루프 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncSettings {
    /// 윈도우당 행 수 (거래소 요청 한도에서 허용치 2를 뺀 값)
    #[serde(default = "default_rows_per_window")]
    pub rows_per_window: usize,
    /// 다운로드 1회당 최대 시도 횟수
    #[serde(default = "default_max_trials")]
    pub max_trials: u32,
    /// 빈 결과 시 커서 전진량 = rows_per_window / advance_divisor
    #[serde(default = "default_advance_divisor")]
    pub advance_divisor: usize,
    /// 연결 확인 재시도 간격 (초)
    #[serde(default = "default_session_retry_secs")]
    pub session_retry_secs: u64,
    /// 실패한 사이클 재시도 간격 (초)
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    /// 요청 한도 초과 시 대기 (초)
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            rows_per_window: default_rows_per_window(),
            max_trials: default_max_trials(),
            advance_divisor: default_advance_divisor(),
            session_retry_secs: default_session_retry_secs(),
            retry_interval_secs: default_retry_interval_secs(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
        }
    }
}

fn default_rows_per_window() -> usize {
    200
}

fn default_max_trials() -> u32 {
    100
}

fn default_advance_divisor() -> usize {
    2
}

fn default_session_retry_secs() -> u64 {
    10
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_rate_limit_backoff_secs() -> u64 {
    5
}

impl SyncSettings {
    /// 연결 확인 재시도 간격을 Duration으로 반환
    pub fn session_retry(&self) -> Duration {
        Duration::from_secs(self.session_retry_secs)
    }

    /// 사이클 재시도 간격을 Duration으로 반환
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// 요청 한도 초과 대기 시간을 Duration으로 반환
    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// `LogConfig`로 변환합니다. 알 수 없는 형식은 pretty로 처리합니다.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig::new(&self.level).with_format(self.format.parse().unwrap_or(LogFormat::Pretty))
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("OHLCV")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.tickers.is_empty());
        assert_eq!(config.sync.rows_per_window, 200);
        assert_eq!(config.sync.max_trials, 100);
        assert_eq!(config.sync.session_retry(), Duration::from_secs(10));
        assert_eq!(config.storage.busy_retries, 10);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{ "tickers": ["binance_spot_BTC_USDT_1h"], "sync": { "max_trials": 7 } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tickers.len(), 1);
        assert_eq!(config.sync.max_trials, 7);
        assert_eq!(config.sync.rows_per_window, 200);
        assert_eq!(config.storage.root_dir, PathBuf::from("db"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AppConfig::load("does/not/exist/main.json").unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_logging_config_conversion() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
        };
        let log_config = logging.to_log_config();
        assert_eq!(log_config.level, "debug");
        assert_eq!(log_config.format, LogFormat::Json);
    }
}
