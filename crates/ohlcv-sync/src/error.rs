//! 에러 타입 정의.

use ohlcv_core::CoreError;
use ohlcv_exchange::{DiscoveryError, ExchangeError};
use ohlcv_store::DataError;
use std::path::PathBuf;
use thiserror::Error;

/// 파라미터 트리 로딩 에러.
#[derive(Debug, Error)]
pub enum ParamsError {
    /// 파일 읽기 실패
    #[error("파일을 읽을 수 없습니다 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON 형식 오류
    #[error("JSON 형식 오류 ({path}): {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// 설정에는 있지만 파라미터 트리에 없는 티커
    #[error("파라미터 트리에 없는 티커: {0:?}")]
    UnknownTickers(Vec<String>),

    /// 티커 기술자 검증 실패
    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// 동기화 에러.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Store(#[from] DataError),

    #[error(transparent)]
    Params(#[from] ParamsError),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, SyncError>;
