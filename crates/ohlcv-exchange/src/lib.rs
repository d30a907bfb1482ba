//! 거래소 캔들 조회와 재시도 다운로드.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - CandleFetcher trait: 한 번의 제한된 캔들 조회
//! - Binance / Bitfinex 공개 REST 커넥터
//! - RateGate / wait_for_session: 요청 간격 제어와 세션 확인
//! - ResilientDownloader: 윈도우 단위 재시도 다운로더
//! - 최초 제공 시각 탐색
//! - MarketAdapter / AdapterRegistry: `(거래소, 자산 유형)` 조회
//! - 시뮬레이션 조회자 (테스트용)

pub mod adapter;
pub mod connector;
pub mod discovery;
pub mod downloader;
pub mod error;
pub mod gate;
pub mod registry;
pub mod simulated;
pub mod traits;

pub use adapter::{CandleMarket, MarketAdapter, SymbolStyle, DEFAULT_PAIRS};
pub use connector::{
    BinanceClient, BinanceConfig, BinanceMarket, BitfinexClient, BitfinexConfig,
};
pub use discovery::{resolve_first_available, DiscoveryError};
pub use downloader::{
    DownloadOutcome, DownloadResult, ResilientDownloader, RetryPolicy, QUERY_TOLERANCE,
};
pub use error::*;
pub use gate::{wait_for_session, RateGate, DEFAULT_SESSION_RETRY};
pub use registry::{AdapterRegistry, ExchangeSettings};
pub use simulated::{FetchRequest, SimulatedFetcher};
pub use traits::*;
