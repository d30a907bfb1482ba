//! 윈도우 기반 증분 OHLCV 동기화기.
//!
//! 이 crate는 설정된 티커마다 거래소 캔들을 받아 로컬 저장소에 이어 붙이는
//! 바이너리와 그 구성 요소를 제공합니다:
//! - 파라미터 트리 로딩 (`main.json`, 거래소/티커 기술자)
//! - 티커 동기화기 (탐색 → 다운로드 → 검증 → 저장 → 대기)
//! - 티커별 태스크 실행기와 통계

pub mod error;
pub mod params;
pub mod runner;
pub mod stats;
pub mod synchronizer;

pub use error::{ParamsError, Result, SyncError};
pub use params::{
    select_tickers, DateSpec, ExchangeParams, ParamsTree, TickerDescriptor, TickerSelection,
    TickerSpec,
};
pub use runner::Runner;
pub use stats::SyncStats;
pub use synchronizer::{CycleOutcome, Prepared, SyncPhase, SyncReport, TickerSynchronizer};
