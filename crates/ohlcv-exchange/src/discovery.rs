//! 최초 제공 시각 탐색.
//!
//! 일봉 → 시간봉 → 분봉 순으로 해상도를 높여가며 거래소가 제공하는 가장 이른
//! 캔들을 찾습니다. 대상 타임프레임에 도달하면 멈춥니다.

use crate::error::ExchangeError;
use crate::traits::CandleFetcher;
use chrono::{DateTime, Utc};
use ohlcv_core::{date_from_ymd, most_recent_windows, offset, Clock, CoreError, Timeframe};
use thiserror::Error;
use tracing::{debug, info};

/// 탐색 요청당 행 수.
pub const PROBE_QUERY_LEN: u32 = 100;

/// 탐색 윈도우 크기 (요청 행 수에서 허용치를 뺀 값).
pub const PROBE_WINDOW_LEN: usize = 98;

/// 일봉 탐색 시작 연도.
pub const DISCOVERY_START_YEAR: i32 = 2015;

/// 탐색 에러.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// 해당 단계에서 데이터를 찾지 못함
    #[error("{timeframe} 단계에서 제공 데이터를 찾지 못했습니다")]
    DataNotAvailable { timeframe: Timeframe },

    #[error(transparent)]
    Fetch(#[from] ExchangeError),

    #[error(transparent)]
    Calendar(#[from] CoreError),
}

/// `target` 타임프레임 기준 최초 제공 시각을 찾습니다.
pub async fn resolve_first_available(
    fetcher: &dyn CandleFetcher,
    symbol: &str,
    target: Timeframe,
    clock: &dyn Clock,
) -> Result<DateTime<Utc>, DiscoveryError> {
    let mut from = date_from_ymd(DISCOVERY_START_YEAR, 1, 1)?;
    let mut stage = Timeframe::Day;

    loop {
        let found = probe_stage(fetcher, symbol, stage, from, clock.now()).await?;
        debug!(symbol, stage = %stage, found = %found, "탐색 단계 완료");

        if stage == target {
            info!(symbol, timeframe = %target, first_available = %found, "최초 제공 시각 확인");
            return Ok(found);
        }
        let Some(next) = stage.finer() else {
            return Ok(found);
        };
        from = offset(found, -1, stage);
        stage = next;
    }
}

async fn probe_stage(
    fetcher: &dyn CandleFetcher,
    symbol: &str,
    stage: Timeframe,
    from: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, DiscoveryError> {
    for window in most_recent_windows(from, stage, PROBE_WINDOW_LEN, now).into_iter().rev() {
        let since = offset(window.from, -1, stage);
        let rows = fetcher
            .fetch_candles(symbol, stage, since.timestamp_millis(), PROBE_QUERY_LEN)
            .await?;
        if let Some(first) = rows.iter().map(|r| r.open_time).min() {
            return Ok(first);
        }
    }
    Err(DiscoveryError::DataNotAvailable { timeframe: stage })
}
