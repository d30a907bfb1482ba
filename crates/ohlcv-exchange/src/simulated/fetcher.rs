//! 결정적인 시뮬레이션 캔들 조회자.
//!
//! 상장 시각부터 현재(시계 기준)까지 모든 틱에 캔들이 있는 시계열을 만들어 냅니다.
//! 테스트에서 거래소의 여러 비정상 동작을 재현할 수 있습니다:
//!
//! - 특정 시각 이전 커서로 조회하면 빈 결과 (`with_empty_before`)
//! - 커서를 무시하고 상장 시각부터 반환 (`ignoring_since`)
//! - 일부 틱 누락 (`with_missing`)
//! - 인접한 두 틱의 순서 뒤바꿈 (`with_swapped`)
//! - 요청당 최대 행 수 (`with_max_limit`)
//! - 예약된 에러를 순서대로 반환 (`push_error`)
//! - 세션 확인 실패 (`fail_connections`)

use crate::gate::RateGate;
use crate::traits::{CandleFetcher, ExchangeResult, DEFAULT_MAX_LIMIT};
use crate::ExchangeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_core::{align, is_aligned, offset, step_count, Candle, Clock, SystemClock, Timeframe};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// 기록된 조회 요청.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub since: DateTime<Utc>,
    pub limit: u32,
}

#[derive(Debug, Default)]
struct SimState {
    scripted: VecDeque<ExchangeError>,
    connection_failures: u32,
    fetch_calls: u32,
    connection_checks: u32,
    requests: Vec<FetchRequest>,
}

/// 시뮬레이션 조회자.
pub struct SimulatedFetcher {
    name: String,
    clock: Arc<dyn Clock>,
    gate: Option<Arc<RateGate>>,
    listing: DateTime<Utc>,
    empty_before: Option<DateTime<Utc>>,
    ignore_since: bool,
    missing: BTreeSet<DateTime<Utc>>,
    swapped: BTreeSet<DateTime<Utc>>,
    max_limit: u32,
    state: Mutex<SimState>,
}

impl SimulatedFetcher {
    /// 2017-08-17 00:00 UTC에 상장된 시계열.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clock: Arc::new(SystemClock),
            gate: None,
            listing: DateTime::from_timestamp(1_502_928_000, 0).unwrap_or_default(),
            empty_before: None,
            ignore_since: false,
            missing: BTreeSet::new(),
            swapped: BTreeSet::new(),
            max_limit: DEFAULT_MAX_LIMIT,
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_gate(mut self, gate: Arc<RateGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// 첫 캔들 시각.
    pub fn with_listing(mut self, listing: DateTime<Utc>) -> Self {
        self.listing = listing;
        self
    }

    /// `since`가 이 시각보다 이르면 빈 결과를 반환합니다.
    pub fn with_empty_before(mut self, ts: DateTime<Utc>) -> Self {
        self.empty_before = Some(ts);
        self
    }

    /// `since`를 무시하고 항상 상장 시각부터 반환합니다.
    pub fn ignoring_since(mut self) -> Self {
        self.ignore_since = true;
        self
    }

    /// 해당 틱을 결과에서 뺍니다.
    pub fn with_missing(mut self, ts: DateTime<Utc>) -> Self {
        self.missing.insert(ts);
        self
    }

    /// 해당 틱을 바로 다음 틱 뒤에 반환합니다.
    pub fn with_swapped(mut self, ts: DateTime<Utc>) -> Self {
        self.swapped.insert(ts);
        self
    }

    pub fn with_max_limit(mut self, max_limit: u32) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    pub fn listing(&self) -> DateTime<Utc> {
        self.listing
    }

    /// 다음 조회에서 반환할 에러를 예약합니다.
    pub fn push_error(&self, error: ExchangeError) {
        self.state().scripted.push_back(error);
    }

    /// 다음 `n`번의 세션 확인을 실패시킵니다.
    pub fn fail_connections(&self, n: u32) {
        self.state().connection_failures = n;
    }

    pub fn fetch_calls(&self) -> u32 {
        self.state().fetch_calls
    }

    pub fn connection_checks(&self) -> u32 {
        self.state().connection_checks
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.state().requests.clone()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 틱 시각으로부터 결정적인 캔들을 만듭니다.
    fn candle_at(&self, t: DateTime<Utc>, tf: Timeframe) -> Candle {
        let i = step_count(align(self.listing, tf), t, tf);
        let open = Decimal::from(100 + i % 50);
        let close = open + Decimal::ONE;
        Candle::new(
            t,
            open,
            close + Decimal::ONE,
            open - Decimal::ONE,
            close,
            Decimal::from(10 + i % 7),
        )
    }

    fn generate(&self, tf: Timeframe, since: DateTime<Utc>, limit: u32) -> Vec<Candle> {
        let first = align(self.listing, tf);
        let cursor = if self.ignore_since {
            first
        } else if is_aligned(since, tf) {
            since.max(first)
        } else {
            offset(align(since, tf), 1, tf).max(first)
        };
        let last = align(self.clock.now(), tf);

        let limit = limit.min(self.max_limit) as usize;
        let mut rows: Vec<Candle> = Vec::new();
        let mut t = cursor;
        while t <= last && rows.len() < limit {
            if !self.missing.contains(&t) {
                rows.push(self.candle_at(t, tf));
            }
            t = offset(t, 1, tf);
        }

        for ts in &self.swapped {
            if let Some(i) = rows.iter().position(|r| r.open_time == *ts) {
                if i + 1 < rows.len() {
                    rows.swap(i, i + 1);
                }
            }
        }
        rows
    }
}

#[async_trait]
impl CandleFetcher for SimulatedFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_limit(&self) -> u32 {
        self.max_limit
    }

    async fn test_connection(&self) -> ExchangeResult<()> {
        let mut state = self.state();
        state.connection_checks += 1;
        if state.connection_failures > 0 {
            state.connection_failures -= 1;
            return Err(ExchangeError::Disconnected("simulated outage".to_string()));
        }
        Ok(())
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>> {
        if let Some(gate) = &self.gate {
            gate.throttle().await;
        }

        let since = DateTime::from_timestamp_millis(since_ms)
            .ok_or_else(|| ExchangeError::ParseError(format!("잘못된 시각: {}", since_ms)))?;

        {
            let mut state = self.state();
            state.fetch_calls += 1;
            state.requests.push(FetchRequest {
                symbol: symbol.to_string(),
                timeframe,
                since,
                limit,
            });
            if let Some(error) = state.scripted.pop_front() {
                return Err(error);
            }
        }

        if self.empty_before.is_some_and(|ts| since < ts) {
            trace!(symbol, since = %since, "빈 구간");
            return Ok(Vec::new());
        }

        Ok(self.generate(timeframe, since, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ohlcv_core::ManualClock;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn fetcher() -> SimulatedFetcher {
        SimulatedFetcher::new("sim")
            .with_listing(ts("2023-01-01T00:00:00Z"))
            .with_clock(Arc::new(ManualClock::new(ts("2023-01-02T00:30:00Z"))))
    }

    #[tokio::test]
    async fn test_generates_from_since() {
        let sim = fetcher();
        let since = ts("2023-01-01T10:00:00Z");
        let rows = sim
            .fetch_candles("BTCUSDT", Timeframe::Hour, since.timestamp_millis(), 5)
            .await
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].open_time, since);
        assert_eq!(sim.fetch_calls(), 1);
        assert_eq!(sim.requests()[0].limit, 5);
    }

    #[tokio::test]
    async fn test_stops_at_now() {
        let sim = fetcher();
        let since = ts("2023-01-01T20:00:00Z");
        let rows = sim
            .fetch_candles("BTCUSDT", Timeframe::Hour, since.timestamp_millis(), 100)
            .await
            .unwrap();
        // 20:00 ~ 다음날 00:00 (형성 중인 캔들 포함)
        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn test_scripted_errors_and_outages() {
        let sim = fetcher();
        sim.push_error(ExchangeError::RateLimited);
        sim.fail_connections(1);

        assert!(sim.test_connection().await.is_err());
        assert!(sim.test_connection().await.is_ok());
        assert!(matches!(
            sim.fetch_candles("BTCUSDT", Timeframe::Hour, 0, 10).await,
            Err(ExchangeError::RateLimited)
        ));
        let rows = sim.fetch_candles("BTCUSDT", Timeframe::Hour, 0, 10).await.unwrap();
        assert_eq!(rows[0].open_time, ts("2023-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_swapped_ticks_and_max_limit() {
        let sim = fetcher()
            .with_swapped(ts("2023-01-01T01:00:00Z"))
            .with_max_limit(3);
        assert_eq!(sim.max_limit(), 3);

        let rows = sim.fetch_candles("BTCUSDT", Timeframe::Hour, 0, 10).await.unwrap();
        let times: Vec<_> = rows.iter().map(|r| r.open_time).collect();
        assert_eq!(
            times,
            vec![
                ts("2023-01-01T00:00:00Z"),
                ts("2023-01-01T02:00:00Z"),
                ts("2023-01-01T01:00:00Z"),
            ]
        );
    }
}
