//! 티커 동기화기.
//!
//! 티커 하나의 수집 루프입니다.
//!
//! ```text
//! ResolvingStart → Fetching → Validating → Persisting → Fetching
//!                      │                        │
//!                      └──────→ Waiting ←───────┘
//! 종료: Done, Blocked
//! ```
//!
//! 한 사이클은 준비 단계(`prepare`: 탐색, 체크포인트 갱신, 다운로드, 검증)와
//! 저장 단계(`persist`)로 나뉩니다. `run`은 준비 단계와 대기만 취소 토큰과
//! 경쟁시키고 저장 단계는 끝까지 실행하므로, 종료 신호를 받아도 쓰기와
//! 체크포인트 전진이 어긋나지 않습니다.

use crate::error::Result;
use crate::params::TickerSpec;
use crate::stats::SyncStats;
use chrono::{DateTime, Utc};
use ohlcv_core::{
    align, assign_sequence_ids, classify_start, consecutive_breaks, next_boundary, offset, Candle,
    Clock, StartMatch, SyncSettings, SyncState, TickerId,
};
use ohlcv_exchange::{DownloadResult, MarketAdapter, ResilientDownloader};
use ohlcv_store::CandleStore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 동기화 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    ResolvingStart,
    Fetching,
    Validating,
    Persisting,
    Waiting,
    /// 요청 범위를 모두 저장함
    Done,
    /// 일관성 에러로 중단됨
    Blocked,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Done | SyncPhase::Blocked)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncPhase::ResolvingStart => "resolving_start",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Validating => "validating",
            SyncPhase::Persisting => "persisting",
            SyncPhase::Waiting => "waiting",
            SyncPhase::Done => "done",
            SyncPhase::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// 한 사이클의 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 곧바로 다음 윈도우로
    Continue,
    /// 재시도 간격만큼 대기
    RetryLater,
    /// 다음 캔들 경계까지 대기
    WaitForNextBoundary,
    Done,
    Blocked,
}

/// 준비 단계의 결과.
#[derive(Debug)]
pub enum Prepared {
    /// 저장할 행 (ID 부여 전)
    Persist(Vec<Candle>),
    /// 저장 없이 사이클 종료
    Finish(CycleOutcome),
}

/// 태스크 종료 보고.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub ticker: String,
    pub phase: SyncPhase,
    pub stats: SyncStats,
    pub block_reason: Option<String>,
}

impl SyncReport {
    /// 시작도 못 한 티커의 보고.
    pub fn blocked(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            phase: SyncPhase::Blocked,
            stats: SyncStats::new(),
            block_reason: Some(reason.into()),
        }
    }
}

/// 티커 동기화기.
pub struct TickerSynchronizer {
    ticker: TickerId,
    key: String,
    adapter: Arc<dyn MarketAdapter>,
    store: Arc<dyn CandleStore>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    downloader: ResilientDownloader,
    state: SyncState,
    phase: SyncPhase,
    stats: SyncStats,
    block_reason: Option<String>,
}

impl TickerSynchronizer {
    /// 새 동기화기를 생성합니다.
    ///
    /// # Errors
    /// 요청 시작이 요청 종료보다 늦으면 `CoreError::InvalidRange`.
    pub fn new(
        spec: &TickerSpec,
        adapter: Arc<dyn MarketAdapter>,
        store: Arc<dyn CandleStore>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Result<Self> {
        let state = SyncState::new(spec.id.timeframe, spec.start, spec.end)?;
        let downloader = adapter.downloader(&spec.id, Arc::clone(&clock), &settings);
        Ok(Self {
            key: spec.id.key(),
            ticker: spec.id.clone(),
            adapter,
            store,
            clock,
            settings,
            downloader,
            state,
            phase: SyncPhase::ResolvingStart,
            stats: SyncStats::new(),
            block_reason: None,
        })
    }

    pub fn ticker(&self) -> &TickerId {
        &self.ticker
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.block_reason.as_deref()
    }

    /// 취소되거나 종료 단계에 이를 때까지 동기화합니다.
    pub async fn run(mut self, token: CancellationToken) -> SyncReport {
        let started = Instant::now();
        info!(ticker = %self.key, start = ?self.state.requested_start(), end = ?self.state.requested_end(), "동기화 시작");

        loop {
            self.stats.cycles += 1;
            let prepared = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                prepared = self.prepare() => prepared,
            };

            let outcome = match prepared {
                Prepared::Persist(rows) => self.persist(rows).await,
                Prepared::Finish(outcome) => outcome,
            };

            let wait = match outcome {
                CycleOutcome::Continue => continue,
                CycleOutcome::Done | CycleOutcome::Blocked => break,
                CycleOutcome::RetryLater => {
                    self.stats.retries += 1;
                    self.settings.retry_interval()
                }
                CycleOutcome::WaitForNextBoundary => self.until_next_boundary(),
            };

            self.phase = SyncPhase::Waiting;
            debug!(ticker = %self.key, wait_secs = wait.as_secs(), "대기");
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if token.is_cancelled() && !self.phase.is_terminal() {
            info!(ticker = %self.key, phase = %self.phase, "종료 신호 수신, 동기화 중지");
        }
        self.stats.elapsed = started.elapsed();
        self.into_report()
    }

    /// 한 사이클을 취소 없이 실행합니다.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.stats.cycles += 1;
        match self.prepare().await {
            Prepared::Persist(rows) => self.persist(rows).await,
            Prepared::Finish(outcome) => outcome,
        }
    }

    /// 저장 직전까지 진행합니다: 최초 시각 탐색, 체크포인트 갱신, 다운로드, 검증.
    pub async fn prepare(&mut self) -> Prepared {
        if self.phase.is_terminal() {
            return Prepared::Finish(self.terminal_outcome());
        }

        if self.state.first_available().is_none() {
            self.phase = SyncPhase::ResolvingStart;
            match self
                .adapter
                .resolve_first_available(&self.ticker, self.clock.as_ref())
                .await
            {
                Ok(first) => {
                    self.state.set_first_available(first);
                    info!(
                        ticker = %self.key,
                        first_available = %first,
                        effective_start = ?self.state.effective_start(),
                        "최초 제공 시각 확인"
                    );
                }
                Err(e) => {
                    warn!(ticker = %self.key, "최초 제공 시각 탐색 실패: {}", e);
                    return Prepared::Finish(CycleOutcome::RetryLater);
                }
            }
        }

        self.phase = SyncPhase::Fetching;
        let checkpoint = match self.store.last_checkpoint(&self.ticker).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(ticker = %self.key, "체크포인트 조회 실패: {}", e);
                return Prepared::Finish(CycleOutcome::RetryLater);
            }
        };
        if let Err(e) = self.state.refresh(checkpoint) {
            return Prepared::Finish(self.block(e.to_string()));
        }

        if self.state.end_predates_first_available() {
            info!(
                ticker = %self.key,
                end = ?self.state.requested_end(),
                first_available = ?self.state.first_available(),
                "요청 종료 시각이 최초 제공 시각보다 이릅니다"
            );
            return Prepared::Finish(self.finish());
        }
        if self.state.end_reached() {
            return Prepared::Finish(self.finish());
        }

        let Some(expected) = self.state.next_expected() else {
            return Prepared::Finish(CycleOutcome::RetryLater);
        };
        let end = self.state.requested_end();
        let window = self
            .downloader
            .next_window(expected)
            .and_then(|w| end.map_or(Some(w), |end| w.clamp_end(end)));
        let Some(window) = window else {
            debug!(ticker = %self.key, next_expected = %expected, "받을 윈도우 없음");
            return Prepared::Finish(CycleOutcome::WaitForNextBoundary);
        };

        debug!(ticker = %self.key, window_from = %window.from, window_to = %window.to, "윈도우 다운로드");
        self.stats.windows += 1;
        let rows = match self.downloader.download(window).await {
            DownloadResult::Rows(rows) => rows,
            DownloadResult::EndOfData => {
                self.stats.empty += 1;
                return Prepared::Finish(self.on_end_of_data());
            }
            DownloadResult::NoDataAvailable => {
                self.stats.empty += 1;
                let now = self.clock.now();
                if self.state.is_caught_up(now) {
                    return Prepared::Finish(CycleOutcome::WaitForNextBoundary);
                }
                warn!(
                    ticker = %self.key,
                    window_from = %window.from,
                    last_outcome = ?self.downloader.last_outcome(),
                    "데이터 없음, 재시도 예정"
                );
                return Prepared::Finish(CycleOutcome::RetryLater);
            }
        };
        self.stats.rows_downloaded += rows.len();

        self.validate(rows, expected)
    }

    /// 검증된 행에 ID를 부여해 저장하고 체크포인트를 전진시킵니다.
    ///
    /// ID는 시각 순서대로 부여되고 체크포인트는 가장 늦은 시각으로 전진합니다.
    ///
    /// 저장이 실패하면 체크포인트는 그대로이며 다음 사이클에서 같은 윈도우를 다시 받습니다.
    pub async fn persist(&mut self, mut rows: Vec<Candle>) -> CycleOutcome {
        self.phase = SyncPhase::Persisting;
        rows.sort_by_key(|r| r.open_time);
        rows.dedup_by_key(|r| r.open_time);
        let Some(last_id) = assign_sequence_ids(&mut rows, self.state.last_persisted_id()) else {
            return CycleOutcome::RetryLater;
        };
        let Some(last_ts) = rows.last().map(|r| r.open_time) else {
            return CycleOutcome::RetryLater;
        };

        let written = match self.write(&rows).await {
            Ok(written) => written,
            Err(e) => {
                self.stats.persist_failures += 1;
                error!(ticker = %self.key, rows = rows.len(), "저장 실패, 체크포인트 유지: {}", e);
                return CycleOutcome::RetryLater;
            }
        };
        self.stats.rows_persisted += written;

        if let Err(e) = self.state.advance(last_ts, last_id) {
            return self.block(e.to_string());
        }
        info!(
            ticker = %self.key,
            rows = written,
            last_ts = %last_ts,
            last_id,
            "저장 완료"
        );

        if self.state.end_reached() {
            return self.finish();
        }
        if self.state.is_caught_up(self.clock.now()) {
            self.phase = SyncPhase::Fetching;
            return CycleOutcome::WaitForNextBoundary;
        }
        self.phase = SyncPhase::Fetching;
        CycleOutcome::Continue
    }

    async fn write(&self, rows: &[Candle]) -> Result<u64> {
        self.store.ensure_table(&self.ticker).await?;
        Ok(self.store.append_rows(&self.ticker, rows).await?)
    }

    fn validate(&mut self, mut rows: Vec<Candle>, expected: DateTime<Utc>) -> Prepared {
        self.phase = SyncPhase::Validating;
        let tf = self.ticker.timeframe;

        if let Some(end) = self.state.requested_end() {
            rows.retain(|r| r.open_time <= end);
            if rows.is_empty() {
                info!(ticker = %self.key, end = %end, "요청 종료 시각까지 남은 데이터 없음");
                return Prepared::Finish(self.finish());
            }
        }

        if rows.windows(2).any(|w| w[1].open_time <= w[0].open_time) {
            let received = rows.len();
            rows.sort_by_key(|r| r.open_time);
            rows.dedup_by_key(|r| r.open_time);
            self.stats.reordered += 1;
            warn!(
                ticker = %self.key,
                received,
                kept = rows.len(),
                "순서가 어긋난 배치, 시각순 정렬 후 중복 제거"
            );
        }

        match classify_start(&rows, expected, tf) {
            Some(StartMatch::Overlap { expected, detected }) => {
                return Prepared::Finish(self.block(format!(
                    "중첩 감지: 기대 {}, 수신 {}",
                    expected, detected
                )));
            }
            Some(StartMatch::Gap {
                expected,
                detected,
                missing,
            }) => {
                self.stats.gaps += 1;
                warn!(
                    ticker = %self.key,
                    expected = %expected,
                    detected = %detected,
                    missing,
                    "시작 갭 감지, 계속 진행"
                );
            }
            Some(StartMatch::Match) | None => {}
        }

        let breaks = consecutive_breaks(&rows, tf);
        if !breaks.is_empty() {
            self.stats.breaks += breaks.len();
            for (prev, next) in &breaks {
                warn!(
                    ticker = %self.key,
                    prev = %rows[*prev].open_time,
                    next = %rows[*next].open_time,
                    "연속성 끊김"
                );
            }
        }

        Prepared::Persist(rows)
    }

    fn on_end_of_data(&mut self) -> CycleOutcome {
        if self.state.end_reached() {
            return self.finish();
        }
        let now = self.clock.now();
        let tf = self.ticker.timeframe;
        let past_end = self
            .state
            .requested_end()
            .is_some_and(|end| end < offset(align(now, tf), -1, tf));
        if past_end {
            info!(ticker = %self.key, "요청 범위에 더 이상 데이터가 없습니다");
            return self.finish();
        }
        CycleOutcome::WaitForNextBoundary
    }

    fn until_next_boundary(&self) -> Duration {
        let now = self.clock.now();
        (next_boundary(now, self.ticker.timeframe) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn finish(&mut self) -> CycleOutcome {
        if self.phase != SyncPhase::Done {
            info!(ticker = %self.key, last_ts = ?self.state.last_persisted_ts(), "요청 범위 동기화 완료");
        }
        self.phase = SyncPhase::Done;
        CycleOutcome::Done
    }

    fn block(&mut self, reason: String) -> CycleOutcome {
        error!(ticker = %self.key, reason = %reason, "동기화 중단");
        self.phase = SyncPhase::Blocked;
        self.block_reason = Some(reason);
        CycleOutcome::Blocked
    }

    fn terminal_outcome(&self) -> CycleOutcome {
        match self.phase {
            SyncPhase::Blocked => CycleOutcome::Blocked,
            _ => CycleOutcome::Done,
        }
    }

    fn into_report(self) -> SyncReport {
        SyncReport {
            ticker: self.key,
            phase: self.phase,
            stats: self.stats,
            block_reason: self.block_reason,
        }
    }
}
