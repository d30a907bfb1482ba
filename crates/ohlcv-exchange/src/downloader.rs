//! 재시도 기반 윈도우 다운로더.
//!
//! 하나의 조회 윈도우를 원격 조회자를 통해 비어 있지 않은 캔들 묶음으로 바꿉니다.
//!
//! # 동작 방식
//!
//! 1. 커서는 윈도우 시작보다 한 스텝 이른 시각에서 출발 (첫 틱 포함 보장)
//! 2. 요청 행 수 = 윈도우 틱 수 + 허용치 2
//! 3. 결과가 비면 커서를 `rows_per_window / advance_divisor` 스텝 전진
//! 4. 커서가 현재 시각(정렬)에 도달하면 `EndOfData`
//! 5. 연결/네트워크/요청 한도 실패는 세션 확인 후 같은 윈도우로 재시도
//! 6. 최대 시도 횟수를 넘기면 `NoDataAvailable`
//!
//! 마지막 결과 분류는 `last_outcome()`으로 노출되며, 이전 호출이 일시적 실패로
//! 끝났다면 다음 호출은 먼저 세션을 확인합니다.

use crate::error::FailureKind;
use crate::gate::{wait_for_session, DEFAULT_SESSION_RETRY};
use crate::traits::CandleFetcher;
use chrono::{DateTime, Utc};
use ohlcv_core::{align, next_window_from, offset, Candle, Clock, SyncSettings, Timeframe, Window};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 윈도우 양 끝을 확실히 받기 위해 추가로 요청하는 행 수.
pub const QUERY_TOLERANCE: usize = 2;

/// 다운로드 결과 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadOutcome {
    /// 행을 받음
    Ok,
    /// 타임아웃 또는 거래소 측 에러
    ConnectionError,
    /// 일반 전송 실패
    NetworkError,
    /// 요청 한도 초과
    RateLimited,
    /// 이 범위에 데이터가 없음
    NoDataAvailable,
    /// 커서가 현재 시각을 따라잡음
    EndOfData,
}

impl DownloadOutcome {
    /// 세션 확인 후 재시도해야 하는 일시적 실패인지 확인합니다.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DownloadOutcome::ConnectionError
                | DownloadOutcome::NetworkError
                | DownloadOutcome::RateLimited
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadOutcome::Ok => "ok",
            DownloadOutcome::ConnectionError => "connection_error",
            DownloadOutcome::NetworkError => "network_error",
            DownloadOutcome::RateLimited => "rate_limited",
            DownloadOutcome::NoDataAvailable => "no_data_available",
            DownloadOutcome::EndOfData => "end_of_data",
        }
    }
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FailureKind> for DownloadOutcome {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Connection => DownloadOutcome::ConnectionError,
            FailureKind::Network => DownloadOutcome::NetworkError,
            FailureKind::RateLimited => DownloadOutcome::RateLimited,
            FailureKind::Fatal => DownloadOutcome::NoDataAvailable,
        }
    }
}

/// `download` 호출의 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    /// 비어 있지 않은 캔들 묶음
    Rows(Vec<Candle>),
    /// 데이터 없음 (최대 시도 초과 포함)
    NoDataAvailable,
    /// 현재 시각까지 따라잡음
    EndOfData,
}

/// 재시도 정책.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 호출당 최대 시도 횟수
    pub max_trials: u32,
    /// 빈 결과 시 전진량 분모
    pub advance_divisor: usize,
    /// 세션 재확인 간격
    pub session_retry: Duration,
    /// 요청 한도 초과 시 추가 대기
    pub rate_limit_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_trials: 100,
            advance_divisor: 2,
            session_retry: DEFAULT_SESSION_RETRY,
            rate_limit_backoff: Duration::from_secs(5),
        }
    }
}

impl From<&SyncSettings> for RetryPolicy {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            max_trials: settings.max_trials.max(1),
            advance_divisor: settings.advance_divisor.max(1),
            session_retry: settings.session_retry(),
            rate_limit_backoff: settings.rate_limit_backoff(),
        }
    }
}

/// 티커 하나를 위한 재시도 다운로더.
pub struct ResilientDownloader {
    fetcher: Arc<dyn CandleFetcher>,
    clock: Arc<dyn Clock>,
    symbol: String,
    timeframe: Timeframe,
    rows_per_window: usize,
    policy: RetryPolicy,
    last_outcome: Option<DownloadOutcome>,
}

impl ResilientDownloader {
    pub fn new(
        fetcher: Arc<dyn CandleFetcher>,
        clock: Arc<dyn Clock>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        rows_per_window: usize,
    ) -> Self {
        let symbol = symbol.into();
        let max_rows = max_rows_per_window(fetcher.as_ref());
        if rows_per_window > max_rows {
            warn!(
                symbol = %symbol,
                fetcher = fetcher.name(),
                requested = rows_per_window,
                max_rows,
                "윈도우 크기가 거래소 요청 한도를 넘어 줄입니다"
            );
        }
        Self {
            fetcher,
            clock,
            symbol,
            timeframe,
            rows_per_window: rows_per_window.clamp(1, max_rows),
            policy: RetryPolicy::default(),
            last_outcome: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn rows_per_window(&self) -> usize {
        self.rows_per_window
    }

    pub fn fetcher(&self) -> &Arc<dyn CandleFetcher> {
        &self.fetcher
    }

    /// 마지막 호출의 결과 분류.
    pub fn last_outcome(&self) -> Option<DownloadOutcome> {
        self.last_outcome
    }

    /// 다음 증분 윈도우를 계산합니다.
    pub fn next_window(&self, from: DateTime<Utc>) -> Option<Window> {
        next_window_from(from, self.timeframe, self.rows_per_window, self.clock.now())
    }

    /// 윈도우 하나를 다운로드합니다.
    pub async fn download(&mut self, window: Window) -> DownloadResult {
        if self.last_outcome.is_some_and(|o| o.is_transient()) {
            info!(
                symbol = %self.symbol,
                last_outcome = %self.last_outcome.map_or("none", |o| o.as_str()),
                "이전 다운로드 실패, API 세션 확인 대기"
            );
            wait_for_session(self.fetcher.as_ref(), self.policy.session_retry).await;
        }

        let tf = self.timeframe;
        let mut window = window;

        for trial in 1..=self.policy.max_trials {
            let since = offset(window.from, -1, tf);
            let limit = u32::try_from(window.len(tf) + QUERY_TOLERANCE)
                .unwrap_or(u32::MAX)
                .min(self.fetcher.max_limit());

            debug!(
                symbol = %self.symbol,
                timeframe = %tf,
                trial,
                window = %window,
                limit,
                "캔들 요청"
            );

            let result = self
                .fetcher
                .fetch_candles(&self.symbol, tf, since.timestamp_millis(), limit)
                .await;

            match result {
                Ok(rows) => {
                    let chunk = bound_to_window(rows, since, window.to);
                    if !chunk.is_empty() {
                        debug!(symbol = %self.symbol, rows = chunk.len(), trial, "캔들 수신");
                        self.last_outcome = Some(DownloadOutcome::Ok);
                        return DownloadResult::Rows(chunk);
                    }

                    let advance = (self.rows_per_window / self.policy.advance_divisor).max(1);
                    let cursor = offset(window.from, advance as i64, tf);
                    let now = self.clock.now();
                    if cursor >= align(now, tf) {
                        debug!(symbol = %self.symbol, cursor = %cursor, "현재 시각 도달");
                        self.last_outcome = Some(DownloadOutcome::EndOfData);
                        return DownloadResult::EndOfData;
                    }
                    let Some(next) = next_window_from(cursor, tf, self.rows_per_window, now) else {
                        self.last_outcome = Some(DownloadOutcome::EndOfData);
                        return DownloadResult::EndOfData;
                    };
                    debug!(
                        symbol = %self.symbol,
                        trial,
                        cursor = %cursor,
                        "빈 결과, 커서 전진"
                    );
                    window = next;
                }
                Err(e) => {
                    let kind = e.classify();
                    if kind == FailureKind::Fatal {
                        error!(symbol = %self.symbol, window = %window, "다운로드 불가: {}", e);
                        self.last_outcome = Some(DownloadOutcome::NoDataAvailable);
                        return DownloadResult::NoDataAvailable;
                    }

                    let outcome = DownloadOutcome::from(kind);
                    self.last_outcome = Some(outcome);
                    warn!(
                        symbol = %self.symbol,
                        trial,
                        max_trials = self.policy.max_trials,
                        outcome = %outcome,
                        "캔들 요청 실패: {}",
                        e
                    );

                    if trial == self.policy.max_trials {
                        break;
                    }
                    if let Some(delay) = e.retry_delay(self.policy.rate_limit_backoff) {
                        tokio::time::sleep(delay).await;
                    }
                    wait_for_session(self.fetcher.as_ref(), self.policy.session_retry).await;
                }
            }
        }

        warn!(
            symbol = %self.symbol,
            max_trials = self.policy.max_trials,
            "최대 시도 횟수 초과, 데이터 없음으로 처리"
        );
        if !self.last_outcome.is_some_and(|o| o.is_transient()) {
            self.last_outcome = Some(DownloadOutcome::NoDataAvailable);
        }
        DownloadResult::NoDataAvailable
    }
}

/// 허용치를 더해도 조회자의 요청당 최대 행 수를 넘지 않는 윈도우 크기.
fn max_rows_per_window(fetcher: &dyn CandleFetcher) -> usize {
    usize::try_from(fetcher.max_limit())
        .unwrap_or(usize::MAX)
        .saturating_sub(QUERY_TOLERANCE)
        .max(1)
}

/// 포함 보장용 앞 틱(`guard`)과 윈도우 끝 이후의 행을 제거합니다.
///
/// `guard`보다 이른 행은 그대로 남겨 호출자의 중첩 검사가 볼 수 있게 합니다.
fn bound_to_window(rows: Vec<Candle>, guard: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Candle> {
    rows.into_iter()
        .filter(|row| row.open_time != guard && row.open_time <= to)
        .collect()
}
