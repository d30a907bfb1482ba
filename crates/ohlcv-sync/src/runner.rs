//! 티커 태스크 실행기.
//!
//! 티커마다 하나의 tokio 태스크를 `JoinSet`에 띄웁니다. 태스크끼리는 거래소별
//! `RateGate`만 공유합니다.

use crate::error::Result;
use crate::params::TickerSpec;
use crate::synchronizer::{SyncReport, TickerSynchronizer};
use ohlcv_core::{ticker_span, Clock, SyncSettings};
use ohlcv_exchange::AdapterRegistry;
use ohlcv_store::CandleStore;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

/// 동기화 실행기.
pub struct Runner {
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn CandleStore>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl Runner {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: Arc<dyn CandleStore>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            settings,
        }
    }

    /// 사양 하나에 대한 동기화기를 만듭니다.
    ///
    /// # Errors
    /// 거래소/자산 유형/통화쌍 조합을 지원하지 않거나 요청 범위가 잘못되면 에러.
    pub fn synchronizer(&self, spec: &TickerSpec) -> Result<TickerSynchronizer> {
        let adapter = self.registry.resolve(&spec.id)?;
        TickerSynchronizer::new(
            spec,
            adapter,
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.settings.clone(),
        )
    }

    /// 모든 티커를 동기화합니다.
    ///
    /// 모든 태스크가 종료 단계에 이르거나 `token`이 취소되면 반환합니다.
    /// 시작하지 못한 티커는 `Blocked` 보고로 포함됩니다.
    pub async fn run(&self, specs: &[TickerSpec], token: CancellationToken) -> Vec<SyncReport> {
        let mut reports = Vec::with_capacity(specs.len());
        let mut tasks = JoinSet::new();

        for spec in specs {
            let key = spec.id.key();
            match self.synchronizer(spec) {
                Ok(synchronizer) => {
                    let span = ticker_span!("ticker_sync", key, spec.id.exchange);
                    tasks.spawn(synchronizer.run(token.child_token()).instrument(span));
                }
                Err(e) => {
                    warn!(ticker = %key, "티커를 시작할 수 없습니다: {}", e);
                    reports.push(SyncReport::blocked(key, e.to_string()));
                }
            }
        }

        info!(tasks = tasks.len(), rejected = reports.len(), "티커 동기화 태스크 시작");

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    report.stats.log_summary(&report.ticker);
                    if let Some(reason) = &report.block_reason {
                        warn!(ticker = %report.ticker, reason = %reason, "티커 중단됨");
                    }
                    reports.push(report);
                }
                Err(e) => error!("동기화 태스크 실패: {}", e),
            }
        }

        reports.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        reports
    }
}
