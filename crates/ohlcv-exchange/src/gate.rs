//! 연결 게이트와 요청 간격 게이트.
//!
//! # 주요 기능
//!
//! - **RateGate**: 거래소 클라이언트별 뮤텍스. 같은 거래소로 가는 요청은 최소 간격을
//!   두고 하나씩 통과합니다.
//! - **wait_for_session**: API 세션이 정상일 때까지 무한히 재확인합니다. 타임아웃이
//!   없으므로 호출자가 취소 가능한 태스크 안에서 실행해야 합니다.

use crate::traits::CandleFetcher;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 기본 연결 재확인 간격.
pub const DEFAULT_SESSION_RETRY: Duration = Duration::from_secs(10);

/// 거래소 클라이언트 단위의 요청 간격 게이트.
#[derive(Debug)]
pub struct RateGate {
    name: String,
    min_interval: Duration,
    lock: Mutex<()>,
}

impl RateGate {
    pub fn new(name: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            name: name.into(),
            min_interval,
            lock: Mutex::new(()),
        }
    }

    /// 간격 제한이 없는 게이트.
    pub fn unlimited(name: impl Into<String>) -> Self {
        Self::new(name, Duration::ZERO)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// 게이트를 통과합니다.
    ///
    /// 잠금을 쥔 채로 최소 간격만큼 대기하므로 동시에 호출한 태스크들은
    /// 간격을 두고 순서대로 풀려납니다.
    pub async fn throttle(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let _guard = self.lock.lock().await;
        debug!(gate = %self.name, delay_ms = self.min_interval.as_millis() as u64, "요청 간격 대기");
        tokio::time::sleep(self.min_interval).await;
    }
}

/// 세션이 정상으로 확인될 때까지 대기합니다.
///
/// 확인 시도 횟수를 반환합니다.
pub async fn wait_for_session(fetcher: &dyn CandleFetcher, retry_interval: Duration) -> u32 {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match fetcher.test_connection().await {
            Ok(()) => {
                if attempts > 1 {
                    info!(exchange = fetcher.name(), attempts, "API 세션 복구");
                }
                return attempts;
            }
            Err(e) => {
                warn!(
                    exchange = fetcher.name(),
                    attempts,
                    retry_secs = retry_interval.as_secs(),
                    "API 세션 확인 실패: {}",
                    e
                );
                tokio::time::sleep(retry_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_rate_gate_serializes_callers() {
        let gate = Arc::new(RateGate::new("test", Duration::from_millis(500)));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move {
                    gate.throttle().await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap() - start);
        }
        finished.sort();

        assert_eq!(finished[0], Duration::from_millis(500));
        assert_eq!(finished[1], Duration::from_millis(1000));
        assert_eq!(finished[2], Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_gate_does_not_wait() {
        let gate = RateGate::unlimited("free");
        let start = Instant::now();
        gate.throttle().await;
        assert_eq!(Instant::now(), start);
    }
}
