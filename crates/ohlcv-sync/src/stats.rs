//! 동기화 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 티커 하나의 동기화 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    /// 실행한 사이클 수
    pub cycles: usize,
    /// 다운로드한 윈도우 수
    pub windows: usize,
    /// 받은 행 수
    pub rows_downloaded: usize,
    /// 저장된 행 수
    pub rows_persisted: u64,
    /// 데이터 없음 / 현재 시각 도달
    pub empty: usize,
    /// 재시도 대기 횟수
    pub retries: usize,
    /// 시작 갭 감지 횟수
    pub gaps: usize,
    /// 연속성 끊김 수
    pub breaks: usize,
    /// 시각순 정렬이 필요했던 배치 수
    pub reordered: usize,
    /// 저장 실패 횟수
    pub persist_failures: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SyncStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 받은 행 중 저장된 비율 (%)
    pub fn persist_rate(&self) -> f64 {
        if self.rows_downloaded == 0 {
            0.0
        } else {
            (self.rows_persisted as f64 / self.rows_downloaded as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, ticker: &str) {
        tracing::info!(
            ticker = ticker,
            cycles = self.cycles,
            windows = self.windows,
            rows_downloaded = self.rows_downloaded,
            rows_persisted = self.rows_persisted,
            empty = self.empty,
            retries = self.retries,
            gaps = self.gaps,
            breaks = self.breaks,
            reordered = self.reordered,
            persist_failures = self.persist_failures,
            persist_rate = format!("{:.1}%", self.persist_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "동기화 종료"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_rate() {
        let mut stats = SyncStats::new();
        assert_eq!(stats.persist_rate(), 0.0);

        stats.rows_downloaded = 200;
        stats.rows_persisted = 150;
        assert!((stats.persist_rate() - 75.0).abs() < f64::EPSILON);
    }
}
