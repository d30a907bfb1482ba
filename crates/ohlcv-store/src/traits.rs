//! 캔들 저장소 추상화.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_core::{Candle, Checkpoint, TickerId};

/// 티커별 캔들 시계열 저장소.
///
/// 저장소에 기록된 체크포인트가 동기화 진행 상태의 기준입니다.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// 티커 테이블이 없으면 만듭니다.
    async fn ensure_table(&self, ticker: &TickerId) -> Result<()>;

    /// 마지막 저장 시각과 행 ID. 테이블이 없거나 비어 있으면 빈 체크포인트.
    async fn last_checkpoint(&self, ticker: &TickerId) -> Result<Checkpoint>;

    /// ID가 부여된 행들을 한 트랜잭션으로 추가합니다.
    ///
    /// 같은 시각의 행이 이미 있으면 건너뜁니다. 실제로 추가된 행 수를 반환합니다.
    ///
    /// # Errors
    /// 빈 목록이면 `DataError::EmptyWriteRejected`.
    async fn append_rows(&self, ticker: &TickerId, rows: &[Candle]) -> Result<u64>;

    /// `from` 이후(포함) 행을 오름차순으로 최대 `limit`개 조회합니다.
    async fn load_rows(
        &self,
        ticker: &TickerId,
        from: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>>;
}
