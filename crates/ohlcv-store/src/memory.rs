//! 프로세스 메모리 캔들 저장소 (테스트용).
//!
//! SQLite 저장소와 같은 규칙(시각 중복 무시, ID 중복 거부, 빈 쓰기 거부)을 따르며,
//! 쓰기 실패를 강제로 발생시킬 수 있습니다.

use crate::error::{DataError, Result};
use crate::traits::CandleStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_core::{Candle, Checkpoint, TickerId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;

type Table = BTreeMap<DateTime<Utc>, Candle>;

/// 메모리 캔들 저장소.
#[derive(Debug, Default)]
pub struct MemoryCandleStore {
    tables: RwLock<HashMap<String, Table>>,
    fail_appends: AtomicBool,
    append_calls: AtomicU32,
}

impl MemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후의 `append_rows` 호출을 실패시킵니다.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn append_calls(&self) -> u32 {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// 테이블의 모든 행 (오름차순).
    pub async fn rows(&self, ticker: &TickerId) -> Vec<Candle> {
        self.tables
            .read()
            .await
            .get(&ticker.key())
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 기존 행을 직접 넣습니다. 체크포인트 회귀 같은 외부 변경을 재현할 때 사용합니다.
    pub async fn replace_rows(&self, ticker: &TickerId, rows: Vec<Candle>) {
        let table = rows.into_iter().map(|r| (r.open_time, r)).collect();
        self.tables.write().await.insert(ticker.key(), table);
    }
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn ensure_table(&self, ticker: &TickerId) -> Result<()> {
        self.tables.write().await.entry(ticker.key()).or_default();
        Ok(())
    }

    async fn last_checkpoint(&self, ticker: &TickerId) -> Result<Checkpoint> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&ticker.key()) else {
            return Ok(Checkpoint::default());
        };
        let last_ts = table.keys().next_back().copied();
        let last_id = table.values().filter_map(|r| r.sequence_id).max();
        Ok(Checkpoint { last_ts, last_id })
    }

    async fn append_rows(&self, ticker: &TickerId, rows: &[Candle]) -> Result<u64> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if rows.is_empty() {
            return Err(DataError::EmptyWriteRejected(ticker.key()));
        }
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(DataError::InsertError("simulated write failure".to_string()));
        }

        if let Some(row) = rows.iter().find(|r| r.sequence_id.is_none()) {
            return Err(DataError::InvalidData(format!(
                "행 ID가 없습니다: {}",
                row.open_time
            )));
        }

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&ticker.key())
            .ok_or_else(|| DataError::NotFound(ticker.key()))?;

        // 기본 키 충돌은 배치 전체를 거부 (SQLite 트랜잭션 롤백과 동일)
        let mut ids: HashSet<i64> = table.values().filter_map(|r| r.sequence_id).collect();
        let mut fresh: BTreeMap<DateTime<Utc>, &Candle> = BTreeMap::new();
        for row in rows {
            if table.contains_key(&row.open_time) || fresh.contains_key(&row.open_time) {
                continue;
            }
            if let Some(id) = row.sequence_id {
                if !ids.insert(id) {
                    return Err(DataError::InsertError(format!(
                        "UNIQUE constraint failed: id {} ({})",
                        id, row.open_time
                    )));
                }
            }
            fresh.insert(row.open_time, row);
        }

        let inserted = fresh.len() as u64;
        for (ts, row) in fresh {
            table.insert(ts, row.clone());
        }
        Ok(inserted)
    }

    async fn load_rows(
        &self,
        ticker: &TickerId,
        from: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&ticker.key()) else {
            return Ok(Vec::new());
        };
        Ok(table
            .values()
            .filter(|row| from.map_or(true, |from| row.open_time >= from))
            .take(limit)
            .cloned()
            .collect())
    }
}
