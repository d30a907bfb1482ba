//! SQLite 캔들 저장소.
//!
//! 통화쌍마다 파일 하나를 사용하고, 그 안에 (거래소, 자산 유형, 타임프레임)별
//! 테이블을 둡니다.
//!
//! ```text
//! <root>/<exchange>/<BASE>_<QUOTE>/<exchange>_<BASE>_<QUOTE>.db
//!   └─ binance_spot_BTC_USDT_1h (id, ts, date, open, high, low, close, volume)
//! ```
//!
//! # 동작 방식
//!
//! 1. `ts`(밀리초)에 UNIQUE 제약, `ON CONFLICT(ts) DO NOTHING`으로 멱등 추가
//! 2. 한 묶음은 하나의 트랜잭션
//! 3. 잠금 에러(SQLITE_BUSY / SQLITE_LOCKED)는 1초 간격으로 최대 10회 재시도
//! 4. 가격/거래량은 정밀도 손실이 없도록 TEXT로 저장

use crate::error::{DataError, Result};
use crate::traits::CandleStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ohlcv_core::{Candle, Checkpoint, StorageConfig, TickerId};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// 잠금 재시도 간격 기본값.
pub const DEFAULT_BUSY_DELAY: Duration = Duration::from_secs(1);

/// 저장 위치.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// 통화쌍별 파일을 둘 루트 디렉터리
    Directory(PathBuf),
    /// 프로세스 메모리 (테스트용, 모든 티커가 하나의 DB 공유)
    Memory,
}

#[derive(Debug, FromRow)]
struct CandleRow {
    id: i64,
    ts: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

impl CandleRow {
    fn into_candle(self) -> Result<Candle> {
        let parse = |s: &str| {
            Decimal::from_str(s).map_err(|e| DataError::InvalidData(format!("{}: {}", s, e)))
        };
        let open_time = DateTime::from_timestamp_millis(self.ts)
            .ok_or_else(|| DataError::InvalidData(format!("잘못된 시각: {}", self.ts)))?;
        let mut candle = Candle::new(
            open_time,
            parse(&self.open)?,
            parse(&self.high)?,
            parse(&self.low)?,
            parse(&self.close)?,
            parse(&self.volume)?,
        );
        candle.sequence_id = Some(self.id);
        Ok(candle)
    }
}

/// SQLite 캔들 저장소.
pub struct SqliteCandleStore {
    location: StorageLocation,
    busy_retries: u32,
    busy_delay: Duration,
    pools: Mutex<HashMap<PathBuf, SqlitePool>>,
}

impl SqliteCandleStore {
    /// 디렉터리 기반 저장소를 생성합니다. 파일은 처음 사용할 때 만들어집니다.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            location: StorageLocation::Directory(root_dir.into()),
            busy_retries: 10,
            busy_delay: DEFAULT_BUSY_DELAY,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// 메모리 저장소를 생성합니다.
    pub fn in_memory() -> Self {
        Self {
            location: StorageLocation::Memory,
            ..Self::new(PathBuf::new())
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.root_dir.clone()).with_busy_retries(config.busy_retries)
    }

    pub fn with_busy_retries(mut self, retries: u32) -> Self {
        self.busy_retries = retries.max(1);
        self
    }

    pub fn with_busy_delay(mut self, delay: Duration) -> Self {
        self.busy_delay = delay;
        self
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// 티커가 저장될 파일 경로. 메모리 저장소는 `None`.
    pub fn db_path(&self, ticker: &TickerId) -> Option<PathBuf> {
        match &self.location {
            StorageLocation::Directory(root) => Some(pair_db_path(root, ticker)),
            StorageLocation::Memory => None,
        }
    }

    /// 티커 파일의 연결 풀을 가져오거나 새로 엽니다.
    async fn pool(&self, ticker: &TickerId) -> Result<SqlitePool> {
        let key = self.db_path(ticker).unwrap_or_default();
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(&key) {
            return Ok(pool.clone());
        }

        let pool = match &self.location {
            StorageLocation::Memory => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(|e| DataError::ConnectionError(e.to_string()))?,
            StorageLocation::Directory(_) => {
                if let Some(parent) = key.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let options = SqliteConnectOptions::new()
                    .filename(&key)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(Duration::from_secs(5));
                let pool = SqlitePoolOptions::new()
                    .max_connections(4)
                    .connect_with(options)
                    .await
                    .map_err(|e| DataError::ConnectionError(e.to_string()))?;
                info!(path = %key.display(), "SQLite 파일 연결");
                pool
            }
        };

        pools.insert(key, pool.clone());
        Ok(pool)
    }

    async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_one(pool)
                .await?;
        Ok(count > 0)
    }

    async fn insert_batch(
        pool: &SqlitePool,
        table: &str,
        rows: &[Candle],
    ) -> std::result::Result<u64, sqlx::Error> {
        let sql = format!(
            "INSERT INTO {} (id, ts, date, open, high, low, close, volume) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT(ts) DO NOTHING",
            quote_ident(table)
        );

        let mut tx = pool.begin().await?;
        let mut inserted = 0;
        for row in rows {
            let result = sqlx::query(&sql)
                .bind(row.sequence_id)
                .bind(row.timestamp_ms())
                .bind(row.open_time.format("%Y-%m-%d %H:%M:%S").to_string())
                .bind(row.open.to_string())
                .bind(row.high.to_string())
                .bind(row.low.to_string())
                .bind(row.close.to_string())
                .bind(row.volume.to_string())
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

#[async_trait]
impl CandleStore for SqliteCandleStore {
    #[instrument(skip(self), fields(table = %ticker.key()))]
    async fn ensure_table(&self, ticker: &TickerId) -> Result<()> {
        let table = table_name(ticker)?;
        let pool = self.pool(ticker).await?;
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                ts INTEGER NOT NULL UNIQUE,
                date TEXT NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL
            )
            "#,
            quote_ident(&table)
        );
        sqlx::query(&sql).execute(&pool).await?;
        debug!("테이블 확인");
        Ok(())
    }

    #[instrument(skip(self), fields(table = %ticker.key()))]
    async fn last_checkpoint(&self, ticker: &TickerId) -> Result<Checkpoint> {
        let table = table_name(ticker)?;
        let pool = self.pool(ticker).await?;
        if !Self::table_exists(&pool, &table).await? {
            return Ok(Checkpoint::default());
        }

        // 다음 ID는 기존 최대 ID 뒤에서 시작해야 기본 키와 충돌하지 않음
        let sql = format!("SELECT MAX(id), MAX(ts) FROM {}", quote_ident(&table));
        let (id, ts): (Option<i64>, Option<i64>) = sqlx::query_as(&sql).fetch_one(&pool).await?;

        match (id, ts) {
            (Some(id), Some(ts)) => {
                let ts = DateTime::from_timestamp_millis(ts)
                    .ok_or_else(|| DataError::InvalidData(format!("잘못된 시각: {}", ts)))?;
                Ok(Checkpoint::new(ts, id))
            }
            _ => Ok(Checkpoint::default()),
        }
    }

    #[instrument(skip(self, rows), fields(table = %ticker.key(), count = rows.len()))]
    async fn append_rows(&self, ticker: &TickerId, rows: &[Candle]) -> Result<u64> {
        if rows.is_empty() {
            return Err(DataError::EmptyWriteRejected(ticker.key()));
        }
        if let Some(row) = rows.iter().find(|r| r.sequence_id.is_none()) {
            return Err(DataError::InvalidData(format!(
                "행 ID가 없습니다: {}",
                row.open_time
            )));
        }

        let table = table_name(ticker)?;
        let pool = self.pool(ticker).await?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            match Self::insert_batch(&pool, &table, rows).await {
                Ok(inserted) => {
                    debug!(inserted, "캔들 저장");
                    return Ok(inserted);
                }
                Err(e) if is_busy(&e) => {
                    if attempts >= self.busy_retries {
                        return Err(DataError::StorageBusy {
                            key: ticker.key(),
                            attempts,
                        });
                    }
                    warn!(attempts, "저장소 잠김, 재시도: {}", e);
                    tokio::time::sleep(self.busy_delay).await;
                }
                Err(e) => return Err(DataError::InsertError(e.to_string())),
            }
        }
    }

    #[instrument(skip(self), fields(table = %ticker.key()))]
    async fn load_rows(
        &self,
        ticker: &TickerId,
        from: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let table = table_name(ticker)?;
        let pool = self.pool(ticker).await?;
        if !Self::table_exists(&pool, &table).await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, ts, open, high, low, close, volume FROM {} \
             WHERE ts >= ? ORDER BY ts ASC LIMIT ?",
            quote_ident(&table)
        );
        let records: Vec<CandleRow> = sqlx::query_as(&sql)
            .bind(from.map_or(i64::MIN, |t| t.timestamp_millis()))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&pool)
            .await?;

        records.into_iter().map(CandleRow::into_candle).collect()
    }
}

/// `<root>/<exchange>/<BASE>_<QUOTE>/<exchange>_<BASE>_<QUOTE>.db`
pub fn pair_db_path(root: &Path, ticker: &TickerId) -> PathBuf {
    let pair = format!("{}_{}", ticker.base, ticker.quote);
    root.join(&ticker.exchange)
        .join(&pair)
        .join(format!("{}_{}.db", ticker.exchange, pair))
}

/// 테이블 이름으로 쓸 수 있는 키인지 확인합니다.
fn table_name(ticker: &TickerId) -> Result<String> {
    let key = ticker.key();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DataError::InvalidData(format!("잘못된 테이블 이름: {}", key)));
    }
    Ok(key)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

/// SQLITE_BUSY(5) / SQLITE_LOCKED(6) 및 확장 코드.
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ohlcv_core::{AssetClass, Timeframe};

    #[test]
    fn test_pair_db_path() {
        let ticker = TickerId::new("binance", "btc", "usdt", AssetClass::Spot, Timeframe::Hour);
        let path = pair_db_path(Path::new("db"), &ticker);
        assert_eq!(
            path,
            Path::new("db/binance/BTC_USDT/binance_BTC_USDT.db").to_path_buf()
        );
    }

    #[test]
    fn test_table_name_validation() {
        let ok = TickerId::new("binance", "BTC", "USDT", AssetClass::Spot, Timeframe::Day);
        assert_eq!(table_name(&ok).unwrap(), "binance_spot_BTC_USDT_1d");

        let bad = TickerId::new("bin\"ance", "BTC", "USDT", AssetClass::Spot, Timeframe::Day);
        assert!(matches!(table_name(&bad), Err(DataError::InvalidData(_))));
    }
}
