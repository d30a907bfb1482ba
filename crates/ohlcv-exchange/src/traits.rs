//! 원격 캔들 조회 추상화.

use crate::ExchangeError;
use async_trait::async_trait;
use ohlcv_core::{Candle, Timeframe};

/// 거래소 작업 결과 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 요청당 최대 행 수를 밝히지 않은 조회자의 기본값.
pub const DEFAULT_MAX_LIMIT: u32 = 1000;

/// 한 번의 제한된 캔들 조회를 수행하는 원격 조회자.
///
/// 구현체는 타임아웃, 거래소 에러, 네트워크 에러, 요청 한도 초과를
/// 서로 다른 `ExchangeError`로 구분해서 반환해야 합니다.
#[async_trait]
pub trait CandleFetcher: Send + Sync {
    /// 조회자 이름 (로그용).
    fn name(&self) -> &str;

    /// 요청 한 번에 받을 수 있는 최대 행 수.
    fn max_limit(&self) -> u32 {
        DEFAULT_MAX_LIMIT
    }

    /// API 세션이 정상인지 확인합니다.
    async fn test_connection(&self) -> ExchangeResult<()>;

    /// `since_ms` 이후(포함)의 캔들을 최대 `limit`개 오름차순으로 조회합니다.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: u32,
    ) -> ExchangeResult<Vec<Candle>>;
}
