//! 테스트와 모의 실행을 위한 시뮬레이션 거래소.
//!
//! 실제 거래소 없이 동기화 엔진 전체를 구동할 수 있도록 결정적인 캔들 시계열과
//! 스크립트된 장애를 제공합니다.
//!
//! # 예제
//!
//! ```ignore
//! use ohlcv_exchange::simulated::SimulatedFetcher;
//!
//! let sim = SimulatedFetcher::new("sim")
//!     .with_listing(listing)
//!     .with_clock(clock.clone());
//! sim.push_error(ExchangeError::RateLimited);
//! ```

mod fetcher;

pub use fetcher::{FetchRequest, SimulatedFetcher};
