//! 동기화 엔진 전반에서 사용되는 공통 타입.

mod candle;
mod ticker;
mod timeframe;

pub use candle::*;
pub use ticker::*;
pub use timeframe::*;
