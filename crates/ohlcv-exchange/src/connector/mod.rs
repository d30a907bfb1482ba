//! 거래소 커넥터.

pub mod binance;
pub mod bitfinex;

pub use binance::*;
pub use bitfinex::*;
