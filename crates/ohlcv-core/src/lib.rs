//! # OHLCV Core
//!
//! 윈도우 기반 증분 캔들 동기화 엔진의 핵심 타입과 순수 알고리즘을 제공합니다:
//! - 타임프레임, 캔들, 티커 식별자
//! - 타임프레임 정렬 날짜 연산
//! - 조회 윈도우 계획
//! - 티커별 동기화 상태와 일관성 검사
//! - 설정 관리
//! - 로깅 인프라

pub mod calendar;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod sync_state;
pub mod types;
pub mod window;

pub use calendar::{align, date_from_ymd, is_aligned, next_boundary, offset, step_count};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use error::*;
pub use logging::*;
pub use sync_state::{classify_start, consecutive_breaks, StartMatch, SyncState};
pub use types::*;
pub use window::{most_recent_windows, next_window_from, plan_windows, Window};
