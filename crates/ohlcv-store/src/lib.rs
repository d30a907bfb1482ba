//! 캔들 저장.
//!
//! 이 crate는 다음을 제공합니다:
//! - CandleStore trait: 테이블 준비, 체크포인트 조회, 멱등 추가
//! - SQLite 저장소 (통화쌍별 파일, 잠금 재시도)
//! - 메모리 저장소 (테스트용)

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{DataError, Result};
pub use memory::MemoryCandleStore;
pub use sqlite::{pair_db_path, SqliteCandleStore, StorageLocation};
pub use traits::CandleStore;
