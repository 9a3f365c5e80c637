//! # guard-data
//!
//! 포지션 가드의 영속화 계층입니다.
//!
//! 저장소는 trait로 정의되며, PostgreSQL 구현(`PgStore`)과 테스트용
//! 인메모리 구현(`MemoryStore`)을 제공합니다. 상위 계층(모니터, PnL
//! 트래커)은 trait에만 의존합니다.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{CredentialStore, OpenPnlUpdate, PositionStore, SessionStore};
