//! 저장소 오류 타입.

use uuid::Uuid;

/// 저장소 작업 결과.
pub type StoreResult<T> = Result<T, StoreError>;

/// 영속화 계층에서 발생하는 오류.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 데이터베이스 오류
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 레코드를 찾을 수 없음
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    /// 종료 조건부 업데이트가 0건에 적용됨.
    /// 다른 경로가 이미 포지션을 종료했음을 의미합니다.
    #[error("Position is not open: {0}")]
    PositionNotOpen(Uuid),

    /// 저장된 값이 도메인 타입으로 변환되지 않음
    #[error("Corrupt record {id}: {detail}")]
    Corrupt { id: Uuid, detail: String },
}

impl StoreError {
    /// 일시적 오류 여부 (재시도 가능).
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }

    /// 이미 종료된 포지션에 대한 중복 종료 시도 여부.
    pub fn is_already_closed(&self) -> bool {
        matches!(self, StoreError::PositionNotOpen(_))
    }
}
