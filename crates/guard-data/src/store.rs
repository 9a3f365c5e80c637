//! 저장소 trait 정의.
//!
//! 모니터와 PnL 트래커는 이 trait들에만 의존하며, 운영 환경에서는
//! `PgStore`, 테스트에서는 `MemoryStore`가 주입됩니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guard_core::domain::{
    CloseReason, EncryptedCredential, ExecutionRecord, Position, Session, SessionAggregates,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::StoreResult;

/// 한 포지션의 미실현 손익 일괄 업데이트 항목.
#[derive(Debug, Clone)]
pub struct OpenPnlUpdate {
    /// 대상 포지션 ID
    pub position_id: Uuid,
    /// 최신 시장 가격
    pub current_price: Decimal,
    /// 수수료 차감 후 미실현 손익
    pub open_pnl: Decimal,
    /// 미실현 수익률 (%)
    pub open_pnl_pct: Decimal,
}

/// 포지션 저장소.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// 포지션 단건 조회.
    async fn position(&self, id: Uuid) -> StoreResult<Position>;

    /// 보호 조건(손절 또는 익절)이 설정된 모든 오픈 포지션 조회.
    ///
    /// 모니터 스윕의 대상 집합입니다.
    async fn open_protected_positions(&self) -> StoreResult<Vec<Position>>;

    /// 주어진 세션들이 소유한 모든 오픈 포지션 조회.
    async fn open_positions_for_owners(&self, owner_ids: &[Uuid]) -> StoreResult<Vec<Position>>;

    /// 새 포지션 삽입.
    async fn insert_position(&self, position: &Position) -> StoreResult<()>;

    /// 오픈 포지션의 손절 가격 갱신.
    ///
    /// 이미 종료된 포지션이면 `PositionNotOpen`을 반환합니다.
    async fn update_stop_loss(&self, id: Uuid, stop_loss: Decimal) -> StoreResult<()>;

    /// 포지션을 CLOSED로 전이.
    ///
    /// `WHERE status = 'OPEN'` 조건부 업데이트로, 0건이 적용되면
    /// `PositionNotOpen`을 반환해 중복 종료를 차단합니다.
    async fn close_position(
        &self,
        id: Uuid,
        exit_price: Decimal,
        realized_pnl: Decimal,
        reason: CloseReason,
        closed_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// 포지션을 ERROR로 전이 (거래소 주문 성공 후 기록 실패).
    async fn mark_error(&self, id: Uuid, note: &str) -> StoreResult<()>;

    /// 미실현 손익 일괄 갱신.
    ///
    /// 단일 트랜잭션으로 적용됩니다. 이미 종료된 포지션은 조용히
    /// 건너뜁니다.
    async fn apply_open_pnl(&self, updates: &[OpenPnlUpdate]) -> StoreResult<()>;

    /// 청산 시도 감사 기록 추가.
    async fn record_execution(&self, record: &ExecutionRecord) -> StoreResult<()>;

    /// 소유자의 모든 종료 포지션 실현 손익 합산.
    ///
    /// 수동 청산 후 세션 실현 손익을 전체 재합산할 때 사용합니다.
    async fn sum_closed_realized_pnl(&self, owner_id: Uuid) -> StoreResult<Decimal>;
}

/// 세션 저장소.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 세션 단건 조회.
    async fn session(&self, id: Uuid) -> StoreResult<Session>;

    /// 활성 상태인 모든 세션 ID 조회.
    async fn active_session_ids(&self) -> StoreResult<Vec<Uuid>>;

    /// 세션 표시용 집계 갱신 (open_pnl, total_pnl, roi).
    async fn update_aggregates(&self, aggregates: &SessionAggregates) -> StoreResult<()>;

    /// 세션 실현 손익 갱신.
    async fn update_realized_pnl(&self, id: Uuid, realized_pnl: Decimal) -> StoreResult<()>;
}

/// API 자격증명 저장소.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 사용자의 특정 거래소 활성 자격증명 조회.
    ///
    /// 없으면 `Ok(None)`을 반환합니다.
    async fn active_credential(
        &self,
        user_id: Uuid,
        exchange: &str,
    ) -> StoreResult<Option<EncryptedCredential>>;
}
