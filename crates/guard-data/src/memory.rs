//! 테스트용 인메모리 저장소.
//!
//! DB 없이 모니터/트래커 로직을 검증할 때 사용합니다. 의미는 `PgStore`와
//! 동일합니다: 종료는 OPEN 조건부이며, 손익 일괄 갱신은 종료된 포지션을
//! 건너뜁니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guard_core::domain::{
    CloseReason, EncryptedCredential, ExecutionRecord, Position, PositionStatus, Session,
    SessionAggregates, SessionStatus,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::{CredentialStore, OpenPnlUpdate, PositionStore, SessionStore};

/// 인메모리 저장소.
#[derive(Default)]
pub struct MemoryStore {
    positions: Mutex<HashMap<Uuid, Position>>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    credentials: Mutex<Vec<EncryptedCredential>>,
    executions: Mutex<Vec<ExecutionRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후 쓰기 작업을 모두 실패시킵니다 (장애 주입).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 세션을 직접 삽입합니다.
    pub fn put_session(&self, session: Session) {
        self.sessions.lock().unwrap().insert(session.id, session);
    }

    /// 자격증명을 직접 삽입합니다.
    pub fn put_credential(&self, credential: EncryptedCredential) {
        self.credentials.lock().unwrap().push(credential);
    }

    /// 기록된 청산 시도 스냅샷.
    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.executions.lock().unwrap().clone()
    }

    /// 포지션 스냅샷 (테스트 검증용).
    pub fn position_snapshot(&self, id: Uuid) -> Option<Position> {
        self.positions.lock().unwrap().get(&id).cloned()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn position(&self, id: Uuid) -> StoreResult<Position> {
        self.positions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn open_protected_positions(&self) -> StoreResult<Vec<Position>> {
        let mut positions: Vec<Position> = self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_fully_protected())
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.opened_at);
        Ok(positions)
    }

    async fn open_positions_for_owners(&self, owner_ids: &[Uuid]) -> StoreResult<Vec<Position>> {
        let mut positions: Vec<Position> = self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_open() && owner_ids.contains(&p.owner_id))
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.opened_at);
        Ok(positions)
    }

    async fn insert_position(&self, position: &Position) -> StoreResult<()> {
        self.check_writable()?;
        self.positions
            .lock()
            .unwrap()
            .insert(position.id, position.clone());
        Ok(())
    }

    async fn update_stop_loss(&self, id: Uuid, stop_loss: Decimal) -> StoreResult<()> {
        self.check_writable()?;
        let mut positions = self.positions.lock().unwrap();
        match positions.get_mut(&id) {
            Some(p) if p.is_open() => {
                p.stop_loss = Some(stop_loss);
                p.updated_at = Utc::now();
                Ok(())
            }
            Some(_) => Err(StoreError::PositionNotOpen(id)),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn close_position(
        &self,
        id: Uuid,
        exit_price: Decimal,
        realized_pnl: Decimal,
        reason: CloseReason,
        closed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.check_writable()?;
        let mut positions = self.positions.lock().unwrap();
        match positions.get_mut(&id) {
            Some(p) if p.is_open() => {
                p.status = PositionStatus::Closed;
                p.close_reason = Some(reason);
                p.exit_price = Some(exit_price);
                p.realized_pnl = Some(realized_pnl);
                p.open_pnl = Decimal::ZERO;
                p.open_pnl_pct = Decimal::ZERO;
                p.closed_at = Some(closed_at);
                p.updated_at = Utc::now();
                Ok(())
            }
            Some(_) => Err(StoreError::PositionNotOpen(id)),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn mark_error(&self, id: Uuid, note: &str) -> StoreResult<()> {
        let mut positions = self.positions.lock().unwrap();
        match positions.get_mut(&id) {
            Some(p) if p.is_open() => {
                p.status = PositionStatus::Error;
                p.notes = Some(note.to_string());
                p.updated_at = Utc::now();
                Ok(())
            }
            Some(_) => Err(StoreError::PositionNotOpen(id)),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn apply_open_pnl(&self, updates: &[OpenPnlUpdate]) -> StoreResult<()> {
        self.check_writable()?;
        let mut positions = self.positions.lock().unwrap();
        for update in updates {
            if let Some(p) = positions.get_mut(&update.position_id) {
                if p.is_open() {
                    p.current_price = update.current_price;
                    p.open_pnl = update.open_pnl;
                    p.open_pnl_pct = update.open_pnl_pct;
                    p.updated_at = Utc::now();
                }
            }
        }
        Ok(())
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> StoreResult<()> {
        self.executions.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn sum_closed_realized_pnl(&self, owner_id: Uuid) -> StoreResult<Decimal> {
        let total = self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.owner_id == owner_id && p.status == PositionStatus::Closed)
            .filter_map(|p| p.realized_pnl)
            .sum();
        Ok(total)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn session(&self, id: Uuid) -> StoreResult<Session> {
        self.sessions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn active_session_ids(&self) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .map(|s| s.id)
            .collect())
    }

    async fn update_aggregates(&self, aggregates: &SessionAggregates) -> StoreResult<()> {
        self.check_writable()?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&aggregates.session_id)
            .ok_or(StoreError::NotFound(aggregates.session_id))?;
        session.open_pnl = aggregates.open_pnl;
        session.total_pnl = aggregates.total_pnl;
        session.roi = aggregates.roi;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn update_realized_pnl(&self, id: Uuid, realized_pnl: Decimal) -> StoreResult<()> {
        self.check_writable()?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        session.realized_pnl = realized_pnl;
        session.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn active_credential(
        &self,
        user_id: Uuid,
        exchange: &str,
    ) -> StoreResult<Option<EncryptedCredential>> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id && c.exchange == exchange && c.is_active)
            .max_by_key(|c| c.created_at)
            .cloned())
    }
}
