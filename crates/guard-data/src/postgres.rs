//! PostgreSQL 저장소 구현.
//!
//! 도메인 enum은 DB에 텍스트로 저장되며, 행 구조체(`*Row`)에서
//! `TryFrom`으로 도메인 타입으로 변환합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guard_core::config::DatabaseConfig;
use guard_core::domain::{
    CloseReason, Direction, EncryptedCredential, ExecutionRecord, Position, PositionStatus,
    Session, SessionAggregates, SessionStatus,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::{CredentialStore, OpenPnlUpdate, PositionStore, SessionStore};

/// positions 테이블의 행 표현.
#[derive(Debug, Clone, FromRow)]
struct PositionRow {
    id: Uuid,
    owner_id: Uuid,
    exchange: String,
    symbol: String,
    direction: String,
    entry_price: Decimal,
    quantity: Decimal,
    current_price: Decimal,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    status: String,
    close_reason: Option<String>,
    exit_price: Option<Decimal>,
    realized_pnl: Option<Decimal>,
    open_pnl: Decimal,
    open_pnl_pct: Decimal,
    opened_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
}

impl TryFrom<PositionRow> for Position {
    type Error = StoreError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |detail: String| StoreError::Corrupt { id, detail };

        let direction: Direction = row.direction.parse().map_err(corrupt)?;
        let status: PositionStatus = row.status.parse().map_err(corrupt)?;
        let close_reason = row
            .close_reason
            .as_deref()
            .map(|s| s.parse::<CloseReason>())
            .transpose()
            .map_err(corrupt)?;

        Ok(Position {
            id: row.id,
            owner_id: row.owner_id,
            exchange: row.exchange,
            symbol: row.symbol,
            direction,
            entry_price: row.entry_price,
            quantity: row.quantity,
            current_price: row.current_price,
            stop_loss: row.stop_loss,
            take_profit: row.take_profit,
            status,
            close_reason,
            exit_price: row.exit_price,
            realized_pnl: row.realized_pnl,
            open_pnl: row.open_pnl,
            open_pnl_pct: row.open_pnl_pct,
            opened_at: row.opened_at,
            updated_at: row.updated_at,
            closed_at: row.closed_at,
            notes: row.notes,
        })
    }
}

/// sessions 테이블의 행 표현.
#[derive(Debug, Clone, FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    start_capital: Decimal,
    current_balance: Decimal,
    realized_pnl: Decimal,
    open_pnl: Decimal,
    total_pnl: Decimal,
    roi: Decimal,
    status: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status: SessionStatus = row.status.parse().map_err(|detail| StoreError::Corrupt {
            id: row.id,
            detail,
        })?;

        Ok(Session {
            id: row.id,
            user_id: row.user_id,
            start_capital: row.start_capital,
            current_balance: row.current_balance,
            realized_pnl: row.realized_pnl,
            open_pnl: row.open_pnl,
            total_pnl: row.total_pnl,
            roi: row.roi,
            status,
            updated_at: row.updated_at,
        })
    }
}

/// api_credentials 테이블의 행 표현.
#[derive(Debug, Clone, FromRow)]
struct CredentialRow {
    id: Uuid,
    user_id: Uuid,
    exchange: String,
    api_key_enc: String,
    api_secret_enc: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<CredentialRow> for EncryptedCredential {
    fn from(row: CredentialRow) -> Self {
        EncryptedCredential {
            id: row.id,
            user_id: row.user_id,
            exchange: row.exchange,
            api_key_enc: row.api_key_enc,
            api_secret_enc: row.api_secret_enc,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL 기반 저장소.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// 기존 커넥션 풀로 저장소를 생성합니다.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 설정으로 커넥션 풀을 만들어 저장소를 생성합니다.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    /// 내부 커넥션 풀 참조.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PositionStore for PgStore {
    async fn position(&self, id: Uuid) -> StoreResult<Position> {
        let row = sqlx::query_as::<_, PositionRow>("SELECT * FROM positions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        row.try_into()
    }

    async fn open_protected_positions(&self) -> StoreResult<Vec<Position>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT * FROM positions
            WHERE status = 'OPEN'
              AND stop_loss IS NOT NULL
              AND take_profit IS NOT NULL
            ORDER BY opened_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Position::try_from).collect()
    }

    async fn open_positions_for_owners(&self, owner_ids: &[Uuid]) -> StoreResult<Vec<Position>> {
        if owner_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT * FROM positions
            WHERE status = 'OPEN' AND owner_id = ANY($1)
            ORDER BY opened_at
            "#,
        )
        .bind(owner_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Position::try_from).collect()
    }

    async fn insert_position(&self, position: &Position) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, owner_id, exchange, symbol, direction,
                entry_price, quantity, current_price, stop_loss, take_profit,
                status, open_pnl, open_pnl_pct, opened_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(position.id)
        .bind(position.owner_id)
        .bind(&position.exchange)
        .bind(&position.symbol)
        .bind(position.direction.to_string())
        .bind(position.entry_price)
        .bind(position.quantity)
        .bind(position.current_price)
        .bind(position.stop_loss)
        .bind(position.take_profit)
        .bind(position.status.to_string())
        .bind(position.open_pnl)
        .bind(position.open_pnl_pct)
        .bind(position.opened_at)
        .bind(position.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_stop_loss(&self, id: Uuid, stop_loss: Decimal) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET stop_loss = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'OPEN'
            "#,
        )
        .bind(id)
        .bind(stop_loss)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PositionNotOpen(id));
        }
        Ok(())
    }

    async fn close_position(
        &self,
        id: Uuid,
        exit_price: Decimal,
        realized_pnl: Decimal,
        reason: CloseReason,
        closed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        // OPEN 조건부 업데이트: 0건이면 다른 경로가 이미 종료한 것
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET
                status = 'CLOSED',
                close_reason = $2,
                exit_price = $3,
                realized_pnl = $4,
                open_pnl = 0,
                open_pnl_pct = 0,
                closed_at = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'OPEN'
            "#,
        )
        .bind(id)
        .bind(reason.to_string())
        .bind(exit_price)
        .bind(realized_pnl)
        .bind(closed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PositionNotOpen(id));
        }
        Ok(())
    }

    async fn mark_error(&self, id: Uuid, note: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET status = 'ERROR', notes = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'OPEN'
            "#,
        )
        .bind(id)
        .bind(note)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PositionNotOpen(id));
        }
        Ok(())
    }

    async fn apply_open_pnl(&self, updates: &[OpenPnlUpdate]) -> StoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for update in updates {
            // 종료된 포지션은 조건에 걸리지 않아 조용히 건너뜀
            sqlx::query(
                r#"
                UPDATE positions
                SET
                    current_price = $2,
                    open_pnl = $3,
                    open_pnl_pct = $4,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'OPEN'
                "#,
            )
            .bind(update.position_id)
            .bind(update.current_price)
            .bind(update.open_pnl)
            .bind(update.open_pnl_pct)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                id, position_id, exchange, symbol, side,
                amount, requested_price, exchange_order_id, pnl,
                outcome, reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(record.position_id)
        .bind(&record.exchange)
        .bind(&record.symbol)
        .bind(record.side.to_string())
        .bind(record.amount)
        .bind(record.requested_price)
        .bind(&record.exchange_order_id)
        .bind(record.pnl)
        .bind(record.outcome.to_string())
        .bind(record.reason.to_string())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn sum_closed_realized_pnl(&self, owner_id: Uuid) -> StoreResult<Decimal> {
        let (total,): (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(realized_pnl), 0) FROM positions
            WHERE owner_id = $1 AND status = 'CLOSED'
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn session(&self, id: Uuid) -> StoreResult<Session> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        row.try_into()
    }

    async fn active_session_ids(&self) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM sessions WHERE status = 'active'")
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn update_aggregates(&self, aggregates: &SessionAggregates) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET open_pnl = $2, total_pnl = $3, roi = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(aggregates.session_id)
        .bind(aggregates.open_pnl)
        .bind(aggregates.total_pnl)
        .bind(aggregates.roi)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(aggregates.session_id));
        }
        Ok(())
    }

    async fn update_realized_pnl(&self, id: Uuid, realized_pnl: Decimal) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET realized_pnl = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(realized_pnl)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn active_credential(
        &self,
        user_id: Uuid,
        exchange: &str,
    ) -> StoreResult<Option<EncryptedCredential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT id, user_id, exchange, api_key_enc, api_secret_enc, is_active, created_at
            FROM api_credentials
            WHERE user_id = $1 AND exchange = $2 AND is_active = TRUE
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(exchange)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EncryptedCredential::from))
    }
}
