//! 페이퍼 트레이딩 세션 집계.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 세션 생명주기 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// PnL 추적 대상 활성 세션
    Active,
    /// 일시 정지
    Paused,
    /// 종료됨
    Stopped,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "paused" => Ok(SessionStatus::Paused),
            "stopped" => Ok(SessionStatus::Stopped),
            other => Err(format!("Unknown session status: {}", other)),
        }
    }
}

/// 페이퍼 트레이딩 세션.
///
/// 포지션들을 소유하는 계좌 유사 집계입니다. `open_pnl`/`total_pnl`/`roi`는
/// PnlTracker가 틱마다 재계산하는 표시용 값으로, 자금 이동에는 사용되지
/// 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// 세션 ID
    pub id: Uuid,
    /// 세션 소유 사용자
    pub user_id: Uuid,
    /// 시작 자본
    pub start_capital: Decimal,
    /// 현재 잔고
    pub current_balance: Decimal,
    /// 실현 손익 (종료된 포지션 합계)
    pub realized_pnl: Decimal,
    /// 미실현 손익 (오픈 포지션 합계)
    pub open_pnl: Decimal,
    /// 총 손익 (실현 + 미실현)
    pub total_pnl: Decimal,
    /// 수익률 (%)
    pub roi: Decimal,
    /// 세션 상태
    pub status: SessionStatus,
    /// 마지막 업데이트 시각
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// 시작 자본으로 새 세션을 생성합니다.
    pub fn new(user_id: Uuid, start_capital: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            start_capital,
            current_balance: start_capital,
            realized_pnl: Decimal::ZERO,
            open_pnl: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            roi: Decimal::ZERO,
            status: SessionStatus::Active,
            updated_at: Utc::now(),
        }
    }

    /// 미실현 손익 합계로부터 집계 값을 계산합니다.
    ///
    /// `roi = total_pnl / start_capital * 100`. 시작 자본이 0이면 ROI는 0.
    pub fn aggregates_with(&self, open_pnl: Decimal) -> SessionAggregates {
        let total_pnl = self.realized_pnl + open_pnl;
        let roi = if self.start_capital.is_zero() {
            Decimal::ZERO
        } else {
            total_pnl / self.start_capital * Decimal::from(100)
        };
        SessionAggregates {
            session_id: self.id,
            open_pnl,
            total_pnl,
            roi,
        }
    }
}

/// 한 틱에서 재계산된 세션 집계 값.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAggregates {
    /// 대상 세션 ID
    pub session_id: Uuid,
    /// 미실현 손익 합계
    pub open_pnl: Decimal,
    /// 총 손익
    pub total_pnl: Decimal,
    /// 수익률 (%)
    pub roi: Decimal,
}
