//! 청산 시도 감사 로그.

use crate::domain::{CloseReason, Direction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 청산 시도 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    /// 주문 및 기록 성공
    Success,
    /// 주문 제출 실패
    Failed,
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionOutcome::Success => write!(f, "SUCCESS"),
            ExecutionOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// 청산 시도 한 건의 append-only 감사 기록.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// 레코드 ID
    pub id: Uuid,
    /// 대상 포지션 ID
    pub position_id: Uuid,
    /// 거래소 이름
    pub exchange: String,
    /// 거래 심볼
    pub symbol: String,
    /// 주문 방향 (청산이므로 포지션과 반대)
    pub side: OrderSide,
    /// 요청 수량
    pub amount: Decimal,
    /// 주문 시점의 기준 가격
    pub requested_price: Decimal,
    /// 거래소 주문 ID (제출 실패 시 None)
    pub exchange_order_id: Option<String>,
    /// 청산으로 확정된 손익
    pub pnl: Option<Decimal>,
    /// 시도 결과
    pub outcome: ExecutionOutcome,
    /// 청산 사유
    pub reason: CloseReason,
    /// 기록 시각
    pub created_at: DateTime<Utc>,
}

/// 주문 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl OrderSide {
    /// 포지션 방향의 청산 주문 방향을 반환합니다 (롱 → 매도, 숏 → 매수).
    pub fn closing(direction: Direction) -> Self {
        match direction {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_side() {
        assert_eq!(OrderSide::closing(Direction::Long), OrderSide::Sell);
        assert_eq!(OrderSide::closing(Direction::Short), OrderSide::Buy);
    }
}
