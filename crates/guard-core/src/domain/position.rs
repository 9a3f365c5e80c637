//! 포지션 엔티티 및 상태 전이.
//!
//! 이 모듈은 모니터링 대상 트레이드 한 건을 나타내는 타입을 정의합니다:
//! - `Position` - 오픈/종료된 트레이드 한 건
//! - `Direction` - 롱/숏 방향
//! - `PositionStatus` - OPEN → {CLOSED, ERROR} 단방향 상태
//! - `CloseReason` - 청산 사유

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 포지션 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// 롱 (가격 상승 시 수익)
    Long,
    /// 숏 (가격 하락 시 수익)
    Short,
}

impl Direction {
    /// 방향에 따라 부호를 조정한 값을 반환합니다.
    ///
    /// 롱은 그대로, 숏은 부호를 반전합니다.
    pub fn adjust(&self, value: Decimal) -> Decimal {
        match self {
            Direction::Long => value,
            Direction::Short => -value,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            other => Err(format!("Unknown direction: {}", other)),
        }
    }
}

/// 포지션 생명주기 상태.
///
/// 전이는 단방향입니다: OPEN → CLOSED 또는 OPEN → ERROR.
/// 터미널 상태 이후에는 감사 노트 외 어떤 필드도 변경되지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    /// 모니터링 중인 오픈 포지션
    Open,
    /// 정상 청산 완료
    Closed,
    /// 거래소 주문은 성공했으나 로컬 기록이 실패한 상태.
    /// 자동 재시도 대상이 아니며 수동 대사가 필요합니다.
    Error,
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Closed => write!(f, "CLOSED"),
            PositionStatus::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(PositionStatus::Open),
            "CLOSED" => Ok(PositionStatus::Closed),
            "ERROR" => Ok(PositionStatus::Error),
            other => Err(format!("Unknown position status: {}", other)),
        }
    }
}

/// 포지션 청산 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    /// 익절 도달
    TakeProfit,
    /// 손절 도달
    StopLoss,
    /// 트레일링 스톱 발동
    TrailingStop,
    /// 드로다운 보호 (피크 대비 수익 급감)
    DrawdownProtection,
    /// 수동 청산
    Manual,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            CloseReason::StopLoss => write!(f, "STOP_LOSS"),
            CloseReason::TrailingStop => write!(f, "TRAILING_STOP"),
            CloseReason::DrawdownProtection => write!(f, "DRAWDOWN_PROTECTION"),
            CloseReason::Manual => write!(f, "MANUAL"),
        }
    }
}

impl std::str::FromStr for CloseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TAKE_PROFIT" => Ok(CloseReason::TakeProfit),
            "STOP_LOSS" => Ok(CloseReason::StopLoss),
            "TRAILING_STOP" => Ok(CloseReason::TrailingStop),
            "DRAWDOWN_PROTECTION" => Ok(CloseReason::DrawdownProtection),
            "MANUAL" => Ok(CloseReason::Manual),
            other => Err(format!("Unknown close reason: {}", other)),
        }
    }
}

/// 오픈/종료된 트레이드 한 건.
///
/// `owner_id`는 실거래 포지션이면 사용자 ID, 페이퍼 트레이딩 포지션이면
/// 세션 ID를 담습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// 내부 포지션 ID
    pub id: Uuid,
    /// 소유자 (사용자 또는 세션)
    pub owner_id: Uuid,
    /// 거래소 이름
    pub exchange: String,
    /// 거래 심볼 (예: "BTC/USDT")
    pub symbol: String,
    /// 포지션 방향
    pub direction: Direction,
    /// 진입 가격
    pub entry_price: Decimal,
    /// 수량
    pub quantity: Decimal,
    /// 마지막으로 관측된 시장 가격
    pub current_price: Decimal,
    /// 손절 가격 (설정 후에는 수익을 보호하는 방향으로만 이동)
    pub stop_loss: Option<Decimal>,
    /// 익절 가격
    pub take_profit: Option<Decimal>,
    /// 생명주기 상태
    pub status: PositionStatus,
    /// 청산 사유 (터미널 상태에서만 설정)
    pub close_reason: Option<CloseReason>,
    /// 청산 체결 가격
    pub exit_price: Option<Decimal>,
    /// 실현 손익 (CLOSED 전이 시점에 체결가로 정확히 한 번 계산)
    pub realized_pnl: Option<Decimal>,
    /// 미실현 손익 (수수료 차감)
    pub open_pnl: Decimal,
    /// 미실현 손익률 (%)
    pub open_pnl_pct: Decimal,
    /// 포지션 오픈 시각
    pub opened_at: DateTime<Utc>,
    /// 마지막 업데이트 시각
    pub updated_at: DateTime<Utc>,
    /// 포지션 종료 시각
    pub closed_at: Option<DateTime<Utc>>,
    /// 감사 노트 (터미널 상태 이후 변경 가능한 유일한 필드)
    pub notes: Option<String>,
}

impl Position {
    /// 새 오픈 포지션을 생성합니다.
    pub fn new(
        owner_id: Uuid,
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        direction: Direction,
        quantity: Decimal,
        entry_price: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            exchange: exchange.into(),
            symbol: symbol.into(),
            direction,
            entry_price,
            quantity,
            current_price: entry_price,
            stop_loss: None,
            take_profit: None,
            status: PositionStatus::Open,
            close_reason: None,
            exit_price: None,
            realized_pnl: None,
            open_pnl: Decimal::ZERO,
            open_pnl_pct: Decimal::ZERO,
            opened_at: now,
            updated_at: now,
            closed_at: None,
            notes: None,
        }
    }

    /// 손절/익절 가격을 설정합니다.
    pub fn with_protection(mut self, stop_loss: Decimal, take_profit: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self.take_profit = Some(take_profit);
        self
    }

    /// 포지션이 오픈 상태인지 확인합니다.
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// 손절과 익절이 모두 설정되어 모니터링 대상인지 확인합니다.
    pub fn is_fully_protected(&self) -> bool {
        self.is_open() && self.stop_loss.is_some() && self.take_profit.is_some()
    }

    /// 진입 시점의 명목 가치를 반환합니다.
    pub fn entry_notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// 현재 가격 기준 방향 조정 손익률(%)을 반환합니다.
    ///
    /// 롱: `(cur - entry) / entry * 100`, 숏은 부호 반전.
    pub fn pnl_pct(&self, current_price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let raw = (current_price - self.entry_price) / self.entry_price * Decimal::from(100);
        self.direction.adjust(raw)
    }

    /// 체결가 기준 방향 조정 실현 손익을 반환합니다.
    pub fn realized_pnl_at(&self, fill_price: Decimal, fill_quantity: Decimal) -> Decimal {
        self.direction.adjust((fill_price - self.entry_price) * fill_quantity)
    }

    /// 익절 조건 도달 여부를 확인합니다.
    ///
    /// 롱은 `current >= take_profit`, 숏은 `current <= take_profit` 에서
    /// 발동합니다 (경계 포함).
    pub fn take_profit_hit(&self, current_price: Decimal) -> bool {
        match (self.take_profit, self.direction) {
            (Some(tp), Direction::Long) => current_price >= tp,
            (Some(tp), Direction::Short) => current_price <= tp,
            (None, _) => false,
        }
    }

    /// 손절 조건 도달 여부를 확인합니다.
    pub fn stop_loss_hit(&self, current_price: Decimal) -> bool {
        match (self.stop_loss, self.direction) {
            (Some(sl), Direction::Long) => current_price <= sl,
            (Some(sl), Direction::Short) => current_price >= sl,
            (None, _) => false,
        }
    }

    /// 후보 손절가가 기존 손절가보다 수익 보호 방향으로 엄격히 개선되는지
    /// 확인합니다. 기존 손절가가 없으면 항상 개선으로 간주합니다.
    pub fn improves_stop(&self, candidate: Decimal) -> bool {
        match (self.stop_loss, self.direction) {
            (Some(current), Direction::Long) => candidate > current,
            (Some(current), Direction::Short) => candidate < current,
            (None, _) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_position() -> Position {
        Position::new(
            Uuid::new_v4(),
            "binance",
            "BTC/USDT",
            Direction::Long,
            dec!(0.5),
            dec!(100),
        )
        .with_protection(dec!(95), dec!(110))
    }

    #[test]
    fn test_pnl_pct_direction_adjusted() {
        let long = long_position();
        assert_eq!(long.pnl_pct(dec!(102)), dec!(2));
        assert_eq!(long.pnl_pct(dec!(98)), dec!(-2));

        let mut short = long_position();
        short.direction = Direction::Short;
        assert_eq!(short.pnl_pct(dec!(92)), dec!(8));
        assert_eq!(short.pnl_pct(dec!(104)), dec!(-4));
    }

    #[test]
    fn test_take_profit_boundary() {
        let position = long_position();
        assert!(position.take_profit_hit(dec!(110)));
        assert!(position.take_profit_hit(dec!(110.01)));
        assert!(!position.take_profit_hit(dec!(109.99)));
    }

    #[test]
    fn test_stop_loss_boundary_short() {
        let mut position = long_position();
        position.direction = Direction::Short;
        position.stop_loss = Some(dec!(105));
        assert!(position.stop_loss_hit(dec!(105)));
        assert!(position.stop_loss_hit(dec!(106)));
        assert!(!position.stop_loss_hit(dec!(104)));
    }

    #[test]
    fn test_improves_stop_never_loosens() {
        let mut long = long_position();
        long.stop_loss = Some(dec!(100.1));
        assert!(long.improves_stop(dec!(101)));
        assert!(!long.improves_stop(dec!(100.1)));
        assert!(!long.improves_stop(dec!(99)));

        let mut short = long_position();
        short.direction = Direction::Short;
        short.stop_loss = Some(dec!(99));
        assert!(short.improves_stop(dec!(98)));
        assert!(!short.improves_stop(dec!(99)));
        assert!(!short.improves_stop(dec!(100)));
    }

    #[test]
    fn test_realized_pnl_at() {
        let long = long_position();
        assert_eq!(long.realized_pnl_at(dec!(104), dec!(0.5)), dec!(2.0));

        let mut short = long_position();
        short.direction = Direction::Short;
        assert_eq!(short.realized_pnl_at(dec!(96), dec!(0.5)), dec!(2.0));
    }
}
