//! 세션 이벤트 브로드캐스트.
//!
//! PnL 트래커와 수동 청산 경로가 구독자(웹소켓 계층 등)에게 내보내는
//! 이벤트를 정의합니다. 발행자는 trait로 주입되며, 기본 구현은 tokio
//! broadcast 채널입니다.

use chrono::{DateTime, Utc};
use guard_core::domain::Position;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 한 포지션의 손익 스냅샷 (pnl:update 페이로드 항목).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionPnl {
    /// 포지션 ID
    pub position_id: Uuid,
    /// 거래 심볼
    pub symbol: String,
    /// 최신 시장 가격
    pub current_price: Decimal,
    /// 수수료 차감 후 미실현 손익
    pub open_pnl: Decimal,
    /// 미실현 수익률 (%)
    pub open_pnl_pct: Decimal,
}

/// 세션 구독자에게 전달되는 이벤트.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// 틱마다 발행되는 세션별 손익 델타
    #[serde(rename = "pnl:update")]
    #[serde(rename_all = "camelCase")]
    PnlUpdate {
        session_id: Uuid,
        positions: Vec<PositionPnl>,
        timestamp: DateTime<Utc>,
    },

    /// 포지션 청산 알림
    #[serde(rename = "position:closed")]
    #[serde(rename_all = "camelCase")]
    PositionClosed {
        session_id: Uuid,
        position: Box<Position>,
        pnl: Decimal,
        pnl_pct: Decimal,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// 이벤트가 속한 세션 ID.
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::PnlUpdate { session_id, .. } => *session_id,
            SessionEvent::PositionClosed { session_id, .. } => *session_id,
        }
    }
}

/// 이벤트 발행자 인터페이스.
pub trait EventPublisher: Send + Sync {
    /// 이벤트를 구독자에게 발행합니다. 구독자가 없어도 실패하지 않습니다.
    fn publish(&self, event: SessionEvent);
}

/// tokio broadcast 채널 기반 발행자.
pub struct BroadcastPublisher {
    sender: tokio::sync::broadcast::Sender<SessionEvent>,
}

impl BroadcastPublisher {
    /// 지정한 버퍼 크기로 발행자를 생성합니다.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// 새 구독 수신자를 만듭니다.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: SessionEvent) {
        // 수신자가 없으면 SendError가 나지만 드롭해도 무방
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pnl_update_serializes_with_type_tag() {
        let event = SessionEvent::PnlUpdate {
            session_id: Uuid::new_v4(),
            positions: vec![PositionPnl {
                position_id: Uuid::new_v4(),
                symbol: "BTC/USDT".to_string(),
                current_price: dec!(50000),
                open_pnl: dec!(12.5),
                open_pnl_pct: dec!(2.5),
            }],
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pnl:update");
        assert!(json["sessionId"].is_string());
        assert_eq!(json["positions"][0]["symbol"], "BTC/USDT");
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let publisher = BroadcastPublisher::new(8);
        publisher.publish(SessionEvent::PnlUpdate {
            session_id: Uuid::new_v4(),
            positions: Vec::new(),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let publisher = BroadcastPublisher::new(8);
        let mut receiver = publisher.subscribe();

        let session_id = Uuid::new_v4();
        publisher.publish(SessionEvent::PnlUpdate {
            session_id,
            positions: Vec::new(),
            timestamp: Utc::now(),
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.session_id(), session_id);
    }
}
