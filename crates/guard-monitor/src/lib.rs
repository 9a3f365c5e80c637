//! # guard-monitor
//!
//! 포지션 리스크 관리 코어의 상위 크레이트입니다.
//!
//! 두 개의 독립 백그라운드 루프를 제공합니다:
//! - `PositionMonitor` - 5초 주기로 TP/SL이 모두 설정된 오픈 포지션을
//!   스윕하며 트레일링 스톱 상태 기계를 구동하고 청산을 트리거
//! - `PnlTracker` - 1초 주기로 구독된 페이퍼 트레이딩 세션의 미실현
//!   손익을 계산해 저장하고 구독자에게 브로드캐스트
//!
//! 두 루프 모두 `CancellationToken`으로 협조적으로 종료됩니다.

pub mod connection;
pub mod error;
pub mod events;
pub mod gateway;
pub mod monitor;
pub mod pnl;
pub mod trailing;

pub use connection::ConnectionCache;
pub use error::{ConnectionError, GatewayError, TrackerError};
pub use events::{BroadcastPublisher, EventPublisher, PositionPnl, SessionEvent};
pub use gateway::ExecutionGateway;
pub use monitor::{MonitorConfig, PositionMonitor};
pub use pnl::{PnlTracker, SessionPnlSummary, TrackerConfig};
pub use trailing::{TrailingDecision, TrailingInput, TrailingStopEngine};
