//! 포지션 모니터 스윕 루프.
//!
//! 고정 주기로 TP/SL이 모두 설정된 오픈 포지션을 순회하며, 포지션마다
//! 독립적으로: 클라이언트 확보 → 현재가 조회 → 피크 수익률 갱신 →
//! 트레일링 스톱 평가 → (청산 | 스톱 갱신) → TP/SL 트리거 확인을
//! 수행합니다. 한 포지션의 어떤 실패도 같은 사이클의 다른 포지션 처리를
//! 막지 않으며, 루프는 포지션 단위 실패로 종료되지 않습니다.

use guard_core::domain::{CloseReason, Position};
use guard_data::PositionStore;
use guard_exchange::PriceOracle;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::ConnectionCache;
use crate::error::GatewayError;
use crate::gateway::ExecutionGateway;
use crate::trailing::{TrailingInput, TrailingStopEngine};

/// 모니터 설정.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// 스윕 주기 (기본: 5초)
    pub check_interval: Duration,
    /// 거래소 호출별 타임아웃 (기본: 10초)
    pub call_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl MonitorConfig {
    /// 환경변수에서 설정 로드.
    ///
    /// * `MONITOR_CHECK_INTERVAL_MS` - 스윕 주기 (밀리초, 기본: 5000)
    /// * `MONITOR_CALL_TIMEOUT_MS` - 거래소 호출 타임아웃 (밀리초, 기본: 10000)
    pub fn from_env() -> Self {
        let check_interval_ms: u64 = std::env::var("MONITOR_CHECK_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);

        let call_timeout_ms: u64 = std::env::var("MONITOR_CALL_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000);

        Self {
            check_interval: Duration::from_millis(check_interval_ms),
            call_timeout: Duration::from_millis(call_timeout_ms),
        }
    }
}

/// 포지션별 휘발성 런타임 상태.
///
/// 프로세스 메모리에만 존재하며 재시작 시 초기화됩니다. 피크 수익률이
/// 리셋되면 드로다운 보호도 함께 리셋됩니다 (의도된 트레이드오프).
#[derive(Debug, Clone, Copy)]
struct RuntimeState {
    highest_pnl_pct: Decimal,
    trailing_activated: bool,
}

/// 포지션 모니터.
pub struct PositionMonitor {
    store: Arc<dyn PositionStore>,
    connections: Arc<ConnectionCache>,
    gateway: Arc<ExecutionGateway>,
    config: MonitorConfig,
    states: Mutex<HashMap<Uuid, RuntimeState>>,
    // 사이클 중첩 시 같은 포지션의 동시 처리를 막는 마커
    in_flight: Mutex<HashSet<Uuid>>,
}

impl PositionMonitor {
    pub fn new(
        store: Arc<dyn PositionStore>,
        connections: Arc<ConnectionCache>,
        gateway: Arc<ExecutionGateway>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            connections,
            gateway,
            config,
            states: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// 백그라운드 스윕 루프를 시작합니다.
    ///
    /// 종료는 협조적입니다: 토큰이 취소되면 진행 중인 사이클을 마친 뒤
    /// 루프를 빠져나옵니다.
    pub fn spawn(self: Arc<Self>, shutdown_token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_ms = self.config.check_interval.as_millis() as u64,
                "포지션 모니터 시작"
            );

            let mut check_interval = interval(self.config.check_interval);

            loop {
                tokio::select! {
                    _ = check_interval.tick() => {
                        self.run_cycle().await;
                    }
                    _ = shutdown_token.cancelled() => {
                        info!("포지션 모니터: 종료 시그널 수신, 정리 중...");
                        break;
                    }
                }
            }

            info!("포지션 모니터 종료됨");
        })
    }

    /// 한 사이클: 보호 조건이 설정된 모든 오픈 포지션을 점검합니다.
    pub async fn run_cycle(&self) {
        let positions = match self.store.open_protected_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "오픈 포지션 조회 실패, 이번 사이클 건너뜀");
                return;
            }
        };

        if positions.is_empty() {
            return;
        }

        debug!(count = positions.len(), "활성 포지션 모니터링");

        for position in positions {
            let id = position.id;
            if !self.in_flight.lock().await.insert(id) {
                debug!(position_id = %id, "이전 사이클이 아직 처리 중, 건너뜀");
                continue;
            }

            self.check_position(&position).await;

            self.in_flight.lock().await.remove(&id);
        }
    }

    /// 포지션 한 건 점검. 모든 실패는 로그 후 이번 사이클에서만 건너뜁니다.
    async fn check_position(&self, position: &Position) {
        let client = match tokio::time::timeout(
            self.config.call_timeout,
            self.connections.client(&position.exchange, position.owner_id),
        )
        .await
        {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                warn!(
                    position_id = %position.id,
                    exchange = %position.exchange,
                    error = %e,
                    "거래소 클라이언트 확보 실패, 포지션 건너뜀"
                );
                return;
            }
            Err(_) => {
                warn!(
                    position_id = %position.id,
                    exchange = %position.exchange,
                    "거래소 연결 타임아웃, 포지션 건너뜀"
                );
                return;
            }
        };

        // 모니터 경로는 캐시 없이 매 사이클 재조회
        let current_price = match tokio::time::timeout(
            self.config.call_timeout,
            PriceOracle::fetch_direct(client.as_ref(), &position.symbol),
        )
        .await
        {
            Ok(Ok(price)) => price,
            Ok(Err(e)) => {
                warn!(
                    position_id = %position.id,
                    symbol = %position.symbol,
                    error = %e,
                    "가격 조회 실패, 포지션 건너뜀"
                );
                return;
            }
            Err(_) => {
                warn!(
                    position_id = %position.id,
                    symbol = %position.symbol,
                    "가격 조회 타임아웃, 포지션 건너뜀"
                );
                return;
            }
        };

        let pnl_pct = position.pnl_pct(current_price);

        // 피크 수익률 갱신은 엔진 호출 전에, 사이클당 한 번
        let highest_pnl_pct = {
            let mut states = self.states.lock().await;
            let state = states.entry(position.id).or_insert(RuntimeState {
                highest_pnl_pct: pnl_pct,
                trailing_activated: false,
            });
            if pnl_pct > state.highest_pnl_pct {
                state.highest_pnl_pct = pnl_pct;
            }
            state.highest_pnl_pct
        };

        let decision = TrailingStopEngine::evaluate(&TrailingInput {
            entry_price: position.entry_price,
            current_price,
            current_stop_loss: position.stop_loss,
            direction: position.direction,
            highest_pnl_pct,
        });

        if decision.should_close {
            let reason = decision.close_reason.unwrap_or(CloseReason::TrailingStop);
            info!(
                position_id = %position.id,
                symbol = %position.symbol,
                pnl_pct = %pnl_pct,
                peak_pct = %highest_pnl_pct,
                "트레일링 스톱 발동"
            );
            self.close_and_forget(client.as_ref(), position, current_price, reason)
                .await;
            return;
        }

        // 스톱 갱신은 단일 필드 업데이트; 이후 TP/SL 판정은 갱신된 값 기준
        let mut position = position.clone();
        if let Some(new_stop) = decision.new_stop_loss {
            match self.store.update_stop_loss(position.id, new_stop).await {
                Ok(()) => {
                    position.stop_loss = Some(new_stop);
                    let mut states = self.states.lock().await;
                    if let Some(state) = states.get_mut(&position.id) {
                        if !state.trailing_activated {
                            info!(
                                position_id = %position.id,
                                symbol = %position.symbol,
                                pnl_pct = %pnl_pct,
                                "트레일링 스톱 활성화"
                            );
                        }
                        state.trailing_activated = true;
                    }
                    info!(
                        position_id = %position.id,
                        symbol = %position.symbol,
                        stop_loss = %new_stop,
                        pnl_pct = %pnl_pct,
                        "트레일링 스톱 갱신"
                    );
                }
                Err(e) if e.is_already_closed() => {
                    debug!(position_id = %position.id, "이미 종료된 포지션, 스톱 갱신 생략");
                    return;
                }
                Err(e) => {
                    warn!(position_id = %position.id, error = %e, "스톱 갱신 실패");
                }
            }
        }

        if position.take_profit_hit(current_price) {
            info!(
                position_id = %position.id,
                symbol = %position.symbol,
                price = %current_price,
                pnl_pct = %pnl_pct,
                "익절 도달"
            );
            self.close_and_forget(client.as_ref(), &position, current_price, CloseReason::TakeProfit)
                .await;
            return;
        }

        if position.stop_loss_hit(current_price) {
            info!(
                position_id = %position.id,
                symbol = %position.symbol,
                price = %current_price,
                pnl_pct = %pnl_pct,
                "손절 도달"
            );
            self.close_and_forget(client.as_ref(), &position, current_price, CloseReason::StopLoss)
                .await;
        }
    }

    /// 청산을 위임하고 런타임 상태를 정리합니다.
    async fn close_and_forget(
        &self,
        client: &dyn guard_exchange::ExchangeClient,
        position: &Position,
        current_price: Decimal,
        reason: CloseReason,
    ) {
        match self
            .gateway
            .close(client, position, current_price, reason)
            .await
        {
            Ok(_) => {}
            Err(GatewayError::AlreadyClosed(_)) => {
                debug!(position_id = %position.id, "다른 경로가 이미 청산함");
            }
            Err(e) if e.is_retryable() => {
                // OPEN 유지, 다음 스윕에서 재시도
                warn!(position_id = %position.id, error = %e, "청산 주문 실패, 다음 사이클에 재시도");
                return;
            }
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "청산 후처리 실패");
            }
        }

        self.states.lock().await.remove(&position.id);
    }
}
