//! 페이퍼 트레이딩 세션 PnL 추적기.
//!
//! 모니터와 독립적인 1초 주기 루프입니다. 구독된 세션의 오픈 포지션을
//! 대상으로: 심볼별 1초 TTL 캐시로 가격 조회 → 수수료 차감 미실현 손익
//! 계산 → 포지션 일괄 갱신 (단일 트랜잭션) → 세션 집계 갱신 (별도 단계,
//! 표시 전용이라 비원자성 허용) → 세션별 델타 브로드캐스트.

use chrono::Utc;
use guard_core::domain::{CloseReason, Position};
use guard_data::{OpenPnlUpdate, PositionStore, SessionStore, StoreError};
use guard_exchange::PriceOracle;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TrackerError;
use crate::events::{EventPublisher, PositionPnl, SessionEvent};

/// PnL 추적기 설정.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// 틱 주기 (기본: 1초)
    pub tick_interval: Duration,
    /// 진입 명목가 대비 수수료 추정 비율 (기본: 0.1%)
    pub fee_rate: Decimal,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            fee_rate: dec!(0.001),
        }
    }
}

impl TrackerConfig {
    /// 환경변수에서 설정 로드.
    ///
    /// * `PNL_TICK_INTERVAL_MS` - 틱 주기 (밀리초, 기본: 1000)
    /// * `PNL_FEE_RATE` - 수수료 비율 (기본: 0.001)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let tick_interval_ms: u64 = std::env::var("PNL_TICK_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);

        let fee_rate = std::env::var("PNL_FEE_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.fee_rate);

        Self {
            tick_interval: Duration::from_millis(tick_interval_ms),
            fee_rate,
        }
    }
}

/// 세션 손익 요약 (조회용).
#[derive(Debug, Clone)]
pub struct SessionPnlSummary {
    /// 오픈 포지션 수
    pub open_positions: usize,
    /// 오픈 포지션 미실현 손익 합계
    pub total_open_pnl: Decimal,
    /// 종료 포지션 실현 손익 합계
    pub total_realized_pnl: Decimal,
    /// 총 손익
    pub total_pnl: Decimal,
    /// 가장 수익률이 높은 오픈 포지션 (심볼, 손익, 수익률)
    pub best_open: Option<(String, Decimal, Decimal)>,
    /// 가장 수익률이 낮은 오픈 포지션
    pub worst_open: Option<(String, Decimal, Decimal)>,
}

/// 세션 PnL 추적기.
pub struct PnlTracker {
    positions: Arc<dyn PositionStore>,
    sessions: Arc<dyn SessionStore>,
    oracle: Arc<PriceOracle>,
    publisher: Arc<dyn EventPublisher>,
    config: TrackerConfig,
    subscribed: Mutex<HashSet<Uuid>>,
}

impl PnlTracker {
    pub fn new(
        positions: Arc<dyn PositionStore>,
        sessions: Arc<dyn SessionStore>,
        oracle: Arc<PriceOracle>,
        publisher: Arc<dyn EventPublisher>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            positions,
            sessions,
            oracle,
            publisher,
            config,
            subscribed: Mutex::new(HashSet::new()),
        }
    }

    /// 세션을 추적 대상에 추가합니다.
    pub async fn subscribe(&self, session_id: Uuid) {
        self.subscribed.lock().await.insert(session_id);
    }

    /// 세션을 추적 대상에서 제거합니다.
    pub async fn unsubscribe(&self, session_id: Uuid) {
        self.subscribed.lock().await.remove(&session_id);
    }

    /// 활성 세션을 모두 구독합니다 (프로세스 시작 시 복구용).
    pub async fn load_active_sessions(&self) -> Result<usize, StoreError> {
        let ids = self.sessions.active_session_ids().await?;
        let count = ids.len();
        let mut subscribed = self.subscribed.lock().await;
        subscribed.extend(ids);
        info!(count, "활성 세션 구독 복구");
        Ok(count)
    }

    /// 백그라운드 틱 루프를 시작합니다.
    pub fn spawn(self: Arc<Self>, shutdown_token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_ms = self.config.tick_interval.as_millis() as u64,
                "PnL 추적기 시작"
            );

            let mut tick_interval = interval(self.config.tick_interval);

            loop {
                tokio::select! {
                    _ = tick_interval.tick() => {
                        self.run_tick().await;
                    }
                    _ = shutdown_token.cancelled() => {
                        info!("PnL 추적기: 종료 시그널 수신, 정리 중...");
                        break;
                    }
                }
            }

            info!("PnL 추적기 종료됨");
        })
    }

    /// 한 틱: 구독된 모든 세션의 오픈 포지션 손익을 갱신합니다.
    pub async fn run_tick(&self) {
        let session_ids: Vec<Uuid> = self.subscribed.lock().await.iter().copied().collect();
        if session_ids.is_empty() {
            return;
        }

        let positions = match self.positions.open_positions_for_owners(&session_ids).await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(error = %e, "오픈 포지션 조회 실패, 이번 틱 건너뜀");
                return;
            }
        };
        if positions.is_empty() {
            return;
        }

        // 중복 제거된 심볼만 조회 (1초 TTL 캐시)
        let symbols: Vec<String> = positions
            .iter()
            .map(|p| p.symbol.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let prices = self.oracle.prices(&symbols).await;

        let mut updates = Vec::with_capacity(positions.len());
        let mut per_session: HashMap<Uuid, Vec<PositionPnl>> = HashMap::new();

        for position in &positions {
            // 가격이 없는 심볼은 이번 틱에서 건너뜀
            let Some(&current_price) = prices.get(&position.symbol) else {
                continue;
            };

            let open_pnl = self.net_open_pnl(position, current_price);
            let open_pnl_pct = position.pnl_pct(current_price);

            updates.push(OpenPnlUpdate {
                position_id: position.id,
                current_price,
                open_pnl,
                open_pnl_pct,
            });
            per_session
                .entry(position.owner_id)
                .or_default()
                .push(PositionPnl {
                    position_id: position.id,
                    symbol: position.symbol.clone(),
                    current_price,
                    open_pnl,
                    open_pnl_pct,
                });
        }

        if updates.is_empty() {
            return;
        }

        // 1단계: 포지션 일괄 갱신 (단일 트랜잭션)
        if let Err(e) = self.positions.apply_open_pnl(&updates).await {
            warn!(error = %e, "포지션 손익 일괄 갱신 실패");
            return;
        }

        // 2단계: 세션 집계 (별도 단계, 표시 전용)
        for (session_id, position_pnls) in &per_session {
            let total_open_pnl: Decimal = position_pnls.iter().map(|p| p.open_pnl).sum();

            let session = match self.sessions.session(*session_id).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(%session_id, error = %e, "세션 조회 실패, 집계 생략");
                    continue;
                }
            };

            let aggregates = session.aggregates_with(total_open_pnl);
            if let Err(e) = self.sessions.update_aggregates(&aggregates).await {
                warn!(%session_id, error = %e, "세션 집계 갱신 실패");
            }
        }

        // 3단계: 세션별 델타 브로드캐스트
        for (session_id, position_pnls) in per_session {
            debug!(%session_id, positions = position_pnls.len(), "손익 델타 발행");
            self.publisher.publish(SessionEvent::PnlUpdate {
                session_id,
                positions: position_pnls,
                timestamp: Utc::now(),
            });
        }
    }

    /// 포지션을 수동으로 청산하고 실현 손익을 확정합니다.
    ///
    /// 가격이 주어지지 않으면 오라클에서 조회합니다. 청산 후 세션 실현
    /// 손익은 그 세션의 모든 종료 포지션을 재합산해 구합니다.
    pub async fn close_position(
        &self,
        position_id: Uuid,
        close_price: Option<Decimal>,
    ) -> Result<Position, TrackerError> {
        let position = self.positions.position(position_id).await?;
        if !position.is_open() {
            return Err(TrackerError::Store(StoreError::PositionNotOpen(position_id)));
        }

        let close_price = match close_price {
            Some(price) => price,
            None => self.oracle.price(&position.symbol).await?,
        };

        let realized_pnl = self.net_open_pnl(&position, close_price);
        let realized_pnl_pct = position.pnl_pct(close_price);

        self.positions
            .close_position(
                position_id,
                close_price,
                realized_pnl,
                CloseReason::Manual,
                Utc::now(),
            )
            .await?;

        // 세션 실현 손익 재합산 (종료 포지션 전체 스캔)
        let session_realized = self
            .positions
            .sum_closed_realized_pnl(position.owner_id)
            .await?;
        self.sessions
            .update_realized_pnl(position.owner_id, session_realized)
            .await?;

        let closed = self.positions.position(position_id).await?;
        self.publisher.publish(SessionEvent::PositionClosed {
            session_id: closed.owner_id,
            position: Box::new(closed.clone()),
            pnl: realized_pnl,
            pnl_pct: realized_pnl_pct,
            timestamp: Utc::now(),
        });

        info!(
            %position_id,
            symbol = %closed.symbol,
            %close_price,
            %realized_pnl,
            "포지션 수동 청산"
        );

        Ok(closed)
    }

    /// 세션 손익 요약을 계산합니다.
    pub async fn session_pnl_summary(
        &self,
        session_id: Uuid,
    ) -> Result<SessionPnlSummary, TrackerError> {
        let open = self
            .positions
            .open_positions_for_owners(&[session_id])
            .await?;
        let total_open_pnl: Decimal = open.iter().map(|p| p.open_pnl).sum();
        let total_realized_pnl = self.positions.sum_closed_realized_pnl(session_id).await?;

        let best_open = open
            .iter()
            .max_by_key(|p| p.open_pnl_pct)
            .map(|p| (p.symbol.clone(), p.open_pnl, p.open_pnl_pct));
        let worst_open = open
            .iter()
            .min_by_key(|p| p.open_pnl_pct)
            .map(|p| (p.symbol.clone(), p.open_pnl, p.open_pnl_pct));

        Ok(SessionPnlSummary {
            open_positions: open.len(),
            total_open_pnl,
            total_realized_pnl,
            total_pnl: total_open_pnl + total_realized_pnl,
            best_open,
            worst_open,
        })
    }

    /// 수수료 추정을 차감한 미실현 손익.
    fn net_open_pnl(&self, position: &Position, current_price: Decimal) -> Decimal {
        let gross = position
            .direction
            .adjust((current_price - position.entry_price) * position.quantity);
        let fee = position.entry_notional() * self.config.fee_rate;
        gross - fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastPublisher;
    use guard_core::domain::{Direction, PositionStatus, Session};
    use guard_data::MemoryStore;
    use guard_exchange::SimulatedExchange;
    use rust_decimal_macros::dec;

    struct Harness {
        store: Arc<MemoryStore>,
        venue: Arc<SimulatedExchange>,
        publisher: Arc<BroadcastPublisher>,
        tracker: PnlTracker,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let venue = Arc::new(SimulatedExchange::new("paper"));
        let oracle = Arc::new(PriceOracle::new(venue.clone()));
        let publisher = Arc::new(BroadcastPublisher::new(16));

        let tracker = PnlTracker::new(
            store.clone(),
            store.clone(),
            oracle,
            publisher.clone(),
            TrackerConfig::default(),
        );

        Harness {
            store,
            venue,
            publisher,
            tracker,
        }
    }

    fn session_with_capital(capital: Decimal) -> Session {
        Session::new(Uuid::new_v4(), capital)
    }

    fn open_long(session_id: Uuid, symbol: &str, quantity: Decimal, entry: Decimal) -> Position {
        Position::new(session_id, "paper", symbol, Direction::Long, quantity, entry)
    }

    #[tokio::test]
    async fn test_tick_updates_positions_and_session() {
        let h = harness();
        let session = session_with_capital(dec!(10000));
        let session_id = session.id;
        h.store.put_session(session);

        let position = open_long(session_id, "BTC/USDT", dec!(1), dec!(100));
        h.store.insert_position(&position).await.unwrap();
        h.venue.set_price("BTC/USDT", dec!(110)).await;

        h.tracker.subscribe(session_id).await;
        h.tracker.run_tick().await;

        // 총이익 10, 수수료 100 * 0.001 = 0.1 → 순이익 9.9
        let snapshot = h.store.position_snapshot(position.id).unwrap();
        assert_eq!(snapshot.open_pnl, dec!(9.9));
        assert_eq!(snapshot.open_pnl_pct, dec!(10));
        assert_eq!(snapshot.current_price, dec!(110));

        // 세션 집계: total = 실현 0 + 9.9, roi = 9.9 / 10000 * 100
        let session = SessionStore::session(h.store.as_ref(), session_id).await.unwrap();
        assert_eq!(session.open_pnl, dec!(9.9));
        assert_eq!(session.total_pnl, dec!(9.9));
        assert_eq!(session.roi, dec!(0.099));
    }

    #[tokio::test]
    async fn test_tick_broadcasts_session_delta() {
        let h = harness();
        let session = session_with_capital(dec!(1000));
        let session_id = session.id;
        h.store.put_session(session);
        h.store
            .insert_position(&open_long(session_id, "ETH/USDT", dec!(2), dec!(50)))
            .await
            .unwrap();
        h.venue.set_price("ETH/USDT", dec!(55)).await;

        let mut receiver = h.publisher.subscribe();
        h.tracker.subscribe(session_id).await;
        h.tracker.run_tick().await;

        let event = receiver.recv().await.unwrap();
        match event {
            SessionEvent::PnlUpdate {
                session_id: id,
                positions,
                ..
            } => {
                assert_eq!(id, session_id);
                assert_eq!(positions.len(), 1);
                assert_eq!(positions[0].symbol, "ETH/USDT");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsubscribed_session_is_ignored() {
        let h = harness();
        let session = session_with_capital(dec!(1000));
        let session_id = session.id;
        h.store.put_session(session);
        let position = open_long(session_id, "BTC/USDT", dec!(1), dec!(100));
        h.store.insert_position(&position).await.unwrap();
        h.venue.set_price("BTC/USDT", dec!(110)).await;

        h.tracker.run_tick().await;

        let snapshot = h.store.position_snapshot(position.id).unwrap();
        assert_eq!(snapshot.open_pnl, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_missing_price_skips_symbol_not_tick() {
        let h = harness();
        let session = session_with_capital(dec!(1000));
        let session_id = session.id;
        h.store.put_session(session);

        let priced = open_long(session_id, "BTC/USDT", dec!(1), dec!(100));
        let unpriced = open_long(session_id, "DOGE/USDT", dec!(10), dec!(1));
        h.store.insert_position(&priced).await.unwrap();
        h.store.insert_position(&unpriced).await.unwrap();
        h.venue.set_price("BTC/USDT", dec!(105)).await;

        h.tracker.subscribe(session_id).await;
        h.tracker.run_tick().await;

        assert_eq!(
            h.store.position_snapshot(priced.id).unwrap().open_pnl,
            dec!(4.9)
        );
        assert_eq!(
            h.store.position_snapshot(unpriced.id).unwrap().open_pnl,
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn test_manual_close_realizes_pnl_and_resums_session() {
        let h = harness();
        let session = session_with_capital(dec!(10000));
        let session_id = session.id;
        h.store.put_session(session);

        // 먼저 종료된 포지션 하나 (실현 손익 5)
        let earlier = open_long(session_id, "ETH/USDT", dec!(1), dec!(100));
        h.store.insert_position(&earlier).await.unwrap();
        h.store
            .close_position(earlier.id, dec!(105), dec!(5), CloseReason::Manual, Utc::now())
            .await
            .unwrap();

        let position = open_long(session_id, "BTC/USDT", dec!(1), dec!(100));
        h.store.insert_position(&position).await.unwrap();

        let mut receiver = h.publisher.subscribe();
        let closed = h
            .tracker
            .close_position(position.id, Some(dec!(120)))
            .await
            .unwrap();

        // 총이익 20 - 수수료 0.1 = 19.9
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.realized_pnl, Some(dec!(19.9)));
        assert_eq!(closed.close_reason, Some(CloseReason::Manual));

        // 세션 실현 손익은 전체 재합산: 5 + 19.9
        let session = SessionStore::session(h.store.as_ref(), session_id).await.unwrap();
        assert_eq!(session.realized_pnl, dec!(24.9));

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::PositionClosed { .. }));
    }

    #[tokio::test]
    async fn test_manual_close_of_closed_position_fails() {
        let h = harness();
        let session = session_with_capital(dec!(1000));
        let session_id = session.id;
        h.store.put_session(session);

        let position = open_long(session_id, "BTC/USDT", dec!(1), dec!(100));
        h.store.insert_position(&position).await.unwrap();
        h.tracker
            .close_position(position.id, Some(dec!(110)))
            .await
            .unwrap();

        let err = h
            .tracker
            .close_position(position.id, Some(dec!(110)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrackerError::Store(StoreError::PositionNotOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_session_pnl_summary() {
        let h = harness();
        let session = session_with_capital(dec!(1000));
        let session_id = session.id;
        h.store.put_session(session);

        let winner = open_long(session_id, "BTC/USDT", dec!(1), dec!(100));
        let loser = open_long(session_id, "ETH/USDT", dec!(1), dec!(100));
        h.store.insert_position(&winner).await.unwrap();
        h.store.insert_position(&loser).await.unwrap();
        h.venue.set_price("BTC/USDT", dec!(110)).await;
        h.venue.set_price("ETH/USDT", dec!(95)).await;

        h.tracker.subscribe(session_id).await;
        h.tracker.run_tick().await;

        let summary = h.tracker.session_pnl_summary(session_id).await.unwrap();
        assert_eq!(summary.open_positions, 2);
        assert_eq!(summary.best_open.as_ref().unwrap().0, "BTC/USDT");
        assert_eq!(summary.worst_open.as_ref().unwrap().0, "ETH/USDT");
        assert_eq!(summary.total_pnl, summary.total_open_pnl);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_stops_on_cancellation() {
        let h = harness();
        let tracker = Arc::new(h.tracker);
        let token = CancellationToken::new();
        let handle = tracker.spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        handle.await.unwrap();
    }
}
