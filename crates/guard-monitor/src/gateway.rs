//! 청산 실행 게이트웨이.
//!
//! 시장가 청산 주문 제출, 체결가 기반 실현 손익 계산, 터미널 상태
//! 영속화를 담당합니다. 외부 주문과 로컬 기록 사이에 트랜잭션은 없으며,
//! 주문이 기록의 원본입니다. 주문 성공 후 기록이 실패하면 포지션을
//! ERROR로 강제 전이해 실제 거래소 상태와 모순된 OPEN을 남기지 않습니다.

use chrono::Utc;
use guard_core::domain::{
    CloseReason, ExecutionOutcome, ExecutionRecord, OrderSide, Position,
};
use guard_data::PositionStore;
use guard_exchange::{ExchangeClient, ExchangeError};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::GatewayError;

/// 청산 결과.
#[derive(Debug, Clone)]
pub struct CloseOutcome {
    /// 체결 가격 (거래소 미보고 시 기준 가격)
    pub exit_price: Decimal,
    /// 실현 손익
    pub realized_pnl: Decimal,
    /// 거래소 주문 ID (중복 제출로 스킵된 경우 None)
    pub order_id: Option<String>,
}

/// 청산 주문 실행기.
pub struct ExecutionGateway {
    store: Arc<dyn PositionStore>,
    call_timeout: Duration,
}

impl ExecutionGateway {
    pub fn new(store: Arc<dyn PositionStore>) -> Self {
        Self {
            store,
            call_timeout: Duration::from_secs(10),
        }
    }

    /// 주문 제출 타임아웃을 지정합니다 (기본: 10초).
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// 포지션을 시장가로 청산합니다.
    ///
    /// 청산 시도마다 포지션 ID 기반의 고정 client order id를 사용합니다.
    /// 일시 장애 후 재시도에서 거래소가 중복 주문을 보고하면 이미 청산된
    /// 것이므로 성공으로 취급합니다.
    pub async fn close(
        &self,
        client: &dyn ExchangeClient,
        position: &Position,
        reference_price: Decimal,
        reason: CloseReason,
    ) -> Result<CloseOutcome, GatewayError> {
        let side = OrderSide::closing(position.direction);
        let client_order_id = Self::client_order_id(position.id);

        info!(
            position_id = %position.id,
            symbol = %position.symbol,
            %side,
            amount = %position.quantity,
            %reason,
            "포지션 청산 주문 제출"
        );

        let submitted = match tokio::time::timeout(
            self.call_timeout,
            client.create_market_order(
                &position.symbol,
                side,
                position.quantity,
                Some(&client_order_id),
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout(format!(
                "close order not acknowledged within {:?}",
                self.call_timeout
            ))),
        };

        let fill = match submitted {
            Ok(fill) => Some(fill),
            Err(e) if e.is_duplicate_order() => {
                // 이전 시도의 주문이 이미 체결됨: 기준 가격으로 마감 처리
                warn!(
                    position_id = %position.id,
                    client_order_id,
                    "중복 주문 감지, 이미 청산된 것으로 처리"
                );
                None
            }
            Err(e) => {
                self.record_attempt(position, side, reference_price, None, None, ExecutionOutcome::Failed, reason)
                    .await;
                return Err(GatewayError::OrderSubmission {
                    position_id: position.id,
                    source: e,
                });
            }
        };

        let exit_price = fill
            .as_ref()
            .map(|f| f.fill_price_or(reference_price))
            .unwrap_or(reference_price);
        let fill_quantity = fill
            .as_ref()
            .filter(|f| f.filled > Decimal::ZERO)
            .map(|f| f.filled)
            .unwrap_or(position.quantity);
        let order_id = fill.map(|f| f.order_id);

        let realized_pnl = position.realized_pnl_at(exit_price, fill_quantity);

        // 주문은 이미 체결됨: 이 이후의 실패는 OPEN으로 되돌릴 수 없음
        match self
            .store
            .close_position(position.id, exit_price, realized_pnl, reason, Utc::now())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_already_closed() => {
                self.record_attempt(position, side, exit_price, order_id.clone(), Some(realized_pnl), ExecutionOutcome::Success, reason)
                    .await;
                return Err(GatewayError::AlreadyClosed(position.id));
            }
            Err(e) => {
                error!(
                    position_id = %position.id,
                    error = %e,
                    "주문 체결 후 기록 실패, ERROR로 전이"
                );
                let note = format!("Close persisted failed after fill: {}", e);
                if let Err(mark_err) = self.store.mark_error(position.id, &note).await {
                    error!(
                        position_id = %position.id,
                        error = %mark_err,
                        "ERROR 전이조차 실패, 수동 대사 필요"
                    );
                }
                return Err(GatewayError::PersistenceAfterExecution {
                    position_id: position.id,
                    source: e,
                });
            }
        }

        self.record_attempt(position, side, exit_price, order_id.clone(), Some(realized_pnl), ExecutionOutcome::Success, reason)
            .await;

        info!(
            position_id = %position.id,
            symbol = %position.symbol,
            %exit_price,
            %realized_pnl,
            %reason,
            "포지션 청산 완료"
        );

        Ok(CloseOutcome {
            exit_price,
            realized_pnl,
            order_id,
        })
    }

    /// 청산 시도별 멱등 키.
    fn client_order_id(position_id: Uuid) -> String {
        format!("close-{}", position_id)
    }

    /// 감사 기록 추가. 기록 실패는 청산 결과를 바꾸지 않습니다.
    #[allow(clippy::too_many_arguments)]
    async fn record_attempt(
        &self,
        position: &Position,
        side: OrderSide,
        price: Decimal,
        order_id: Option<String>,
        pnl: Option<Decimal>,
        outcome: ExecutionOutcome,
        reason: CloseReason,
    ) {
        let record = ExecutionRecord {
            id: Uuid::new_v4(),
            position_id: position.id,
            exchange: position.exchange.clone(),
            symbol: position.symbol.clone(),
            side,
            amount: position.quantity,
            requested_price: price,
            exchange_order_id: order_id,
            pnl,
            outcome,
            reason,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.record_execution(&record).await {
            warn!(position_id = %position.id, error = %e, "청산 감사 기록 실패");
        }
    }
}
