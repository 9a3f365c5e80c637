//! 시뮬레이션 거래소 구현.
//!
//! 실제 거래소 없이 모니터링 코어를 구동/테스트하기 위한 인메모리
//! 구현입니다. 가격은 외부에서 주입하며, 시장가 주문은 현재가에 즉시
//! 체결됩니다.

use async_trait::async_trait;
use chrono::Utc;
use guard_core::OrderSide;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::traits::{
    ClientFactory, ExchangeClient, ExchangeCredentials, ExchangeResult, OrderFill, Ticker,
};
use crate::ExchangeError;

/// 시뮬레이션 거래소에 기록된 주문.
#[derive(Debug, Clone)]
pub struct SimulatedOrder {
    /// 거래소 주문 ID
    pub order_id: String,
    /// 주입된 client order id
    pub client_order_id: Option<String>,
    /// 거래 심볼
    pub symbol: String,
    /// 주문 방향
    pub side: OrderSide,
    /// 체결 수량
    pub amount: Decimal,
    /// 체결 가격
    pub fill_price: Decimal,
}

/// 시뮬레이션 거래소.
#[derive(Debug)]
pub struct SimulatedExchange {
    name: String,
    prices: RwLock<HashMap<String, Decimal>>,
    orders: RwLock<Vec<SimulatedOrder>>,
    seen_client_ids: RwLock<HashSet<String>>,
    /// 체결 평균가 보고 여부 (false면 호출자의 기준가 fallback 경로 테스트)
    report_average: bool,
    fail_markets: RwLock<bool>,
    fail_ticker: RwLock<bool>,
    fail_orders: RwLock<bool>,
}

impl SimulatedExchange {
    /// 새 시뮬레이션 거래소를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prices: RwLock::new(HashMap::new()),
            orders: RwLock::new(Vec::new()),
            seen_client_ids: RwLock::new(HashSet::new()),
            report_average: true,
            fail_markets: RwLock::new(false),
            fail_ticker: RwLock::new(false),
            fail_orders: RwLock::new(false),
        }
    }

    /// 평균 체결가를 보고하지 않는 거래소를 흉내냅니다.
    pub fn without_average(mut self) -> Self {
        self.report_average = false;
        self
    }

    /// 심볼의 현재가를 설정합니다.
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// 시세 조회 실패를 강제합니다.
    pub async fn set_fail_ticker(&self, fail: bool) {
        *self.fail_ticker.write().await = fail;
    }

    /// 주문 제출 실패를 강제합니다.
    pub async fn set_fail_orders(&self, fail: bool) {
        *self.fail_orders.write().await = fail;
    }

    /// 마켓 로드 실패를 강제합니다 (연결 프로브 실패 시나리오).
    pub async fn set_fail_markets(&self, fail: bool) {
        *self.fail_markets.write().await = fail;
    }

    /// 지금까지 제출된 주문들을 반환합니다.
    pub async fn submitted_orders(&self) -> Vec<SimulatedOrder> {
        self.orders.read().await.clone()
    }
}

#[async_trait]
impl ExchangeClient for SimulatedExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_markets(&self) -> ExchangeResult<()> {
        if *self.fail_markets.read().await {
            return Err(ExchangeError::Unauthorized("simulated auth failure".into()));
        }
        Ok(())
    }

    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        if *self.fail_ticker.read().await {
            return Err(ExchangeError::Network("simulated ticker failure".into()));
        }

        let prices = self.prices.read().await;
        let last = prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))?;

        Ok(Ticker {
            symbol: symbol.to_string(),
            last,
            timestamp: Utc::now(),
        })
    }

    async fn create_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        client_order_id: Option<&str>,
    ) -> ExchangeResult<OrderFill> {
        if *self.fail_orders.read().await {
            return Err(ExchangeError::Network("simulated order failure".into()));
        }

        if let Some(cid) = client_order_id {
            let mut seen = self.seen_client_ids.write().await;
            if !seen.insert(cid.to_string()) {
                return Err(ExchangeError::DuplicateClientOrderId(cid.to_string()));
            }
        }

        let fill_price = {
            let prices = self.prices.read().await;
            prices
                .get(symbol)
                .copied()
                .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))?
        };

        let order = SimulatedOrder {
            order_id: format!("sim-{}", uuid::Uuid::new_v4()),
            client_order_id: client_order_id.map(str::to_string),
            symbol: symbol.to_string(),
            side,
            amount,
            fill_price,
        };
        let order_id = order.order_id.clone();
        self.orders.write().await.push(order);

        Ok(OrderFill {
            order_id,
            filled: amount,
            average: self.report_average.then_some(fill_price),
            price: None,
        })
    }
}

/// 모든 사용자에게 같은 시뮬레이션 거래소를 반환하는 팩토리.
pub struct SimulatedClientFactory {
    client: Arc<SimulatedExchange>,
}

impl SimulatedClientFactory {
    /// 공유 시뮬레이션 거래소를 감싸는 팩토리를 생성합니다.
    pub fn new(client: Arc<SimulatedExchange>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClientFactory for SimulatedClientFactory {
    async fn build(
        &self,
        exchange: &str,
        _credentials: ExchangeCredentials,
    ) -> ExchangeResult<Arc<dyn ExchangeClient>> {
        if exchange != self.client.name() {
            return Err(ExchangeError::Venue(format!(
                "unsupported exchange: {}",
                exchange
            )));
        }
        Ok(self.client.clone() as Arc<dyn ExchangeClient>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_ticker_and_order() {
        let exchange = SimulatedExchange::new("binance");
        exchange.set_price("BTC/USDT", dec!(50000)).await;

        let ticker = exchange.fetch_ticker("BTC/USDT").await.unwrap();
        assert_eq!(ticker.last, dec!(50000));

        let fill = exchange
            .create_market_order("BTC/USDT", OrderSide::Sell, dec!(0.1), Some("close-1"))
            .await
            .unwrap();
        assert_eq!(fill.filled, dec!(0.1));
        assert_eq!(fill.average, Some(dec!(50000)));
    }

    #[tokio::test]
    async fn test_duplicate_client_order_id() {
        let exchange = SimulatedExchange::new("binance");
        exchange.set_price("BTC/USDT", dec!(50000)).await;

        exchange
            .create_market_order("BTC/USDT", OrderSide::Sell, dec!(0.1), Some("close-1"))
            .await
            .unwrap();

        let second = exchange
            .create_market_order("BTC/USDT", OrderSide::Sell, dec!(0.1), Some("close-1"))
            .await;
        assert!(matches!(
            second,
            Err(ExchangeError::DuplicateClientOrderId(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let exchange = SimulatedExchange::new("binance");
        assert!(matches!(
            exchange.fetch_ticker("ETH/USDT").await,
            Err(ExchangeError::SymbolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fill_price_fallback() {
        let exchange = SimulatedExchange::new("binance").without_average();
        exchange.set_price("BTC/USDT", dec!(50000)).await;

        let fill = exchange
            .create_market_order("BTC/USDT", OrderSide::Sell, dec!(0.1), None)
            .await
            .unwrap();
        assert_eq!(fill.average, None);
        assert_eq!(fill.fill_price_or(dec!(49999)), dec!(49999));
    }
}
