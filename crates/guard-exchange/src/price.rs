//! 가격 오라클.
//!
//! 두 가지 조회 경로를 제공합니다:
//! - `fetch_direct` - 캐시 없이 매번 재조회 (포지션 모니터 경로)
//! - `price` - 심볼당 짧은 TTL 캐시 (PnL 추적기 경로; 여러 포지션이 같은
//!   심볼을 공유할 때 호출량을 제한)

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::traits::{ExchangeClient, ExchangeResult};

#[derive(Debug, Clone, Copy)]
struct CachedPrice {
    price: Decimal,
    fetched_at: Instant,
}

/// TTL 캐시가 붙은 가격 오라클.
pub struct PriceOracle {
    client: Arc<dyn ExchangeClient>,
    ttl: Duration,
    cache: Mutex<HashMap<String, CachedPrice>>,
}

impl PriceOracle {
    /// 기본 1초 TTL로 오라클을 생성합니다.
    pub fn new(client: Arc<dyn ExchangeClient>) -> Self {
        Self::with_ttl(client, Duration::from_secs(1))
    }

    /// 지정한 TTL로 오라클을 생성합니다.
    pub fn with_ttl(client: Arc<dyn ExchangeClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 캐시 없이 클라이언트에서 현재가를 직접 조회합니다.
    ///
    /// 모니터 스윕은 사이클마다 재조회하므로 이 경로를 사용합니다.
    pub async fn fetch_direct(
        client: &dyn ExchangeClient,
        symbol: &str,
    ) -> ExchangeResult<Decimal> {
        let ticker = client.fetch_ticker(symbol).await?;
        Ok(ticker.last)
    }

    /// TTL 캐시를 거쳐 현재가를 조회합니다.
    pub async fn price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(symbol) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.price);
                }
            }
        }

        let ticker = self.client.fetch_ticker(symbol).await?;
        debug!(symbol, price = %ticker.last, "가격 캐시 갱신");

        let mut cache = self.cache.lock().await;
        cache.insert(
            symbol.to_string(),
            CachedPrice {
                price: ticker.last,
                fetched_at: Instant::now(),
            },
        );
        Ok(ticker.last)
    }

    /// 여러 심볼의 현재가를 조회합니다.
    ///
    /// 실패한 심볼은 결과에서 제외됩니다 (호출자는 해당 심볼을 이번 틱에서
    /// 건너뜁니다).
    pub async fn prices(&self, symbols: &[String]) -> HashMap<String, Decimal> {
        let mut out = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            match self.price(symbol).await {
                Ok(price) => {
                    out.insert(symbol.clone(), price);
                }
                Err(error) => {
                    tracing::warn!(symbol, %error, "가격 조회 실패, 이번 틱에서 제외");
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedExchange;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_cache_within_ttl() {
        let exchange = Arc::new(SimulatedExchange::new("binance"));
        exchange.set_price("BTC/USDT", dec!(50000)).await;

        let oracle = PriceOracle::with_ttl(exchange.clone(), Duration::from_secs(60));
        assert_eq!(oracle.price("BTC/USDT").await.unwrap(), dec!(50000));

        // TTL 내에서는 가격이 바뀌어도 캐시 값을 반환
        exchange.set_price("BTC/USDT", dec!(51000)).await;
        assert_eq!(oracle.price("BTC/USDT").await.unwrap(), dec!(50000));
    }

    #[tokio::test]
    async fn test_fetch_direct_bypasses_cache() {
        let exchange = Arc::new(SimulatedExchange::new("binance"));
        exchange.set_price("BTC/USDT", dec!(50000)).await;

        assert_eq!(
            PriceOracle::fetch_direct(exchange.as_ref(), "BTC/USDT")
                .await
                .unwrap(),
            dec!(50000)
        );

        exchange.set_price("BTC/USDT", dec!(51000)).await;
        assert_eq!(
            PriceOracle::fetch_direct(exchange.as_ref(), "BTC/USDT")
                .await
                .unwrap(),
            dec!(51000)
        );
    }

    #[tokio::test]
    async fn test_prices_skips_failures() {
        let exchange = Arc::new(SimulatedExchange::new("binance"));
        exchange.set_price("BTC/USDT", dec!(50000)).await;

        let oracle = PriceOracle::new(exchange);
        let prices = oracle
            .prices(&["BTC/USDT".to_string(), "ETH/USDT".to_string()])
            .await;

        assert_eq!(prices.len(), 1);
        assert_eq!(prices.get("BTC/USDT"), Some(&dec!(50000)));
    }
}
