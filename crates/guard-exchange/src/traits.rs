//! 거래소 trait 정의.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guard_core::OrderSide;
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::sync::Arc;

use crate::ExchangeError;

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 심볼의 현재 시세.
#[derive(Debug, Clone)]
pub struct Ticker {
    /// 거래 심볼
    pub symbol: String,
    /// 마지막 체결 가격
    pub last: Decimal,
    /// 시세 시각
    pub timestamp: DateTime<Utc>,
}

/// 시장가 주문 체결 결과.
#[derive(Debug, Clone)]
pub struct OrderFill {
    /// 거래소 주문 ID
    pub order_id: String,
    /// 체결 수량
    pub filled: Decimal,
    /// 평균 체결 가격 (거래소가 보고하지 않으면 None)
    pub average: Option<Decimal>,
    /// 주문 가격 (거래소가 보고하지 않으면 None)
    pub price: Option<Decimal>,
}

impl OrderFill {
    /// 체결 가격을 반환합니다.
    ///
    /// 평균 체결가를 우선하고, 없으면 주문 가격, 그것도 없으면 호출자가
    /// 제공한 기준 가격을 사용합니다.
    pub fn fill_price_or(&self, reference: Decimal) -> Decimal {
        self.average.or(self.price).unwrap_or(reference)
    }
}

/// 복호화된 거래소 자격증명.
///
/// `SecretString`으로 감싸 로그/디버그 출력에 평문이 노출되지 않도록
/// 합니다.
#[derive(Clone)]
pub struct ExchangeCredentials {
    /// API 키
    pub api_key: SecretString,
    /// API 시크릿
    pub api_secret: SecretString,
}

impl ExchangeCredentials {
    /// 평문 키/시크릿으로 자격증명을 생성합니다.
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl std::fmt::Debug for ExchangeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeCredentials").finish_non_exhaustive()
    }
}

/// 통합 거래소 클라이언트 인터페이스.
///
/// ccxt 스타일의 최소 표면: 모니터링 코어가 필요로 하는 세 가지 작업만
/// 노출합니다.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// 거래소 이름 반환.
    fn name(&self) -> &str;

    /// 마켓 메타데이터 로드. 연결/인증 확인 용도로도 사용됩니다.
    async fn load_markets(&self) -> ExchangeResult<()>;

    /// 심볼의 현재 시세 조회.
    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<Ticker>;

    /// 시장가 주문 제출.
    ///
    /// `client_order_id`는 청산 시도별로 안정적인 멱등 키입니다. 같은
    /// 키로 재제출되면 거래소는 `DuplicateClientOrderId`를 반환해야
    /// 합니다.
    async fn create_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        client_order_id: Option<&str>,
    ) -> ExchangeResult<OrderFill>;
}

/// 자격증명으로 거래소 클라이언트를 생성하는 팩토리.
///
/// 연결 캐시가 거래소별 생성 로직에 의존하지 않도록 분리한 seam입니다.
/// 테스트에서는 시뮬레이션 클라이언트를 반환하는 팩토리를 주입합니다.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// 거래소 이름과 자격증명으로 클라이언트를 생성합니다.
    ///
    /// 지원하지 않는 거래소면 `ExchangeError::Venue`를 반환합니다.
    async fn build(
        &self,
        exchange: &str,
        credentials: ExchangeCredentials,
    ) -> ExchangeResult<Arc<dyn ExchangeClient>>;
}
