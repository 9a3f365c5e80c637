//! # Guard Exchange
//!
//! 거래소 클라이언트 추상화를 제공합니다.
//!
//! 모니터링 코어가 거래소에 기대하는 것은 세 가지뿐입니다:
//! 마켓 메타데이터 로드, 현재가 조회, 시장가 주문 제출.
//! 거래소별 에러 분류는 불투명하게 취급하여 `ExchangeError`로 매핑합니다.

pub mod error;
pub mod price;
pub mod simulated;
pub mod traits;

pub use error::ExchangeError;
pub use price::PriceOracle;
pub use simulated::{SimulatedClientFactory, SimulatedExchange};
pub use traits::{
    ClientFactory, ExchangeClient, ExchangeCredentials, ExchangeResult, OrderFill, Ticker,
};
