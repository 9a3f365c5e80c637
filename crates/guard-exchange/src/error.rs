//! 거래소 에러 타입.

use thiserror::Error;

/// 거래소 관련 에러.
///
/// 거래소별 에러 분류는 불투명하게 취급합니다. 모니터 입장에서 의미 있는
/// 구분은 "재시도 가능한가"와 "이미 체결된 주문의 중복 제출인가" 둘뿐입니다.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 인증/권한 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded")]
    RateLimited,

    /// 심볼을 찾을 수 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 주문 거부됨
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// 동일한 client order id의 주문이 이미 존재함.
    /// 청산 재시도 시 "이미 청산됨"을 의미하므로 호출자는 성공으로
    /// 취급할 수 있습니다.
    #[error("Duplicate client order id: {0}")]
    DuplicateClientOrderId(String),

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 거래소가 반환한 그 외 에러
    #[error("Venue error: {0}")]
    Venue(String),
}

impl ExchangeError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Network(_) | ExchangeError::RateLimited | ExchangeError::Timeout(_)
        )
    }

    /// 동일 주문 중복 제출 에러인지 확인합니다.
    pub fn is_duplicate_order(&self) -> bool {
        matches!(self, ExchangeError::DuplicateClientOrderId(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ExchangeError::Network("reset".into()).is_retryable());
        assert!(ExchangeError::RateLimited.is_retryable());
        assert!(!ExchangeError::Unauthorized("bad key".into()).is_retryable());
    }

    #[test]
    fn test_duplicate_order() {
        assert!(ExchangeError::DuplicateClientOrderId("close-1".into()).is_duplicate_order());
        assert!(!ExchangeError::OrderRejected("size".into()).is_duplicate_order());
    }
}
