//! 모니터링 계층 오류 타입.
//!
//! 오류 분류 규칙: 한 포지션의 실패는 같은 사이클의 다른 포지션 처리를
//! 중단시키지 않으며, 루프 자체는 포지션 단위 실패로 종료되지 않습니다.

use guard_core::crypto::CryptoError;
use guard_data::StoreError;
use guard_exchange::ExchangeError;
use uuid::Uuid;

/// 거래소 클라이언트 확보 실패.
///
/// 이번 사이클에서 해당 포지션을 건너뛰는 비치명 오류입니다.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// 해당 사용자+거래소의 활성 자격증명 없음
    #[error("No active credential for user {user_id} on {exchange}")]
    NoCredential { user_id: Uuid, exchange: String },

    /// 자격증명 복호화 실패 (해당 자격증명에만 치명적)
    #[error("Credential decryption failed: {0}")]
    Decrypt(#[from] CryptoError),

    /// 클라이언트 생성 또는 연결 확인 실패
    #[error("Venue connection probe failed: {0}")]
    Probe(#[from] ExchangeError),

    /// 자격증명 조회 실패
    #[error("Credential lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// 청산 실행 실패.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 주문 제출 실패. 포지션은 OPEN으로 남아 다음 스윕에서 재시도됩니다.
    #[error("Close order submission failed for position {position_id}: {source}")]
    OrderSubmission {
        position_id: Uuid,
        #[source]
        source: ExchangeError,
    },

    /// 주문은 성공했으나 로컬 기록이 실패. 포지션은 ERROR로 전이되며
    /// 수동 대사가 필요합니다.
    #[error("Order filled but persistence failed for position {position_id}: {source}")]
    PersistenceAfterExecution {
        position_id: Uuid,
        #[source]
        source: StoreError,
    },

    /// 다른 경로가 이미 포지션을 종료함
    #[error("Position {0} already closed")]
    AlreadyClosed(Uuid),
}

/// PnL 추적/수동 청산 실패.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// 저장소 오류
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// 청산 가격 조회 실패
    #[error("Price fetch failed: {0}")]
    Price(#[from] ExchangeError),
}

impl GatewayError {
    /// 다음 스윕에서 재시도 가능한 오류인지 여부.
    ///
    /// 주문 제출 실패만 재시도 대상입니다. 주문 성공 후 기록 실패는
    /// 재시도하면 이중 체결이 되므로 제외합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::OrderSubmission { .. })
    }
}
