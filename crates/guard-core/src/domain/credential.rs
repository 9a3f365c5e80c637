//! 암호화 저장된 거래소 자격증명.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 사용자+거래소별 암호화된 API 자격증명.
///
/// 평문 키는 저장되지 않으며, 연결 캐시 내부에서 필요할 때만
/// 복호화됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedCredential {
    /// 자격증명 ID
    pub id: Uuid,
    /// 소유 사용자
    pub user_id: Uuid,
    /// 거래소 이름 (예: "binance")
    pub exchange: String,
    /// 암호화된 API 키
    pub api_key_enc: String,
    /// 암호화된 API 시크릿
    pub api_secret_enc: String,
    /// 활성 여부 (사용자+거래소당 활성 자격증명은 하나)
    pub is_active: bool,
    /// 등록 시각
    pub created_at: DateTime<Utc>,
}
