//! 거래소 클라이언트 연결 캐시.
//!
//! (거래소, 사용자) 쌍마다 인증된 클라이언트를 한 번만 만들어 재사용합니다.
//! 생성 경로: 활성 자격증명 조회 → 복호화 → 클라이언트 생성 → 마켓
//! 메타데이터 로드로 연결 확인. 어느 단계든 실패하면 캐시하지 않고
//! `ConnectionError`를 반환하며, 호출자는 해당 포지션을 이번 사이클에서
//! 건너뜁니다.

use guard_core::crypto::CredentialCipher;
use guard_data::CredentialStore;
use guard_exchange::{ClientFactory, ExchangeClient, ExchangeCredentials};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ConnectionError;

/// (거래소, 사용자) 단위 클라이언트 캐시.
///
/// 캐시는 Mutex로 보호되어 동시 호출자 간 중복 연결 경쟁을 막습니다.
pub struct ConnectionCache {
    credentials: Arc<dyn CredentialStore>,
    cipher: Arc<CredentialCipher>,
    factory: Arc<dyn ClientFactory>,
    clients: Mutex<HashMap<(String, Uuid), Arc<dyn ExchangeClient>>>,
}

impl ConnectionCache {
    /// 의존성을 주입받아 캐시를 생성합니다.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        cipher: Arc<CredentialCipher>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            credentials,
            cipher,
            factory,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// 사용자의 거래소 클라이언트를 반환합니다.
    ///
    /// 캐시에 있으면 그대로 반환하고, 없으면 자격증명을 복호화해 새로
    /// 연결합니다. 연결 확인까지 성공한 클라이언트만 캐시됩니다.
    pub async fn client(
        &self,
        exchange: &str,
        user_id: Uuid,
    ) -> Result<Arc<dyn ExchangeClient>, ConnectionError> {
        let key = (exchange.to_string(), user_id);

        // 생성 전 과정을 락 안에서 수행해 같은 키의 중복 연결을 방지
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let credential = self
            .credentials
            .active_credential(user_id, exchange)
            .await?
            .ok_or_else(|| ConnectionError::NoCredential {
                user_id,
                exchange: exchange.to_string(),
            })?;

        let api_key = self.cipher.decrypt(&credential.api_key_enc)?;
        let api_secret = self.cipher.decrypt(&credential.api_secret_enc)?;

        let client = self
            .factory
            .build(exchange, ExchangeCredentials::new(api_key, api_secret))
            .await?;

        // 캐시 전 연결 확인
        if let Err(e) = client.load_markets().await {
            warn!(exchange, %user_id, error = %e, "거래소 연결 확인 실패");
            return Err(ConnectionError::Probe(e));
        }

        debug!(exchange, %user_id, "거래소 클라이언트 연결 및 캐시");
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// 캐시된 클라이언트를 제거합니다 (자격증명 교체 시).
    pub async fn invalidate(&self, exchange: &str, user_id: Uuid) {
        self.clients
            .lock()
            .await
            .remove(&(exchange.to_string(), user_id));
    }

    /// 캐시된 클라이언트 수.
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// 캐시가 비어 있는지 여부.
    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}
