//! 설정 관리.
//!
//! 컴포넌트별 세부 설정(모니터 주기, 추적기 주기 등)은 각 컴포넌트 옆에
//! 정의되며, 이 모듈은 프로세스 공통 설정만 다룹니다.

use serde::{Deserialize, Serialize};

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// 연결 URL
    pub url: String,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/position_guard".to_string(),
            max_connections: 10,
            connection_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// * `DATABASE_URL` - 연결 URL
    /// * `DATABASE_MAX_CONNECTIONS` - 최대 연결 수 (기본: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("DATABASE_URL").unwrap_or(defaults.url),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            connection_timeout_secs: defaults.connection_timeout_secs,
        }
    }
}

/// `.env` 파일이 있으면 환경변수로 로드합니다 (로컬 개발용).
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
    }
}
