//! # Guard Core
//!
//! 포지션 리스크 관리 코어의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 리스크 관리 시스템 전반에서 사용되는 기본 타입을 제공합니다:
//! - 포지션 및 포지션 상태 전이
//! - 페이퍼 트레이딩 세션 집계
//! - 청산 시도 감사 로그
//! - 설정 관리
//! - 로깅 인프라
//! - 자격증명 암호화

pub mod config;
pub mod crypto;
pub mod domain;
pub mod logging;

pub use config::*;
pub use crypto::{CredentialCipher, CryptoError};
pub use domain::*;
pub use logging::*;
