//! # 자격증명 암호화 모듈
//!
//! AES-256-GCM을 사용한 거래소 API 키 암호화/복호화 기능을 제공합니다.
//!
//! ## 보안 고려사항
//! - 키는 PBKDF2-HMAC-SHA256 (100,000회 반복)으로 시크릿 + 솔트에서 유도
//! - 암호화마다 고유한 16바이트 IV 사용
//! - 신규 형식: `base64("ivHex:authTagHex:cipherHex")`
//! - 레거시 형식: `"ivHex:cipherHex"` (AES-256-CBC, 인증 태그 없음) 복호화만 지원

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use aes::Aes256;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{AesGcm, Nonce};
use base64::Engine;
use rand::RngCore;
use thiserror::Error;

/// 16바이트 IV를 사용하는 AES-256-GCM (원본 데이터 형식 호환).
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// 레거시 형식용 AES-256-CBC 복호화기.
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// 암호화 에러.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption secret not configured")]
    SecretNotConfigured,

    #[error("Invalid encrypted data format: {0}")]
    InvalidFormat(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Hex decode error: {0}")]
    HexError(#[from] hex::FromHexError),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("UTF-8 decode error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
}

/// AES-256 키 크기 (바이트).
pub const KEY_SIZE: usize = 32;

/// IV 크기 (바이트).
pub const IV_SIZE: usize = 16;

/// GCM 인증 태그 크기 (바이트).
pub const TAG_SIZE: usize = 16;

/// PBKDF2 반복 횟수.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// 자격증명 암호화 관리자.
///
/// 시크릿과 솔트에서 유도된 단일 키를 보관하며, 신규(GCM)와
/// 레거시(CBC) 두 형식의 복호화를 모두 지원합니다.
pub struct CredentialCipher {
    key: [u8; KEY_SIZE],
}

impl CredentialCipher {
    /// 시크릿과 솔트로 암호화 관리자를 생성합니다.
    ///
    /// 키는 PBKDF2-HMAC-SHA256으로 유도됩니다 (100,000회 반복, 32바이트).
    pub fn new(secret: &str, salt: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::SecretNotConfigured);
        }

        let mut key = [0u8; KEY_SIZE];
        pbkdf2::pbkdf2_hmac::<sha2::Sha256>(
            secret.as_bytes(),
            salt.as_bytes(),
            PBKDF2_ITERATIONS,
            &mut key,
        );
        Ok(Self { key })
    }

    /// 환경변수에서 암호화 관리자를 생성합니다.
    ///
    /// `ENCRYPTION_SECRET`은 필수이며, `ENCRYPTION_SALT`가 없으면 기본
    /// 솔트를 사용합니다.
    pub fn from_env() -> Result<Self, CryptoError> {
        let secret =
            std::env::var("ENCRYPTION_SECRET").map_err(|_| CryptoError::SecretNotConfigured)?;
        let salt = std::env::var("ENCRYPTION_SALT")
            .unwrap_or_else(|_| "position-guard-default-salt".to_string());
        Self::new(&secret, &salt)
    }

    /// 문자열을 암호화합니다.
    ///
    /// 반환 형식: `base64("ivHex:authTagHex:cipherHex")`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm16::new_from_slice(&self.key)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut iv = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        // aes-gcm은 암호문 끝에 태그를 붙여 반환하므로 분리한다
        let mut ciphertext = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        let tag = ciphertext.split_off(ciphertext.len() - TAG_SIZE);

        let combined = format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        );
        Ok(base64::engine::general_purpose::STANDARD.encode(combined))
    }

    /// 암호화된 문자열을 복호화합니다.
    ///
    /// 신규(GCM)와 레거시(CBC) 형식을 자동으로 판별합니다.
    pub fn decrypt(&self, encrypted: &str) -> Result<String, CryptoError> {
        // base64 표준 알파벳에는 콜론이 없으므로 콜론 유무로 형식 판별
        if !encrypted.contains(':') {
            self.decrypt_gcm(encrypted)
        } else {
            self.decrypt_legacy_cbc(encrypted)
        }
    }

    /// 신규 형식 복호화: `base64("ivHex:authTagHex:cipherHex")`.
    fn decrypt_gcm(&self, encrypted: &str) -> Result<String, CryptoError> {
        let combined = base64::engine::general_purpose::STANDARD.decode(encrypted)?;
        let combined = String::from_utf8(combined)?;

        let parts: Vec<&str> = combined.split(':').collect();
        if parts.len() != 3 {
            return Err(CryptoError::InvalidFormat(format!(
                "expected 3 parts, got {}",
                parts.len()
            )));
        }

        let iv = hex::decode(parts[0])?;
        let tag = hex::decode(parts[1])?;
        let mut ciphertext = hex::decode(parts[2])?;

        if iv.len() != IV_SIZE {
            return Err(CryptoError::InvalidFormat(format!(
                "invalid IV length {}",
                iv.len()
            )));
        }

        let cipher = Aes256Gcm16::new_from_slice(&self.key)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        // aead API는 태그가 뒤에 붙은 암호문을 기대한다
        ciphertext.extend_from_slice(&tag);
        let plaintext = cipher
            .decrypt(Nonce::<U16>::from_slice(&iv), ciphertext.as_ref())
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(CryptoError::from)
    }

    /// 레거시 형식 복호화: `"ivHex:cipherHex"` (AES-256-CBC, PKCS7).
    fn decrypt_legacy_cbc(&self, encrypted: &str) -> Result<String, CryptoError> {
        let parts: Vec<&str> = encrypted.split(':').collect();
        if parts.len() != 2 {
            return Err(CryptoError::InvalidFormat(format!(
                "expected 2 parts, got {}",
                parts.len()
            )));
        }

        let iv = hex::decode(parts[0])?;
        let ciphertext = hex::decode(parts[1])?;

        let decryptor = Aes256CbcDec::new_from_slices(&self.key, &iv)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        let plaintext = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(CryptoError::from)
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 키 자체는 절대 출력하지 않는다
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    type Aes256CbcEnc = cbc::Encryptor<Aes256>;

    fn test_cipher() -> CredentialCipher {
        CredentialCipher::new("test-secret", "test-salt").unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let plaintext = "my-secret-api-key-12345";

        let encrypted = cipher.encrypt(plaintext).unwrap();
        assert_ne!(encrypted, plaintext);

        let decrypted = cipher.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_unique_iv() {
        let cipher = test_cipher();
        let a = cipher.encrypt("same-input").unwrap();
        let b = cipher.encrypt("same-input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = test_cipher();
        let other = CredentialCipher::new("other-secret", "test-salt").unwrap();

        let encrypted = cipher.encrypt("secret").unwrap();
        assert!(matches!(
            other.decrypt(&encrypted),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_legacy_cbc_format() {
        let cipher = test_cipher();

        // 레거시 형식으로 직접 암호화해 하위 호환 복호화를 검증
        let iv = [7u8; IV_SIZE];
        let ciphertext = Aes256CbcEnc::new_from_slices(&cipher.key, &iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(b"legacy-api-secret");
        let legacy = format!("{}:{}", hex::encode(iv), hex::encode(ciphertext));

        let decrypted = cipher.decrypt(&legacy).unwrap();
        assert_eq!(decrypted, "legacy-api-secret");
    }

    #[test]
    fn test_invalid_format() {
        let cipher = test_cipher();
        let bogus = base64::engine::general_purpose::STANDARD.encode("only:two");
        assert!(matches!(
            cipher.decrypt(&bogus),
            Err(CryptoError::InvalidFormat(_)) | Err(CryptoError::HexError(_))
        ));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            CredentialCipher::new("", "salt"),
            Err(CryptoError::SecretNotConfigured)
        ));
    }
}
