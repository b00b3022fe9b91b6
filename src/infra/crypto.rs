//! At-rest encryption for per-restaurant gateway secrets.
//!
//! Ciphertexts are `enc:<iv hex>:<tag hex>:<data hex>` using AES-256-GCM with
//! a 16-byte IV. Anything without the `enc:` prefix is legacy plaintext and
//! is returned unchanged.

use {
    crate::domain::error::EngineError,
    aes_gcm::{
        AesGcm, Nonce,
        aead::{Aead, AeadCore, KeyInit, OsRng, consts::U16},
        aes::Aes256,
    },
    sha2::{Digest, Sha256},
};

type Aes256Gcm16 = AesGcm<Aes256, U16>;

const PREFIX: &str = "enc:";
const TAG_LEN: usize = 16;

pub struct CredentialCipher {
    cipher: Aes256Gcm16,
}

impl CredentialCipher {
    /// 64 hex chars are decoded, exactly 32 chars are used as raw bytes,
    /// anything else is hashed with SHA-256.
    pub fn new(key: &str) -> Result<Self, EngineError> {
        if key.is_empty() {
            return Err(EngineError::Crypto("encryption key is empty".into()));
        }
        let bytes: [u8; 32] = if key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit()) {
            let decoded = hex::decode(key).map_err(|e| EngineError::Crypto(e.to_string()))?;
            decoded
                .try_into()
                .map_err(|_| EngineError::Crypto("hex key must be 32 bytes".into()))?
        } else if key.len() == 32 {
            let mut raw = [0u8; 32];
            raw.copy_from_slice(key.as_bytes());
            raw
        } else {
            Sha256::digest(key.as_bytes()).into()
        };

        let cipher = Aes256Gcm16::new_from_slice(&bytes)
            .map_err(|e| EngineError::Crypto(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, EngineError> {
        let nonce = Aes256Gcm16::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| EngineError::Crypto("encryption failed".into()))?;
        let (data, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(format!(
            "{PREFIX}{}:{}:{}",
            hex::encode(nonce),
            hex::encode(tag),
            hex::encode(data)
        ))
    }

    pub fn decrypt(&self, value: &str) -> Result<String, EngineError> {
        let Some(body) = value.strip_prefix(PREFIX) else {
            return Ok(value.to_string());
        };

        let mut parts = body.split(':');
        let (Some(iv), Some(tag), Some(data), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(EngineError::Crypto("malformed ciphertext".into()));
        };

        let iv = decode_hex(iv)?;
        let tag = decode_hex(tag)?;
        if iv.len() != 16 || tag.len() != TAG_LEN {
            return Err(EngineError::Crypto("malformed ciphertext".into()));
        }
        let mut sealed = decode_hex(data)?;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::<U16>::from_slice(&iv), sealed.as_slice())
            .map_err(|_| EngineError::Crypto("decryption failed, wrong key or tampered value".into()))?;
        String::from_utf8(plaintext).map_err(|e| EngineError::Crypto(e.to_string()))
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, EngineError> {
    hex::decode(s).map_err(|e| EngineError::Crypto(e.to_string()))
}
