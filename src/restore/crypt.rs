// restoretool/src/restore/crypt.rs
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;

use crate::errors::{RestoreError, Result};

pub const SYMMETRIC_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;

/// Opens a sealed dump payload: a 24-byte nonce prefix followed by the
/// XChaCha20-Poly1305 ciphertext and tag. Tampering, truncation, or a wrong
/// key all surface as `DecryptionFailed`; there is never partial plaintext.
pub fn open_dump_payload(key: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for_key(key)?;
    if payload.len() < NONCE_LEN {
        return Err(RestoreError::DecryptionFailed(format!(
            "Payload of {} bytes is shorter than the {}-byte nonce",
            payload.len(),
            NONCE_LEN
        )));
    }
    let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| RestoreError::DecryptionFailed("Payload authentication failed".to_string()))
}

/// Seals plaintext into the payload framing `open_dump_payload` accepts.
/// Restore never calls this; it exists for dump producers and tests.
#[allow(dead_code)]
pub fn seal_dump_payload(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = cipher_for_key(key)?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| RestoreError::DecryptionFailed("Payload encryption failed".to_string()))?;

    let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    Ok(payload)
}

fn cipher_for_key(key: &[u8]) -> Result<XChaCha20Poly1305> {
    if key.len() != SYMMETRIC_KEY_LEN {
        return Err(RestoreError::DecryptionFailed(format!(
            "Symmetric key must be {} bytes, got {}",
            SYMMETRIC_KEY_LEN,
            key.len()
        )));
    }
    Ok(XChaCha20Poly1305::new(Key::from_slice(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; SYMMETRIC_KEY_LEN] {
        let mut key = [0u8; SYMMETRIC_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_seal_and_open_round_trip() -> Result<()> {
        let key = test_key();
        let payload = seal_dump_payload(&key, b"CREATE TABLE t (a INT);")?;
        assert_eq!(open_dump_payload(&key, &payload)?, b"CREATE TABLE t (a INT);");
        Ok(())
    }

    #[test]
    fn test_tampered_payload_fails_authentication() {
        let key = test_key();
        let mut payload = seal_dump_payload(&key, b"sensitive dump").unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;

        match open_dump_payload(&key, &payload) {
            Err(RestoreError::DecryptionFailed(_)) => {}
            other => panic!("expected DecryptionFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let key = test_key();
        match open_dump_payload(&key, &[0u8; NONCE_LEN - 1]) {
            Err(RestoreError::DecryptionFailed(_)) => {}
            other => panic!("expected DecryptionFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let payload = seal_dump_payload(&test_key(), b"dump").unwrap();
        assert!(matches!(
            open_dump_payload(&test_key(), &payload),
            Err(RestoreError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_undersized_key_is_rejected() {
        assert!(matches!(
            open_dump_payload(&[0u8; 16], &[0u8; 64]),
            Err(RestoreError::DecryptionFailed(_))
        ));
    }
}
