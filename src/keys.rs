// restoretool/src/keys.rs
use once_cell::sync::OnceCell;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{RestoreError, Result};

pub const KEY_BITS: usize = 4096;

/// Long-lived RSA keypair persisted as PKCS#8 PEM. The keypair is
/// materialized lazily on first use: a missing or expired key file is
/// replaced by a freshly generated one before anything reads it.
///
/// The checksum of the public key names the remote key blobs addressed to
/// this keypair generation (`<dump>.key.<checksum>`), so rotating the key
/// invalidates dumps sealed for the previous generation.
pub struct AsymmetricKeyStore {
    key_file: PathBuf,
    expiry_secs: u64,
    key_bits: usize,
    key: OnceCell<RsaPrivateKey>,
}

impl AsymmetricKeyStore {
    /// `expiry_secs` is the rotation window measured against the key file's
    /// modification time; `0` means the key never expires.
    pub fn new(key_file: impl Into<PathBuf>, expiry_secs: u64) -> Self {
        AsymmetricKeyStore {
            key_file: key_file.into(),
            expiry_secs,
            key_bits: KEY_BITS,
            key: OnceCell::new(),
        }
    }

    /// PEM serialization of the public half of the active keypair.
    pub fn public_key_pem(&self) -> Result<String> {
        let key = self.private_key()?;
        RsaPublicKey::from(key)
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| RestoreError::Storage(format!("Could not serialize public key: {}", e)))
    }

    /// Lowercase hex fingerprint of the serialized public key.
    pub fn key_checksum(&self) -> Result<String> {
        let pem = self.public_key_pem()?;
        Ok(hex::encode(Sha256::digest(pem.as_bytes())))
    }

    /// Decrypts a small blob addressed to this keypair. Older producers
    /// encrypted with PKCS#1 v1.5 padding, newer ones with OAEP; both must
    /// keep decrypting against the currently active key.
    pub fn decrypt(&self, input: &[u8]) -> Result<Vec<u8>> {
        let key = self.private_key()?;
        try_decrypt_schemes(key, input)
    }

    fn private_key(&self) -> Result<&RsaPrivateKey> {
        self.key.get_or_try_init(|| self.load_or_generate())
    }

    fn load_or_generate(&self) -> Result<RsaPrivateKey> {
        if self.key_file_is_fresh() {
            let pem = fs::read_to_string(&self.key_file).map_err(|e| {
                RestoreError::Storage(format!(
                    "Could not read key file {}: {}",
                    self.key_file.display(),
                    e
                ))
            })?;
            return RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| {
                RestoreError::Storage(format!(
                    "Key file {} is not a valid PKCS#8 private key: {}",
                    self.key_file.display(),
                    e
                ))
            });
        }

        println!(
            "Generating fresh {}-bit keypair at {}",
            self.key_bits,
            self.key_file.display()
        );
        let _ = fs::remove_file(&self.key_file);

        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, self.key_bits)
            .map_err(|e| RestoreError::KeyUnavailable(format!("Keypair generation failed: {}", e)))?;
        self.persist(&key)?;

        // Read back so the key in memory always matches the bytes on disk.
        let pem = fs::read_to_string(&self.key_file).map_err(|e| {
            RestoreError::Storage(format!(
                "Could not read back key file {}: {}",
                self.key_file.display(),
                e
            ))
        })?;
        RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| {
            RestoreError::Storage(format!("Persisted key failed to parse: {}", e))
        })
    }

    fn key_file_is_fresh(&self) -> bool {
        let Ok(metadata) = fs::metadata(&self.key_file) else {
            return false;
        };
        if self.expiry_secs == 0 {
            return true;
        }
        match metadata.modified().and_then(|mtime| {
            mtime
                .elapsed()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        }) {
            Ok(age) => age <= Duration::from_secs(self.expiry_secs),
            // Unreadable or future mtime: treat as fresh rather than rotate.
            Err(_) => true,
        }
    }

    // Write-then-rename so a crash never leaves a half-written key file.
    fn persist(&self, key: &RsaPrivateKey) -> Result<()> {
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| RestoreError::Storage(format!("Could not serialize keypair: {}", e)))?;
        let mut staging = self.key_file.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, pem.as_bytes()).map_err(|e| {
            RestoreError::Storage(format!(
                "Could not write key file {}: {}",
                staging.display(),
                e
            ))
        })?;
        fs::rename(&staging, &self.key_file).map_err(|e| {
            RestoreError::Storage(format!(
                "Could not move key file into place at {}: {}",
                self.key_file.display(),
                e
            ))
        })
    }
}

/// Attempts the modern OAEP scheme first and falls back to the legacy
/// PKCS#1 v1.5 scheme, failing only when both reject the ciphertext.
pub(crate) fn try_decrypt_schemes(key: &RsaPrivateKey, input: &[u8]) -> Result<Vec<u8>> {
    if let Ok(plain) = key.decrypt(Oaep::new::<Sha256>(), input) {
        return Ok(plain);
    }
    key.decrypt(Pkcs1v15Encrypt, input).map_err(|e| {
        RestoreError::KeyUnavailable(format!(
            "Decryption failed under both padding schemes: {}",
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY_BITS: usize = 2048;

    fn test_store(key_file: PathBuf, expiry_secs: u64) -> AsymmetricKeyStore {
        AsymmetricKeyStore {
            key_file,
            expiry_secs,
            key_bits: TEST_KEY_BITS,
            key: OnceCell::new(),
        }
    }

    #[test]
    fn test_round_trip_both_padding_schemes() -> Result<()> {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, TEST_KEY_BITS).unwrap();
        let public = RsaPublicKey::from(&key);
        let message = b"symmetric key material";

        let modern = public
            .encrypt(&mut rng, Oaep::new::<Sha256>(), message)
            .unwrap();
        assert_eq!(try_decrypt_schemes(&key, &modern)?, message);

        let legacy = public.encrypt(&mut rng, Pkcs1v15Encrypt, message).unwrap();
        assert_eq!(try_decrypt_schemes(&key, &legacy)?, message);
        Ok(())
    }

    #[test]
    fn test_decrypt_with_foreign_ciphertext_is_key_unavailable() {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, TEST_KEY_BITS).unwrap();
        let other = RsaPrivateKey::new(&mut rng, TEST_KEY_BITS).unwrap();
        let ciphertext = RsaPublicKey::from(&other)
            .encrypt(&mut rng, Oaep::new::<Sha256>(), b"sealed for someone else")
            .unwrap();

        match try_decrypt_schemes(&key, &ciphertext) {
            Err(RestoreError::KeyUnavailable(_)) => {}
            other => panic!("expected KeyUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_store_persists_and_reloads_same_keypair() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("servercontrol.key");

        let store = test_store(key_file.clone(), 0);
        let checksum = store.key_checksum()?;
        assert_eq!(checksum.len(), 64);
        assert!(key_file.is_file());

        // A second store over the same fresh file loads the same keypair.
        let reloaded = test_store(key_file.clone(), 0);
        assert_eq!(reloaded.key_checksum()?, checksum);
        Ok(())
    }

    #[test]
    fn test_store_regenerates_when_file_is_missing() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("servercontrol.key");

        let first = test_store(key_file.clone(), 0).key_checksum()?;
        fs::remove_file(&key_file).unwrap();
        let second = test_store(key_file, 0).key_checksum()?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn test_corrupt_key_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("servercontrol.key");
        fs::write(&key_file, "not a pem").unwrap();

        let store = test_store(key_file, 0);
        match store.decrypt(b"anything") {
            Err(RestoreError::Storage(_)) => {}
            other => panic!("expected Storage error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_round_trip_through_store() -> Result<()> {
        use rsa::pkcs8::DecodePublicKey;

        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path().join("servercontrol.key"), 30000);

        let pem = store.public_key_pem()?;
        let public = RsaPublicKey::from_public_key_pem(&pem).unwrap();
        let mut rng = rand::thread_rng();
        let sealed = public
            .encrypt(&mut rng, Oaep::new::<Sha256>(), b"fresh symmetric key")
            .unwrap();
        assert_eq!(store.decrypt(&sealed)?, b"fresh symmetric key");
        Ok(())
    }
}
