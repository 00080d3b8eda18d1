//! AES-256-GCM encryption for wallet secrets at rest.
//!
//! The cipher key is derived from the vault master key with PBKDF2-HMAC-SHA256
//! and a per-vault random salt. Decrypted plaintext is always returned inside
//! a `Zeroizing` buffer so it is wiped when the scope ends.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_SIZE: usize = 16;
const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption failed")]
    Encrypt,
    #[error("Decryption failed (wrong master key or corrupted ciphertext)")]
    Decrypt,
    #[error("Invalid nonce length: {0}")]
    InvalidNonce(usize),
}

/// Symmetric cipher bound to one vault's derived key.
pub struct VaultCipher {
    key: [u8; KEY_SIZE],
}

impl VaultCipher {
    pub fn derive(master_key: &[u8], salt: &[u8]) -> Self {
        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(master_key, salt, PBKDF2_ITERATIONS, &mut key);
        Self { key }
    }

    pub fn random_salt() -> [u8; SALT_SIZE] {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    /// Encrypt plaintext under a fresh random nonce. Returns (nonce, ciphertext).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<([u8; NONCE_SIZE], Vec<u8>), CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Encrypt)?;
        Ok((nonce, ciphertext))
    }

    pub fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if nonce.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonce(nonce.len()));
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        Ok(Zeroizing::new(plaintext))
    }
}

impl Drop for VaultCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let salt = VaultCipher::random_salt();
        let cipher = VaultCipher::derive(b"master-key", &salt);
        let (nonce, ct) = cipher.encrypt(b"super secret").unwrap();
        let pt = cipher.decrypt(&nonce, &ct).unwrap();
        assert_eq!(&*pt, b"super secret");
    }

    #[test]
    fn test_wrong_master_key_fails() {
        let salt = VaultCipher::random_salt();
        let cipher = VaultCipher::derive(b"master-key", &salt);
        let (nonce, ct) = cipher.encrypt(b"super secret").unwrap();

        let wrong = VaultCipher::derive(b"other-key", &salt);
        assert!(matches!(wrong.decrypt(&nonce, &ct), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let salt = VaultCipher::random_salt();
        let cipher = VaultCipher::derive(b"master-key", &salt);
        let (nonce, mut ct) = cipher.encrypt(b"super secret").unwrap();
        ct[0] ^= 0xff;
        assert!(cipher.decrypt(&nonce, &ct).is_err());
    }

    #[test]
    fn test_nonces_are_unique() {
        let salt = VaultCipher::random_salt();
        let cipher = VaultCipher::derive(b"master-key", &salt);
        let (n1, _) = cipher.encrypt(b"x").unwrap();
        let (n2, _) = cipher.encrypt(b"x").unwrap();
        assert_ne!(n1, n2);
    }
}
