//! WalletVault - encrypted per-user signing credentials with scoped access.
//!
//! One credential per (user, chain family). Secrets are AES-256-GCM
//! encrypted at rest; the only way to use one is `with_signer`, which
//! decrypts into a zeroized buffer, hands an ephemeral `ChainSigner` to the
//! wrapped operation and wipes the plaintext on every exit path.

pub mod crypto;
pub mod signer;

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::domain::signal::ChainFamily;
use crate::storage::{JsonStore, StoreError};

pub use crypto::{CryptoError, VaultCipher};
pub use signer::{ChainSigner, SignerError};

const MASTER_KEY_ENV: &str = "VAULT_MASTER_KEY";
const KEY_FILE: &str = ".vault_key";

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("User {user_id} has no {chain} wallet")]
    NoWallet { user_id: u64, chain: ChainFamily },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Vault master key unavailable: {0}")]
    MasterKey(String),
    #[error("Corrupted credential encoding: {0}")]
    Encoding(String),
}

/// Encrypted credential record. The plaintext secret never appears here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletCredential {
    pub user_id: u64,
    pub chain: ChainFamily,
    /// Public address derived at registration time.
    pub address: String,
    nonce: String,
    ciphertext: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultFile {
    salt: String,
    credentials: Vec<WalletCredential>,
}

/// Load the vault master key: `VAULT_MASTER_KEY` env var if set, otherwise
/// a key file in the data dir (generated on first run). An unreadable key
/// file is fatal - without the key no credential can ever be decrypted.
pub fn load_master_key(data_dir: &Path) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    if let Ok(key) = std::env::var(MASTER_KEY_ENV) {
        if key.is_empty() {
            return Err(VaultError::MasterKey(format!("{MASTER_KEY_ENV} is empty")));
        }
        return Ok(Zeroizing::new(key.into_bytes()));
    }

    let key_path = data_dir.join(KEY_FILE);
    if key_path.exists() {
        let bytes = std::fs::read(&key_path)
            .map_err(|e| VaultError::MasterKey(format!("cannot read {}: {e}", key_path.display())))?;
        if bytes.is_empty() {
            return Err(VaultError::MasterKey(format!(
                "{} is empty",
                key_path.display()
            )));
        }
        return Ok(Zeroizing::new(bytes));
    }

    let mut key = vec![0u8; 32];
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(&mut key);
    std::fs::create_dir_all(data_dir)
        .map_err(|e| VaultError::MasterKey(format!("cannot create data dir: {e}")))?;
    std::fs::write(&key_path, &key)
        .map_err(|e| VaultError::MasterKey(format!("cannot write {}: {e}", key_path.display())))?;
    tracing::warn!(path = %key_path.display(), "Generated new vault master key");
    Ok(Zeroizing::new(key))
}

pub struct WalletVault {
    cipher: VaultCipher,
    credentials: RwLock<HashMap<(u64, ChainFamily), WalletCredential>>,
    store: JsonStore,
    salt: String,
}

impl WalletVault {
    pub fn load(store: JsonStore, master_key: &[u8]) -> Result<Self, VaultError> {
        let mut file: VaultFile = store.load_or_default()?;
        if file.salt.is_empty() {
            file.salt =
                base64::engine::general_purpose::STANDARD.encode(VaultCipher::random_salt());
        }
        let salt = base64::engine::general_purpose::STANDARD
            .decode(&file.salt)
            .map_err(|e| VaultError::Encoding(e.to_string()))?;
        let cipher = VaultCipher::derive(master_key, &salt);
        let credentials = file
            .credentials
            .into_iter()
            .map(|c| ((c.user_id, c.chain), c))
            .collect::<HashMap<_, _>>();
        tracing::info!(credentials = credentials.len(), "Wallet vault loaded");
        Ok(Self {
            cipher,
            credentials: RwLock::new(credentials),
            store,
            salt: file.salt,
        })
    }

    async fn persist(
        &self,
        credentials: &HashMap<(u64, ChainFamily), WalletCredential>,
    ) -> Result<(), VaultError> {
        let mut list: Vec<_> = credentials.values().cloned().collect();
        list.sort_by_key(|c| (c.user_id, c.chain.as_str()));
        self.store.save(&VaultFile {
            salt: self.salt.clone(),
            credentials: list,
        })?;
        Ok(())
    }

    /// Encrypt and store a credential, replacing any existing one for the
    /// same (user, chain). The secret is validated by deriving the signer
    /// once; the returned string is the derived public address.
    pub async fn add_credential(
        &self,
        user_id: u64,
        chain: ChainFamily,
        secret: &str,
    ) -> Result<String, VaultError> {
        let address = {
            let signer = ChainSigner::from_secret(chain, secret.as_bytes())?;
            signer.address()
        };
        let (nonce, ciphertext) = self.cipher.encrypt(secret.as_bytes())?;
        let credential = WalletCredential {
            user_id,
            chain,
            address: address.clone(),
            nonce: base64::engine::general_purpose::STANDARD.encode(nonce),
            ciphertext: base64::engine::general_purpose::STANDARD.encode(ciphertext),
            created_at: Utc::now(),
        };
        let mut credentials = self.credentials.write().await;
        credentials.insert((user_id, chain), credential);
        self.persist(&credentials).await?;
        tracing::info!(user_id, %chain, %address, "Wallet credential stored");
        Ok(address)
    }

    pub async fn remove_credential(
        &self,
        user_id: u64,
        chain: ChainFamily,
    ) -> Result<bool, VaultError> {
        let mut credentials = self.credentials.write().await;
        let removed = credentials.remove(&(user_id, chain)).is_some();
        if removed {
            self.persist(&credentials).await?;
        }
        Ok(removed)
    }

    pub async fn has_credential(&self, user_id: u64, chain: ChainFamily) -> bool {
        self.credentials
            .read()
            .await
            .contains_key(&(user_id, chain))
    }

    /// Public address for balance lookups; does not decrypt anything.
    pub async fn address_of(&self, user_id: u64, chain: ChainFamily) -> Option<String> {
        self.credentials
            .read()
            .await
            .get(&(user_id, chain))
            .map(|c| c.address.clone())
    }

    /// Chains the user has a wallet for, with addresses. Display accessor.
    pub async fn wallets_of(&self, user_id: u64) -> Vec<(ChainFamily, String)> {
        let credentials = self.credentials.read().await;
        ChainFamily::ALL
            .into_iter()
            .filter_map(|chain| {
                credentials
                    .get(&(user_id, chain))
                    .map(|c| (chain, c.address.clone()))
            })
            .collect()
    }

    /// Run `op` with a scoped signer for the user's credential. The
    /// decrypted secret lives in a zeroized buffer for the duration of
    /// signer construction only, and the signer handle itself does not
    /// outlive this call - on success, error or panic unwind alike.
    pub async fn with_signer<F, Fut, T>(
        &self,
        user_id: u64,
        chain: ChainFamily,
        op: F,
    ) -> Result<T, VaultError>
    where
        F: FnOnce(ChainSigner) -> Fut,
        Fut: Future<Output = T>,
    {
        let (nonce, ciphertext) = {
            let credentials = self.credentials.read().await;
            let credential = credentials
                .get(&(user_id, chain))
                .ok_or(VaultError::NoWallet { user_id, chain })?;
            (
                base64::engine::general_purpose::STANDARD
                    .decode(&credential.nonce)
                    .map_err(|e| VaultError::Encoding(e.to_string()))?,
                base64::engine::general_purpose::STANDARD
                    .decode(&credential.ciphertext)
                    .map_err(|e| VaultError::Encoding(e.to_string()))?,
            )
        };
        let signer = {
            let plaintext = self.cipher.decrypt(&nonce, &ciphertext)?;
            ChainSigner::from_secret(chain, &plaintext)?
            // plaintext buffer zeroized here
        };
        Ok(op(signer).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::Keypair;
    use solana_sdk::signer::Signer as _;
    use tempfile::TempDir;

    fn vault(dir: &TempDir) -> WalletVault {
        let store = JsonStore::open(dir.path(), "wallets.json").unwrap();
        WalletVault::load(store, b"test-master-key").unwrap()
    }

    #[tokio::test]
    async fn test_add_and_scoped_sign() {
        let dir = TempDir::new().unwrap();
        let vault = vault(&dir);
        let keypair = Keypair::new();
        let address = vault
            .add_credential(7, ChainFamily::Solana, &keypair.to_base58_string())
            .await
            .unwrap();
        assert_eq!(address, keypair.pubkey().to_string());

        let signed = vault
            .with_signer(7, ChainFamily::Solana, |signer| async move {
                signer.as_solana().unwrap().sign_message(b"hello")
            })
            .await
            .unwrap();
        assert!(signed.verify(keypair.pubkey().as_ref(), b"hello"));
    }

    #[tokio::test]
    async fn test_no_wallet_error() {
        let dir = TempDir::new().unwrap();
        let vault = vault(&dir);
        let result = vault
            .with_signer(7, ChainFamily::Ton, |_signer| async move { () })
            .await;
        assert!(matches!(
            result,
            Err(VaultError::NoWallet {
                user_id: 7,
                chain: ChainFamily::Ton
            })
        ));
    }

    #[tokio::test]
    async fn test_secret_not_stored_in_plaintext() {
        let dir = TempDir::new().unwrap();
        let vault = vault(&dir);
        let secret = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
        vault
            .add_credential(7, ChainFamily::Evm, secret)
            .await
            .unwrap();

        let on_disk = std::fs::read_to_string(dir.path().join("wallets.json")).unwrap();
        assert!(!on_disk.contains(secret.trim_start_matches("0x")));
    }

    #[tokio::test]
    async fn test_survives_reload_with_same_key() {
        let dir = TempDir::new().unwrap();
        let keypair = Keypair::new();
        {
            let vault = vault(&dir);
            vault
                .add_credential(7, ChainFamily::Solana, &keypair.to_base58_string())
                .await
                .unwrap();
        }
        let vault = vault(&dir);
        assert!(vault.has_credential(7, ChainFamily::Solana).await);
        assert_eq!(
            vault.address_of(7, ChainFamily::Solana).await.unwrap(),
            keypair.pubkey().to_string()
        );
    }

    #[tokio::test]
    async fn test_wrong_master_key_cannot_decrypt() {
        let dir = TempDir::new().unwrap();
        let keypair = Keypair::new();
        {
            let vault = vault(&dir);
            vault
                .add_credential(7, ChainFamily::Solana, &keypair.to_base58_string())
                .await
                .unwrap();
        }
        let store = JsonStore::open(dir.path(), "wallets.json").unwrap();
        let wrong = WalletVault::load(store, b"different-key").unwrap();
        let result = wrong
            .with_signer(7, ChainFamily::Solana, |_s| async move { () })
            .await;
        assert!(matches!(result, Err(VaultError::Crypto(_))));
    }

    #[tokio::test]
    async fn test_remove_credential() {
        let dir = TempDir::new().unwrap();
        let vault = vault(&dir);
        let keypair = Keypair::new();
        vault
            .add_credential(7, ChainFamily::Solana, &keypair.to_base58_string())
            .await
            .unwrap();
        assert!(vault.remove_credential(7, ChainFamily::Solana).await.unwrap());
        assert!(!vault.has_credential(7, ChainFamily::Solana).await);
        assert!(!vault.remove_credential(7, ChainFamily::Solana).await.unwrap());
    }

    #[test]
    fn test_master_key_generated_once() {
        let dir = TempDir::new().unwrap();
        // Env var must not leak into this test.
        std::env::remove_var(MASTER_KEY_ENV);
        let key1 = load_master_key(dir.path()).unwrap();
        let key2 = load_master_key(dir.path()).unwrap();
        assert_eq!(&*key1, &*key2);
        assert_eq!(key1.len(), 32);
    }
}
