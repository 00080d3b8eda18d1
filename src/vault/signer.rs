//! Ephemeral signer handles, one variant per chain family.
//!
//! A `ChainSigner` only exists inside a `WalletVault::with_signer` scope.
//! Adapters downcast to their family's variant and treat a mismatch as a
//! signature error.

use ed25519_dalek::SigningKey;
use ethers::signers::{LocalWallet, Signer as _};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer as _;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::domain::signal::ChainFamily;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Invalid {family} secret: {reason}")]
    InvalidSecret {
        family: ChainFamily,
        reason: String,
    },
    #[error("Signer is for {actual}, expected {expected}")]
    WrongFamily {
        expected: ChainFamily,
        actual: ChainFamily,
    },
}

pub enum ChainSigner {
    Solana(Keypair),
    Evm(LocalWallet),
    Ton(SigningKey),
}

impl ChainSigner {
    /// Build a signer from the decrypted secret material.
    ///
    /// Accepted formats: Solana - base58 or JSON byte array of the 64-byte
    /// keypair; EVM - hex private key with optional 0x prefix; TON - hex or
    /// base64 of the 32-byte ed25519 seed.
    pub fn from_secret(chain: ChainFamily, secret: &[u8]) -> Result<Self, SignerError> {
        let text = std::str::from_utf8(secret)
            .map_err(|e| invalid(chain, e.to_string()))?
            .trim();
        match chain {
            ChainFamily::Solana => {
                let bytes: Zeroizing<Vec<u8>> = if text.starts_with('[') {
                    Zeroizing::new(
                        serde_json::from_str::<Vec<u8>>(text)
                            .map_err(|e| invalid(chain, e.to_string()))?,
                    )
                } else {
                    Zeroizing::new(
                        bs58::decode(text)
                            .into_vec()
                            .map_err(|e| invalid(chain, e.to_string()))?,
                    )
                };
                let keypair =
                    Keypair::try_from(&bytes[..]).map_err(|e| invalid(chain, e.to_string()))?;
                Ok(ChainSigner::Solana(keypair))
            }
            ChainFamily::Evm => {
                let hex_key = text.strip_prefix("0x").unwrap_or(text);
                let wallet: LocalWallet = hex_key
                    .parse()
                    .map_err(|e: ethers::signers::WalletError| invalid(chain, e.to_string()))?;
                Ok(ChainSigner::Evm(wallet))
            }
            ChainFamily::Ton => {
                let bytes: Zeroizing<Vec<u8>> = if text.len() == 64 {
                    Zeroizing::new(hex::decode(text).map_err(|e| invalid(chain, e.to_string()))?)
                } else {
                    use base64::Engine as _;
                    Zeroizing::new(
                        base64::engine::general_purpose::STANDARD
                            .decode(text)
                            .map_err(|e| invalid(chain, e.to_string()))?,
                    )
                };
                let seed: [u8; 32] = bytes[..]
                    .try_into()
                    .map_err(|_| invalid(chain, format!("expected 32-byte seed, got {}", bytes.len())))?;
                Ok(ChainSigner::Ton(SigningKey::from_bytes(&seed)))
            }
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            ChainSigner::Solana(_) => ChainFamily::Solana,
            ChainSigner::Evm(_) => ChainFamily::Evm,
            ChainSigner::Ton(_) => ChainFamily::Ton,
        }
    }

    /// Public address for balance lookups and order routing. Derived once at
    /// registration so later lookups never touch the secret.
    pub fn address(&self) -> String {
        match self {
            ChainSigner::Solana(keypair) => keypair.pubkey().to_string(),
            ChainSigner::Evm(wallet) => format!("{:?}", wallet.address()),
            // TON wallet-contract address resolution happens gateway-side;
            // the credential is identified by its raw public key.
            ChainSigner::Ton(key) => hex::encode(key.verifying_key().to_bytes()),
        }
    }

    pub fn as_solana(&self) -> Result<&Keypair, SignerError> {
        match self {
            ChainSigner::Solana(keypair) => Ok(keypair),
            other => Err(wrong(ChainFamily::Solana, other)),
        }
    }

    pub fn as_evm(&self) -> Result<&LocalWallet, SignerError> {
        match self {
            ChainSigner::Evm(wallet) => Ok(wallet),
            other => Err(wrong(ChainFamily::Evm, other)),
        }
    }

    pub fn as_ton(&self) -> Result<&SigningKey, SignerError> {
        match self {
            ChainSigner::Ton(key) => Ok(key),
            other => Err(wrong(ChainFamily::Ton, other)),
        }
    }
}

fn invalid(family: ChainFamily, reason: String) -> SignerError {
    SignerError::InvalidSecret { family, reason }
}

fn wrong(expected: ChainFamily, actual: &ChainSigner) -> SignerError {
    SignerError::WrongFamily {
        expected,
        actual: actual.family(),
    }
}
