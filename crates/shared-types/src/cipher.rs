//! # Cipher Port
//!
//! The asymmetric encryption primitive is an external collaborator. Nodes
//! only ever move its output around; clients and tests plug an implementation
//! in through this trait.

use thiserror::Error;

use crate::entities::PublicKey;
use crate::errors::RelayError;

/// Failure at the cipher boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Decryption failed")]
    DecryptionFailed,
}

impl From<CryptoError> for RelayError {
    fn from(err: CryptoError) -> Self {
        RelayError::Crypto(err.to_string())
    }
}

/// Public-key encryption contract used by relay clients.
pub trait MessageCipher: Send + Sync {
    /// Private key material understood by the implementation.
    type PrivateKey;

    /// Encrypt `plaintext` so only the holder of the matching private key can read it.
    fn encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt a ciphertext produced by [`MessageCipher::encrypt`].
    fn decrypt(&self, key: &Self::PrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}
