//! # ECIES Message Cipher
//!
//! Test-side implementation of [`MessageCipher`]: an ephemeral secp256k1
//! ECDH exchange, SHA-256 key derivation and AES-256-GCM.
//!
//! Ciphertext layout:
//!
//! ```text
//! [ephemeral public key, 65 bytes SEC1 uncompressed][nonce, 12 bytes][AES-GCM output]
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use k256::ecdh::{diffie_hellman, EphemeralSecret};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};

use shared_types::{CryptoError, MessageCipher, PublicKey};

const EPHEMERAL_LEN: usize = 65;
const NONCE_LEN: usize = 12;
const KDF_DOMAIN: &[u8] = b"mailbox-relay/ecies/v1";

/// A recipient key pair.
pub struct KeyPair {
    secret: k256::SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret = k256::SecretKey::random(&mut rand::thread_rng());
        let public = PublicKey::new(
            secret
                .public_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        );
        Self { secret, public }
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret(&self) -> &k256::SecretKey {
        &self.secret
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EciesCipher;

impl EciesCipher {
    fn derive_key(shared: &[u8], ephemeral: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(KDF_DOMAIN);
        hasher.update(shared);
        hasher.update(ephemeral);
        hasher.finalize().into()
    }
}

impl MessageCipher for EciesCipher {
    type PrivateKey = k256::SecretKey;

    fn encrypt(&self, recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let recipient = k256::PublicKey::from_sec1_bytes(recipient.as_bytes())
            .map_err(|e| CryptoError::MalformedKey(e.to_string()))?;

        let ephemeral = EphemeralSecret::random(&mut rand::thread_rng());
        let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
        let shared = ephemeral.diffie_hellman(&recipient);
        let key = Self::derive_key(shared.raw_secret_bytes(), ephemeral_public.as_bytes());

        let mut nonce = [0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce);
        let sealed = Aes256Gcm::new(&key.into())
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::MalformedCiphertext("encryption failed".into()))?;

        let mut out = Vec::with_capacity(EPHEMERAL_LEN + NONCE_LEN + sealed.len());
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, key: &Self::PrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < EPHEMERAL_LEN + NONCE_LEN {
            return Err(CryptoError::MalformedCiphertext("too short".into()));
        }
        let (ephemeral, rest) = ciphertext.split_at(EPHEMERAL_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);

        let ephemeral_key = k256::PublicKey::from_sec1_bytes(ephemeral)
            .map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))?;
        let shared = diffie_hellman(key.to_nonzero_scalar(), ephemeral_key.as_affine());
        let aes_key = Self::derive_key(shared.raw_secret_bytes(), ephemeral);

        Aes256Gcm::new(&aes_key.into())
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let tj = KeyPair::generate();
        let sealed = EciesCipher.encrypt(tj.public(), b"Hello. You here?").unwrap();
        assert_eq!(
            EciesCipher.decrypt(tj.secret(), &sealed).unwrap(),
            b"Hello. You here?"
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let tj = KeyPair::generate();
        let other = KeyPair::generate();
        let sealed = EciesCipher.encrypt(tj.public(), b"secret").unwrap();
        assert_eq!(
            EciesCipher.decrypt(other.secret(), &sealed),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let tj = KeyPair::generate();
        let mut sealed = EciesCipher.encrypt(tj.public(), b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(EciesCipher.decrypt(tj.secret(), &sealed).is_err());
    }

    #[test]
    fn test_malformed_recipient_key() {
        let bogus = PublicKey::new(vec![0x04; 10]);
        assert!(matches!(
            EciesCipher.encrypt(&bogus, b"x"),
            Err(CryptoError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_each_encryption_is_fresh() {
        let tj = KeyPair::generate();
        let a = EciesCipher.encrypt(tj.public(), b"same").unwrap();
        let b = EciesCipher.encrypt(tj.public(), b"same").unwrap();
        assert_ne!(a, b);
    }
}
