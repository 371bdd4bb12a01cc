//! Key custody behind a signing interface
//!
//! The execution core never touches raw key bytes; it sees only the
//! [`Signer`] trait. The in-process [`LocalKeySigner`] is the reference
//! custody backend and can be swapped for an HSM or remote signer without
//! touching the trading agent.

use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};

use crate::address::Address;

/// Error types for key handling
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("key generation failed")]
    Generation,

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
}

/// Signs messages on behalf of one keypair without exposing it.
pub trait Signer: Send + Sync {
    /// Raw public key bytes
    fn public_key(&self) -> Vec<u8>;

    /// Address derived from the public key
    fn address(&self) -> Address;

    /// Sign an arbitrary message digest
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

/// In-process Ed25519 signer holding its own key material.
pub struct LocalKeySigner {
    pkcs8: Vec<u8>,
    keypair: Ed25519KeyPair,
    address: Address,
}

impl LocalKeySigner {
    /// Generate a fresh keypair.
    pub fn generate() -> Result<Self, SignerError> {
        let rng = SystemRandom::new();
        let pkcs8 =
            Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| SignerError::Generation)?;
        Self::from_pkcs8(pkcs8.as_ref())
    }

    /// Reconstruct a signer from PKCS#8 key material (e.g. uploaded by the
    /// issuing device).
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, SignerError> {
        let keypair = Ed25519KeyPair::from_pkcs8(pkcs8)
            .map_err(|e| SignerError::InvalidKeyMaterial(e.to_string()))?;
        let address = Address::from_public_key(keypair.public_key().as_ref());

        Ok(Self {
            pkcs8: pkcs8.to_vec(),
            keypair,
            address,
        })
    }

    /// Export the key material for transport to the agent's store.
    ///
    /// This is the trust-boundary crossing of the reference design: the
    /// issuing device hands the session key to the process that runs the
    /// agent. A production custody backend keeps the key where it was
    /// generated and exposes only `Signer`.
    pub fn to_pkcs8_hex(&self) -> String {
        hex::encode(&self.pkcs8)
    }
}

impl Signer for LocalKeySigner {
    fn public_key(&self) -> Vec<u8> {
        self.keypair.public_key().as_ref().to_vec()
    }

    fn address(&self) -> Address {
        self.address.clone()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.keypair.sign(message).as_ref().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::signature::UnparsedPublicKey;

    #[test]
    fn test_generate_produces_distinct_keys() {
        let a = LocalKeySigner::generate().unwrap();
        let b = LocalKeySigner::generate().unwrap();
        assert_ne!(a.public_key(), b.public_key());
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_signature_verifies_against_public_key() {
        let signer = LocalKeySigner::generate().unwrap();
        let message = b"batch-digest";
        let signature = signer.sign(message);

        let verifier = UnparsedPublicKey::new(&ring::signature::ED25519, signer.public_key());
        assert!(verifier.verify(message, &signature).is_ok());
    }

    #[test]
    fn test_pkcs8_round_trip_preserves_identity() {
        let original = LocalKeySigner::generate().unwrap();
        let exported = original.to_pkcs8_hex();

        let restored = LocalKeySigner::from_pkcs8(&hex::decode(exported).unwrap()).unwrap();
        assert_eq!(original.public_key(), restored.public_key());
        assert_eq!(original.address(), restored.address());
    }

    #[test]
    fn test_from_pkcs8_rejects_garbage() {
        assert!(LocalKeySigner::from_pkcs8(b"not-a-key").is_err());
    }
}
