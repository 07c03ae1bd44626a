//! Authority keypair
//!
//! The process holds exactly one signing identity. Keys are stored in the
//! 64-byte `secret ‖ public` layout used by ledger CLI keypair files (a JSON
//! array of byte values).

use crate::types::Pubkey;
use crate::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Ed25519 keypair of the ledger authority
pub struct Keypair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from a 32-byte secret seed (deterministic)
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create from 64 bytes `secret ‖ public`, checking that the halves agree
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; 64] = bytes.try_into().map_err(|_| {
            Error::InvalidIdentity(format!("keypair must be 64 bytes, got {}", bytes.len()))
        })?;

        let signing_key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| Error::InvalidIdentity(format!("keypair halves disagree: {}", e)))?;
        let verifying_key = signing_key.verifying_key();

        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Load a keypair file (JSON array of 64 byte values)
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let bytes: Vec<u8> = serde_json::from_str(&contents)?;
        Self::from_bytes(&bytes)
    }

    /// 64-byte `secret ‖ public` encoding
    pub fn to_bytes(&self) -> [u8; 64] {
        self.signing_key.to_keypair_bytes()
    }

    /// Public identity
    pub fn pubkey(&self) -> Pubkey {
        Pubkey::new(self.verifying_key.to_bytes())
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify a signature made by this keypair
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> Result<()> {
        verify_signature(message, signature, &self.pubkey())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

/// Verify a signature against a public identity
pub fn verify_signature(message: &[u8], signature: &[u8; 64], signer: &Pubkey) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(signer.as_bytes())
        .map_err(|e| Error::InvalidIdentity(format!("{}: {}", signer, e)))?;

    verifying_key
        .verify(message, &Signature::from_bytes(signature))
        .map_err(|e| Error::SignatureError(format!("Verification failed: {}", e)))
}

/// SHA-256 of arbitrary bytes
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let a = Keypair::from_seed(&seed);
        let b = Keypair::from_seed(&seed);
        assert_eq!(a.pubkey(), b.pubkey());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"record");

        assert!(keypair.verify(b"record", &signature).is_ok());
        assert!(keypair.verify(b"other", &signature).is_err());

        let stranger = Keypair::generate();
        assert!(verify_signature(b"record", &signature, &stranger.pubkey()).is_err());
    }

    #[test]
    fn test_bytes_roundtrip_and_mismatch() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        let bytes = keypair.to_bytes();
        let restored = Keypair::from_bytes(&bytes).unwrap();
        assert_eq!(restored.pubkey(), keypair.pubkey());

        let mut corrupted = bytes;
        corrupted[40] ^= 0xff;
        assert!(Keypair::from_bytes(&corrupted).is_err());
        assert!(Keypair::from_bytes(&bytes[..32]).is_err());
    }

    #[test]
    fn test_read_from_file() {
        let keypair = Keypair::from_seed(&[9u8; 32]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = Keypair::read_from_file(file.path()).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_debug_hides_secret() {
        let keypair = Keypair::from_seed(&[3u8; 32]);
        let debug = format!("{:?}", keypair);
        assert!(debug.contains(&keypair.pubkey().to_string()));
        assert!(!debug.contains("signing_key"));
    }

    #[test]
    fn test_sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(digest[..4], [0xba, 0x78, 0x16, 0xbf]);
    }
}
