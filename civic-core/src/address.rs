//! Program-derived record addresses
//!
//! A record's address is a SHA-256 hash of its seeds, a one-byte bump, the
//! program identifier and a fixed marker. The bump is walked down from 255
//! until the hash is not a valid ed25519 point, so no private key can ever
//! sign for the address.

use crate::error::AddressError;
use crate::types::{truncate_seed, DerivedAddress, LogicalRecordKey, Namespace, Pubkey, MAX_SEED_LEN};
use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};

/// Maximum number of seeds, bump included
pub const MAX_SEEDS: usize = 16;

/// Marker appended to every derivation hash
pub const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Raw bytes of [`crate::DEFAULT_PROGRAM_ID`]
pub const DEFAULT_PROGRAM_KEY: [u8; 32] = [
    218, 7, 92, 178, 255, 94, 198, 129, 118, 19, 222, 83, 11, 105, 42, 135, 53, 71, 119, 105, 218,
    71, 67, 12, 189, 129, 84, 51, 92, 74, 131, 39,
];

/// Whether 32 bytes decompress to a point on the ed25519 curve
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

/// Hash seeds (bump included) into an address; fails if the result is on the curve
pub fn create_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<Pubkey, AddressError> {
    if seeds.len() > MAX_SEEDS {
        return Err(AddressError::TooManySeeds(seeds.len()));
    }
    for (index, seed) in seeds.iter().enumerate() {
        if seed.len() > MAX_SEED_LEN {
            return Err(AddressError::SeedTooLong {
                index,
                len: seed.len(),
            });
        }
    }

    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    let hash: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&hash) {
        return Err(AddressError::OnCurve(Pubkey::new(hash)));
    }
    Ok(Pubkey::new(hash))
}

/// Find the first off-curve address, walking the bump down from 255
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<DerivedAddress, AddressError> {
    if seeds.len() >= MAX_SEEDS {
        return Err(AddressError::TooManySeeds(seeds.len() + 1));
    }

    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 1);
        with_bump.extend_from_slice(seeds);
        with_bump.push(&bump_seed);

        match create_program_address(&with_bump, program_id) {
            Ok(address) => return Ok(DerivedAddress::new(address, bump)),
            Err(AddressError::OnCurve(_)) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(AddressError::NoViableBump)
}

/// Maps logical record keys to ledger addresses
///
/// Stateless apart from the program identifier; clone freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDeriver {
    program_id: Pubkey,
}

impl Default for AddressDeriver {
    fn default() -> Self {
        Self::new(Pubkey::new(DEFAULT_PROGRAM_KEY))
    }
}

impl AddressDeriver {
    /// Create a deriver for a program
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    /// Program identifier
    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    /// Derive a record address
    ///
    /// Identifiers longer than 32 bytes are cut to their first 32 bytes.
    /// The authority only seeds contract addresses.
    pub fn derive(
        &self,
        namespace: Namespace,
        primary: &str,
        secondary: &str,
        authority: &Pubkey,
    ) -> Result<DerivedAddress, AddressError> {
        self.derive_seeds(namespace, truncate_seed(primary), truncate_seed(secondary), authority)
    }

    /// Derive the address of a logical key
    pub fn derive_key(&self, key: &LogicalRecordKey) -> Result<DerivedAddress, AddressError> {
        self.derive_seeds(
            key.namespace(),
            key.primary_seed(),
            key.secondary_seed(),
            key.authority(),
        )
    }

    fn derive_seeds(
        &self,
        namespace: Namespace,
        primary: &[u8],
        secondary: &[u8],
        authority: &Pubkey,
    ) -> Result<DerivedAddress, AddressError> {
        if primary.is_empty() {
            return Err(AddressError::MalformedIdentifier(format!(
                "{}: primary identifier is empty",
                namespace
            )));
        }

        match namespace {
            Namespace::AirQuality => {
                if secondary.is_empty() {
                    return Err(AddressError::MalformedIdentifier(
                        "air_quality: sensor id is empty".to_string(),
                    ));
                }
                find_program_address(
                    &[namespace.seed().as_bytes(), primary, secondary],
                    &self.program_id,
                )
            }
            Namespace::Contract => find_program_address(
                &[namespace.seed().as_bytes(), primary, &authority.as_bytes()[..]],
                &self.program_id,
            ),
        }
    }

    /// Re-derive and check a stored address
    ///
    /// Fails when the stored address or bump differs from a fresh derivation,
    /// or when the stored address lies on the curve.
    pub fn audit(&self, key: &LogicalRecordKey, stored: &DerivedAddress) -> Result<(), AddressError> {
        let derived = self.derive_key(key)?;

        if derived != *stored {
            tracing::error!(
                key = %key,
                stored = %stored.address(),
                derived = %derived.address(),
                "Address audit mismatch"
            );
            return Err(AddressError::AuditMismatch {
                stored: stored.address(),
                stored_bump: stored.bump(),
                derived: derived.address(),
                derived_bump: derived.bump(),
            });
        }

        if is_on_curve(stored.address().as_bytes()) {
            return Err(AddressError::OnCurve(stored.address()));
        }

        Ok(())
    }
}
