use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::EscrowError;

pub const ADDRESS_BYTES: usize = 32;
pub const MAX_SEEDS: usize = 16;
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// A 32-byte ledger identity. Renders as base58.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct Address(pub [u8; ADDRESS_BYTES]);

/// System program: `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: Address = Address([0; 32]);

/// Token program: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Address = Address([
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79, 0xac,
    0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff, 0x00, 0xa9,
]);

/// Rent sysvar: `SysvarRent111111111111111111111111111111111`
pub const SYSVAR_RENT_ID: Address = Address([
    0x06, 0xa7, 0xd5, 0x17, 0x19, 0x2c, 0x5c, 0x51, 0x21, 0x8c, 0xc9, 0x4c, 0x3d, 0x4a, 0xf1, 0x7f,
    0x58, 0xda, 0xee, 0x08, 0x9b, 0xa1, 0xfd, 0x44, 0xe3, 0xdb, 0xd9, 0x8a, 0x00, 0x00, 0x00, 0x00,
]);

/// Owner of deployed program accounts: `BPFLoader2111111111111111111111111111111111`
pub const LOADER_ID: Address = Address([
    0x02, 0xa8, 0xf6, 0x91, 0x4e, 0x88, 0xa1, 0x6e, 0x39, 0x5a, 0xe1, 0x28, 0x94, 0x8f, 0xfa, 0x69,
    0x56, 0x93, 0x37, 0x68, 0x18, 0xdd, 0x47, 0x43, 0x52, 0x21, 0xf3, 0xc6, 0x00, 0x00, 0x00, 0x00,
]);

/// Seed of the escrow program's signing authority.
pub const ESCROW_AUTHORITY_SEED: &[u8] = b"escrow";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58 address: {0}")]
    InvalidBase58(String),
    #[error("address must be 32 bytes, got {0}")]
    InvalidLength(usize),
    #[error("too many seeds or a seed longer than 32 bytes")]
    MaxSeedLengthExceeded,
    #[error("derived address lies on the ed25519 curve")]
    InvalidSeeds,
    #[error("no viable bump seed found")]
    NoViableBump,
}

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    /// Random address that is not backed by any key. Used for fixtures.
    pub fn new_unique() -> Self {
        Self(rand::random())
    }

    pub fn to_bytes(self) -> [u8; ADDRESS_BYTES] {
        self.0
    }

    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| AddressError::InvalidBase58(s.to_string()))?;
        let bytes: [u8; ADDRESS_BYTES] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| AddressError::InvalidLength(v.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Hashes `seeds` (which must already include the bump) with `program_id`.
/// Fails when the result is a valid curve point, i.e. could have a private key.
pub fn create_program_address(seeds: &[&[u8]], program_id: &Address) -> Result<Address, AddressError> {
    if seeds.len() > MAX_SEEDS || seeds.iter().any(|s| s.len() > MAX_SEED_LEN) {
        return Err(AddressError::MaxSeedLengthExceeded);
    }

    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.as_ref());
    hasher.update(PDA_MARKER);
    let address = Address(hasher.finalize().into());

    if address.is_on_curve() {
        return Err(AddressError::InvalidSeeds);
    }
    Ok(address)
}

/// Searches bumps from 255 down and returns the first off-curve address.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Address) -> Result<(Address, u8), AddressError> {
    if seeds.len() >= MAX_SEEDS {
        return Err(AddressError::MaxSeedLengthExceeded);
    }
    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);
        match create_program_address(&with_bump, program_id) {
            Ok(address) => return Ok((address, bump)),
            Err(AddressError::InvalidSeeds) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(AddressError::NoViableBump)
}

/// Who controls an account.
///
/// `KeyHeld` authorities prove themselves with a signature. `Derived`
/// authorities have no private key; only the owning program can sign for
/// them, by re-deriving the address from its seeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authority {
    KeyHeld { identity: Address },
    Derived { seeds: Vec<Vec<u8>>, program_id: Address },
}

impl Authority {
    /// The keyless authority the escrow program holds custody under.
    pub fn escrow(program_id: Address) -> Self {
        Authority::Derived {
            seeds: vec![ESCROW_AUTHORITY_SEED.to_vec()],
            program_id,
        }
    }

    pub fn address(&self) -> Result<Address, AddressError> {
        Ok(self.resolve()?.0)
    }

    /// Resolves to the address and, for derived authorities, the bump.
    pub fn resolve(&self) -> Result<(Address, Option<u8>), AddressError> {
        match self {
            Authority::KeyHeld { identity } => Ok((*identity, None)),
            Authority::Derived { seeds, program_id } => {
                let seeds: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();
                let (address, bump) = find_program_address(&seeds, program_id)?;
                Ok((address, Some(bump)))
            }
        }
    }

    /// Checks a caller-supplied address against the independent derivation
    /// and returns the bump, if any, the owning program signs with.
    pub fn verify(&self, claimed: &Address) -> Result<Option<u8>, EscrowError> {
        let (expected, bump) = self.resolve().map_err(|_| EscrowError::InvalidAuthority)?;
        if &expected != claimed {
            return Err(EscrowError::InvalidAuthority);
        }
        Ok(bump)
    }
}
