//! Key material that is derived from plot memos.
//!
//! Actual cryptography (BLS arithmetic, key derivation paths) is provided externally through
//! [`KeyDerivation`], this module only defines data types and sequences derivation steps.

#[cfg(test)]
mod tests;

use derive_more::{From, Into};
use parity_scale_codec::{Decode, Encode};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

/// Size of serialized G1 public key in bytes
pub const G1_PUBLIC_KEY_SIZE: usize = 48;
/// Size of pool contract puzzle hash in bytes
pub const PUZZLE_HASH_SIZE: usize = 32;
/// Size of secret key in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Serialized G1 public key (farmer, pool or plot key)
#[derive(Copy, Clone, Eq, PartialEq, Hash, Encode, Decode, From, Into)]
pub struct G1PublicKey([u8; G1_PUBLIC_KEY_SIZE]);

impl fmt::Debug for G1PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for G1PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for G1PublicKey {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Puzzle hash of the pool contract a plot is bound to
#[derive(Copy, Clone, Eq, PartialEq, Hash, Encode, Decode, From, Into)]
pub struct PuzzleHash([u8; PUZZLE_HASH_SIZE]);

impl fmt::Debug for PuzzleHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for PuzzleHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for PuzzleHash {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Pool binding of a plot, either a pool public key or a pool contract puzzle hash, never both
#[derive(Debug, Copy, Clone, Eq, PartialEq, Encode, Decode)]
pub enum PlotPool {
    /// Plot is bound to a pool public key
    PublicKey(G1PublicKey),
    /// Plot is bound to a pool contract (plot NFT)
    ContractPuzzleHash(PuzzleHash),
}

impl PlotPool {
    /// Pool public key, if plot is bound to one
    pub fn public_key(&self) -> Option<&G1PublicKey> {
        match self {
            Self::PublicKey(public_key) => Some(public_key),
            Self::ContractPuzzleHash(_) => None,
        }
    }

    /// Pool contract puzzle hash, if plot is bound to one
    pub fn contract_puzzle_hash(&self) -> Option<&PuzzleHash> {
        match self {
            Self::PublicKey(_) => None,
            Self::ContractPuzzleHash(puzzle_hash) => Some(puzzle_hash),
        }
    }

    /// Whether plot is bound to a pool contract
    pub fn is_contract(&self) -> bool {
        matches!(self, Self::ContractPuzzleHash(_))
    }
}

/// Secret key, wiped from memory on drop
#[derive(Clone)]
pub struct SecretKey(Zeroizing<[u8; SECRET_KEY_SIZE]>);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey").finish_non_exhaustive()
    }
}

impl From<[u8; SECRET_KEY_SIZE]> for SecretKey {
    #[inline]
    fn from(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }
}

impl SecretKey {
    /// Raw bytes of the secret key
    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        &self.0
    }
}

/// Contents of the memo embedded in every plot
#[derive(Debug, Clone)]
pub struct PlotMemo {
    /// Pool binding
    pub pool: PlotPool,
    /// Farmer public key
    pub farmer_public_key: G1PublicKey,
    /// Master secret key the local (plot) secret key is derived from
    pub local_master_secret_key: SecretKey,
}

/// Keys of a plot, derived once from its memo and cached afterwards
#[derive(Debug, Clone, Eq, PartialEq, Encode, Decode)]
pub struct CacheKeys {
    /// Farmer public key
    pub farmer_public_key: G1PublicKey,
    /// Pool binding
    pub pool: PlotPool,
    /// Plot public key
    pub plot_public_key: G1PublicKey,
}

/// Errors happening during key derivation
#[derive(Debug, Error)]
pub enum KeyDerivationError {
    /// Memo can't be parsed
    #[error("Invalid memo: {0}")]
    InvalidMemo(String),
    /// Key is not valid for the requested operation
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Key derivation primitives used to turn plot memo into [`CacheKeys`]
pub trait KeyDerivation: Send + Sync + fmt::Debug {
    /// Parse memo into pool binding, farmer public key and local master secret key
    fn parse_memo(&self, memo: &[u8]) -> Result<PlotMemo, KeyDerivationError>;

    /// Derive local secret key from local master secret key
    fn master_sk_to_local_sk(
        &self,
        master_secret_key: &SecretKey,
    ) -> Result<SecretKey, KeyDerivationError>;

    /// Generate plot public key from local secret key and farmer public key.
    ///
    /// `include_taproot` is set for plots bound to a pool contract.
    fn generate_plot_public_key(
        &self,
        local_secret_key: &SecretKey,
        farmer_public_key: &G1PublicKey,
        include_taproot: bool,
    ) -> Result<G1PublicKey, KeyDerivationError>;
}

/// Derive all the keys of the plot from its memo
pub fn derive_cache_keys(
    key_derivation: &dyn KeyDerivation,
    memo: &[u8],
) -> Result<CacheKeys, KeyDerivationError> {
    let PlotMemo {
        pool,
        farmer_public_key,
        local_master_secret_key,
    } = key_derivation.parse_memo(memo)?;

    let local_secret_key = key_derivation.master_sk_to_local_sk(&local_master_secret_key)?;
    let plot_public_key = key_derivation.generate_plot_public_key(
        &local_secret_key,
        &farmer_public_key,
        pool.is_contract(),
    )?;

    Ok(CacheKeys {
        farmer_public_key,
        pool,
        plot_public_key,
    })
}
