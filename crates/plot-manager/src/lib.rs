//! Plot manager for proof-of-space farming.
//!
//! Farming node answers challenges using plot files that are often spread over many large disks.
//! [`PlotManager`] keeps an up-to-date view of plots that can be farmed: it periodically enumerates
//! plot directories, opens new plot files, derives their keys, checks them against keys of the
//! farmer and excludes duplicate copies of the same plot. Deriving keys is expensive, so derived
//! keys are cached on disk with [`DiskCache`] and reused after restart.
//!
//! Plot file format and key derivation cryptography are not part of this crate, they are plugged
//! in with [`ProverOpener`] and [`KeyDerivation`] implementations.

#![warn(rust_2018_idioms, missing_debug_implementations, missing_docs)]

pub mod config;
pub mod keys;
#[cfg(test)]
mod mock_prover;
pub mod plot_directories;
pub mod plot_manager;
pub mod prover;
pub mod thread_pools;
pub(crate) mod utils;

pub use config::{PlotManagerConfig, PlotsRefreshParameter};
pub use keys::{CacheKeys, G1PublicKey, KeyDerivation, KeyDerivationError, PlotPool, PuzzleHash};
pub use plot_directories::{PlotDirectories, PlotScanner};
pub use plot_manager::cache::{CacheEntry, DiskCache, DiskCacheError};
pub use plot_manager::{
    PlotInfo, PlotManager, PlotManagerError, PlotManagerOptions, PlotRefreshEvent,
    PlotRefreshResult,
};
pub use prover::{PlotError, Prover, ProverOpener};
pub use thread_pools::PlotRefreshThreadPools;
