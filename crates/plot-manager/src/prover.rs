//! Abstract prover API.
//!
//! Plot file layout and proof-of-space algorithms are not implemented by this crate, access to plot
//! files goes through [`ProverOpener`] and [`Prover`] implementations supplied by the user.

#[cfg(test)]
mod tests;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Erased error type
pub type PlotError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Ratio between the space plot tables actually take on disk and their theoretical size
const ACTUAL_SPACE_CONSTANT_FACTOR: f64 = 0.762;
/// Plots with size parameter below this value are not checked for being incomplete
const MIN_SIZE_CHECKED_FOR_COMPLETENESS: u8 = 30;
/// Share of expected size below which a plot is considered to still be written
const COMPLETE_PLOT_SIZE_RATIO: f64 = 0.98;

/// Opened plot file
pub trait Prover: Send + Sync + fmt::Debug {
    /// Size parameter (`k`) of the plot
    fn size(&self) -> u8;

    /// Raw memo embedded in the plot
    fn memo(&self) -> &[u8];

    /// Serialized prover that can be turned back into prover with [`ProverOpener::from_bytes()`]
    fn to_bytes(&self) -> Vec<u8>;

    /// Path of the file this prover was opened from
    fn filename(&self) -> &Path;
}

/// Factory for [`Prover`] instances
pub trait ProverOpener: Send + Sync + fmt::Debug {
    /// Open plot file at `path`, fails on missing or corrupted files
    fn open(&self, path: &Path) -> Result<Arc<dyn Prover>, PlotError>;

    /// Restore prover previously serialized with [`Prover::to_bytes()`]
    fn from_bytes(&self, bytes: &[u8]) -> Result<Arc<dyn Prover>, PlotError>;
}

/// Theoretical size of the plot tables for size parameter `k` in bytes
pub fn expected_plot_size(k: u8) -> u64 {
    let Some(exponent) = k.checked_sub(1) else {
        return 0;
    };

    (2 * u64::from(k) + 1).saturating_mul(1u64.checked_shl(u32::from(exponent)).unwrap_or(u64::MAX))
}

/// Size on disk a completely written plot with size parameter `k` is expected to have
pub fn expected_plot_file_size(k: u8) -> f64 {
    expected_plot_size(k) as f64 * ACTUAL_SPACE_CONSTANT_FACTOR
}

/// Whether file of `file_size` bytes with size parameter `k` looks like it is still being written
/// (copied or moved from another disk)
pub fn is_plot_incomplete(k: u8, file_size: u64) -> bool {
    k >= MIN_SIZE_CHECKED_FOR_COMPLETENESS
        && (file_size as f64) < COMPLETE_PLOT_SIZE_RATIO * expected_plot_file_size(k)
}
