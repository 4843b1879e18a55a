use crate::keys::{CacheKeys, KeyDerivation, derive_cache_keys};
use crate::utils::panic_message;
use rayon::ThreadPool;
use rayon::prelude::*;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use tracing::{error, trace};

/// Derive keys from memos of all plots in one go.
///
/// Output corresponds to input by index, `None` means keys could not be derived for that plot.
pub(super) fn decode_memos(
    thread_pool: &ThreadPool,
    key_derivation: &dyn KeyDerivation,
    memos: &[(&Path, &[u8])],
) -> Vec<Option<CacheKeys>> {
    if memos.is_empty() {
        return Vec::new();
    }

    thread_pool.install(|| {
        memos
            .par_iter()
            .map(|&(path, memo)| decode_memo(key_derivation, path, memo))
            .collect()
    })
}

fn decode_memo(key_derivation: &dyn KeyDerivation, path: &Path, memo: &[u8]) -> Option<CacheKeys> {
    trace!(path = %path.display(), "Decoding memo");

    match panic::catch_unwind(AssertUnwindSafe(|| derive_cache_keys(key_derivation, memo))) {
        Ok(Ok(keys)) => Some(keys),
        Ok(Err(error)) => {
            error!(%error, path = %path.display(), "Failed to derive plot keys");
            None
        }
        Err(payload) => {
            error!(
                error = %panic_message(payload.as_ref()),
                path = %path.display(),
                "Key derivation panicked"
            );
            None
        }
    }
}
