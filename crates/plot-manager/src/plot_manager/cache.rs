//! On-disk cache of plot keys and provers.
//!
//! Deriving keys from plot memo is expensive, so results are stored on disk and reused after
//! restart instead of being derived for every plot again.


use crate::keys::CacheKeys;
use crate::prover::{PlotError, Prover, ProverOpener};
use crate::utils::{path_from_bytes, path_to_bytes, unix_timestamp};
use parity_scale_codec::{Decode, DecodeAll, Encode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use std::{fs, io};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Version of the cache file format
pub const CURRENT_VERSION: u16 = 1;
/// Cache entries are kept alive for this long after their last use
pub const EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Errors happening when loading or saving disk cache
#[derive(Debug, Error)]
pub enum DiskCacheError {
    /// I/O error occurred
    #[error("Disk cache I/O error: {0}")]
    Io(#[from] io::Error),
    /// Cache was written by a different version of the software
    #[error("Unexpected cache version {actual}, expected {expected}")]
    UnexpectedVersion {
        /// Version found in the file
        actual: u16,
        /// Version this software supports
        expected: u16,
    },
    /// Decoding error
    #[error("Decoding error: {0}")]
    Decoding(#[from] parity_scale_codec::Error),
    /// Failed to restore prover from cached bytes
    #[error("Failed to restore prover of {path}: {error}")]
    Prover {
        /// Path of the plot
        path: PathBuf,
        /// Lower-level error
        error: PlotError,
    },
}

#[derive(Debug, Encode, Decode)]
struct DiskCacheEntry {
    prover_data: Vec<u8>,
    keys: CacheKeys,
    last_use: u64,
}

#[derive(Debug, Encode, Decode)]
struct DiskCacheSnapshot {
    version: u16,
    /// Raw bytes of plot path and entry
    data: Vec<(Vec<u8>, DiskCacheEntry)>,
}

/// Cached prover and keys of a plot
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Opened prover
    pub prover: Arc<dyn Prover>,
    /// Keys derived from plot memo
    pub keys: CacheKeys,
    /// Last time entry was used, seconds since Unix epoch
    pub last_use: u64,
}

impl CacheEntry {
    /// Create new entry that was just used
    pub fn new(prover: Arc<dyn Prover>, keys: CacheKeys) -> Self {
        Self {
            prover,
            keys,
            last_use: unix_timestamp(),
        }
    }

    /// Mark entry as used right now
    pub fn bump_last_use(&mut self) {
        self.last_use = unix_timestamp();
    }

    /// Whether entry was not used for longer than `expiry`
    pub fn expired(&self, expiry: Duration) -> bool {
        unix_timestamp().saturating_sub(self.last_use) > expiry.as_secs()
    }
}

/// Cache of plot keys and provers, keyed by absolute plot path and persisted to a single file
#[derive(Debug)]
pub struct DiskCache {
    path: PathBuf,
    data: HashMap<PathBuf, CacheEntry>,
    changed: bool,
}

impl DiskCache {
    /// Name of the directory cache file is stored in, relative to root path
    pub const DIRECTORY_NAME: &'static str = "cache";
    /// Name of the cache file
    pub const FILE_NAME: &'static str = "plot_manager.dat";

    /// Create empty cache that will be stored at `path`
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: HashMap::new(),
            changed: false,
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether cache is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether there are changes not yet saved to disk
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Get cached entry for plot at `path`
    pub fn get(&self, path: &Path) -> Option<&CacheEntry> {
        self.data.get(path)
    }

    /// Iterate over all cached entries
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &CacheEntry)> + '_ {
        self.data.iter()
    }

    /// Insert or replace entry for plot at `path`
    pub fn update(&mut self, path: PathBuf, entry: CacheEntry) {
        self.data.insert(path, entry);
        self.changed = true;
    }

    /// Remove entries of provided plots
    pub fn remove<'a, I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        for path in paths {
            if self.data.remove(path).is_some() {
                self.changed = true;
            }
        }
    }

    /// Mark entry of plot at `path` as used right now.
    ///
    /// This doesn't count as a change, new timestamp is persisted with the next save.
    pub fn bump_last_use(&mut self, path: &Path) {
        if let Some(entry) = self.data.get_mut(path) {
            entry.bump_last_use();
        }
    }

    /// Remove entries that are expired and not in use, bump entries that are in use.
    ///
    /// Returns number of removed entries.
    pub fn remove_expired<F>(&mut self, in_use: F) -> usize
    where
        F: Fn(&Path) -> bool,
    {
        let mut remove_paths = Vec::new();
        for (path, entry) in self.data.iter_mut() {
            if in_use(path.as_path()) {
                entry.bump_last_use();
            } else if entry.expired(EXPIRY) {
                remove_paths.push(path.clone());
            }
        }

        self.remove(&remove_paths);

        remove_paths.len()
    }

    /// Save cache to disk.
    ///
    /// Errors are logged, in which case cache remains marked as changed and save will be
    /// attempted again later.
    pub fn save(&mut self) {
        match self.try_save() {
            Ok(size) => {
                self.changed = false;
                info!(%size, path = %self.path.display(), "Saved cached data");
            }
            Err(error) => {
                error!(%error, path = %self.path.display(), "Failed to save cache");
            }
        }
    }

    /// Load cache from disk, replacing in-memory contents.
    ///
    /// Missing file results in empty cache. Cache from different version of the software or a
    /// corrupted cache is discarded completely.
    pub fn load(&mut self, prover_opener: &dyn ProverOpener) {
        self.data = match self.try_load(prover_opener) {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(path = %self.path.display(), "Cache not found");
                HashMap::new()
            }
            Err(error @ DiskCacheError::UnexpectedVersion { .. }) => {
                warn!(%error, path = %self.path.display(), "Discarding cache");
                HashMap::new()
            }
            Err(error) => {
                error!(%error, path = %self.path.display(), "Failed to load cache");
                HashMap::new()
            }
        };
    }

    fn try_save(&self) -> Result<usize, DiskCacheError> {
        let mut data = self
            .data
            .iter()
            .filter_map(|(path, entry)| {
                let Some(path_bytes) = path_to_bytes(path) else {
                    warn!(
                        path = %path.display(),
                        "Plot path can't be stored in cache, skipping"
                    );
                    return None;
                };

                Some((
                    path_bytes,
                    DiskCacheEntry {
                        prover_data: entry.prover.to_bytes(),
                        keys: entry.keys.clone(),
                        last_use: entry.last_use,
                    },
                ))
            })
            .collect::<Vec<_>>();
        data.sort_by(|(a, _), (b, _)| a.cmp(b));

        let bytes = DiskCacheSnapshot {
            version: CURRENT_VERSION,
            data,
        }
        .encode();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, &bytes)?;

        Ok(bytes.len())
    }

    fn try_load(
        &self,
        prover_opener: &dyn ProverOpener,
    ) -> Result<Option<HashMap<PathBuf, CacheEntry>>, DiskCacheError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) => {
                return if error.kind() == io::ErrorKind::NotFound {
                    Ok(None)
                } else {
                    Err(error.into())
                };
            }
        };

        info!(size = bytes.len(), path = %self.path.display(), "Loaded cached data");

        // Version is checked before anything else so that changes in the rest of the format are
        // detected properly
        let version = u16::decode(&mut bytes.as_slice())?;
        if version != CURRENT_VERSION {
            return Err(DiskCacheError::UnexpectedVersion {
                actual: version,
                expected: CURRENT_VERSION,
            });
        }

        let DiskCacheSnapshot { data, .. } = DiskCacheSnapshot::decode_all(&mut bytes.as_slice())?;

        let mut cache = HashMap::with_capacity(data.len());
        for (path_bytes, entry) in data {
            let Some(path) = path_from_bytes(path_bytes) else {
                debug!("Skipping cached plot with path unsupported on this platform");
                continue;
            };
            let prover = match prover_opener.from_bytes(&entry.prover_data) {
                Ok(prover) => prover,
                Err(error) => {
                    return Err(DiskCacheError::Prover { path, error });
                }
            };

            cache.insert(
                path,
                CacheEntry {
                    prover,
                    keys: entry.keys,
                    last_use: entry.last_use,
                },
            );
        }

        Ok(Some(cache))
    }
}
