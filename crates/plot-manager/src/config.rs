//! Plot manager configuration

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

/// Parameters of the periodic plot refresh
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlotsRefreshParameter {
    /// Interval between refresh cycles in seconds
    pub interval_seconds: u64,
    /// How long to wait before trying to open a plot that failed to open again, in seconds
    pub retry_invalid_seconds: u64,
    /// How many plots are processed and published at once
    pub batch_size: NonZeroUsize,
}

impl Default for PlotsRefreshParameter {
    fn default() -> Self {
        Self {
            interval_seconds: 120,
            retry_invalid_seconds: 1200,
            batch_size: NonZeroUsize::new(300).expect("Not zero; qed"),
        }
    }
}

impl PlotsRefreshParameter {
    /// Interval between refresh cycles
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Retry backoff for plots that failed to open
    pub fn retry_invalid(&self) -> Duration {
        Duration::from_secs(self.retry_invalid_seconds)
    }
}

/// Plot manager configuration as stored on disk
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlotManagerConfig {
    /// Directories plots are searched in
    pub plot_directories: Vec<PathBuf>,
    /// Whether sub-directories of plot directories are searched too
    pub recursive_plot_scan: bool,
    /// Only load plots whose path contains this string
    pub match_str: Option<String>,
    /// Load plots even if their keys are not among the keys of this farmer
    pub open_no_key_filenames: bool,
    /// Refresh parameters
    pub refresh_parameter: PlotsRefreshParameter,
}

impl PlotManagerConfig {
    const FILE_NAME: &'static str = "plot_manager.json";

    /// Load config from directory it is supposed to be stored in, `None` means no config file was
    /// found.
    pub fn load_from(directory: &Path) -> io::Result<Option<Self>> {
        let bytes = match fs::read(directory.join(Self::FILE_NAME)) {
            Ok(bytes) => bytes,
            Err(error) => {
                return if error.kind() == io::ErrorKind::NotFound {
                    Ok(None)
                } else {
                    Err(error)
                };
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
    }

    /// Store config in directory so it can be loaded again upon restart.
    pub fn store_to(&self, directory: &Path) -> io::Result<()> {
        fs::write(
            directory.join(Self::FILE_NAME),
            serde_json::to_vec_pretty(self).expect("Config serialization never fails; qed"),
        )
    }
}
