use crate::plot_manager::cache::CacheEntry;
use crate::plot_manager::preprocessing::PreprocessedPlot;
use crate::plot_manager::{PlotFilenamePaths, PlotInfo, PlotState, PublicKeys};
use crate::utils::unix_timestamp;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::{info, warn};

/// Checks keys and duplicates of plots in a batch, must be used with plot state and plot file name
/// paths locked
pub(super) struct Postprocessing<'a> {
    pub(super) state: &'a mut PlotState,
    pub(super) plot_filename_paths: &'a mut HashMap<OsString, PlotFilenamePaths>,
    pub(super) public_keys: &'a PublicKeys,
    pub(super) open_no_key_filenames: bool,
}

impl Postprocessing<'_> {
    pub(super) fn record_failure(&mut self, path: PathBuf) {
        self.state
            .failed_to_open_filenames
            .insert(path, unix_timestamp());
    }

    /// Returns plot info if plot can be published
    pub(super) fn postprocess_plot(
        &mut self,
        plot: &PreprocessedPlot,
        cache_entry: &CacheEntry,
    ) -> Option<PlotInfo> {
        let path = &plot.path;
        let keys = &cache_entry.keys;

        let mut keys_missing = false;
        if !self.public_keys.farmer.contains(&keys.farmer_public_key) {
            warn!(
                path = %path.display(),
                farmer_public_key = %keys.farmer_public_key,
                "Plot has a farmer public key that is not in the farmer's list"
            );
            keys_missing = true;
        }
        if let Some(pool_public_key) = keys.pool.public_key()
            && !self.public_keys.pool.contains(pool_public_key)
        {
            warn!(
                path = %path.display(),
                %pool_public_key,
                "Plot has a pool public key that is not in the farmer's pool list"
            );
            keys_missing = true;
        }

        if keys_missing {
            self.state.no_key_filenames.insert(path.clone());
            if !self.open_no_key_filenames {
                return None;
            }
        } else {
            self.state.no_key_filenames.remove(path);
        }

        let filename = path.file_name()?;
        let directory = path.parent()?;
        match self.plot_filename_paths.entry(filename.to_os_string()) {
            Entry::Vacant(entry) => {
                entry.insert(PlotFilenamePaths {
                    loaded_directory: directory.to_path_buf(),
                    duplicate_directories: HashSet::new(),
                });
            }
            Entry::Occupied(mut entry) => {
                let paths = entry.get_mut();
                if paths.loaded_directory != directory {
                    paths.duplicate_directories.insert(directory.to_path_buf());
                    warn!(
                        filename = %filename.to_string_lossy(),
                        loaded_directory = %paths.loaded_directory.display(),
                        duplicates = paths.duplicate_directories.len(),
                        "Have multiple copies of the plot"
                    );
                    return None;
                }
            }
        }

        let plot_info = PlotInfo {
            prover: cache_entry.prover.clone(),
            pool: keys.pool,
            plot_public_key: keys.plot_public_key,
            file_size: plot.file_size,
            time_modified: plot.time_modified,
        };

        self.state.cache.bump_last_use(path);
        self.state.failed_to_open_filenames.remove(path);

        info!(
            path = %path.display(),
            size = plot_info.prover.size(),
            "Found plot"
        );

        Some(plot_info)
    }
}
