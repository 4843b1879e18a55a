use crate::plot_manager::Inner;
use crate::plot_manager::cache::CacheEntry;
use crate::prover::{PlotError, Prover, expected_plot_file_size, is_plot_incomplete};
use crate::utils::unix_timestamp;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, warn};

const GIB: f64 = (1024 * 1024 * 1024) as f64;

/// Plot file that was opened and is ready for key derivation or publication
#[derive(Debug)]
pub(super) struct PreprocessedPlot {
    pub(super) path: PathBuf,
    pub(super) file_size: u64,
    pub(super) time_modified: SystemTime,
    pub(super) prover: Arc<dyn Prover>,
    pub(super) cache_entry: Option<CacheEntry>,
}

/// Open plot file unless it should be skipped.
///
/// Returns `None` for skipped plots, plots that failed to open and plots that are still being
/// written.
pub(super) fn preprocess_plot(inner: &Inner, path: &Path) -> Option<PreprocessedPlot> {
    if inner.stop_requested() {
        return None;
    }

    if let Some(match_str) = &inner.match_str
        && !path.to_string_lossy().contains(match_str.as_str())
    {
        return None;
    }

    {
        let state = inner.state.lock();

        if let Some(&failed_at) = state.failed_to_open_filenames.get(path)
            && unix_timestamp().saturating_sub(failed_at)
                < inner.refresh_parameter.retry_invalid().as_secs()
        {
            return None;
        }

        if state.plots.contains_key(path) {
            return None;
        }
    }

    if let (Some(filename), Some(directory)) = (path.file_name(), path.parent())
        && inner
            .plot_filename_paths
            .lock()
            .get(filename)
            .is_some_and(|paths| paths.duplicate_directories.contains(directory))
    {
        debug!(path = %path.display(), "Skipping duplicate plot");
        return None;
    }

    let open_result = (|| -> Result<_, PlotError> {
        let metadata = fs::metadata(path)?;
        let time_modified = metadata.modified()?;
        let prover = inner.prover_opener.open(path)?;

        Ok((metadata.len(), time_modified, prover))
    })();
    let (file_size, time_modified, prover) = match open_result {
        Ok(opened) => opened,
        Err(error) => {
            error!(%error, path = %path.display(), "Failed to open plot file");
            inner
                .state
                .lock()
                .failed_to_open_filenames
                .insert(path.to_path_buf(), unix_timestamp());
            return None;
        }
    };

    let k = prover.size();
    if is_plot_incomplete(k, file_size) {
        warn!(
            path = %path.display(),
            %k,
            size_gib = file_size as f64 / GIB,
            expected_size_gib = expected_plot_file_size(k) / GIB,
            "Not farming plot that is smaller than expected, assuming it is still being copied"
        );
        return None;
    }

    let cache_entry = inner.state.lock().cache.get(path).cloned();

    Some(PreprocessedPlot {
        path: path.to_path_buf(),
        file_size,
        time_modified,
        prover,
        cache_entry,
    })
}
