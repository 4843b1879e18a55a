//! Plot manager discovers plot files, derives their keys and publishes plots that can be farmed.
//!
//! Refresh runs in cycles: plot directories are enumerated, plots that disappeared are dropped and
//! remaining candidates are processed in batches. Each batch is opened in parallel on the
//! preprocessing thread pool, keys of plots not found in [`DiskCache`] are derived in bulk on the
//! decoding thread pool, after which plots are checked against farmer's keys and other copies of
//! the same plot and published all at once. Progress is reported with [`PlotRefreshEvent`].

pub mod cache;
mod decoding;
mod postprocessing;
mod preprocessing;

use crate::config::PlotsRefreshParameter;
use crate::keys::{G1PublicKey, KeyDerivation, PlotPool, PuzzleHash};
use crate::plot_directories::PlotScanner;
use crate::plot_manager::cache::{CacheEntry, DiskCache};
use crate::plot_manager::postprocessing::Postprocessing;
use crate::prover::{PlotError, Prover, ProverOpener};
use crate::thread_pools::PlotRefreshThreadPools;
use crate::utils::{JoinOnDrop, list_to_batches, panic_message};
use event_listener_primitives::{Bag, HandlerId};
use parking_lot::{Condvar, Mutex, RwLock};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};
use std::{io, panic, thread};
use thiserror::Error;
use tracing::{debug, error, info, info_span};

/// Refresh loop wakes up at least this often to check whether it needs to refresh or stop
const REFRESH_WAIT_STEP: Duration = Duration::from_secs(1);

type HandlerFn<A> = Arc<dyn Fn(&A) + Send + Sync + 'static>;
type Handler<A> = Bag<HandlerFn<A>, A>;

#[derive(Default, Debug)]
struct Handlers {
    refresh: Handler<PlotRefreshEvent>,
}

/// Errors happening when managing plots
#[derive(Debug, Error)]
pub enum PlotManagerError {
    /// Failed to spawn refresh thread
    #[error("Failed to spawn refresh thread: {0}")]
    RefreshThreadSpawn(io::Error),
}

#[derive(Debug, Error)]
enum RefreshError {
    #[error("Failed to enumerate plot files: {0}")]
    PlotScanner(PlotError),
    #[error("Refresh panicked: {0}")]
    Panicked(String),
}

/// Plot that was found, opened and accepted for farming
#[derive(Debug, Clone)]
pub struct PlotInfo {
    /// Opened prover of the plot
    pub prover: Arc<dyn Prover>,
    /// Pool binding
    pub pool: PlotPool,
    /// Plot public key
    pub plot_public_key: G1PublicKey,
    /// Size of the plot file in bytes
    pub file_size: u64,
    /// Modification time of the plot file
    pub time_modified: SystemTime,
}

impl PlotInfo {
    /// Pool public key, if plot is bound to one
    pub fn pool_public_key(&self) -> Option<&G1PublicKey> {
        self.pool.public_key()
    }

    /// Pool contract puzzle hash, if plot is bound to one
    pub fn pool_contract_puzzle_hash(&self) -> Option<&PuzzleHash> {
        self.pool.contract_puzzle_hash()
    }
}

/// Result of the refresh cycle or a part of it
#[derive(Debug, Clone, Default)]
pub struct PlotRefreshResult {
    /// Plots that were published
    pub loaded: Vec<PlotInfo>,
    /// Plots (including duplicates) that no longer exist
    pub removed: Vec<PathBuf>,
    /// Number of candidates processed
    pub processed: usize,
    /// Number of candidates not yet processed
    pub remaining: usize,
    /// Time spent processing
    pub duration: Duration,
}

/// Refresh progress notification
#[derive(Debug, Clone)]
pub enum PlotRefreshEvent {
    /// Refresh cycle started, `remaining` contains total number of candidates
    Started(PlotRefreshResult),
    /// Batch of candidates was processed and its plots were published
    BatchProcessed(PlotRefreshResult),
    /// Refresh cycle finished, contains accumulated results of all batches. Not emitted when
    /// cycle was aborted.
    Done(PlotRefreshResult),
}

/// Options for [`PlotManager`]
#[derive(Debug, Clone)]
pub struct PlotManagerOptions {
    /// Root path, disk cache is stored in `cache` directory under it
    pub root_path: PathBuf,
    /// Source of candidate plot files
    pub plot_scanner: Arc<dyn PlotScanner>,
    /// Opens plot files
    pub prover_opener: Arc<dyn ProverOpener>,
    /// Derives keys from plot memos
    pub key_derivation: Arc<dyn KeyDerivation>,
    /// Thread pools shared with other plot managers
    pub thread_pools: Arc<PlotRefreshThreadPools>,
    /// Only load plots whose path contains this string
    pub match_str: Option<String>,
    /// Load plots even if their keys are not among the keys of this farmer
    pub open_no_key_filenames: bool,
    /// Refresh parameters
    pub refresh_parameter: PlotsRefreshParameter,
}

#[derive(Debug, Default, Clone)]
struct PublicKeys {
    farmer: HashSet<G1PublicKey>,
    pool: HashSet<G1PublicKey>,
}

/// Where a plot file name was loaded from and where other copies of it were found
#[derive(Debug)]
struct PlotFilenamePaths {
    loaded_directory: PathBuf,
    duplicate_directories: HashSet<PathBuf>,
}

#[derive(Debug)]
struct PlotState {
    plots: HashMap<PathBuf, PlotInfo>,
    /// Plots that failed to open or decode with the time of the last failure
    failed_to_open_filenames: HashMap<PathBuf, u64>,
    no_key_filenames: HashSet<PathBuf>,
    cache: DiskCache,
    initial: bool,
}

#[derive(Debug)]
struct Schedule {
    last_refresh: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    plot_scanner: Arc<dyn PlotScanner>,
    prover_opener: Arc<dyn ProverOpener>,
    key_derivation: Arc<dyn KeyDerivation>,
    thread_pools: Arc<PlotRefreshThreadPools>,
    match_str: Option<String>,
    open_no_key_filenames: bool,
    refresh_parameter: PlotsRefreshParameter,
    public_keys: RwLock<PublicKeys>,
    /// Always locked before `plot_filename_paths` when both are needed
    state: Mutex<PlotState>,
    plot_filename_paths: Mutex<HashMap<OsString, PlotFilenamePaths>>,
    schedule: Mutex<Schedule>,
    schedule_changed: Condvar,
    stop_requested: AtomicBool,
    /// Held for the duration of the refresh cycle
    refresh_lock: Mutex<()>,
    handlers: Handlers,
}

/// Manager of plot files, see module-level documentation for details
#[derive(Debug)]
pub struct PlotManager {
    inner: Arc<Inner>,
    refresh_thread: Mutex<Option<JoinOnDrop>>,
}

impl Drop for PlotManager {
    fn drop(&mut self) {
        self.stop_refreshing();
    }
}

impl PlotManager {
    /// Create new plot manager.
    ///
    /// Nothing happens until [`Self::start_refreshing()`] or [`Self::refresh_plots()`] is called.
    pub fn new(options: PlotManagerOptions) -> Self {
        let PlotManagerOptions {
            root_path,
            plot_scanner,
            prover_opener,
            key_derivation,
            thread_pools,
            match_str,
            open_no_key_filenames,
            refresh_parameter,
        } = options;

        let cache_path = root_path
            .join(DiskCache::DIRECTORY_NAME)
            .join(DiskCache::FILE_NAME);

        let inner = Inner {
            plot_scanner,
            prover_opener,
            key_derivation,
            thread_pools,
            match_str,
            open_no_key_filenames,
            refresh_parameter,
            public_keys: RwLock::default(),
            state: Mutex::new(PlotState {
                plots: HashMap::new(),
                failed_to_open_filenames: HashMap::new(),
                no_key_filenames: HashSet::new(),
                cache: DiskCache::new(cache_path),
                initial: true,
            }),
            plot_filename_paths: Mutex::default(),
            schedule: Mutex::new(Schedule { last_refresh: None }),
            schedule_changed: Condvar::new(),
            stop_requested: AtomicBool::new(false),
            refresh_lock: Mutex::new(()),
            handlers: Handlers::default(),
        };

        Self {
            inner: Arc::new(inner),
            refresh_thread: Mutex::new(None),
        }
    }

    /// Set farmer and pool public keys plots must be bound to.
    ///
    /// Takes effect for plots processed in subsequent refresh cycles.
    pub fn set_public_keys<F, P>(&self, farmer_public_keys: F, pool_public_keys: P)
    where
        F: IntoIterator<Item = G1PublicKey>,
        P: IntoIterator<Item = G1PublicKey>,
    {
        *self.inner.public_keys.write() = PublicKeys {
            farmer: farmer_public_keys.into_iter().collect(),
            pool: pool_public_keys.into_iter().collect(),
        };
    }

    /// Whether both farmer and pool public keys were set
    pub fn public_keys_available(&self) -> bool {
        let public_keys = self.inner.public_keys.read();
        !public_keys.farmer.is_empty() && !public_keys.pool.is_empty()
    }

    /// Load disk cache and start refreshing plots in background thread, does nothing if refresh
    /// thread is already running
    pub fn start_refreshing(&self) -> Result<(), PlotManagerError> {
        self.inner.stop_requested.store(false, Ordering::Release);

        let mut refresh_thread = self.refresh_thread.lock();
        if let Some(join_handle) = refresh_thread.as_ref()
            && !join_handle.is_finished()
        {
            return Ok(());
        }

        self.inner
            .state
            .lock()
            .cache
            .load(self.inner.prover_opener.as_ref());

        let span = info_span!("plot-refresh");
        let join_handle = thread::Builder::new()
            .name("plot-refresh".to_string())
            .spawn({
                let inner = Arc::clone(&self.inner);

                move || {
                    let _span_guard = span.enter();

                    inner.run_refresh_loop();
                }
            })
            .map_err(PlotManagerError::RefreshThreadSpawn)?;

        *refresh_thread = Some(JoinOnDrop::new(join_handle));

        Ok(())
    }

    /// Stop refreshing plots and wait for refresh thread to exit.
    ///
    /// Batch that is being processed is finished and its plots are published, but
    /// [`PlotRefreshEvent::BatchProcessed`] is not emitted for it. The rest of the cycle is aborted
    /// and [`PlotRefreshEvent::Done`] is not emitted either.
    pub fn stop_refreshing(&self) {
        self.inner.stop_requested.store(true, Ordering::Release);
        {
            let _schedule = self.inner.schedule.lock();
            self.inner.schedule_changed.notify_all();
        }

        let mut refresh_thread = self.refresh_thread.lock();
        // Refresh thread can't wait for itself, it will exit on its own
        let is_refresh_thread = refresh_thread
            .as_ref()
            .is_some_and(|join_handle| join_handle.thread().id() == thread::current().id());
        if !is_refresh_thread {
            // Joins the thread
            refresh_thread.take();
        }
    }

    /// Make refresh thread start new refresh cycle as soon as possible
    pub fn trigger_refresh(&self) {
        debug!("Refresh triggered");
        let mut schedule = self.inner.schedule.lock();
        schedule.last_refresh = None;
        self.inner.schedule_changed.notify_all();
    }

    /// Run one refresh cycle on the current thread.
    ///
    /// Returns `None` if refresh failed, in which case in-memory state was reset. Cycle aborted
    /// with [`Self::stop_refreshing()`] returns results of batches that were processed before
    /// abort, [`PlotRefreshEvent::Done`] is only emitted for complete cycles.
    ///
    /// Blocks while another refresh cycle is in progress.
    pub fn refresh_plots(&self) -> Option<PlotRefreshResult> {
        self.inner.refresh_or_reset()
    }

    /// Whether refresh interval has elapsed since the last refresh
    pub fn needs_refresh(&self) -> bool {
        self.inner.needs_refresh()
    }

    /// Whether no refresh cycle has completed yet since creation or the last reset
    pub fn initial_refresh(&self) -> bool {
        self.inner.state.lock().initial
    }

    /// Forget all plots, duplicates, failures and plots without keys.
    ///
    /// Disk cache is kept, so plots are loaded again without deriving keys.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Number of published plots
    pub fn plot_count(&self) -> usize {
        self.inner.state.lock().plots.len()
    }

    /// Snapshot of published plots
    pub fn plots(&self) -> HashMap<PathBuf, PlotInfo> {
        self.inner.state.lock().plots.clone()
    }

    /// Published plot at `path`
    pub fn plot(&self, path: &Path) -> Option<PlotInfo> {
        self.inner.state.lock().plots.get(path).cloned()
    }

    /// Paths of all copies of plots that are not farmed because the same plot file name is
    /// already loaded from another directory
    pub fn get_duplicates(&self) -> Vec<PathBuf> {
        self.inner
            .plot_filename_paths
            .lock()
            .iter()
            .flat_map(|(filename, paths)| {
                paths
                    .duplicate_directories
                    .iter()
                    .map(move |directory| directory.join(filename))
            })
            .collect()
    }

    /// Directories with copies of plot `filename` that are not farmed, sorted
    pub fn duplicates_of<F>(&self, filename: F) -> Vec<PathBuf>
    where
        F: AsRef<OsStr>,
    {
        let mut directories = self
            .inner
            .plot_filename_paths
            .lock()
            .get(filename.as_ref())
            .map(|paths| paths.duplicate_directories.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        directories.sort();
        directories
    }

    /// Plots that failed to open or decode with Unix timestamp of the last failure
    pub fn failed_to_open_filenames(&self) -> HashMap<PathBuf, u64> {
        self.inner.state.lock().failed_to_open_filenames.clone()
    }

    /// Plots whose keys are not among the keys of this farmer
    pub fn no_key_filenames(&self) -> HashSet<PathBuf> {
        self.inner.state.lock().no_key_filenames.clone()
    }

    /// Number of entries in disk cache
    pub fn cache_len(&self) -> usize {
        self.inner.state.lock().cache.len()
    }

    /// Subscribe to refresh progress notifications.
    ///
    /// Callbacks are called synchronously on the thread running refresh cycle. They must not call
    /// [`Self::refresh_plots()`], which waits for the running cycle to finish and would deadlock.
    pub fn on_refresh(&self, callback: HandlerFn<PlotRefreshEvent>) -> HandlerId {
        self.inner.handlers.refresh.add(callback)
    }
}

impl Inner {
    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    fn needs_refresh(&self) -> bool {
        let interval = self.refresh_parameter.interval();
        self.schedule
            .lock()
            .last_refresh
            .is_none_or(|last_refresh| last_refresh.elapsed() > interval)
    }

    fn run_refresh_loop(&self) {
        debug!("Refresh loop started");

        loop {
            {
                let interval = self.refresh_parameter.interval();
                let mut schedule = self.schedule.lock();
                while !self.stop_requested()
                    && schedule
                        .last_refresh
                        .is_some_and(|last_refresh| last_refresh.elapsed() <= interval)
                {
                    self.schedule_changed
                        .wait_for(&mut schedule, REFRESH_WAIT_STEP);
                }
            }

            if self.stop_requested() {
                break;
            }

            self.refresh_or_reset();
        }

        debug!("Refresh loop exited");
    }

    fn refresh_or_reset(&self) -> Option<PlotRefreshResult> {
        let _refresh_guard = self.refresh_lock.lock();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.refresh())).unwrap_or_else(
            |payload| Err(RefreshError::Panicked(panic_message(payload.as_ref()))),
        );

        match result {
            Ok(result) => Some(result),
            Err(error) => {
                error!(%error, "Plot refresh failed, resetting");
                self.reset();
                None
            }
        }
    }

    fn reset(&self) {
        {
            let mut state = self.state.lock();
            state.plots.clear();
            state.failed_to_open_filenames.clear();
            state.no_key_filenames.clear();
            state.initial = true;

            self.plot_filename_paths.lock().clear();
        }

        self.schedule.lock().last_refresh = Some(Instant::now());
    }

    fn refresh(&self) -> Result<PlotRefreshResult, RefreshError> {
        let plot_directories = self
            .plot_scanner
            .plot_filenames()
            .map_err(RefreshError::PlotScanner)?;

        let mut plot_paths = Vec::new();
        {
            let mut seen = HashSet::new();
            for plot_path in plot_directories
                .into_iter()
                .flat_map(|contents| contents.plot_filenames)
            {
                if seen.insert(plot_path.clone()) {
                    plot_paths.push(plot_path);
                }
            }
        }
        let candidates = plot_paths
            .iter()
            .map(PathBuf::as_path)
            .collect::<HashSet<_>>();

        self.handlers
            .refresh
            .call_simple(&PlotRefreshEvent::Started(PlotRefreshResult {
                remaining: plot_paths.len(),
                ..PlotRefreshResult::default()
            }));

        let mut total_result = PlotRefreshResult {
            removed: self.drop_missing_plots(&candidates),
            ..PlotRefreshResult::default()
        };

        if let Some(match_str) = &self.match_str {
            info!(%match_str, "Only loading plots that contain match string in their path");
        }

        let mut aborted = false;
        for (remaining, batch) in
            list_to_batches(&plot_paths, self.refresh_parameter.batch_size.get())
        {
            let mut batch_result = self.refresh_batch(batch);
            if self.stop_requested() {
                debug!("Plot refresh aborted");
                aborted = true;
                break;
            }

            batch_result.remaining = remaining;
            total_result.loaded.extend(batch_result.loaded.iter().cloned());
            total_result.processed += batch_result.processed;
            total_result.duration += batch_result.duration;

            self.handlers
                .refresh
                .call_simple(&PlotRefreshEvent::BatchProcessed(batch_result));
        }

        if !aborted {
            self.handlers
                .refresh
                .call_simple(&PlotRefreshEvent::Done(total_result.clone()));
        }

        {
            let mut state = self.state.lock();
            let state = &mut *state;
            state.initial = false;

            debug!(entries = state.cache.len(), "Cache entries before cleanup");
            let plots = &state.plots;
            let removed = state.cache.remove_expired(|path| plots.contains_key(path));
            debug!(%removed, "Expired cache entries removed");

            if state.cache.changed() {
                state.cache.save();
            }
        }

        self.schedule.lock().last_refresh = Some(Instant::now());

        debug!(
            loaded = total_result.loaded.len(),
            removed = total_result.removed.len(),
            duration = ?total_result.duration,
            "Plot refresh finished"
        );

        Ok(total_result)
    }

    /// Forget failures and missing keys of plots that no longer exist, drop plots and duplicates
    /// that no longer exist.
    ///
    /// Returns paths that were dropped.
    fn drop_missing_plots(&self, candidates: &HashSet<&Path>) -> Vec<PathBuf> {
        let mut removed = Vec::new();

        let mut state = self.state.lock();
        let state = &mut *state;
        state
            .failed_to_open_filenames
            .retain(|path, _failed_at| candidates.contains(path.as_path()));
        state
            .no_key_filenames
            .retain(|path| candidates.contains(path.as_path()));

        self.plot_filename_paths
            .lock()
            .retain(|filename, plot_filename_paths| {
                let loaded_plot = plot_filename_paths.loaded_directory.join(filename);
                if !candidates.contains(loaded_plot.as_path()) {
                    // Duplicates will be picked up as regular plots now
                    state.plots.remove(&loaded_plot);
                    removed.push(loaded_plot);
                    return false;
                }

                plot_filename_paths
                    .duplicate_directories
                    .retain(|directory| {
                        let duplicate_plot = directory.join(filename);
                        if candidates.contains(duplicate_plot.as_path()) {
                            true
                        } else {
                            removed.push(duplicate_plot);
                            false
                        }
                    });

                true
            });

        removed
    }

    fn refresh_batch(&self, batch: &[PathBuf]) -> PlotRefreshResult {
        let start = Instant::now();

        let preprocessed = self.thread_pools.preprocessing.install(|| {
            batch
                .par_iter()
                .filter_map(|path| preprocessing::preprocess_plot(self, path))
                .collect::<Vec<_>>()
        });
        let preprocessing_duration = start.elapsed();

        let (cache_hits, cache_misses) = preprocessed
            .into_iter()
            .partition::<Vec<_>, _>(|plot| plot.cache_entry.is_some());

        let decoding_start = Instant::now();
        let decoded = {
            let memos = cache_misses
                .iter()
                .map(|plot| (plot.path.as_path(), plot.prover.memo()))
                .collect::<Vec<_>>();

            decoding::decode_memos(
                &self.thread_pools.decoding,
                self.key_derivation.as_ref(),
                &memos,
            )
        };
        let decoding_duration = decoding_start.elapsed();

        let public_keys = self.public_keys.read().clone();

        let locking_start = Instant::now();
        let mut state = self.state.lock();
        let mut plot_filename_paths = self.plot_filename_paths.lock();
        let locked_duration = locking_start.elapsed();

        let mut postprocessing = Postprocessing {
            state: &mut *state,
            plot_filename_paths: &mut *plot_filename_paths,
            public_keys: &public_keys,
            open_no_key_filenames: self.open_no_key_filenames,
        };
        let mut plots_refreshed = Vec::new();

        for mut plot in cache_hits {
            let Some(cache_entry) = plot.cache_entry.take() else {
                continue;
            };

            if let Some(plot_info) = postprocessing.postprocess_plot(&plot, &cache_entry) {
                plots_refreshed.push((plot.path, plot_info));
            }
        }

        for (plot, keys) in cache_misses.into_iter().zip(decoded) {
            let Some(keys) = keys else {
                postprocessing.record_failure(plot.path);
                continue;
            };

            let cache_entry = CacheEntry::new(Arc::clone(&plot.prover), keys);
            postprocessing
                .state
                .cache
                .update(plot.path.clone(), cache_entry.clone());

            if let Some(plot_info) = postprocessing.postprocess_plot(&plot, &cache_entry) {
                plots_refreshed.push((plot.path, plot_info));
            }
        }

        let loaded = plots_refreshed
            .iter()
            .map(|(_path, plot_info)| plot_info.clone())
            .collect::<Vec<_>>();
        state.plots.extend(plots_refreshed);
        drop(plot_filename_paths);
        drop(state);

        let result = PlotRefreshResult {
            loaded,
            removed: Vec::new(),
            processed: batch.len(),
            remaining: 0,
            duration: start.elapsed(),
        };

        debug!(
            loaded = result.loaded.len(),
            processed = result.processed,
            batch_size = self.refresh_parameter.batch_size.get(),
            ?preprocessing_duration,
            ?decoding_duration,
            ?locked_duration,
            duration = ?result.duration,
            "Batch processed"
        );

        result
    }
}
