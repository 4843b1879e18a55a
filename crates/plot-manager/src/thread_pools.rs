//! Thread pools used by plot refresh

#[cfg(test)]
mod tests;

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::num::NonZeroUsize;
use std::thread;

/// Upper bound on the default number of preprocessing threads
const MAX_DEFAULT_PREPROCESSING_THREADS: usize = 32;
/// Extra preprocessing threads on top of CPU cores, plot opening is mostly waiting for disks
const EXTRA_PREPROCESSING_THREADS: usize = 4;

/// A pair of thread pools for plot refresh purposes.
///
/// Preprocessing (stat and opening of plot files) is I/O-bound and runs one task per file, while
/// decoding of plot memos is CPU-bound and is submitted as a single bulk task per batch. They are
/// separate so that slow disks don't starve key derivation and the other way around.
///
/// Thread pools are meant to be created once per process and shared between plot managers.
#[derive(Debug)]
pub struct PlotRefreshThreadPools {
    /// Thread pool for I/O-bound preprocessing
    pub preprocessing: ThreadPool,
    /// Thread pool for CPU-bound memo decoding
    pub decoding: ThreadPool,
}

impl PlotRefreshThreadPools {
    /// Create thread pools with explicit number of threads in each
    pub fn new(
        preprocessing_threads: NonZeroUsize,
        decoding_threads: NonZeroUsize,
    ) -> Result<Self, ThreadPoolBuildError> {
        let preprocessing = ThreadPoolBuilder::new()
            .thread_name(|thread_index| format!("plot-preprocessing-{thread_index}"))
            .num_threads(preprocessing_threads.get())
            .build()?;
        let decoding = ThreadPoolBuilder::new()
            .thread_name(|thread_index| format!("plot-decoding-{thread_index}"))
            .num_threads(decoding_threads.get())
            .build()?;

        Ok(Self {
            preprocessing,
            decoding,
        })
    }

    /// Create thread pools sized according to available parallelism
    pub fn with_default_sizes() -> Result<Self, ThreadPoolBuildError> {
        let cpu_cores = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        let preprocessing_threads =
            (cpu_cores + EXTRA_PREPROCESSING_THREADS).min(MAX_DEFAULT_PREPROCESSING_THREADS);

        Self::new(
            NonZeroUsize::new(preprocessing_threads).expect("Not zero; qed"),
            NonZeroUsize::new(cpu_cores).expect("Not zero; qed"),
        )
    }
}
