//! Enumeration of plot files in plot directories


use crate::config::PlotManagerConfig;
use crate::prover::PlotError;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extension of plot files
const PLOT_EXTENSION: &str = "plot";
/// Prefix of AppleDouble files macOS creates on foreign file systems
const APPLE_DOUBLE_PREFIX: &str = "._";

/// Plot files found in one plot directory
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlotDirectoryContents {
    /// Plot directory
    pub directory: PathBuf,
    /// Plot files found in the directory
    pub plot_filenames: Vec<PathBuf>,
}

/// Source of candidate plot files
pub trait PlotScanner: Send + Sync + fmt::Debug {
    /// Plot files found, grouped by plot directory they were found in.
    ///
    /// Directories are returned in configured order, when the same plot file name exists in
    /// multiple directories the copy that comes first is the one that gets farmed.
    fn plot_filenames(&self) -> Result<Vec<PlotDirectoryContents>, PlotError>;
}

/// [`PlotScanner`] that lists `*.plot` files in a set of directories
#[derive(Debug, Clone)]
pub struct PlotDirectories {
    directories: Vec<PathBuf>,
    recursive: bool,
}

impl PlotScanner for PlotDirectories {
    fn plot_filenames(&self) -> Result<Vec<PlotDirectoryContents>, PlotError> {
        Ok(self
            .directories
            .iter()
            .map(|directory| {
                let directory = directory
                    .canonicalize()
                    .unwrap_or_else(|_error| directory.clone());
                let plot_filenames = self.plot_filenames_in(&directory);
                PlotDirectoryContents {
                    directory,
                    plot_filenames,
                }
            })
            .collect())
    }
}

impl PlotDirectories {
    /// Create new instance, with `recursive` set sub-directories are searched too
    pub fn new(directories: Vec<PathBuf>, recursive: bool) -> Self {
        Self {
            directories,
            recursive,
        }
    }

    /// Create new instance from plot manager config
    pub fn from_config(config: &PlotManagerConfig) -> Self {
        Self::new(config.plot_directories.clone(), config.recursive_plot_scan)
    }

    /// Directories plots are searched in
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    fn plot_filenames_in(&self, directory: &Path) -> Vec<PathBuf> {
        if !directory.is_dir() {
            warn!(directory = %directory.display(), "Plot directory doesn't exist");
            return Vec::new();
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let plot_filenames = WalkDir::new(directory)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    warn!(%error, directory = %directory.display(), "Error reading directory");
                    None
                }
            })
            .filter(|entry| !entry.file_type().is_dir() && is_plot_filename(entry.path()))
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>();

        debug!(
            directory = %directory.display(),
            count = plot_filenames.len(),
            "Found plot files"
        );

        plot_filenames
    }
}

fn is_plot_filename(path: &Path) -> bool {
    let has_plot_extension = path
        .extension()
        .is_some_and(|extension| extension == PLOT_EXTENSION);
    let is_apple_double = path
        .file_name()
        .and_then(|file_name| file_name.to_str())
        .is_some_and(|file_name| file_name.starts_with(APPLE_DOUBLE_PREFIX));

    has_plot_extension && !is_apple_double
}
