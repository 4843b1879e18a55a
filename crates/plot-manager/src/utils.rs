#[cfg(test)]
mod tests;

use std::any::Any;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

/// Joins synchronous join handle on drop
#[derive(Debug)]
pub(crate) struct JoinOnDrop(Option<thread::JoinHandle<()>>);

impl Drop for JoinOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            // Panics are caught inside of the refresh loop, there is nothing to do with an error
            // here besides ignoring it
            let _ = handle.join();
        }
    }
}

impl JoinOnDrop {
    // Create new instance
    pub(crate) fn new(handle: thread::JoinHandle<()>) -> Self {
        Self(Some(handle))
    }
}

impl Deref for JoinOnDrop {
    type Target = thread::JoinHandle<()>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.0.as_ref().expect("Only dropped in Drop impl; qed")
    }
}

/// Current time in seconds since Unix epoch
pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}

/// Split items into batches of `batch_size`, each batch is accompanied by the number of items that
/// remain after it
pub(crate) fn list_to_batches<T>(
    items: &[T],
    batch_size: usize,
) -> impl Iterator<Item = (usize, &[T])> + '_ {
    let total = items.len();
    items
        .chunks(batch_size.max(1))
        .scan(0, move |processed, batch| {
            *processed += batch.len();
            Some((total - *processed, batch))
        })
}

/// Human-readable message of a caught panic
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Raw bytes of a path, `None` if path can't be represented losslessly on this platform
#[cfg(unix)]
pub(crate) fn path_to_bytes(path: &Path) -> Option<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;

    Some(path.as_os_str().as_bytes().to_vec())
}

/// Raw bytes of a path, `None` if path can't be represented losslessly on this platform
#[cfg(not(unix))]
pub(crate) fn path_to_bytes(path: &Path) -> Option<Vec<u8>> {
    path.to_str().map(|path| path.as_bytes().to_vec())
}

/// Inverse of [`path_to_bytes()`]
#[cfg(unix)]
pub(crate) fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStringExt;

    Some(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

/// Inverse of [`path_to_bytes()`]
#[cfg(not(unix))]
pub(crate) fn path_from_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
    String::from_utf8(bytes).ok().map(PathBuf::from)
}
