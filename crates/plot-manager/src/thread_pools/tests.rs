use crate::thread_pools::PlotRefreshThreadPools;
use std::num::NonZeroUsize;
use std::thread;

#[test]
fn explicit_sizes() {
    let thread_pools =
        PlotRefreshThreadPools::new(NonZeroUsize::new(3).unwrap(), NonZeroUsize::new(1).unwrap())
            .unwrap();

    assert_eq!(thread_pools.preprocessing.current_num_threads(), 3);
    assert_eq!(thread_pools.decoding.current_num_threads(), 1);

    let thread_name = thread_pools
        .decoding
        .install(|| thread::current().name().map(str::to_string));
    assert_eq!(thread_name.as_deref(), Some("plot-decoding-0"));
}

#[test]
fn default_sizes() {
    let thread_pools = PlotRefreshThreadPools::with_default_sizes().unwrap();
    let cpu_cores = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);

    assert_eq!(thread_pools.decoding.current_num_threads(), cpu_cores);
    assert!(thread_pools.preprocessing.current_num_threads() > cpu_cores.min(28));
    assert!(thread_pools.preprocessing.current_num_threads() <= 32);
}
