use crate::config::{PlotManagerConfig, PlotsRefreshParameter};
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn defaults() {
    let refresh_parameter = PlotsRefreshParameter::default();
    assert_eq!(refresh_parameter.interval(), Duration::from_secs(120));
    assert_eq!(refresh_parameter.retry_invalid(), Duration::from_secs(1200));
    assert_eq!(refresh_parameter.batch_size.get(), 300);
}

#[test]
fn store_and_load() {
    let directory = tempdir().unwrap();

    assert!(PlotManagerConfig::load_from(directory.path()).unwrap().is_none());

    let config = PlotManagerConfig {
        plot_directories: vec![PathBuf::from("/mnt/plots-1"), PathBuf::from("/mnt/plots-2")],
        recursive_plot_scan: true,
        match_str: Some("k32".to_string()),
        open_no_key_filenames: false,
        refresh_parameter: PlotsRefreshParameter {
            interval_seconds: 10,
            retry_invalid_seconds: 20,
            batch_size: NonZeroUsize::new(5).unwrap(),
        },
    };
    config.store_to(directory.path()).unwrap();

    assert_eq!(
        PlotManagerConfig::load_from(directory.path()).unwrap(),
        Some(config)
    );
}

#[test]
fn partial_config_uses_defaults() {
    let directory = tempdir().unwrap();
    fs::write(
        directory.path().join("plot_manager.json"),
        r#"{"plotDirectories": ["/plots"], "refreshParameter": {"batchSize": 7}}"#,
    )
    .unwrap();

    let config = PlotManagerConfig::load_from(directory.path())
        .unwrap()
        .unwrap();
    assert_eq!(config.plot_directories, vec![PathBuf::from("/plots")]);
    assert!(!config.recursive_plot_scan);
    assert_eq!(config.match_str, None);
    assert_eq!(config.refresh_parameter.batch_size.get(), 7);
    assert_eq!(config.refresh_parameter.interval_seconds, 120);
}

#[test]
fn invalid_config() {
    let directory = tempdir().unwrap();
    fs::write(directory.path().join("plot_manager.json"), b"not json").unwrap();

    assert!(PlotManagerConfig::load_from(directory.path()).is_err());
}
