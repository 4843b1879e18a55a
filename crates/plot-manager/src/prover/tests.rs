use crate::prover::{expected_plot_file_size, expected_plot_size, is_plot_incomplete};

#[test]
fn expected_size() {
    assert_eq!(expected_plot_size(0), 0);
    assert_eq!(expected_plot_size(1), 3);
    // (2 * 32 + 1) * 2^31
    assert_eq!(expected_plot_size(32), 65 * (1 << 31));

    let k32 = expected_plot_file_size(32);
    // Around 99 GiB on disk
    assert!(k32 > 99.0 * 1024.0 * 1024.0 * 1024.0);
    assert!(k32 < 100.0 * 1024.0 * 1024.0 * 1024.0);

    // Never overflows
    assert_eq!(expected_plot_size(u8::MAX), u64::MAX);
}

#[test]
fn incomplete_plots() {
    let full_size = expected_plot_file_size(32).ceil() as u64;

    assert!(!is_plot_incomplete(32, full_size));
    assert!(!is_plot_incomplete(32, (full_size as f64 * 0.985) as u64));
    assert!(is_plot_incomplete(32, (full_size as f64 * 0.9) as u64));
    assert!(is_plot_incomplete(30, 0));

    // Small plots are never considered incomplete
    assert!(!is_plot_incomplete(29, 0));
    assert!(!is_plot_incomplete(25, 1024));
}
