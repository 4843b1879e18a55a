use crate::utils::{JoinOnDrop, list_to_batches, panic_message, unix_timestamp};
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn batches() {
    let items = (0..7).collect::<Vec<u32>>();

    let batches = list_to_batches(&items, 3).collect::<Vec<_>>();
    assert_eq!(
        batches,
        vec![
            (4, &[0, 1, 2][..]),
            (1, &[3, 4, 5][..]),
            (0, &[6][..]),
        ]
    );

    let batches = list_to_batches(&items, 7).collect::<Vec<_>>();
    assert_eq!(batches, vec![(0, &items[..])]);

    let batches = list_to_batches(&items, 100).collect::<Vec<_>>();
    assert_eq!(batches, vec![(0, &items[..])]);

    assert_eq!(list_to_batches::<u32>(&[], 3).count(), 0);
}

#[test]
fn join_on_drop() {
    let finished = Arc::new(AtomicBool::new(false));

    let join_on_drop = JoinOnDrop::new(thread::spawn({
        let finished = Arc::clone(&finished);

        move || {
            thread::sleep(Duration::from_millis(50));
            finished.store(true, Ordering::SeqCst);
        }
    }));
    drop(join_on_drop);

    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn timestamp() {
    // Some time after 2020-01-01
    assert!(unix_timestamp() > 1_577_836_800);
}

#[test]
fn panic_messages() {
    let payload = panic::catch_unwind(|| panic!("static message")).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "static message");

    let index = 5;
    let payload = panic::catch_unwind(|| panic!("formatted message {index}")).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "formatted message 5");

    let payload = panic::catch_unwind(|| panic::panic_any(42_u32)).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "unknown panic");
}

#[cfg(unix)]
#[test]
fn non_utf8_path_bytes() {
    use crate::utils::{path_from_bytes, path_to_bytes};
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    let path = Path::new(OsStr::from_bytes(b"/plots/plot-\xff.plot"));
    let bytes = path_to_bytes(path).unwrap();
    assert_eq!(bytes, b"/plots/plot-\xff.plot");
    assert_eq!(path_from_bytes(bytes).unwrap(), path);
}
