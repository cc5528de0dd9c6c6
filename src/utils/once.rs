use std::any::TypeId;
use std::collections::HashSet;
use parking_lot::Mutex;
use lazy_static::lazy_static;

lazy_static! {
    static ref INITIALIZED: Mutex<HashSet<TypeId>> = Mutex::new(HashSet::new());
}

/// Run `init` the first time this is called for `T` in the process.
/// Returns true when `init` ran.
///
/// The registry lock is held while `init` runs, so concurrent callers wait
/// for the first initialization to finish.
pub(crate) fn call_once_per_type<T: 'static>(init: impl FnOnce()) -> bool {
    let mut initialized = INITIALIZED.lock();
    if !initialized.insert(TypeId::of::<T>()) {
        return false;
    }
    init();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_runs_once_per_type() {
        struct Marker;
        struct OtherMarker;

        let calls = AtomicUsize::new(0);
        assert!(call_once_per_type::<Marker>(|| {
            calls.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(!call_once_per_type::<Marker>(|| {
            calls.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(call_once_per_type::<OtherMarker>(|| {
            calls.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_callers() {
        struct ThreadedMarker;

        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let calls = calls.clone();
                thread::spawn(move || {
                    call_once_per_type::<ThreadedMarker>(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
