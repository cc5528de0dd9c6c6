// Location: src/processing/queue.rs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use parking_lot::{Condvar, Mutex};

/// FIFO of text fragments handed from the stream worker to a polling caller.
///
/// The active flag is flipped under the fragment lock, so once [`close`]
/// returns no further fragment can be appended until the queue is reopened.
///
/// [`close`]: TokenQueue::close
#[derive(Debug, Default)]
pub struct TokenQueue {
    fragments: Mutex<VecDeque<String>>,
    ready: Condvar,
    active: AtomicBool,
}

impl TokenQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop leftovers from a previous stream and start accepting fragments
    pub(crate) fn open(&self) {
        let mut fragments = self.fragments.lock();
        fragments.clear();
        self.active.store(true, Ordering::Release);
    }

    /// Append a fragment. Returns false when the stream was closed.
    pub(crate) fn push(&self, fragment: String) -> bool {
        {
            let mut fragments = self.fragments.lock();
            if !self.active.load(Ordering::Acquire) {
                return false;
            }
            fragments.push_back(fragment);
        }
        self.ready.notify_all();
        true
    }

    /// Stop accepting fragments. Queued ones stay poll-able.
    pub(crate) fn close(&self) {
        {
            let _fragments = self.fragments.lock();
            self.active.store(false, Ordering::Release);
        }
        self.ready.notify_all();
    }

    pub(crate) fn clear(&self) {
        self.fragments.lock().clear();
    }

    /// Pop the oldest fragment without waiting
    pub fn try_pop(&self) -> Option<String> {
        self.fragments.lock().pop_front()
    }

    /// Pop the oldest fragment, waiting up to `timeout` for one to arrive
    /// while the stream is active
    pub fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        let mut fragments = self.fragments.lock();
        if fragments.is_empty() && self.active.load(Ordering::Acquire) {
            self.ready.wait_for(&mut fragments, timeout);
        }
        fragments.pop_front()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.fragments.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.lock().is_empty()
    }
}
