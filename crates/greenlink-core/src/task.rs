//! Single-slot background worker handle.
//!
//! Both background workers in this crate (the serial read cycle and the log
//! flush) are capped at one live instance. `TaskSlot` models the
//! launch-if-empty / reclaim-on-completion contract around a thread handle.

use std::thread::JoinHandle;

/// Holder for at most one running worker thread.
#[derive(Debug, Default)]
pub(crate) struct TaskSlot {
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    /// True while a worker has been launched and not yet reclaimed.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Store a freshly spawned worker. Callers check `is_running` first.
    pub fn launch(&mut self, handle: JoinHandle<()>) {
        debug_assert!(self.handle.is_none(), "task slot already occupied");
        self.handle = Some(handle);
    }

    /// Join and release the worker. Call after its completion signal; also
    /// safe on shutdown with the worker still running (blocks until the
    /// bounded read or write finishes).
    pub fn reclaim(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn slot_lifecycle() {
        let mut slot = TaskSlot::default();
        assert!(!slot.is_running());

        slot.launch(thread::spawn(|| {}));
        assert!(slot.is_running());

        slot.reclaim();
        assert!(!slot.is_running());
    }

    #[test]
    fn reclaim_on_empty_slot_is_a_noop() {
        let mut slot = TaskSlot::default();
        slot.reclaim();
        assert!(!slot.is_running());
    }
}
