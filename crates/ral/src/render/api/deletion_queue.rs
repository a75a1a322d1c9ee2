//! Deferred destruction of native objects
//!
//! The queue has no notion of time. The owner decides when a flush is safe,
//! which for per-frame queues means "after the fence of the frame that
//! enqueued these entries has signaled".

use std::fmt;

type Deletion = Box<dyn FnOnce()>;

/// Ordered list of destruction closures, flushed newest first
#[derive(Default)]
pub struct DeletionQueue {
    entries: Vec<(&'static str, Deletion)>,
}

impl DeletionQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one destruction
    ///
    /// The label only feeds diagnostics.
    pub fn push(&mut self, label: &'static str, deletion: impl FnOnce() + 'static) {
        self.entries.push((label, Box::new(deletion)));
    }

    /// Run every pending destruction in reverse insertion order
    pub fn flush(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        log::debug!("Flushing {} deferred deletion(s)", self.entries.len());
        while let Some((label, deletion)) = self.entries.pop() {
            log::trace!("Destroying {label}");
            deletion();
        }
    }

    /// Pending destruction count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(label, _)| label))
            .finish()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::warn!(
                "DeletionQueue dropped with {} pending deletion(s); flushing now",
                self.entries.len()
            );
            self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_flush_runs_in_reverse_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut queue = DeletionQueue::new();

        for i in 0..4 {
            let order = Rc::clone(&order);
            queue.push("entry", move || order.borrow_mut().push(i));
        }
        assert_eq!(queue.len(), 4);

        queue.flush();
        assert_eq!(*order.borrow(), vec![3, 2, 1, 0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_twice_runs_each_entry_once() {
        let count = Rc::new(RefCell::new(0));
        let mut queue = DeletionQueue::new();
        let c = Rc::clone(&count);
        queue.push("entry", move || *c.borrow_mut() += 1);

        queue.flush();
        queue.flush();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_drop_flushes_pending_entries() {
        let count = Rc::new(RefCell::new(0));
        {
            let mut queue = DeletionQueue::new();
            let c = Rc::clone(&count);
            queue.push("entry", move || *c.borrow_mut() += 1);
        }
        assert_eq!(*count.borrow(), 1);
    }
}
