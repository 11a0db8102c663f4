//! Cooperative task queue.
//!
//! Deferred notifications (request events, socket events) are never run
//! inline: they are posted here and run on a later turn of the host's
//! single-threaded loop, in posting order.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::Duration;
use tracing::trace;

/// A unit of deferred work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the host's task queue. Clones share the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Schedule a task for a later turn
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Both ends live in `self`, so the channel cannot be disconnected here
        let _ = self.tx.send(Box::new(task));
    }

    /// Number of tasks waiting
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Run one task if available
    pub fn run_once(&self) -> bool {
        match self.rx.try_recv() {
            Ok(task) => {
                task();
                true
            }
            Err(_) => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks posted meanwhile.
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        trace!("Task queue idle after {} tasks", ran);
        ran
    }

    /// Block up to `timeout` for one task and run it
    pub fn run_next_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(_) => false,
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue").field("pending", &self.pending()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_tasks_run_in_order_and_later() {
        let queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            queue.post(move || log.lock().unwrap().push(i));
        }
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(queue.pending(), 3);

        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_tasks_posted_while_running() {
        let queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_queue = queue.clone();
        let inner_log = log.clone();
        queue.post(move || {
            inner_log.lock().unwrap().push("outer");
            let log = inner_log.clone();
            inner_queue.post(move || log.lock().unwrap().push("inner"));
        });

        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_run_next_timeout_on_empty_queue() {
        let queue = TaskQueue::new();
        assert!(!queue.run_next_timeout(Duration::from_millis(5)));
    }
}
