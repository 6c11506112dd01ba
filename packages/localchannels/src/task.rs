//! Deferred work.
//!
//! Self-delivered messages are not dispatched inside the call that posts
//! them. They are queued here and run on the next [`poll`], which keeps
//! self-delivery asynchronous like every cross-process delivery.
//!
//! [`poll`]: crate::LocalChannels::poll

use std::collections::VecDeque;

use serde_json::Value;

/// A unit of deferred work.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Task {
    /// Dispatch a message this process sent to itself.
    DeliverToSelf { data: Value },
}

/// FIFO of pending tasks.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    pending: VecDeque<Task>,
}

impl TaskQueue {
    pub(crate) fn push(&mut self, task: Task) {
        self.pending.push_back(task);
    }

    /// Take every task queued so far. Tasks queued while these run wait for
    /// the next tick.
    pub(crate) fn take_ready(&mut self) -> Vec<Task> {
        self.pending.drain(..).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tasks_run_in_fifo_order() {
        let mut queue = TaskQueue::default();
        queue.push(Task::DeliverToSelf { data: json!(1) });
        queue.push(Task::DeliverToSelf { data: json!(2) });
        assert_eq!(queue.len(), 2);

        let ready = queue.take_ready();
        assert_eq!(
            ready,
            vec![
                Task::DeliverToSelf { data: json!(1) },
                Task::DeliverToSelf { data: json!(2) },
            ]
        );
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn clear_drops_pending() {
        let mut queue = TaskQueue::default();
        queue.push(Task::DeliverToSelf { data: json!(null) });
        queue.clear();
        assert!(queue.take_ready().is_empty());
    }
}
