use std::collections::VecDeque;
use std::sync::Arc;

use super::{BaseQueue, EntryList, PostEnqueueAction, QueueCore, QueueEntry};
use crate::message::Message;

/// FIFO entry list.
#[derive(Debug, Default)]
pub struct FifoEntries {
    entries: VecDeque<QueueEntry>,
}

impl EntryList for FifoEntries {
    fn insert(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    fn pop_next(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    fn entries(&self) -> Vec<QueueEntry> {
        self.entries.iter().cloned().collect()
    }

    fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A plain first-in, first-out queue.
#[derive(Debug)]
pub struct StandardQueue {
    core: QueueCore<FifoEntries>,
}

impl StandardQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_owner(name, None)
    }

    pub fn with_owner(name: impl Into<String>, owner: Option<String>) -> Self {
        Self {
            core: QueueCore::new(name, owner, FifoEntries::default()),
        }
    }

    /// Waits for the next message.
    pub async fn receive(&self) -> QueueEntry {
        self.core.receive().await
    }
}

impl BaseQueue for StandardQueue {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn owner(&self) -> Option<&str> {
        self.core.owner()
    }

    fn enqueue(&self, message: Arc<Message>, action: Option<PostEnqueueAction>) {
        let entry = self.core.new_entry(message);
        self.core.insert(entry.clone());
        self.core.finish_enqueue(entry, action);
    }

    fn try_receive(&self) -> Option<QueueEntry> {
        self.core.try_receive()
    }

    fn snapshot(&self) -> Vec<QueueEntry> {
        self.core.snapshot()
    }

    fn clear(&self) -> usize {
        self.core.clear()
    }

    fn depth(&self) -> usize {
        self.core.len()
    }

    fn enqueued_total(&self) -> u64 {
        self.core.enqueued_total()
    }
}
