use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use super::{epoch_ms, PostEnqueueAction, QueueEntry};
use crate::message::Message;

/// Storage discipline for queue entries.
pub trait EntryList: Send {
    fn insert(&mut self, entry: QueueEntry);

    /// Removes the entry that should be delivered next.
    fn pop_next(&mut self) -> Option<QueueEntry>;

    /// Entries in delivery order.
    fn entries(&self) -> Vec<QueueEntry>;

    fn clear(&mut self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State and consumer-side operations shared by every queue variant.
///
/// `entries` is the consumer-side lock: receive, snapshot and clear take it,
/// and producers hold it only for the insertion itself.
#[derive(Debug)]
pub struct QueueCore<L> {
    name: String,
    owner: Option<String>,
    entries: Mutex<L>,
    /// Wakes consumers blocked in `receive`.
    notify: Notify,
    next_sequence: AtomicU64,
    enqueued_total: AtomicU64,
}

impl<L: EntryList> QueueCore<L> {
    pub fn new(name: impl Into<String>, owner: Option<String>, entries: L) -> Self {
        Self {
            name: name.into(),
            owner,
            entries: Mutex::new(entries),
            notify: Notify::new(),
            next_sequence: AtomicU64::new(1),
            enqueued_total: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Stamps a new entry with the next sequence number and the current time.
    pub fn new_entry(&self, message: Arc<Message>) -> QueueEntry {
        QueueEntry {
            message,
            sequence_number: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            enqueued_time_utc: epoch_ms(),
        }
    }

    pub fn insert(&self, entry: QueueEntry) {
        self.entries.lock().insert(entry);
    }

    /// Bookkeeping after the entry became visible: statistics, consumer
    /// wakeup and the caller's post-enqueue action. Runs without any lock.
    pub fn finish_enqueue(&self, entry: QueueEntry, action: Option<PostEnqueueAction>) {
        self.enqueued_total.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
        if let Some(action) = action {
            action(&entry);
        }
    }

    pub fn try_receive(&self) -> Option<QueueEntry> {
        self.entries.lock().pop_next()
    }

    /// Waits until an entry is available, then removes and returns it.
    pub async fn receive(&self) -> QueueEntry {
        loop {
            if let Some(entry) = self.try_receive() {
                return entry;
            }
            self.notify.notified().await;
        }
    }

    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries.lock().entries()
    }

    pub fn clear(&self) -> usize {
        self.entries.lock().clear()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn enqueued_total(&self) -> u64 {
        self.enqueued_total.load(Ordering::Relaxed)
    }
}
