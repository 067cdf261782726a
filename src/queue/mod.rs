//! Destination queues.
//!
//! Routing produces a set of [`QueueRef`]s; the delivery pipeline then calls
//! [`BaseQueue::enqueue`] once per destination. Two variants are provided:
//!
//! - [`StandardQueue`]: FIFO delivery.
//! - [`SortedQueue`]: delivery ordered by a configured message header, with
//!   arrival order breaking ties.
//!
//! Both share [`QueueCore`], which owns the entry list behind the
//! consumer-side lock and wakes waiting consumers through a `Notify`.

mod shared;
pub mod sorted;
pub mod standard;

use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;

use crate::message::Message;

pub use shared::{EntryList, QueueCore};
pub use sorted::{SortKey, SortedQueue};
pub use standard::StandardQueue;

/// Callback run once the entry is visible to consumers.
pub type PostEnqueueAction = Box<dyn FnOnce(&QueueEntry) + Send>;

/// A message instance held by one queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub message: Arc<Message>,
    /// Queue-local, monotonically increasing arrival number.
    pub sequence_number: u64,
    /// When the entry was created (milliseconds since UNIX epoch).
    pub enqueued_time_utc: u64,
}

/// The queue operations the routing core and the admin surface rely on.
pub trait BaseQueue: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Connection that exclusively owns this queue, if any (no-local).
    fn owner(&self) -> Option<&str>;

    /// Header that orders delivery, for sorted queues.
    fn sort_key(&self) -> Option<&str> {
        None
    }

    /// Adds a message, then runs `action` outside any queue lock.
    fn enqueue(&self, message: Arc<Message>, action: Option<PostEnqueueAction>);

    /// Removes and returns the next entry in delivery order, if any.
    fn try_receive(&self) -> Option<QueueEntry>;

    /// Entries in delivery order, without removing them.
    fn snapshot(&self) -> Vec<QueueEntry>;

    /// Removes every entry and returns how many were dropped.
    fn clear(&self) -> usize;

    fn depth(&self) -> usize;

    /// Total number of messages ever enqueued.
    fn enqueued_total(&self) -> u64;
}

/// Shared handle to any queue variant.
pub type QueueRef = Arc<dyn BaseQueue>;

/// Returns current time as milliseconds since UNIX epoch.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
