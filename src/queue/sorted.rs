//! Queue ordered by a message header.
//!
//! Producers serialize on `sort_lock` for the ordering-sensitive step only:
//! reading the sort key, taking the arrival sequence number and inserting
//! into the entry list. Holding it across both keeps entries with equal
//! keys in arrival order even while consumers drain the list. The
//! post-enqueue bookkeeping runs after the lock is released.
//!
//! Lock order is `sort_lock` then the consumer-side entry lock. Consumer
//! paths never take `sort_lock`.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{BaseQueue, EntryList, PostEnqueueAction, QueueCore, QueueEntry};
use crate::message::{Message, Value};

/// Ordering key read from a message header.
///
/// Missing headers sort first, then booleans, numbers and strings.
/// Integers and floats compare numerically with each other.
#[derive(Debug, Clone)]
pub enum SortKey {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SortKey {
    pub fn from_header(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => SortKey::Missing,
            Some(Value::Bool(b)) => SortKey::Bool(*b),
            Some(Value::Int(n)) => SortKey::Int(*n),
            Some(Value::Float(n)) => SortKey::Float(*n),
            Some(Value::String(s)) => SortKey::Text(s.clone()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Missing => 0,
            SortKey::Bool(_) => 1,
            SortKey::Int(_) | SortKey::Float(_) => 2,
            SortKey::Text(_) => 3,
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Bool(a), SortKey::Bool(b)) => a.cmp(b),
            (SortKey::Int(a), SortKey::Int(b)) => a.cmp(b),
            (SortKey::Int(a), SortKey::Float(b)) => cmp_int_float(*a, *b),
            (SortKey::Float(a), SortKey::Int(b)) => cmp_int_float(*b, *a).reverse(),
            // Zeros of either sign are equal, as they are to `Int(0)`.
            (SortKey::Float(a), SortKey::Float(b)) if a == b => Ordering::Equal,
            (SortKey::Float(a), SortKey::Float(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Exact comparison of an integer with a float, without rounding the integer.
/// NaNs sort by sign, matching `f64::total_cmp`.
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    // 2^63: the first float above every i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return if float.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(float - whole)).unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

/// Entry list kept in `(sort key, arrival sequence)` order.
#[derive(Debug)]
pub struct SortedEntries {
    property: String,
    entries: BTreeMap<(SortKey, u64), QueueEntry>,
}

impl SortedEntries {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            entries: BTreeMap::new(),
        }
    }
}

impl EntryList for SortedEntries {
    fn insert(&mut self, entry: QueueEntry) {
        let key = SortKey::from_header(entry.message.header(&self.property));
        self.entries.insert((key, entry.sequence_number), entry);
    }

    fn pop_next(&mut self) -> Option<QueueEntry> {
        self.entries.pop_first().map(|(_, entry)| entry)
    }

    fn entries(&self) -> Vec<QueueEntry> {
        self.entries.values().cloned().collect()
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

/// A queue delivering messages in order of a header value.
#[derive(Debug)]
pub struct SortedQueue {
    core: QueueCore<SortedEntries>,
    sort_key: String,
    /// Serializes producers; distinct from the consumer-side entry lock.
    sort_lock: Mutex<()>,
}

impl SortedQueue {
    pub fn new(name: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self::with_owner(name, sort_key, None)
    }

    pub fn with_owner(
        name: impl Into<String>,
        sort_key: impl Into<String>,
        owner: Option<String>,
    ) -> Self {
        let sort_key = sort_key.into();
        Self {
            core: QueueCore::new(name, owner, SortedEntries::new(sort_key.clone())),
            sort_key,
            sort_lock: Mutex::new(()),
        }
    }

    /// Waits for the next message in sort order.
    pub async fn receive(&self) -> QueueEntry {
        self.core.receive().await
    }
}

impl BaseQueue for SortedQueue {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn owner(&self) -> Option<&str> {
        self.core.owner()
    }

    fn sort_key(&self) -> Option<&str> {
        Some(&self.sort_key)
    }

    fn enqueue(&self, message: Arc<Message>, action: Option<PostEnqueueAction>) {
        let entry = {
            let _guard = self.sort_lock.lock();
            let entry = self.core.new_entry(message);
            self.core.insert(entry.clone());
            entry
        };
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

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(value: impl Into<Value>) -> Arc<Message> {
        Arc::new(Message::builder().header("rank", value).build())
    }

    #[test]
    fn test_sort_key_ordering() {
        let mut keys = vec![
            SortKey::Text("b".into()),
            SortKey::Float(2.5),
            SortKey::Missing,
            SortKey::Int(3),
            SortKey::Bool(true),
            SortKey::Int(1),
            SortKey::Text("a".into()),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                SortKey::Missing,
                SortKey::Bool(true),
                SortKey::Int(1),
                SortKey::Float(2.5),
                SortKey::Int(3),
                SortKey::Text("a".into()),
                SortKey::Text("b".into()),
            ]
        );
    }

    #[test]
    fn test_int_float_comparison_is_exact() {
        let two_53 = 1i64 << 53;
        let float = SortKey::Float(two_53 as f64);
        assert_eq!(SortKey::Int(two_53).cmp(&float), Ordering::Equal);
        assert_eq!(SortKey::Int(two_53 + 1).cmp(&float), Ordering::Greater);
        assert_eq!(float.cmp(&SortKey::Int(two_53 + 1)), Ordering::Less);

        assert_eq!(SortKey::Int(i64::MAX).cmp(&SortKey::Float(i64::MAX as f64)), Ordering::Less);
        assert_eq!(SortKey::Int(i64::MIN).cmp(&SortKey::Float(i64::MIN as f64)), Ordering::Equal);
        assert_eq!(SortKey::Int(2).cmp(&SortKey::Float(2.5)), Ordering::Less);
        assert_eq!(SortKey::Int(-2).cmp(&SortKey::Float(-2.5)), Ordering::Greater);
        assert_eq!(SortKey::Int(0).cmp(&SortKey::Float(-0.0)), Ordering::Equal);
        assert_eq!(SortKey::Float(-0.0).cmp(&SortKey::Float(0.0)), Ordering::Equal);
        assert_eq!(SortKey::Int(i64::MAX).cmp(&SortKey::Float(f64::INFINITY)), Ordering::Less);
        assert_eq!(SortKey::Int(i64::MIN).cmp(&SortKey::Float(f64::NEG_INFINITY)), Ordering::Greater);
        assert_eq!(SortKey::Int(0).cmp(&SortKey::Float(f64::NAN)), Ordering::Less);
    }

    #[test]
    fn test_large_ints_keep_distinct_order() {
        let queue = SortedQueue::new("sorted", "rank");
        let two_53 = 1i64 << 53;
        queue.enqueue(keyed(two_53 + 1), None);
        queue.enqueue(keyed(two_53 as f64), None);
        queue.enqueue(keyed(two_53), None);

        let order: Vec<Value> = std::iter::from_fn(|| queue.try_receive())
            .map(|e| e.message.headers["rank"].clone())
            .collect();
        assert_eq!(
            order,
            vec![
                Value::Float(two_53 as f64),
                Value::Int(two_53),
                Value::Int(two_53 + 1),
            ]
        );
    }

    #[test]
    fn test_delivers_in_key_order() {
        let queue = SortedQueue::new("sorted", "rank");
        for rank in [5, 1, 3] {
            queue.enqueue(keyed(rank), None);
        }
        let order: Vec<Value> = std::iter::from_fn(|| queue.try_receive())
            .map(|e| e.message.headers["rank"].clone())
            .collect();
        assert_eq!(order, vec![Value::Int(1), Value::Int(3), Value::Int(5)]);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let queue = SortedQueue::new("sorted", "rank");
        let first = Arc::new(Message::builder().header("rank", 2).body("first").build());
        let second = Arc::new(Message::builder().header("rank", 2).body("second").build());
        queue.enqueue(first, None);
        queue.enqueue(keyed(1), None);
        queue.enqueue(second, None);

        let bodies: Vec<String> = queue.snapshot().iter().map(|e| e.message.body.clone()).collect();
        assert_eq!(bodies, vec!["", "first", "second"]);
    }

    #[test]
    fn test_post_enqueue_action_runs() {
        let queue = SortedQueue::new("sorted", "rank");
        let (tx, rx) = std::sync::mpsc::channel();
        queue.enqueue(
            keyed(7),
            Some(Box::new(move |entry: &QueueEntry| {
                tx.send(entry.sequence_number).unwrap();
            })),
        );
        assert_eq!(rx.recv().unwrap(), 1);
    }
}
