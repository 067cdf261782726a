//! Per-exchange binding table.
//!
//! The table is an immutable [`TableSnapshot`] published through an
//! [`ArcSwap`]. Routing loads the current snapshot without locking and works
//! on it to completion, so a route that overlaps a bind or unbind sees either
//! the whole previous table or the whole next one.
//!
//! Mutations are serialized by one exchange-scoped mutex. Each mutation
//! copies the top-level partition map, rebuilds only the partition it
//! touches, and installs the result in a single store. Untouched partitions
//! are shared between snapshots.
//!
//! Within a partition three pieces of state are kept consistent:
//!
//! - `refcount`: number of unfiltered bindings per queue; a queue is in
//!   `unfiltered_queues` exactly when its count is positive.
//! - `filtered_queues`: queues with at least one filtered binding that are
//!   not already reachable through an unfiltered one.
//! - `filtered_bindings`: the filter map of every queue with at least one
//!   filtered binding, whether or not the queue is listed as filtered.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::binding::{Binding, BindingKey};
use crate::error::{Result, RoutingError};
use crate::exchange::RoutingStrategy;
use crate::filter::{create_message_filter, FilterError, FilterableMessage, MessageFilter};
use crate::message::{Headers, InstanceProperties, Message};
use crate::queue::QueueRef;

/// Filtered bindings of one queue in one partition, in bind order.
pub type FilterMap = Vec<Arc<Binding>>;

/// Routing state for one partition of an exchange.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    refcount: HashMap<String, usize>,
    unfiltered_bindings: Vec<Arc<Binding>>,
    unfiltered_queues: Vec<QueueRef>,
    filtered_queues: Vec<QueueRef>,
    filtered_bindings: HashMap<String, Arc<FilterMap>>,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.refcount.is_empty() && self.filtered_bindings.is_empty()
    }

    /// Queues reached through an unfiltered binding, in first-bind order.
    pub fn unfiltered_queues(&self) -> Vec<&str> {
        self.unfiltered_queues.iter().map(|q| q.name()).collect()
    }

    /// Queues whose only bindings here are filtered.
    pub fn filtered_queues(&self) -> Vec<&str> {
        self.filtered_queues.iter().map(|q| q.name()).collect()
    }

    pub fn refcount(&self, queue: &str) -> usize {
        self.refcount.get(queue).copied().unwrap_or(0)
    }

    pub fn filtered_binding_count(&self, queue: &str) -> usize {
        self.filtered_bindings.get(queue).map_or(0, |m| m.len())
    }

    pub fn has_filter_map(&self, queue: &str) -> bool {
        self.filtered_bindings.contains_key(queue)
    }

    fn add(&mut self, binding: Arc<Binding>) {
        let queue = binding.queue().clone();
        let name = queue.name().to_string();

        if binding.is_filtered() {
            let mut map = self
                .filtered_bindings
                .get(&name)
                .map(|m| (**m).clone())
                .unwrap_or_default();
            map.push(binding);
            self.filtered_bindings.insert(name.clone(), Arc::new(map));

            let listed = self.filtered_queues.iter().any(|q| q.name() == name);
            if !self.refcount.contains_key(&name) && !listed {
                self.filtered_queues.push(queue);
            }
        } else {
            self.unfiltered_bindings.push(binding);
            let count = self.refcount.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                self.unfiltered_queues.push(queue);
                self.filtered_queues.retain(|q| q.name() != name);
            }
        }
    }

    fn remove(&mut self, binding: &Arc<Binding>) {
        let name = binding.queue_name();

        if binding.is_filtered() {
            let Some(current) = self.filtered_bindings.get(name) else {
                return;
            };
            let mut map = (**current).clone();
            map.retain(|b| !Arc::ptr_eq(b, binding));
            if map.is_empty() {
                self.filtered_bindings.remove(name);
                self.filtered_queues.retain(|q| q.name() != name);
            } else {
                self.filtered_bindings.insert(name.to_string(), Arc::new(map));
            }
        } else {
            self.unfiltered_bindings.retain(|b| !Arc::ptr_eq(b, binding));
            let Some(count) = self.refcount.get_mut(name) else {
                return;
            };
            *count -= 1;
            if *count == 0 {
                self.refcount.remove(name);
                let queue = binding.queue().clone();
                self.unfiltered_queues.retain(|q| q.name() != name);
                if self.filtered_bindings.contains_key(name) {
                    self.filtered_queues.push(queue);
                }
            }
        }
    }
}

/// One immutable version of an exchange's bindings.
#[derive(Debug, Default)]
pub struct TableSnapshot {
    version: u64,
    partitions: BTreeMap<String, Arc<Partition>>,
    bindings: BTreeMap<BindingKey, Arc<Binding>>,
}

impl TableSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn partitions(&self) -> &BTreeMap<String, Arc<Partition>> {
        &self.partitions
    }

    pub fn partition(&self, key: &str) -> Option<&Partition> {
        self.partitions.get(key).map(|p| p.as_ref())
    }

    /// Bindings ordered by queue name, then binding key.
    pub fn bindings(&self) -> impl Iterator<Item = &Arc<Binding>> {
        self.bindings.values()
    }

    pub fn binding(&self, queue: &str, binding_key: &str) -> Option<&Arc<Binding>> {
        self.bindings.get(&BindingKey::new(queue, binding_key))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Builds the successor snapshot with `removed` and `added` applied.
    ///
    /// Every partition touched is cloned once; the rest are shared.
    fn apply(&self, added: &[Arc<Binding>], removed: &[Arc<Binding>]) -> TableSnapshot {
        let mut partitions = self.partitions.clone();
        let mut bindings = self.bindings.clone();
        let mut touched: BTreeMap<String, Partition> = BTreeMap::new();

        for binding in removed {
            let key = binding.partition();
            if !touched.contains_key(key) {
                let current = partitions.get(key).map(|p| (**p).clone()).unwrap_or_default();
                touched.insert(key.to_string(), current);
            }
            if let Some(partition) = touched.get_mut(key) {
                partition.remove(binding);
            }
            bindings.remove(&binding.key());
        }

        for binding in added {
            let key = binding.partition();
            if !touched.contains_key(key) {
                let current = partitions.get(key).map(|p| (**p).clone()).unwrap_or_default();
                touched.insert(key.to_string(), current);
            }
            if let Some(partition) = touched.get_mut(key) {
                partition.add(binding.clone());
            }
            bindings.insert(binding.key(), binding.clone());
        }

        for (key, partition) in touched {
            if partition.is_empty() {
                partitions.remove(&key);
            } else {
                partitions.insert(key, Arc::new(partition));
            }
        }

        TableSnapshot {
            version: self.version + 1,
            partitions,
            bindings,
        }
    }
}

/// The bindings of one exchange.
#[derive(Debug)]
pub struct BindingTable {
    exchange: String,
    current: ArcSwap<TableSnapshot>,
    /// Serializes bind, unbind and queue removal. Routing never takes it.
    mutation: Mutex<()>,
}

impl BindingTable {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            current: ArcSwap::from_pointee(TableSnapshot::default()),
            mutation: Mutex::new(()),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<TableSnapshot> {
        self.current.load_full()
    }

    /// Adds a binding of `queue` under `binding_key`.
    ///
    /// The arguments are compiled into a filter first; if compilation fails
    /// the table is left untouched.
    pub fn bind(
        &self,
        strategy: &dyn RoutingStrategy,
        queue: QueueRef,
        binding_key: &str,
        arguments: Headers,
    ) -> Result<Arc<Binding>> {
        let partition = strategy.partition_key(binding_key)?;
        let filter = compile_filter(strategy, &queue, binding_key, &arguments)?;

        let _guard = self.mutation.lock();
        let current = self.current.load_full();
        if current.binding(queue.name(), binding_key).is_some() {
            return Err(RoutingError::DuplicateBinding {
                exchange: self.exchange.clone(),
                queue: queue.name().to_string(),
                binding_key: binding_key.to_string(),
            });
        }

        let binding = Arc::new(Binding::new(
            &self.exchange,
            queue,
            binding_key,
            partition,
            arguments,
            filter,
        ));
        let next = current.apply(std::slice::from_ref(&binding), &[]);
        self.current.store(Arc::new(next));

        info!(
            exchange = %self.exchange,
            queue = %binding.queue_name(),
            binding_key = %binding_key,
            filtered = binding.is_filtered(),
            "Binding added"
        );
        Ok(binding)
    }

    /// Removes the binding identified by `(queue, binding_key)`.
    pub fn unbind(&self, queue: &str, binding_key: &str) -> Result<Arc<Binding>> {
        let _guard = self.mutation.lock();
        let current = self.current.load_full();
        let binding = current
            .binding(queue, binding_key)
            .cloned()
            .ok_or_else(|| RoutingError::UnknownBinding {
                exchange: self.exchange.clone(),
                queue: queue.to_string(),
                binding_key: binding_key.to_string(),
            })?;

        let next = current.apply(&[], std::slice::from_ref(&binding));
        self.current.store(Arc::new(next));

        info!(
            exchange = %self.exchange,
            queue = %queue,
            binding_key = %binding_key,
            "Binding removed"
        );
        Ok(binding)
    }

    /// Removes `binding` if it is still installed. A binding that has since
    /// been replaced under the same key is left alone.
    pub fn remove_binding(&self, binding: &Arc<Binding>) -> bool {
        let _guard = self.mutation.lock();
        let current = self.current.load_full();
        let installed = current
            .binding(binding.queue_name(), binding.binding_key())
            .is_some_and(|b| Arc::ptr_eq(b, binding));
        if !installed {
            return false;
        }

        let next = current.apply(&[], std::slice::from_ref(binding));
        self.current.store(Arc::new(next));
        debug!(
            exchange = %self.exchange,
            queue = %binding.queue_name(),
            binding_key = %binding.binding_key(),
            "Binding withdrawn"
        );
        true
    }

    /// Drops every binding of this queue instance in one mutation. Bindings
    /// of another queue declared under the same name are kept.
    pub fn remove_queue(&self, queue: &QueueRef) -> Vec<Arc<Binding>> {
        let _guard = self.mutation.lock();
        let current = self.current.load_full();
        let removed: Vec<Arc<Binding>> = current
            .bindings()
            .filter(|b| Arc::ptr_eq(b.queue(), queue))
            .cloned()
            .collect();
        if removed.is_empty() {
            return removed;
        }

        let next = current.apply(&[], &removed);
        self.current.store(Arc::new(next));

        debug!(
            exchange = %self.exchange,
            queue = %queue.name(),
            count = removed.len(),
            "Removed bindings of queue"
        );
        removed
    }

    /// All bindings, ordered by queue name then binding key.
    pub fn bindings(&self) -> Vec<Arc<Binding>> {
        self.current.load().bindings().cloned().collect()
    }

    pub fn binding(&self, queue: &str, binding_key: &str) -> Option<Arc<Binding>> {
        self.current.load().binding(queue, binding_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Computes the destination queues of `message`.
    ///
    /// Queues reached through unfiltered bindings come first, then queues
    /// admitted by a filtered binding. Each queue appears at most once.
    pub fn route(
        &self,
        strategy: &dyn RoutingStrategy,
        message: &Message,
        instance: &InstanceProperties,
    ) -> Vec<QueueRef> {
        let snapshot = self.current.load();
        let partitions = strategy.select(snapshot.partitions(), &message.routing_key);

        let mut result: Vec<QueueRef> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for partition in &partitions {
            for binding in &partition.unfiltered_bindings {
                binding.increment_matches();
            }
            for queue in &partition.unfiltered_queues {
                if seen.insert(queue.name()) {
                    result.push(queue.clone());
                }
            }
        }

        let view = FilterableMessage::new(message, instance);
        for partition in &partitions {
            for queue in &partition.filtered_queues {
                if seen.contains(queue.name()) {
                    continue;
                }
                // A listed queue without a filter map has nothing to admit it.
                let Some(filters) = partition.filtered_bindings.get(queue.name()) else {
                    continue;
                };
                if let Some(binding) = filters.iter().find(|b| b.accepts(&view)) {
                    binding.increment_matches();
                    seen.insert(queue.name());
                    result.push(queue.clone());
                }
            }
        }

        debug!(
            exchange = %self.exchange,
            routing_key = %message.routing_key,
            version = snapshot.version(),
            queues = ?result.iter().map(|q| q.name()).collect::<Vec<_>>(),
            "Routed message"
        );
        result
    }
}

fn compile_filter(
    strategy: &dyn RoutingStrategy,
    queue: &QueueRef,
    binding_key: &str,
    arguments: &Headers,
) -> Result<Option<MessageFilter>> {
    let compilation_error = |source: FilterError| RoutingError::FilterCompilation {
        queue: queue.name().to_string(),
        binding_key: binding_key.to_string(),
        source,
    };

    let mut filters = Vec::new();
    if let Some(filter) =
        create_message_filter(arguments, queue.owner()).map_err(compilation_error)?
    {
        filters.push(filter);
    }
    if let Some(filter) = strategy.binding_filter(arguments).map_err(compilation_error)? {
        filters.push(filter);
    }
    Ok(MessageFilter::combine(filters))
}
