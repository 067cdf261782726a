use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::filter::{Filterable, MessageFilter};
use crate::message::Headers;
use crate::queue::QueueRef;

/// Identity of a binding within one exchange.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingKey {
    pub queue: String,
    pub binding_key: String,
}

impl BindingKey {
    pub fn new(queue: impl Into<String>, binding_key: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            binding_key: binding_key.into(),
        }
    }
}

/// A binding between an exchange and a queue.
///
/// Immutable after construction apart from the match counter. A binding
/// whose arguments compile to a filter is *filtered*; it stays so for its
/// whole life.
#[derive(Debug)]
pub struct Binding {
    exchange: String,
    queue: QueueRef,
    binding_key: String,
    /// Routing partition this binding lives in (see `RoutingStrategy`).
    partition: String,
    arguments: Headers,
    filter: Option<MessageFilter>,
    matches: AtomicU64,
}

impl Binding {
    pub fn new(
        exchange: impl Into<String>,
        queue: QueueRef,
        binding_key: impl Into<String>,
        partition: impl Into<String>,
        arguments: Headers,
        filter: Option<MessageFilter>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue,
            binding_key: binding_key.into(),
            partition: partition.into(),
            arguments,
            filter,
            matches: AtomicU64::new(0),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn queue(&self) -> &QueueRef {
        &self.queue
    }

    pub fn queue_name(&self) -> &str {
        self.queue.name()
    }

    pub fn binding_key(&self) -> &str {
        &self.binding_key
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn arguments(&self) -> &Headers {
        &self.arguments
    }

    pub fn filter(&self) -> Option<&MessageFilter> {
        self.filter.as_ref()
    }

    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    pub fn key(&self) -> BindingKey {
        BindingKey::new(self.queue.name(), &self.binding_key)
    }

    /// Evaluates the binding's filter. Unfiltered bindings accept everything.
    pub fn accepts(&self, message: &dyn Filterable) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(message))
    }

    /// Number of messages this binding has routed.
    pub fn matches(&self) -> u64 {
        self.matches.load(Ordering::Relaxed)
    }

    pub fn increment_matches(&self) {
        self.matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn info(&self) -> BindingInfo {
        BindingInfo {
            exchange: self.exchange.clone(),
            queue: self.queue.name().to_string(),
            binding_key: self.binding_key.clone(),
            arguments: self.arguments.clone(),
            filtered: self.is_filtered(),
            selector: self
                .filter()
                .and_then(|f| f.selector())
                .map(|s| s.source().to_string()),
            matches: self.matches(),
        }
    }
}

/// Serializable view of a binding for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct BindingInfo {
    pub exchange: String,
    pub queue: String,
    pub binding_key: String,
    pub arguments: Headers,
    pub filtered: bool,
    /// Selector expression of a filtered binding, if it has one.
    pub selector: Option<String>,
    pub matches: u64,
}
