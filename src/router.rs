//! Broker registry: exchanges, queues and the publish pipeline.
//!
//! The standard exchanges (`amq.direct`, `amq.fanout`, `amq.topic`,
//! `amq.match`) and the default exchange exist from the start. The default
//! exchange is a direct exchange named `""`; every declared queue is bound
//! to it under its own name, and those bindings cannot be changed by hand.
//!
//! Lookups clone the `Arc` out of the map and release the shard before
//! routing, so no registry lock is held while filters are evaluated.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::binding::Binding;
use crate::config::Topology;
use crate::error::{Result, RoutingError};
use crate::exchange::{Exchange, ExchangeType};
use crate::message::{Headers, InstanceProperties, Message};
use crate::queue::{PostEnqueueAction, QueueRef};

/// Name of the default exchange.
pub const DEFAULT_EXCHANGE: &str = "";

/// Exchanges every router starts with, besides the default exchange.
pub const STANDARD_EXCHANGES: [(&str, ExchangeType); 4] = [
    ("amq.direct", ExchangeType::Direct),
    ("amq.fanout", ExchangeType::Fanout),
    ("amq.topic", ExchangeType::Topic),
    ("amq.match", ExchangeType::Headers),
];

fn is_reserved(name: &str) -> bool {
    name == DEFAULT_EXCHANGE || name.starts_with("amq.")
}

/// Result of publishing a message through the router.
#[derive(Debug, PartialEq, Eq)]
pub enum PublishResult {
    /// Message enqueued to the named queues, possibly none.
    Accepted(Vec<String>),
    /// The exchange does not exist.
    UnknownExchange,
}

pub struct Router {
    exchanges: DashMap<String, Arc<Exchange>>,
    queues: DashMap<String, QueueRef>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a router holding only the default and standard exchanges.
    pub fn new() -> Self {
        let exchanges = DashMap::new();
        exchanges.insert(
            DEFAULT_EXCHANGE.to_string(),
            Arc::new(Exchange::new(DEFAULT_EXCHANGE, ExchangeType::Direct)),
        );
        for (name, kind) in STANDARD_EXCHANGES {
            exchanges.insert(name.to_string(), Arc::new(Exchange::new(name, kind)));
        }
        Self {
            exchanges,
            queues: DashMap::new(),
        }
    }

    /// Creates a router and declares everything listed in the topology.
    pub fn from_topology(topology: &Topology) -> Result<Self> {
        let router = Self::new();
        for exchange in &topology.exchanges {
            router.declare_exchange(&exchange.name, exchange.kind)?;
        }
        for queue in &topology.queues {
            router.declare_queue(queue.build())?;
        }
        for binding in &topology.bindings {
            router.bind(
                &binding.exchange,
                &binding.queue,
                &binding.binding_key,
                binding.arguments.clone(),
            )?;
        }
        Ok(router)
    }

    pub fn declare_exchange(&self, name: &str, kind: ExchangeType) -> Result<Arc<Exchange>> {
        if is_reserved(name) {
            return Err(RoutingError::ReservedExchange(name.to_string()));
        }
        match self.exchanges.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RoutingError::ExchangeExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let exchange = Arc::new(Exchange::new(name, kind));
                slot.insert(exchange.clone());
                info!(exchange = %name, kind = %kind, "Exchange declared");
                Ok(exchange)
            }
        }
    }

    /// Deletes an exchange together with all of its bindings.
    pub fn delete_exchange(&self, name: &str) -> Result<Arc<Exchange>> {
        if is_reserved(name) {
            return Err(RoutingError::ReservedExchange(name.to_string()));
        }
        let (_, exchange) = self
            .exchanges
            .remove(name)
            .ok_or_else(|| RoutingError::UnknownExchange(name.to_string()))?;
        info!(exchange = %name, bindings = exchange.bindings().len(), "Exchange deleted");
        Ok(exchange)
    }

    pub fn exchange(&self, name: &str) -> Option<Arc<Exchange>> {
        self.exchanges.get(name).map(|e| e.value().clone())
    }

    /// All exchanges, ordered by name.
    pub fn exchanges(&self) -> Vec<Arc<Exchange>> {
        let mut exchanges: Vec<Arc<Exchange>> =
            self.exchanges.iter().map(|e| e.value().clone()).collect();
        exchanges.sort_by(|a, b| a.name().cmp(b.name()));
        exchanges
    }

    /// Registers a queue and binds it to the default exchange under its name.
    pub fn declare_queue(&self, queue: QueueRef) -> Result<QueueRef> {
        let name = queue.name().to_string();
        let default = self.default_exchange()?;
        match self.queues.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RoutingError::QueueExists(name));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(queue.clone());
            }
        }

        let binding = match default.bind(queue.clone(), &name, Headers::new()) {
            Ok(binding) => binding,
            Err(err) => {
                self.queues.remove_if(&name, |_, current| Arc::ptr_eq(current, &queue));
                return Err(err);
            }
        };

        // A concurrent delete_queue may have removed the entry before the
        // default binding was installed.
        if !self.is_declared(&queue) {
            default.remove_binding(&binding);
            return Err(RoutingError::UnknownQueue(name));
        }
        info!(queue = %name, owner = ?queue.owner(), "Queue declared");
        Ok(queue)
    }

    /// Deletes a queue and removes its bindings from every exchange.
    pub fn delete_queue(&self, name: &str) -> Result<QueueRef> {
        let (_, queue) = self
            .queues
            .remove(name)
            .ok_or_else(|| RoutingError::UnknownQueue(name.to_string()))?;

        let mut removed = 0;
        for exchange in self.exchanges() {
            removed += exchange.remove_queue(&queue).len();
        }
        info!(queue = %name, bindings = removed, "Queue deleted");
        Ok(queue)
    }

    pub fn queue(&self, name: &str) -> Option<QueueRef> {
        self.queues.get(name).map(|q| q.value().clone())
    }

    /// All queues, ordered by name.
    pub fn queues(&self) -> Vec<QueueRef> {
        let mut queues: Vec<QueueRef> = self.queues.iter().map(|q| q.value().clone()).collect();
        queues.sort_by(|a, b| a.name().cmp(b.name()));
        queues
    }

    pub fn bind(
        &self,
        exchange: &str,
        queue: &str,
        binding_key: &str,
        arguments: Headers,
    ) -> Result<Arc<Binding>> {
        if exchange == DEFAULT_EXCHANGE {
            return Err(RoutingError::ReservedExchange(exchange.to_string()));
        }
        let target = self
            .exchange(exchange)
            .ok_or_else(|| RoutingError::UnknownExchange(exchange.to_string()))?;
        let queue_ref = self
            .queue(queue)
            .ok_or_else(|| RoutingError::UnknownQueue(queue.to_string()))?;

        let binding = target.bind(queue_ref.clone(), binding_key, arguments)?;

        // A concurrent delete_queue may have swept the exchanges before this
        // binding was installed.
        if !self.is_declared(&queue_ref) {
            target.remove_binding(&binding);
            return Err(RoutingError::UnknownQueue(queue.to_string()));
        }
        Ok(binding)
    }

    pub fn unbind(&self, exchange: &str, queue: &str, binding_key: &str) -> Result<Arc<Binding>> {
        if exchange == DEFAULT_EXCHANGE {
            return Err(RoutingError::ReservedExchange(exchange.to_string()));
        }
        let target = self
            .exchange(exchange)
            .ok_or_else(|| RoutingError::UnknownExchange(exchange.to_string()))?;
        target.unbind(queue, binding_key)
    }

    /// Destination queues of `message` on `exchange`, without enqueuing.
    pub fn route(
        &self,
        exchange: &str,
        message: &Message,
        instance: &InstanceProperties,
    ) -> Result<Vec<QueueRef>> {
        let target = self
            .exchange(exchange)
            .ok_or_else(|| RoutingError::UnknownExchange(exchange.to_string()))?;
        Ok(target.route(message, instance))
    }

    /// Routes `message` and enqueues it on every destination queue.
    pub fn publish(
        &self,
        exchange: &str,
        message: Message,
        instance: &InstanceProperties,
    ) -> PublishResult {
        self.publish_with(exchange, message, instance, || None)
    }

    /// Like [`Router::publish`], running an action per enqueued entry.
    pub fn publish_with<F>(
        &self,
        exchange: &str,
        message: Message,
        instance: &InstanceProperties,
        mut action: F,
    ) -> PublishResult
    where
        F: FnMut() -> Option<PostEnqueueAction>,
    {
        let Some(target) = self.exchange(exchange) else {
            warn!(exchange = %exchange, "Publish to unknown exchange");
            return PublishResult::UnknownExchange;
        };

        let destinations = target.route(&message, instance);
        if destinations.is_empty() {
            debug!(
                exchange = %exchange,
                routing_key = %message.routing_key,
                "Message unroutable"
            );
            return PublishResult::Accepted(Vec::new());
        }

        let message = Arc::new(message);
        let mut routed_to = Vec::with_capacity(destinations.len());
        for queue in destinations {
            queue.enqueue(message.clone(), action());
            routed_to.push(queue.name().to_string());
        }
        PublishResult::Accepted(routed_to)
    }

    /// True if `queue` itself, not just a queue of the same name, is declared.
    fn is_declared(&self, queue: &QueueRef) -> bool {
        self.queue(queue.name())
            .is_some_and(|current| Arc::ptr_eq(&current, queue))
    }

    fn default_exchange(&self) -> Result<Arc<Exchange>> {
        self.exchange(DEFAULT_EXCHANGE)
            .ok_or_else(|| RoutingError::UnknownExchange(DEFAULT_EXCHANGE.to_string()))
    }
}

/// Shared router type used by the admin surface and the server.
pub type SharedRouter = Arc<Router>;
