//! Exchanges and their routing strategies.
//!
//! Every exchange type shares one [`BindingTable`]; a [`RoutingStrategy`]
//! only decides how binding keys map to partitions, which partitions a
//! routing key selects, and whether the binding arguments contribute an
//! extra filter.

pub mod direct;
pub mod fanout;
pub mod headers;
pub mod topic;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::binding::Binding;
use crate::binding_table::{BindingTable, Partition, TableSnapshot};
use crate::error::Result;
use crate::filter::{FilterError, MessageFilter};
use crate::message::{Headers, InstanceProperties, Message};
use crate::queue::QueueRef;

pub use direct::DirectStrategy;
pub use fanout::FanoutStrategy;
pub use headers::HeadersStrategy;
pub use topic::TopicStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    Fanout,
    Direct,
    Topic,
    Headers,
}

impl ExchangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeType::Fanout => "fanout",
            ExchangeType::Direct => "direct",
            ExchangeType::Topic => "topic",
            ExchangeType::Headers => "headers",
        }
    }

    pub fn strategy(&self) -> Box<dyn RoutingStrategy> {
        match self {
            ExchangeType::Fanout => Box::new(FanoutStrategy),
            ExchangeType::Direct => Box::new(DirectStrategy),
            ExchangeType::Topic => Box::new(TopicStrategy),
            ExchangeType::Headers => Box::new(HeadersStrategy),
        }
    }
}

impl fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fanout" => Ok(ExchangeType::Fanout),
            "direct" => Ok(ExchangeType::Direct),
            "topic" => Ok(ExchangeType::Topic),
            "headers" => Ok(ExchangeType::Headers),
            other => Err(format!("unknown exchange type '{other}'")),
        }
    }
}

/// How an exchange type maps bindings and routing keys onto partitions.
pub trait RoutingStrategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> ExchangeType;

    /// Validates a binding key and returns the partition it belongs to.
    fn partition_key(&self, binding_key: &str) -> Result<String>;

    /// Partitions relevant to `routing_key`, in table order.
    fn select<'a>(
        &self,
        partitions: &'a BTreeMap<String, Arc<Partition>>,
        routing_key: &str,
    ) -> Vec<&'a Partition>;

    /// Extra filter contributed by the binding arguments, AND-ed with any
    /// selector or no-local filter.
    fn binding_filter(
        &self,
        _arguments: &Headers,
    ) -> std::result::Result<Option<MessageFilter>, FilterError> {
        Ok(None)
    }
}

/// A named exchange owning one binding table.
#[derive(Debug)]
pub struct Exchange {
    name: String,
    strategy: Box<dyn RoutingStrategy>,
    table: BindingTable,
}

impl Exchange {
    pub fn new(name: impl Into<String>, kind: ExchangeType) -> Self {
        let name = name.into();
        Self {
            table: BindingTable::new(name.clone()),
            strategy: kind.strategy(),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExchangeType {
        self.strategy.kind()
    }

    pub fn bind(
        &self,
        queue: QueueRef,
        binding_key: &str,
        arguments: Headers,
    ) -> Result<Arc<Binding>> {
        self.table
            .bind(self.strategy.as_ref(), queue, binding_key, arguments)
    }

    pub fn unbind(&self, queue: &str, binding_key: &str) -> Result<Arc<Binding>> {
        self.table.unbind(queue, binding_key)
    }

    pub fn remove_binding(&self, binding: &Arc<Binding>) -> bool {
        self.table.remove_binding(binding)
    }

    pub fn remove_queue(&self, queue: &QueueRef) -> Vec<Arc<Binding>> {
        self.table.remove_queue(queue)
    }

    /// Destination queues for `message`, deduplicated.
    pub fn route(&self, message: &Message, instance: &InstanceProperties) -> Vec<QueueRef> {
        self.table.route(self.strategy.as_ref(), message, instance)
    }

    pub fn bindings(&self) -> Vec<Arc<Binding>> {
        self.table.bindings()
    }

    pub fn binding(&self, queue: &str, binding_key: &str) -> Option<Arc<Binding>> {
        self.table.binding(queue, binding_key)
    }

    pub fn snapshot(&self) -> Arc<TableSnapshot> {
        self.table.snapshot()
    }
}
