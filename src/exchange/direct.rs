use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ExchangeType, RoutingStrategy};
use crate::binding_table::Partition;
use crate::error::Result;

/// Routes on exact equality of routing key and binding key.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectStrategy;

impl RoutingStrategy for DirectStrategy {
    fn kind(&self) -> ExchangeType {
        ExchangeType::Direct
    }

    fn partition_key(&self, binding_key: &str) -> Result<String> {
        Ok(binding_key.to_string())
    }

    fn select<'a>(
        &self,
        partitions: &'a BTreeMap<String, Arc<Partition>>,
        routing_key: &str,
    ) -> Vec<&'a Partition> {
        partitions.get(routing_key).map(|p| p.as_ref()).into_iter().collect()
    }
}
