use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ExchangeType, RoutingStrategy};
use crate::binding_table::Partition;
use crate::error::Result;

/// Every binding lives in a single partition; binding and routing keys are
/// ignored for routing. The binding key still distinguishes bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct FanoutStrategy;

const PARTITION: &str = "";

impl RoutingStrategy for FanoutStrategy {
    fn kind(&self) -> ExchangeType {
        ExchangeType::Fanout
    }

    fn partition_key(&self, _binding_key: &str) -> Result<String> {
        Ok(PARTITION.to_string())
    }

    fn select<'a>(
        &self,
        partitions: &'a BTreeMap<String, Arc<Partition>>,
        _routing_key: &str,
    ) -> Vec<&'a Partition> {
        partitions.get(PARTITION).map(|p| p.as_ref()).into_iter().collect()
    }
}
