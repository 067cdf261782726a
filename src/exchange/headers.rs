use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ExchangeType, RoutingStrategy};
use crate::binding_table::Partition;
use crate::error::Result;
use crate::filter::{FilterError, HeadersMatch, MessageFilter};
use crate::message::Headers;

/// Routes on message headers rather than the routing key.
///
/// The header match is compiled into the binding's filter, so a headers
/// binding is filtered whenever its arguments name at least one header.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadersStrategy;

const PARTITION: &str = "";

impl RoutingStrategy for HeadersStrategy {
    fn kind(&self) -> ExchangeType {
        ExchangeType::Headers
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

    fn binding_filter(
        &self,
        arguments: &Headers,
    ) -> std::result::Result<Option<MessageFilter>, FilterError> {
        Ok(HeadersMatch::from_arguments(arguments)?.map(MessageFilter::Headers))
    }
}
