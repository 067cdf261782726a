//! Topic routing.
//!
//! Routing keys and binding patterns are `.`-separated words. In a pattern
//! `*` stands for exactly one word and `#` for zero or more words. Runs of
//! `#` are equivalent to a single `#` and are collapsed before a pattern is
//! used as a partition key, so `a.#.#` and `a.#` share one partition.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ExchangeType, RoutingStrategy};
use crate::binding_table::Partition;
use crate::error::{Result, RoutingError};

#[derive(Debug, Clone, Copy, Default)]
pub struct TopicStrategy;

impl RoutingStrategy for TopicStrategy {
    fn kind(&self) -> ExchangeType {
        ExchangeType::Topic
    }

    fn partition_key(&self, binding_key: &str) -> Result<String> {
        validate_pattern(binding_key)?;
        Ok(normalize(binding_key))
    }

    fn select<'a>(
        &self,
        partitions: &'a BTreeMap<String, Arc<Partition>>,
        routing_key: &str,
    ) -> Vec<&'a Partition> {
        partitions
            .iter()
            .filter(|(pattern, _)| topic_matches(pattern, routing_key))
            .map(|(_, partition)| partition.as_ref())
            .collect()
    }
}

/// Rejects patterns where a wildcard shares a word with other characters.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    for word in pattern.split('.') {
        let has_wildcard = word.contains('*') || word.contains('#');
        if has_wildcard && word.len() != 1 {
            return Err(RoutingError::InvalidBindingKey {
                binding_key: pattern.to_string(),
                reason: format!("wildcard must be a whole word, found '{word}'"),
            });
        }
    }
    Ok(())
}

/// Collapses consecutive `#` words.
pub fn normalize(pattern: &str) -> String {
    let mut words: Vec<&str> = Vec::new();
    for word in pattern.split('.') {
        if word == "#" && words.last() == Some(&"#") {
            continue;
        }
        words.push(word);
    }
    words.join(".")
}

/// Returns true if `routing_key` matches the topic `pattern`.
///
/// Runs in O(pattern words × key words): `reachable[j]` holds whether the
/// pattern words consumed so far can match the first `j` key words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    if pattern == routing_key || pattern == "#" {
        return true;
    }
    let key: Vec<&str> = routing_key.split('.').collect();

    let mut reachable = vec![false; key.len() + 1];
    let mut next = vec![false; key.len() + 1];
    reachable[0] = true;

    for word in pattern.split('.') {
        match word {
            "#" => {
                let mut any = false;
                for (slot, &ok) in next.iter_mut().zip(&reachable) {
                    any |= ok;
                    *slot = any;
                }
            }
            _ => {
                next[0] = false;
                for j in 1..=key.len() {
                    next[j] = reachable[j - 1] && (word == "*" || word == key[j - 1]);
                }
            }
        }
        std::mem::swap(&mut reachable, &mut next);
        if !reachable.contains(&true) {
            return false;
        }
    }
    reachable[key.len()]
}
