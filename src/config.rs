use anyhow::Result;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::sync::Arc;

use crate::exchange::ExchangeType;
use crate::message::Headers;
use crate::queue::{QueueRef, SortedQueue, StandardQueue};

/// Default listen address of the admin API.
pub const DEFAULT_ADMIN_ADDRESS: &str = "0.0.0.0:8080";

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ExchangeType,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    pub name: String,
    /// Header to order messages by; makes the queue a sorted queue.
    #[serde(default)]
    pub sort_key: Option<String>,
    /// Connection that exclusively owns the queue (no-local filtering).
    #[serde(default)]
    pub owner: Option<String>,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort_key: None,
            owner: None,
        }
    }

    /// Builds the queue this entry describes.
    pub fn build(&self) -> QueueRef {
        match &self.sort_key {
            Some(key) => Arc::new(SortedQueue::with_owner(
                self.name.clone(),
                key.clone(),
                self.owner.clone(),
            )),
            None => Arc::new(StandardQueue::with_owner(self.name.clone(), self.owner.clone())),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BindingConfig {
    pub exchange: String,
    pub queue: String,
    #[serde(default)]
    pub binding_key: String,
    #[serde(default)]
    pub arguments: Headers,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Topology {
    #[serde(default)]
    pub exchanges: Vec<ExchangeConfig>,
    pub queues: Vec<QueueConfig>,
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
    #[serde(default = "default_admin_address")]
    pub admin_address: String,
}

fn default_admin_address() -> String {
    DEFAULT_ADMIN_ADDRESS.to_string()
}

impl Topology {
    /// Loads topology from a YAML file.
    pub fn load(path: &str) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let topology: Topology = serde_yaml::from_str(&content)?;
        Ok(topology)
    }

    /// Parses topology from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let topology: Topology = serde_yaml::from_str(yaml)?;
        Ok(topology)
    }
}
