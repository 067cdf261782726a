//! Message model seen by the routing core.
//!
//! A `Message` is immutable once published; the router hands the same
//! `Arc<Message>` to every destination queue. Routing attributes that belong
//! to a single delivery rather than to the message itself travel alongside
//! in `InstanceProperties`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Default JMS priority for messages that do not set one.
pub const DEFAULT_PRIORITY: u8 = 4;

/// A typed header or argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

/// Header maps and binding arguments share the same shape.
pub type Headers = BTreeMap<String, Value>;

/// A published message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    #[serde(default)]
    pub routing_key: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Milliseconds since UNIX epoch, stamped at construction.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub persistent: bool,
    /// Identity of the connection that published the message (no-local).
    #[serde(default)]
    pub origin: Option<String>,
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

impl Message {
    /// Starts a message with a fresh id and the current timestamp.
    pub fn builder() -> MessageBuilder {
        MessageBuilder {
            message: Message {
                id: Uuid::new_v4(),
                routing_key: String::new(),
                headers: Headers::new(),
                body: String::new(),
                correlation_id: None,
                message_type: None,
                priority: DEFAULT_PRIORITY,
                timestamp: crate::queue::epoch_ms(),
                persistent: false,
                origin: None,
            },
        }
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }
}

pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    pub fn routing_key(mut self, key: impl Into<String>) -> Self {
        self.message.routing_key = key.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.message.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.message.body = body.into();
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.message.correlation_id = Some(id.into());
        self
    }

    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message.message_type = Some(message_type.into());
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.message.priority = priority.min(9);
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.message.persistent = persistent;
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.message.origin = Some(origin.into());
        self
    }

    pub fn build(self) -> Message {
        self.message
    }
}

/// Per-delivery routing attributes supplied by the publish path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceProperties {
    /// Overrides `Message::persistent` for this delivery when set.
    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub redelivered: bool,
}
