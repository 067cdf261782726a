//! Binding filters.
//!
//! Binding arguments may carry a selector expression and a no-local flag.
//! Those are compiled once, at bind time, into an immutable [`MessageFilter`]
//! that routing evaluates against a [`Filterable`] view of each message.
//! Compilation is the only place a filter can fail; evaluation never errors
//! and treats anything it cannot resolve as a non-match.

pub mod headers;
pub mod selector;

use std::borrow::Cow;
use thiserror::Error;

use crate::message::{Headers, InstanceProperties, Message, Value};

pub use headers::{HeadersMatch, MatchMode};
pub use selector::Selector;

/// Argument key carrying a JMS-style selector expression.
pub const JMS_SELECTOR_ARGUMENT: &str = "x-filter-jms-selector";

/// Argument key carrying the no-local flag.
pub const NO_LOCAL_ARGUMENT: &str = "x-qpid-no-local";

/// Errors raised while compiling binding arguments into a filter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("selector syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("invalid filter argument '{key}': {reason}")]
    InvalidArgument { key: String, reason: String },
}

/// The message view a filter is evaluated against.
pub trait Filterable {
    /// Resolves a property by name: JMS header identifiers first, then
    /// application headers.
    fn property(&self, name: &str) -> Option<Cow<'_, Value>>;

    /// Identity of the connection that published the message, if known.
    fn origin(&self) -> Option<&str>;
}

/// Adapts a message plus its delivery instance properties to [`Filterable`].
#[derive(Debug, Clone, Copy)]
pub struct FilterableMessage<'a> {
    message: &'a Message,
    instance: &'a InstanceProperties,
}

impl<'a> FilterableMessage<'a> {
    pub fn new(message: &'a Message, instance: &'a InstanceProperties) -> Self {
        Self { message, instance }
    }

    fn persistent(&self) -> bool {
        self.instance.persistent.unwrap_or(self.message.persistent)
    }
}

impl Filterable for FilterableMessage<'_> {
    fn property(&self, name: &str) -> Option<Cow<'_, Value>> {
        let msg = self.message;
        let computed = match name {
            "JMSMessageID" => Value::String(format!("ID:{}", msg.id)),
            "JMSCorrelationID" => Value::String(msg.correlation_id.clone()?),
            "JMSType" => Value::String(msg.message_type.clone()?),
            "JMSPriority" => Value::Int(msg.priority as i64),
            "JMSTimestamp" => Value::Int(msg.timestamp as i64),
            "JMSDeliveryMode" => Value::String(
                if self.persistent() {
                    "PERSISTENT"
                } else {
                    "NON_PERSISTENT"
                }
                .to_string(),
            ),
            "JMSRedelivered" => Value::Bool(self.instance.redelivered),
            _ => return msg.headers.get(name).map(Cow::Borrowed),
        };
        Some(Cow::Owned(computed))
    }

    fn origin(&self) -> Option<&str> {
        self.message.origin.as_deref()
    }
}

/// A compiled, immutable binding filter.
#[derive(Debug, Clone)]
pub enum MessageFilter {
    Selector(Selector),
    /// Rejects messages published by the connection owning the bound queue.
    NoLocal { owner: String },
    Headers(HeadersMatch),
    /// Every inner filter must match.
    All(Vec<MessageFilter>),
}

impl MessageFilter {
    pub fn matches(&self, message: &dyn Filterable) -> bool {
        match self {
            MessageFilter::Selector(selector) => selector.matches(message),
            MessageFilter::NoLocal { owner } => message.origin() != Some(owner.as_str()),
            MessageFilter::Headers(headers) => headers.matches(message),
            MessageFilter::All(filters) => filters.iter().all(|f| f.matches(message)),
        }
    }

    /// The selector this filter evaluates, if any.
    pub fn selector(&self) -> Option<&Selector> {
        match self {
            MessageFilter::Selector(selector) => Some(selector),
            MessageFilter::All(filters) => filters.iter().find_map(|f| f.selector()),
            _ => None,
        }
    }

    /// Combines optional filters into one, flattening single entries.
    pub fn combine(filters: Vec<MessageFilter>) -> Option<MessageFilter> {
        let mut filters = filters;
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(MessageFilter::All(filters)),
        }
    }
}

/// Compiles the selector and no-local arguments of a binding.
///
/// `queue_owner` is the exclusive owner of the bound queue; a no-local
/// request on a queue without an owner compiles to nothing since there is
/// no local connection to exclude.
pub fn create_message_filter(
    arguments: &Headers,
    queue_owner: Option<&str>,
) -> Result<Option<MessageFilter>, FilterError> {
    let mut filters = Vec::new();

    if let Some(value) = arguments.get(JMS_SELECTOR_ARGUMENT) {
        let expression = value.as_str().ok_or_else(|| FilterError::InvalidArgument {
            key: JMS_SELECTOR_ARGUMENT.to_string(),
            reason: format!("expected a string, got {value}"),
        })?;
        if !expression.trim().is_empty() {
            filters.push(MessageFilter::Selector(Selector::parse(expression)?));
        }
    }

    if let Some(value) = arguments.get(NO_LOCAL_ARGUMENT) {
        let no_local = flag_value(value).ok_or_else(|| FilterError::InvalidArgument {
            key: NO_LOCAL_ARGUMENT.to_string(),
            reason: format!("expected a boolean, got {value}"),
        })?;
        if let (true, Some(owner)) = (no_local, queue_owner) {
            filters.push(MessageFilter::NoLocal {
                owner: owner.to_string(),
            });
        }
    }

    Ok(MessageFilter::combine(filters))
}

fn flag_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_no_arguments_is_unfiltered() {
        assert!(create_message_filter(&Headers::new(), None).unwrap().is_none());
    }

    #[test]
    fn test_blank_selector_is_unfiltered() {
        let a = args(&[(JMS_SELECTOR_ARGUMENT, Value::from("   "))]);
        assert!(create_message_filter(&a, None).unwrap().is_none());
    }

    #[test]
    fn test_selector_is_filtered() {
        let a = args(&[(JMS_SELECTOR_ARGUMENT, Value::from("x = 1"))]);
        assert!(matches!(
            create_message_filter(&a, None).unwrap(),
            Some(MessageFilter::Selector(_))
        ));
    }

    #[test]
    fn test_non_string_selector_rejected() {
        let a = args(&[(JMS_SELECTOR_ARGUMENT, Value::Int(3))]);
        assert!(matches!(
            create_message_filter(&a, None),
            Err(FilterError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_false_no_local_is_unfiltered() {
        let a = args(&[(NO_LOCAL_ARGUMENT, Value::Bool(false))]);
        assert!(create_message_filter(&a, Some("conn-1")).unwrap().is_none());
    }

    #[test]
    fn test_selector_found_inside_combined_filter() {
        let a = args(&[
            (JMS_SELECTOR_ARGUMENT, Value::from("x = 1")),
            (NO_LOCAL_ARGUMENT, Value::Bool(true)),
        ]);
        let filter = create_message_filter(&a, Some("conn-1")).unwrap().unwrap();
        assert_eq!(filter.selector().map(|s| s.source()), Some("x = 1"));

        let no_local = args(&[(NO_LOCAL_ARGUMENT, Value::Bool(true))]);
        let filter = create_message_filter(&no_local, Some("conn-1")).unwrap().unwrap();
        assert!(filter.selector().is_none());
    }

    #[test]
    fn test_no_local_rejects_own_messages() {
        let a = args(&[(NO_LOCAL_ARGUMENT, Value::from("true"))]);
        let filter = create_message_filter(&a, Some("conn-1")).unwrap().unwrap();
        let instance = InstanceProperties::default();

        let own = Message::builder().origin("conn-1").build();
        let other = Message::builder().origin("conn-2").build();
        let anonymous = Message::builder().build();

        assert!(!filter.matches(&FilterableMessage::new(&own, &instance)));
        assert!(filter.matches(&FilterableMessage::new(&other, &instance)));
        assert!(filter.matches(&FilterableMessage::new(&anonymous, &instance)));
    }

    #[test]
    fn test_selector_and_no_local_combine() {
        let a = args(&[
            (JMS_SELECTOR_ARGUMENT, Value::from("x = 1")),
            (NO_LOCAL_ARGUMENT, Value::Bool(true)),
        ]);
        let filter = create_message_filter(&a, Some("conn-1")).unwrap().unwrap();
        let instance = InstanceProperties::default();

        let own = Message::builder().origin("conn-1").header("x", 1).build();
        let other = Message::builder().origin("conn-2").header("x", 1).build();
        let other_mismatch = Message::builder().origin("conn-2").header("x", 2).build();

        assert!(!filter.matches(&FilterableMessage::new(&own, &instance)));
        assert!(filter.matches(&FilterableMessage::new(&other, &instance)));
        assert!(!filter.matches(&FilterableMessage::new(&other_mismatch, &instance)));
    }

    #[test]
    fn test_jms_identifiers() {
        let msg = Message::builder()
            .correlation_id("abc")
            .message_type("order")
            .priority(7)
            .persistent(true)
            .build();
        let instance = InstanceProperties {
            persistent: None,
            redelivered: true,
        };
        let view = FilterableMessage::new(&msg, &instance);

        assert_eq!(
            view.property("JMSCorrelationID").as_deref(),
            Some(&Value::from("abc"))
        );
        assert_eq!(view.property("JMSType").as_deref(), Some(&Value::from("order")));
        assert_eq!(view.property("JMSPriority").as_deref(), Some(&Value::Int(7)));
        assert_eq!(
            view.property("JMSDeliveryMode").as_deref(),
            Some(&Value::from("PERSISTENT"))
        );
        assert_eq!(view.property("JMSRedelivered").as_deref(), Some(&Value::Bool(true)));
        assert!(view.property("missing").is_none());
    }

    #[test]
    fn test_instance_persistence_overrides_message() {
        let msg = Message::builder().persistent(true).build();
        let instance = InstanceProperties {
            persistent: Some(false),
            redelivered: false,
        };
        let view = FilterableMessage::new(&msg, &instance);
        assert_eq!(
            view.property("JMSDeliveryMode").as_deref(),
            Some(&Value::from("NON_PERSISTENT"))
        );
    }
}
