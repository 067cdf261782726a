use thiserror::Error;

use crate::filter::FilterError;

/// Errors returned by binding-table and registry operations.
///
/// Routing itself never fails: an empty destination set is a normal result.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("cannot bind queue '{queue}' with key '{binding_key}': {source}")]
    FilterCompilation {
        queue: String,
        binding_key: String,
        #[source]
        source: FilterError,
    },

    #[error("no binding of queue '{queue}' with key '{binding_key}' on exchange '{exchange}'")]
    UnknownBinding {
        exchange: String,
        queue: String,
        binding_key: String,
    },

    #[error("queue '{queue}' is already bound to exchange '{exchange}' with key '{binding_key}'")]
    DuplicateBinding {
        exchange: String,
        queue: String,
        binding_key: String,
    },

    #[error("exchange '{0}' not found")]
    UnknownExchange(String),

    #[error("queue '{0}' not found")]
    UnknownQueue(String),

    #[error("exchange '{0}' already exists")]
    ExchangeExists(String),

    #[error("queue '{0}' already exists")]
    QueueExists(String),

    #[error("invalid binding key '{binding_key}': {reason}")]
    InvalidBindingKey { binding_key: String, reason: String },

    #[error("exchange '{0}' is reserved")]
    ReservedExchange(String),
}

pub type Result<T> = std::result::Result<T, RoutingError>;
