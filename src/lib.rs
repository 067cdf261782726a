pub mod admin;
pub mod binding;
pub mod binding_table;
pub mod config;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod message;
pub mod queue;
pub mod router;
pub mod server;

pub use error::{Result, RoutingError};
