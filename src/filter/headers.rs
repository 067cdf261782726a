//! Header matching for headers exchanges.
//!
//! Binding arguments whose keys do not start with `x-` name headers the
//! message must carry. `x-match` selects whether all of them (`all`, the
//! default) or at least one (`any`) must match. A `null` argument only
//! checks that the header is present.

use super::{FilterError, Filterable};
use crate::message::{Headers, Value};

/// Argument key selecting `all` / `any` matching.
pub const X_MATCH_ARGUMENT: &str = "x-match";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    All,
    Any,
}

#[derive(Debug, Clone)]
pub struct HeadersMatch {
    mode: MatchMode,
    required: Vec<(String, Value)>,
}

impl HeadersMatch {
    /// Builds a header match from binding arguments. Returns `None` when the
    /// arguments name no headers.
    pub fn from_arguments(arguments: &Headers) -> Result<Option<Self>, FilterError> {
        let mode = match arguments.get(X_MATCH_ARGUMENT) {
            None => MatchMode::All,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("all") => MatchMode::All,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("any") => MatchMode::Any,
            Some(other) => {
                return Err(FilterError::InvalidArgument {
                    key: X_MATCH_ARGUMENT.to_string(),
                    reason: format!("expected 'all' or 'any', got {other}"),
                })
            }
        };

        let required: Vec<(String, Value)> = arguments
            .iter()
            .filter(|(key, _)| !key.starts_with("x-"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        if required.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { mode, required }))
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn matches(&self, message: &dyn Filterable) -> bool {
        let mut checks = self.required.iter().map(|(key, expected)| {
            match message.property(key) {
                Some(actual) if expected.is_null() => !actual.is_null(),
                Some(actual) => *actual == *expected,
                None => false,
            }
        });
        match self.mode {
            MatchMode::All => checks.all(|ok| ok),
            MatchMode::Any => checks.any(|ok| ok),
        }
    }
}
