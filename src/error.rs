//! Errors surfaced by the mock.

use crate::Value;
use crate::engine::format_parameters;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// A user-supplied error shared between an entry and every call it fails.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

pub type Result<T, E = MockError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MockError {
    /// No live registered expectation accepted the call.
    #[error("{}", unmatched_message(.text, .parameters, .registered))]
    Unmatched {
        /// Normalized SQL text of the call.
        text: String,
        parameters: Vec<Value>,
        /// Shape of every registered expectation, oldest first.
        registered: Vec<String>,
    },

    /// A builder refinement was applied to a matcher it makes no sense for.
    #[error("cannot apply `{refinement}` to a {matcher} matcher: {reason}")]
    InvalidRefinement { refinement: &'static str, matcher: &'static str, reason: &'static str },

    #[error("invalid query pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A structural registration was requested from a statement that carries
    /// no structural descriptor.
    #[error("statement has no structural descriptor to match on")]
    MissingDescriptor,

    /// The error registered with `Builder::throw`, passed through unchanged.
    #[error(transparent)]
    Simulated(SharedError),
}

impl MockError {
    /// The registered error object if this is a simulated failure.
    pub fn simulated(&self) -> Option<&SharedError> {
        match self {
            MockError::Simulated(err) => Some(err),
            _ => None,
        }
    }

    /// Downcast a simulated failure to the concrete type that was registered.
    pub fn downcast_simulated<E: StdError + 'static>(&self) -> Option<&E> {
        self.simulated().and_then(|err| (**err).downcast_ref::<E>())
    }

    pub fn is_unmatched(&self) -> bool {
        matches!(self, MockError::Unmatched { .. })
    }
}

fn unmatched_message(text: &str, parameters: &[Value], registered: &[String]) -> String {
    let mut msg = format!("no mock matched query: {text}\n  parameters: {}", format_parameters(parameters));
    if registered.is_empty() {
        msg.push_str("\n  no mocks are registered");
    } else {
        msg.push_str("\n  registered mocks:");
        for (i, shape) in registered.iter().enumerate() {
            msg.push_str(&format!("\n    {}. {shape}", i + 1));
        }
    }
    msg
}
