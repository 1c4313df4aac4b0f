//! A rule-based test double for database query layers.
//!
//! Register expectations on a [`QueryMock`], hand the mock (or a
//! [`binding::MockSession`] wrapping it) to the code under test, and every
//! outgoing query is matched against the registered expectations instead of
//! reaching a real connection.
//!
//! ```
//! use querymock::{QueryMock, json, params};
//!
//! let mock = QueryMock::new();
//! let users = mock.on_sql("SELECT * FROM users").respond(json!([{ "id": 1 }]));
//!
//! let rows = futures::executor::block_on(mock.handle("SELECT *  FROM users", params![], None)).unwrap();
//! assert_eq!(rows, json!([{ "id": 1 }]));
//! assert_eq!(users.call_count(), 1);
//! assert_eq!(mock.calls().len(), 1);
//! ```
extern crate self as querymock;

use std::collections::BTreeSet;
use std::fmt;

#[macro_use]
mod macros;
mod api;
pub mod binding;
mod engine;
mod error;

pub use api::{Options, PlaceholderStyle, QueryMock};
pub use binding::{Entity, MockSession, RawStatement, Statement, TxHandle, TxOutcome};
pub use engine::{Builder, Handle, HandleCall, RecordedCall};
pub use error::{MockError, Result, SharedError};
pub use serde_json::{Value, json};

// --- Call shapes -------------------------------------------------------------

/// Kind of statement a query builder produced.
///
/// Collaborators translate their own tags into this set with
/// [`Operation::from_tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    FindFirst,
    FindMany,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::FindFirst => "findFirst",
            Operation::FindMany => "findMany",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query shape extracted by the collaborator from its builder configuration.
///
/// This never comes from the SQL text itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralDescriptor {
    pub operation: Operation,
    pub entity_name: String,
    pub entity_schema: Option<String>,
    /// Columns the statement reads or writes, when the collaborator knows them.
    pub field_keys: Option<BTreeSet<String>>,
}

impl StructuralDescriptor {
    pub fn new(operation: Operation, entity: impl Into<Entity>) -> Self {
        let entity = entity.into();
        StructuralDescriptor { operation, entity_name: entity.name, entity_schema: entity.schema, field_keys: None }
    }

    pub fn with_fields<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }
}

/// One normalized query execution.
///
/// `text` has every run of whitespace collapsed to a single space and is
/// trimmed at both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub text: String,
    pub parameters: Vec<Value>,
    pub descriptor: Option<StructuralDescriptor>,
}

impl Call {
    pub fn new(text: &str, parameters: Vec<Value>, descriptor: Option<StructuralDescriptor>) -> Self {
        Call { text: engine::normalize_sql(text), parameters, descriptor }
    }
}
