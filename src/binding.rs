//! Collaborator binding.
//!
//! The engine never looks inside a query builder. A collaborator hands it a
//! [`Statement`]: SQL text, positional parameters and, when the builder knows
//! them, a [`StructuralDescriptor`]. This module holds the pieces a binding
//! needs on that side of the boundary:
//!
//! - the [`Statement`] trait, plus [`RawStatement`] for hand-written SQL;
//! - [`Entity`], a table reference with an optional schema;
//! - [`Operation::from_tag`], which turns a builder's own operation tag into
//!   the closed [`Operation`] set;
//! - [`MockSession`], a connection stand-in that routes statements and
//!   transactions through a [`QueryMock`].

use crate::{Call, Operation, QueryMock, Result, StructuralDescriptor, Value};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Anything that can be executed as one query.
pub trait Statement {
    fn sql(&self) -> &str;

    fn parameters(&self) -> &[Value];

    fn descriptor(&self) -> Option<&StructuralDescriptor> {
        None
    }

    /// Normalized call description handed to the engine.
    fn to_call(&self) -> Call {
        Call::new(self.sql(), self.parameters().to_vec(), self.descriptor().cloned())
    }
}

impl Statement for Call {
    fn sql(&self) -> &str {
        &self.text
    }

    fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    fn descriptor(&self) -> Option<&StructuralDescriptor> {
        self.descriptor.as_ref()
    }
}

/// A table (or view) reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    pub name: String,
    pub schema: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Entity { name: name.into(), schema: None }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

impl From<&str> for Entity {
    fn from(name: &str) -> Self {
        Entity::new(name)
    }
}

impl From<String> for Entity {
    fn from(name: String) -> Self {
        Entity::new(name)
    }
}

/// Hand-written SQL with bound parameters and an optional shape.
///
/// ```
/// use querymock::{Operation, RawStatement, Statement};
///
/// let stmt = RawStatement::new("update users set name = ? where id = ?")
///     .bind("alice")
///     .bind(7)
///     .shaped(Operation::Update, "users")
///     .fields(["name"]);
///
/// assert_eq!(stmt.parameters().len(), 2);
/// assert!(stmt.descriptor().is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStatement {
    sql: String,
    parameters: Vec<Value>,
    descriptor: Option<StructuralDescriptor>,
}

impl RawStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        RawStatement { sql: sql.into(), parameters: Vec::new(), descriptor: None }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.parameters.push(value.into());
        self
    }

    pub fn bind_all(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.parameters.extend(values);
        self
    }

    /// Attach a structural descriptor.
    pub fn shaped(mut self, operation: Operation, entity: impl Into<Entity>) -> Self {
        self.descriptor = Some(StructuralDescriptor::new(operation, entity));
        self
    }

    /// Set the fields the statement touches. Has no effect before
    /// [`shaped`](Self::shaped).
    pub fn fields<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(descriptor) = self.descriptor.take() {
            self.descriptor = Some(descriptor.with_fields(keys));
        }
        self
    }
}

impl Statement for RawStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    fn descriptor(&self) -> Option<&StructuralDescriptor> {
        self.descriptor.as_ref()
    }
}

// --- Operation tags ----------------------------------------------------------

impl Operation {
    /// Map a query builder's operation tag onto [`Operation`].
    ///
    /// Accepts the bare verb in any case or separator style (`"select"`,
    /// `"find_first"`, `"FindMany"`) as well as builder class names with a
    /// `QueryBuilder`, `Query` or `Builder` suffix (`"SelectQueryBuilder"`).
    ///
    /// ```
    /// use querymock::Operation;
    ///
    /// assert_eq!(Operation::from_tag("UpdateQueryBuilder"), Some(Operation::Update));
    /// assert_eq!(Operation::from_tag("merge"), None);
    /// assert_eq!(Operation::from_tag("find-many"), Some(Operation::FindMany));
    /// ```
    pub fn from_tag(tag: &str) -> Option<Operation> {
        let folded: String =
            tag.chars().filter(|c| !matches!(c, '_' | '-' | ' ')).map(|c| c.to_ascii_lowercase()).collect();
        let verb = ["querybuilder", "query", "builder"]
            .iter()
            .find_map(|suffix| folded.strip_suffix(suffix))
            .unwrap_or(folded.as_str());

        match verb {
            "select" => Some(Operation::Select),
            "insert" => Some(Operation::Insert),
            "update" => Some(Operation::Update),
            "delete" => Some(Operation::Delete),
            "findfirst" => Some(Operation::FindFirst),
            "findmany" => Some(Operation::FindMany),
            _ => None,
        }
    }
}

// --- Session -----------------------------------------------------------------

/// Result of [`MockSession::transaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome<T> {
    Committed(T),
    /// The body asked for a rollback; its return value is discarded.
    RolledBack,
}

impl<T> TxOutcome<T> {
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, TxOutcome::RolledBack)
    }

    pub fn committed(self) -> Option<T> {
        match self {
            TxOutcome::Committed(value) => Some(value),
            TxOutcome::RolledBack => None,
        }
    }
}

/// A connection stand-in for the code under test.
#[derive(Debug, Clone)]
pub struct MockSession {
    mock: QueryMock,
}

impl MockSession {
    pub fn new(mock: QueryMock) -> Self {
        MockSession { mock }
    }

    pub fn mock(&self) -> &QueryMock {
        &self.mock
    }

    /// Run one statement against the mock. Each invocation is a distinct call.
    pub async fn execute<S: Statement + ?Sized>(&self, statement: &S) -> Result<Value> {
        self.mock.handle_statement(statement).await
    }

    /// Run `body` as a transaction.
    ///
    /// If the body calls [`TxHandle::rollback`] the outcome is
    /// [`TxOutcome::RolledBack`], not an error. Errors returned by the body
    /// are passed through.
    pub async fn transaction<T, F, Fut>(&self, body: F) -> Result<TxOutcome<T>>
    where
        F: FnOnce(TxHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let rolled_back = Arc::new(AtomicBool::new(false));
        let tx = TxHandle { session: self.clone(), rolled_back: Arc::clone(&rolled_back) };

        let value = body(tx).await?;
        if rolled_back.load(Ordering::SeqCst) {
            tracing::debug!("transaction rolled back");
            return Ok(TxOutcome::RolledBack);
        }
        Ok(TxOutcome::Committed(value))
    }
}

/// Handle passed into a transaction body.
#[derive(Debug, Clone)]
pub struct TxHandle {
    session: MockSession,
    rolled_back: Arc<AtomicBool>,
}

impl TxHandle {
    pub async fn execute<S: Statement + ?Sized>(&self, statement: &S) -> Result<Value> {
        self.session.execute(statement).await
    }

    /// Mark the transaction for rollback.
    pub fn rollback(&self) {
        self.rolled_back.store(true, Ordering::SeqCst);
    }
}
