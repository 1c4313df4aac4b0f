use crate::binding::{Entity, Statement};
use crate::engine::{self, Builder, Ledger, Matcher, Outcome, RecordedCall, Registry, StructuralMatcher};
use crate::{Call, MockError, Operation, Result, StructuralDescriptor, Value};
use parking_lot::{Mutex, MutexGuard};
use regex::Regex;
use std::sync::Arc;

/// How bind placeholders are spelled in the SQL the collaborator produces.
///
/// Used to line up `where_sql` fragments with the call's parameter list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `$1`, `$2`, ...
    Dollar,
    /// Either of the above.
    #[default]
    Any,
}

/// Options that affect matching.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub placeholder: PlaceholderStyle,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub registry: Registry,
    pub ledger: Ledger,
    pub options: Options,
}

/// The mock controller.
///
/// Owns the registered expectations and the ledger of every call. Cloning is
/// cheap and every clone shares the same state, so the code under test and
/// the test body can each hold one.
///
/// The internal lock is held only while a call is logged and resolved; a
/// computed response is awaited after it is released.
#[derive(Debug, Clone, Default)]
pub struct QueryMock {
    state: Arc<Mutex<State>>,
}

impl QueryMock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Options) -> Self {
        QueryMock { state: Arc::new(Mutex::new(State { options, ..State::default() })) }
    }

    pub fn options(&self) -> Options {
        self.lock().options.clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }

    // --- Registration ---------------------------------------------------------

    /// Expect a query with the statement's exact (normalized) text.
    ///
    /// The statement's parameters are captured; call
    /// [`Builder::strict_params`] to require them.
    pub fn on<S: Statement + ?Sized>(&self, statement: &S) -> Builder {
        let text = engine::normalize_sql(statement.sql());
        Builder::new(self.clone(), Matcher::Exact { text, parameters: None }, statement.parameters().to_vec())
    }

    /// Expect a query with exactly this (normalized) text.
    pub fn on_sql(&self, sql: &str) -> Builder {
        Builder::new(self.clone(), Matcher::Exact { text: engine::normalize_sql(sql), parameters: None }, Vec::new())
    }

    /// Expect a query by shape: operation on an entity.
    pub fn on_structural(&self, entity: impl Into<Entity>, operation: Operation) -> Builder {
        let entity = entity.into();
        let matcher = StructuralMatcher {
            operation,
            entity_name: entity.name,
            entity_schema: entity.schema,
            field_keys: None,
            fragments: Vec::new(),
        };
        Builder::new(self.clone(), Matcher::Structural(matcher), Vec::new())
    }

    /// Expect a query with the same shape as `statement`, including the fields
    /// it touches.
    pub fn on_shape<S: Statement + ?Sized>(&self, statement: &S) -> Result<Builder> {
        let descriptor = statement.descriptor().ok_or(MockError::MissingDescriptor)?;
        let matcher = StructuralMatcher {
            operation: descriptor.operation,
            entity_name: descriptor.entity_name.clone(),
            entity_schema: descriptor.entity_schema.clone(),
            field_keys: descriptor.field_keys.clone(),
            fragments: Vec::new(),
        };
        Ok(Builder::new(self.clone(), Matcher::Structural(matcher), Vec::new()))
    }

    /// Expect any query whose normalized text matches `pattern`.
    pub fn on_pattern(&self, pattern: &str) -> Result<Builder> {
        Ok(self.on_regex(Regex::new(pattern)?))
    }

    pub fn on_regex(&self, pattern: Regex) -> Builder {
        Builder::new(self.clone(), Matcher::Pattern { pattern, parameters: None }, Vec::new())
    }

    /// Expect any query whose normalized text contains `substring`, itself
    /// normalized the same way.
    pub fn on_substring(&self, substring: &str) -> Builder {
        let matcher = Matcher::Substring { substring: engine::normalize_sql(substring), parameters: None };
        Builder::new(self.clone(), matcher, Vec::new())
    }

    // --- Interception ---------------------------------------------------------

    /// Answer one outgoing query.
    ///
    /// The call is recorded in the ledger whatever the outcome. Computed
    /// responses, sync or async, are awaited here.
    pub async fn handle(
        &self,
        sql: &str,
        parameters: Vec<Value>,
        descriptor: Option<StructuralDescriptor>,
    ) -> Result<Value> {
        let call = Call::new(sql, parameters, descriptor);
        self.handle_call(call).await
    }

    pub async fn handle_statement<S: Statement + ?Sized>(&self, statement: &S) -> Result<Value> {
        self.handle_call(statement.to_call()).await
    }

    async fn handle_call(&self, call: Call) -> Result<Value> {
        let outcome = {
            let mut state = self.lock();
            let State { registry, ledger, options } = &mut *state;
            engine::dispatch(registry, ledger, &call, options.placeholder)?
        };

        match outcome {
            Outcome::Data(value) => Ok(value),
            Outcome::Compute(compute) => Ok(compute(&call.text, &call.parameters).await),
            Outcome::Fail(err) => Err(MockError::Simulated(err)),
        }
    }

    // --- Inspection -----------------------------------------------------------

    /// Snapshot of the ledger: every call observed since the last reset.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().ledger.records().to_vec()
    }

    pub fn call_count(&self) -> usize {
        self.lock().ledger.records().len()
    }

    /// Number of registered expectations, consumed ones included.
    pub fn mock_count(&self) -> usize {
        self.lock().registry.len()
    }

    /// Shape of every registered expectation, oldest first.
    pub fn describe(&self) -> Vec<String> {
        self.lock().registry.entries().iter().map(engine::describe_entry).collect()
    }

    /// Shapes of the expectations that never answered a query.
    pub fn unused_mocks(&self) -> Vec<String> {
        self.lock()
            .registry
            .entries()
            .iter()
            .filter(|entry| !entry.handle.was_called())
            .map(engine::describe_entry)
            .collect()
    }

    // --- Lifecycle ------------------------------------------------------------

    /// Forget every expectation and every recorded call.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.registry.clear();
        state.ledger.clear();
    }

    /// Forget every expectation; keep the ledger.
    pub fn reset_mocks(&self) {
        self.lock().registry.clear();
    }

    /// Forget every recorded call; keep the expectations.
    pub fn reset_calls(&self) {
        self.lock().ledger.clear();
    }
}

#[cfg(test)]
#[path = "api/tests.rs"]
mod tests;
