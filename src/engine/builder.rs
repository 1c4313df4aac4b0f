//! Fluent registration API.
//!
//! A `Builder` is bound to one matcher when it is created by one of the
//! `QueryMock::on*` entry points. Refinements reshape that matcher and are
//! validated against its variant immediately, so a misconfigured expectation
//! fails at the line that configured it rather than at query time.
//!
//! ```text
//! on(..) ─▶ partial / strict_params / with_params / where_sql / with_fields / once
//!              │
//!              ├─ respond / respond_with / respond_with_async / throw ─▶ Handle
//!              └─ respond_once ─▶ Builder (same entry, one more queued response)
//! ```
//!
//! A plain finalizer after one or more `respond_once` calls turns the queued
//! entry into a persistent fallback that answers once the queue is drained.

use super::entry::{ComputeFn, EntryId, Handle, Refinements, Response};
use super::matcher::{Fragment, Matcher};
use super::normalize::normalize_sql;
use crate::{MockError, QueryMock, Result, SharedError, Value};
use futures::FutureExt;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug)]
pub struct Builder {
    mock: QueryMock,
    matcher: Matcher,
    /// Parameters of the statement the builder was created from.
    captured: Vec<Value>,
    refinements: Refinements,
    handle: Handle,
    /// Set once `respond_once` has registered the entry.
    registered: Option<EntryId>,
}

impl Builder {
    pub(crate) fn new(mock: QueryMock, matcher: Matcher, captured: Vec<Value>) -> Self {
        Builder {
            mock,
            matcher,
            captured,
            refinements: Refinements::empty(),
            handle: Handle::default(),
            registered: None,
        }
    }

    /// Introspection handle of the expectation being built.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    // --- Refinements ----------------------------------------------------------

    /// Match any query whose text starts with the registered text.
    ///
    /// Only exact-text matchers can be relaxed this way.
    pub fn partial(mut self) -> Result<Self> {
        self.ensure_unregistered("partial")?;
        let Matcher::Exact { text, parameters } = &self.matcher else {
            return Err(self.invalid("partial", "only exact-text matchers can be relaxed to a prefix"));
        };
        self.matcher = Matcher::Prefix { text: text.clone(), parameters: parameters.clone() };
        Ok(self)
    }

    /// Require the parameters of the statement passed to `on`, position by
    /// position. Pattern and substring matchers capture no parameters, so for
    /// them this requires an empty parameter list.
    pub fn strict_params(self) -> Result<Self> {
        let captured = self.captured.clone();
        self.require_params("strict_params", captured)
    }

    /// Require exactly `parameters`, position by position.
    pub fn with_params(self, parameters: Vec<Value>) -> Result<Self> {
        self.require_params("with_params", parameters)
    }

    fn require_params(mut self, refinement: &'static str, parameters: Vec<Value>) -> Result<Self> {
        self.ensure_unregistered(refinement)?;
        if matches!(self.matcher, Matcher::Structural(_)) {
            return Err(self.invalid(refinement, "parameter strictness is meaningless for structural matching"));
        }
        if self.refinements.contains(Refinements::STRICT_PARAMS) {
            return Err(self.invalid(refinement, "the required parameters are already set"));
        }
        if let Matcher::Exact { parameters: slot, .. }
        | Matcher::Prefix { parameters: slot, .. }
        | Matcher::Pattern { parameters: slot, .. }
        | Matcher::Substring { parameters: slot, .. } = &mut self.matcher
        {
            *slot = Some(parameters);
        }
        self.refinements |= Refinements::STRICT_PARAMS;
        Ok(self)
    }

    /// Require `sql` (with its own bind `parameters`) to appear in the query.
    ///
    /// The fragment's parameters are compared with the query's parameters at
    /// the position given by the number of placeholders before the fragment.
    pub fn where_sql(mut self, sql: &str, parameters: Vec<Value>) -> Result<Self> {
        self.ensure_unregistered("where_sql")?;
        if !matches!(self.matcher, Matcher::Structural(_)) {
            return Err(self.invalid("where_sql", "SQL fragments only refine structural matchers"));
        }
        if let Matcher::Structural(structural) = &mut self.matcher {
            structural.fragments.push(Fragment { text: normalize_sql(sql), parameters });
        }
        Ok(self)
    }

    /// Require the query to touch at least these fields.
    pub fn with_fields<I, S>(mut self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_unregistered("with_fields")?;
        if !matches!(self.matcher, Matcher::Structural(_)) {
            return Err(self.invalid("with_fields", "field sets only refine structural matchers"));
        }
        if self.refinements.contains(Refinements::FIELDS) {
            return Err(self.invalid("with_fields", "the field set is already given"));
        }
        if let Matcher::Structural(structural) = &mut self.matcher {
            structural.field_keys = Some(keys.into_iter().map(Into::into).collect());
        }
        self.refinements |= Refinements::FIELDS;
        Ok(self)
    }

    /// Answer at most one query, then become inert.
    pub fn once(mut self) -> Result<Self> {
        self.ensure_unregistered("once")?;
        self.refinements |= Refinements::ONCE;
        Ok(self)
    }

    fn ensure_unregistered(&self, refinement: &'static str) -> Result<()> {
        match self.registered {
            Some(_) => Err(self.invalid(refinement, "the expectation is already registered by respond_once")),
            None => Ok(()),
        }
    }

    fn invalid(&self, refinement: &'static str, reason: &'static str) -> MockError {
        MockError::InvalidRefinement { refinement, matcher: self.matcher.kind(), reason }
    }

    // --- Finalizers -----------------------------------------------------------

    /// Answer matching queries with `value`.
    pub fn respond(self, value: Value) -> Handle {
        self.finish(Some(Response::Data(value)), None)
    }

    /// Answer matching queries with the result of `compute(text, parameters)`.
    pub fn respond_with<F>(self, compute: F) -> Handle
    where
        F: Fn(&str, &[Value]) -> Value + Send + Sync + 'static,
    {
        let compute: ComputeFn =
            Arc::new(move |text: &str, parameters: &[Value]| futures::future::ready(compute(text, parameters)).boxed());
        self.finish(Some(Response::Compute(compute)), None)
    }

    /// Answer matching queries with the value `compute(text, parameters)`
    /// resolves to.
    pub fn respond_with_async<F, Fut>(self, compute: F) -> Handle
    where
        F: Fn(&str, &[Value]) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        let compute: ComputeFn = Arc::new(move |text: &str, parameters: &[Value]| compute(text, parameters).boxed());
        self.finish(Some(Response::Compute(compute)), None)
    }

    /// Fail matching queries with `error`.
    ///
    /// Every failing call returns the same error object inside
    /// [`MockError::Simulated`].
    pub fn throw<E>(self, error: E) -> Handle
    where
        E: StdError + Send + Sync + 'static,
    {
        let failure: SharedError = Arc::new(error);
        self.finish(None, Some(failure))
    }

    /// Like [`throw`](Self::throw) for an error that is already shared.
    pub fn throw_shared(self, error: SharedError) -> Handle {
        self.finish(None, Some(error))
    }

    /// Queue `value` as the answer to the next matching query.
    ///
    /// Repeated calls queue further answers on the same expectation, answered
    /// in FIFO order. Once the queue is drained the expectation is consumed,
    /// unless a plain finalizer added a fallback.
    ///
    /// If a reset removed the expectation in the meantime, a new one is
    /// registered with a fresh [`Handle`].
    pub fn respond_once(mut self, value: Value) -> Self {
        let response = Response::Data(value);
        let mut state = self.mock.lock();

        match self.registered.and_then(|id| state.registry.position(id)) {
            Some(index) => state.registry.entries_mut()[index].queue.push_back(response),
            None => {
                if self.registered.is_some() {
                    self.handle = Handle::default();
                }
                let entry = state.registry.register(self.matcher.clone(), self.handle.clone(), true);
                entry.queue.push_back(response);
                tracing::debug!(entry = entry.id, kind = entry.matcher.kind(), "registered queued expectation");
                self.registered = Some(entry.id);
            }
        }

        drop(state);
        self
    }

    fn finish(mut self, response: Option<Response>, failure: Option<SharedError>) -> Handle {
        let mut state = self.mock.lock();

        match self.registered.and_then(|id| state.registry.position(id)) {
            Some(index) => {
                let entry = &mut state.registry.entries_mut()[index];
                entry.response = response;
                entry.failure = failure;
                entry.one_shot = false;
                tracing::debug!(entry = entry.id, "queued expectation gained a persistent fallback");
            }
            None => {
                if self.registered.is_some() {
                    self.handle = Handle::default();
                }
                let one_shot = self.refinements.contains(Refinements::ONCE);
                let entry = state.registry.register(self.matcher, self.handle.clone(), one_shot);
                entry.response = response;
                entry.failure = failure;
                tracing::debug!(
                    entry = entry.id,
                    kind = entry.matcher.kind(),
                    specificity = entry.matcher.specificity().score(),
                    one_shot,
                    "registered expectation"
                );
            }
        }

        self.handle
    }
}
