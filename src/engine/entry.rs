//! Registration entries and introspection handles.
//!
//! An `Entry` is one registered expectation: a matcher, the ways it may answer
//! (a FIFO queue of one-off responses, a persistent response, a failure
//! override) and a tiny state machine:
//!
//! ```text
//! Pending ──(last permitted match)──▶ Consumed
//! ```
//!
//! A consumed entry is skipped by resolution and never comes back. Entries are
//! only ever removed in bulk by the controller's reset operations.
//!
//! Every entry shares a [`Handle`] with the code that registered it, so tests
//! can ask how often and with what arguments a particular expectation fired.

use super::matcher::Matcher;
use crate::{Call, SharedError, Value};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

pub(crate) type EntryId = u64;

pub(crate) type ComputeFn = Arc<dyn Fn(&str, &[Value]) -> BoxFuture<'static, Value> + Send + Sync>;

bitflags::bitflags! {
    /// Builder refinements that may be applied at most once.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub(crate) struct Refinements: u8 {
        const STRICT_PARAMS = 1 << 0;
        const FIELDS        = 1 << 1;
        const ONCE          = 1 << 2;
    }
}

/// How an entry produces a value.
#[derive(Clone)]
pub(crate) enum Response {
    Data(Value),
    Compute(ComputeFn),
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Data(value) => f.debug_tuple("Data").field(value).finish(),
            Response::Compute(_) => f.write_str("Compute(<function>)"),
        }
    }
}

/// What the winning entry hands back to the controller.
///
/// Computing and failing happen after the controller lock is released.
pub(crate) enum Outcome {
    Data(Value),
    Compute(ComputeFn),
    Fail(SharedError),
}

impl From<Response> for Outcome {
    fn from(response: Response) -> Self {
        match response {
            Response::Data(value) => Outcome::Data(value),
            Response::Compute(compute) => Outcome::Compute(compute),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    Pending,
    Consumed,
}

pub(crate) struct Entry {
    pub id: EntryId,
    pub matcher: Matcher,
    pub response: Option<Response>,
    pub queue: VecDeque<Response>,
    pub failure: Option<SharedError>,
    pub one_shot: bool,
    pub state: EntryState,
    pub handle: Handle,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("matcher", &self.matcher)
            .field("response", &self.response)
            .field("queue", &self.queue.len())
            .field("failure", &self.failure.as_ref().map(|e| e.to_string()))
            .field("one_shot", &self.one_shot)
            .field("state", &self.state)
            .finish()
    }
}

impl Entry {
    /// Whether resolution may still pick this entry.
    pub fn is_live(&self) -> bool {
        self.state == EntryState::Pending
            && (!self.queue.is_empty() || self.failure.is_some() || self.response.is_some())
    }

    /// Produce the answer for one match and advance the state machine.
    ///
    /// Queued responses are used first, in FIFO order. After the queue a
    /// failure override wins over the persistent response.
    pub fn take(&mut self) -> Option<Outcome> {
        if let Some(next) = self.queue.pop_front() {
            if self.queue.is_empty() && self.one_shot {
                self.state = EntryState::Consumed;
            }
            return Some(next.into());
        }

        if self.one_shot {
            self.state = EntryState::Consumed;
        }

        if let Some(failure) = &self.failure {
            return Some(Outcome::Fail(Arc::clone(failure)));
        }
        self.response.clone().map(Outcome::from)
    }
}

/// Insertion-ordered set of entries owned by a controller.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: Vec<Entry>,
    next_id: EntryId,
}

impl Registry {
    pub fn register(&mut self, matcher: Matcher, handle: Handle, one_shot: bool) -> &mut Entry {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            matcher,
            response: None,
            queue: VecDeque::new(),
            failure: None,
            one_shot,
            state: EntryState::Pending,
            handle,
        });
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    pub fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// One call observed by a specific expectation.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleCall {
    pub text: String,
    pub parameters: Vec<Value>,
}

/// Introspection handle for one registered expectation.
///
/// Cloning a handle is cheap; every clone observes the same counter and log.
/// The log survives controller resets.
#[derive(Debug, Clone, Default)]
pub struct Handle {
    calls: Arc<Mutex<Vec<HandleCall>>>,
}

impl Handle {
    /// Number of calls this expectation answered (including simulated failures).
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn was_called(&self) -> bool {
        self.call_count() > 0
    }

    /// Every `(text, parameters)` pair this expectation answered, oldest first.
    pub fn calls(&self) -> Vec<HandleCall> {
        self.calls.lock().clone()
    }

    pub fn last_call(&self) -> Option<HandleCall> {
        self.calls.lock().last().cloned()
    }

    pub(crate) fn record(&self, call: &Call) {
        self.calls.lock().push(HandleCall { text: call.text.clone(), parameters: call.parameters.clone() });
    }
}
