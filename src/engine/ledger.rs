//! Call ledger.
//!
//! Append-only record of every call the controller observed, whether or not
//! any expectation matched it. Order is arrival order.

use crate::{Call, StructuralDescriptor, Value};
use chrono::{DateTime, Utc};

/// One observed call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Normalized SQL text.
    pub text: String,
    pub parameters: Vec<Value>,
    pub descriptor: Option<StructuralDescriptor>,
    /// Wall-clock time the call reached the controller.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct Ledger {
    records: Vec<RecordedCall>,
}

impl Ledger {
    pub fn append(&mut self, call: &Call) {
        tracing::trace!(text = %call.text, parameters = call.parameters.len(), "ledger append");
        self.records.push(RecordedCall {
            text: call.text.clone(),
            parameters: call.parameters.clone(),
            descriptor: call.descriptor.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn records(&self) -> &[RecordedCall] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
