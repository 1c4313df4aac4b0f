//! Resolution: picking the entry that answers a call.
//!
//! ```text
//! call ──▶ ledger.append
//!            │
//!            v
//!   entries (newest first, consumed skipped)
//!            │ Matcher::accepts
//!            v
//!   candidates ── max by Specificity ── ties: newest wins
//!            │
//!            ├─ winner ──▶ handle.record ──▶ Entry::take ──▶ Outcome
//!            └─ none   ──▶ MockError::Unmatched (every registered shape)
//! ```
//!
//! All of this runs while the controller lock is held. Nothing here awaits.

use super::describe::describe_entry;
use super::entry::{Entry, Outcome, Registry};
use super::ledger::Ledger;
use super::matcher::Specificity;
use crate::{Call, MockError, PlaceholderStyle, Result};

/// The winning entry for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Resolution {
    /// Index into the registry's entries.
    pub index: usize,
    pub specificity: Specificity,
    /// Number of live entries that accepted the call.
    pub candidates: usize,
}

/// Scan `entries` newest first and return the most specific live entry that
/// accepts `call`.
///
/// Only a strictly higher specificity replaces the current best, so among
/// equals the first one seen in the reverse scan (the most recently
/// registered) wins.
pub(crate) fn resolve(entries: &[Entry], call: &Call, style: PlaceholderStyle) -> Option<Resolution> {
    let mut best: Option<Resolution> = None;
    let mut candidates = 0;

    for (index, entry) in entries.iter().enumerate().rev() {
        if !entry.is_live() || !entry.matcher.accepts(call, style) {
            continue;
        }
        candidates += 1;

        let specificity = entry.matcher.specificity();
        if best.is_none_or(|b| specificity > b.specificity) {
            best = Some(Resolution { index, specificity, candidates: 0 });
        }
    }

    best.map(|b| Resolution { candidates, ..b })
}

/// Log `call`, resolve it and extract the winner's answer.
///
/// The ledger records the call before resolution, so unmatched calls and
/// simulated failures are recorded too.
pub(crate) fn dispatch(
    registry: &mut Registry,
    ledger: &mut Ledger,
    call: &Call,
    style: PlaceholderStyle,
) -> Result<Outcome> {
    ledger.append(call);

    let resolved = resolve(registry.entries(), call, style)
        .and_then(|resolution| {
            let entry = &mut registry.entries_mut()[resolution.index];
            entry.handle.record(call);
            let outcome = entry.take()?;

            tracing::debug!(
                entry = entry.id,
                kind = entry.matcher.kind(),
                specificity = resolution.specificity.score(),
                candidates = resolution.candidates,
                consumed = !entry.is_live(),
                text = %call.text,
                "query matched"
            );
            Some(outcome)
        });

    match resolved {
        Some(outcome) => Ok(outcome),
        None => {
            let registered: Vec<String> = registry.entries().iter().map(describe_entry).collect();
            tracing::warn!(text = %call.text, registered = registered.len(), "no registered query matched");
            Err(MockError::Unmatched { text: call.text.clone(), parameters: call.parameters.clone(), registered })
        }
    }
}
