//! Matching and dispatch engine.
//!
//! Everything that decides *which* registered expectation answers a query
//! lives under `src/engine/`. The controller in `api.rs` owns the state and
//! takes the lock; the functions here are synchronous and never await.
//!
//! ## How the parts work together
//!
//! ```text
//! Builder (builder.rs) ── refinements ──▶ Matcher (matcher.rs)
//!        │                                   │
//!        └── respond / throw / respond_once ─┴──▶ Entry + Handle (entry.rs)
//!                                                    │
//! call ── normalize_sql (normalize.rs) ──▶ Ledger::append (ledger.rs)
//!                                                    │
//!                                                    v
//!                                    dispatch (resolve.rs)
//!                                      - reverse scan, skip consumed
//!                                      - rank by Specificity
//!                                      - Entry::take (queue / failure / response)
//!                                                    │
//!                                                    v
//!                                  Outcome  or  MockError::Unmatched
//!                                               (shapes from describe.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `normalize.rs`: whitespace normalization and placeholder counting.
//! - `matcher.rs`: the closed `Matcher` variant, acceptance and specificity.
//! - `entry.rs`: registration entries, response strategies, the
//!   `Pending -> Consumed` state machine and introspection handles.
//! - `ledger.rs`: the append-only record of every call.
//! - `resolve.rs`: winner selection and response extraction.
//! - `describe.rs`: human-readable matcher shapes for diagnostics.
//! - `builder.rs`: the fluent registration API.

#[path = "engine/builder.rs"]
mod builder;
#[path = "engine/describe.rs"]
mod describe;
#[path = "engine/entry.rs"]
mod entry;
#[path = "engine/ledger.rs"]
mod ledger;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/normalize.rs"]
mod normalize;
#[path = "engine/resolve.rs"]
mod resolve;

pub use builder::Builder;
pub use entry::{Handle, HandleCall};
pub use ledger::RecordedCall;

pub(crate) use describe::{describe_entry, format_parameters};
pub(crate) use entry::{Outcome, Registry};
pub(crate) use ledger::Ledger;
pub(crate) use matcher::{Matcher, StructuralMatcher};
pub(crate) use normalize::normalize_sql;
pub(crate) use resolve::dispatch;
