//! Matchers and specificity.
//!
//! A `Matcher` is the shape half of a registered expectation. Each variant
//! answers two questions about a candidate `Call`:
//!
//! - does it accept the call (`Matcher::accepts`), and
//! - how specific is it (`Matcher::specificity`), used only to rank several
//!   accepting matchers against each other.
//!
//! ```text
//! Exact      + params ─ 5
//! Exact               ─ 4
//! Prefix     + params ─ 3
//! Prefix              ─ 2
//! Structural + sql    ─ 1.75
//! Structural + fields ─ 1.5
//! Structural          ─ 1.25
//! Pattern / Substring ─ 1
//! ```
//!
//! Structural matchers rank below every text matcher, even when they carry
//! SQL fragments.

use super::normalize::placeholders_before;
use crate::{Call, Operation, PlaceholderStyle, Value};
use regex::Regex;
use std::collections::BTreeSet;

/// Ranking weight of a matcher, stored as the score times four so the
/// quarter steps of the structural variants stay exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Specificity(u8);

impl Specificity {
    pub const EXACT_WITH_PARAMS: Self = Self(20);
    pub const EXACT: Self = Self(16);
    pub const PREFIX_WITH_PARAMS: Self = Self(12);
    pub const PREFIX: Self = Self(8);
    pub const STRUCTURAL_WITH_SQL: Self = Self(7);
    pub const STRUCTURAL_WITH_FIELDS: Self = Self(6);
    pub const STRUCTURAL: Self = Self(5);
    pub const LOOSE_TEXT: Self = Self(4);

    pub fn score(self) -> f32 {
        f32::from(self.0) / 4.0
    }
}

/// A sub-expression of the SQL text together with its own bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fragment {
    pub text: String,
    pub parameters: Vec<Value>,
}

impl Fragment {
    /// True if some occurrence of the fragment in `call.text` lines up with
    /// the fragment's parameters.
    ///
    /// The positional offset of an occurrence is the number of placeholders
    /// that precede it in the call's text.
    fn found_in(&self, call: &Call, style: PlaceholderStyle) -> bool {
        call.text.match_indices(self.text.as_str()).any(|(start, _)| {
            let offset = placeholders_before(&call.text, start, style);
            call.parameters
                .get(offset..offset + self.parameters.len())
                .is_some_and(|window| window == self.parameters.as_slice())
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StructuralMatcher {
    pub operation: Operation,
    pub entity_name: String,
    pub entity_schema: Option<String>,
    pub field_keys: Option<BTreeSet<String>>,
    pub fragments: Vec<Fragment>,
}

impl StructuralMatcher {
    fn accepts(&self, call: &Call, style: PlaceholderStyle) -> bool {
        // Calls without a descriptor fall through to other matchers.
        let Some(descriptor) = &call.descriptor else {
            return false;
        };

        if descriptor.operation != self.operation
            || descriptor.entity_name != self.entity_name
            || descriptor.entity_schema != self.entity_schema
        {
            return false;
        }

        // The registered fields must be a subset of the fields the call touches.
        if let Some(expected) = &self.field_keys {
            match &descriptor.field_keys {
                Some(actual) if expected.is_subset(actual) => {}
                _ => return false,
            }
        }

        self.fragments.iter().all(|fragment| fragment.found_in(call, style))
    }

    fn specificity(&self) -> Specificity {
        if !self.fragments.is_empty() {
            Specificity::STRUCTURAL_WITH_SQL
        } else if self.field_keys.is_some() {
            Specificity::STRUCTURAL_WITH_FIELDS
        } else {
            Specificity::STRUCTURAL
        }
    }
}

/// The shape of one registered expectation.
#[derive(Debug, Clone)]
pub(crate) enum Matcher {
    /// Normalized text must be equal.
    Exact { text: String, parameters: Option<Vec<Value>> },
    /// Call text must start with `text` ("partial").
    Prefix { text: String, parameters: Option<Vec<Value>> },
    /// Regular expression must match somewhere in the call text.
    Pattern { pattern: Regex, parameters: Option<Vec<Value>> },
    /// Call text must contain `substring`.
    Substring { substring: String, parameters: Option<Vec<Value>> },
    /// Match on operation / entity / fields instead of text.
    Structural(StructuralMatcher),
}

impl Matcher {
    pub fn kind(&self) -> &'static str {
        match self {
            Matcher::Exact { .. } => "exact",
            Matcher::Prefix { .. } => "partial",
            Matcher::Pattern { .. } => "pattern",
            Matcher::Substring { .. } => "substring",
            Matcher::Structural(_) => "structural",
        }
    }

    pub fn parameters(&self) -> Option<&[Value]> {
        match self {
            Matcher::Exact { parameters, .. }
            | Matcher::Prefix { parameters, .. }
            | Matcher::Pattern { parameters, .. }
            | Matcher::Substring { parameters, .. } => parameters.as_deref(),
            Matcher::Structural(_) => None,
        }
    }

    pub fn accepts(&self, call: &Call, style: PlaceholderStyle) -> bool {
        let shape_ok = match self {
            Matcher::Exact { text, .. } => call.text == *text,
            Matcher::Prefix { text, .. } => call.text.starts_with(text.as_str()),
            Matcher::Pattern { pattern, .. } => pattern.is_match(&call.text),
            Matcher::Substring { substring, .. } => call.text.contains(substring.as_str()),
            Matcher::Structural(structural) => return structural.accepts(call, style),
        };

        shape_ok && parameters_match(self.parameters(), &call.parameters)
    }

    pub fn specificity(&self) -> Specificity {
        match self {
            Matcher::Exact { parameters: Some(_), .. } => Specificity::EXACT_WITH_PARAMS,
            Matcher::Exact { parameters: None, .. } => Specificity::EXACT,
            Matcher::Prefix { parameters: Some(_), .. } => Specificity::PREFIX_WITH_PARAMS,
            Matcher::Prefix { parameters: None, .. } => Specificity::PREFIX,
            Matcher::Structural(structural) => structural.specificity(),
            Matcher::Pattern { .. } | Matcher::Substring { .. } => Specificity::LOOSE_TEXT,
        }
    }
}

/// Positional equality: same length, each element equal.
fn parameters_match(expected: Option<&[Value]>, actual: &[Value]) -> bool {
    match expected {
        None => true,
        Some(expected) => expected == actual,
    }
}
