//! Human-readable matcher shapes.
//!
//! Used for the unmatched-call diagnostic, so that a failing test shows what
//! *was* configured, and for `QueryMock::describe`.

use super::entry::{Entry, EntryState, Response};
use super::matcher::{Matcher, StructuralMatcher};
use crate::Value;

pub(crate) fn format_parameters(parameters: &[Value]) -> String {
    let items: Vec<String> = parameters.iter().map(Value::to_string).collect();
    format!("[{}]", items.join(", "))
}

pub(crate) fn describe_matcher(matcher: &Matcher) -> String {
    let mut out = match matcher {
        Matcher::Exact { text, .. } => format!("exact {text:?}"),
        Matcher::Prefix { text, .. } => format!("partial {text:?}"),
        Matcher::Pattern { pattern, .. } => format!("pattern /{}/", pattern.as_str()),
        Matcher::Substring { substring, .. } => format!("substring {substring:?}"),
        Matcher::Structural(structural) => describe_structural(structural),
    };
    if let Some(parameters) = matcher.parameters() {
        out.push_str(" params=");
        out.push_str(&format_parameters(parameters));
    }
    out
}

fn describe_structural(m: &StructuralMatcher) -> String {
    let entity = match &m.entity_schema {
        Some(schema) => format!("{schema}.{}", m.entity_name),
        None => m.entity_name.clone(),
    };
    let mut out = format!("structural {} {entity}", m.operation);
    if let Some(keys) = &m.field_keys {
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        out.push_str(&format!(" fields={{{}}}", keys.join(", ")));
    }
    for fragment in &m.fragments {
        out.push_str(&format!(" where {:?} {}", fragment.text, format_parameters(&fragment.parameters)));
    }
    out
}

/// Matcher shape plus the entry's answer kind and state.
///
/// ```text
/// exact "select * from users" params=[1] -> data [once] (consumed)
/// ```
pub(crate) fn describe_entry(entry: &Entry) -> String {
    let mut out = describe_matcher(&entry.matcher);

    let answer = if entry.failure.is_some() {
        "throw"
    } else {
        match entry.response {
            Some(Response::Data(_)) => "data",
            Some(Response::Compute(_)) => "compute",
            None => "queue",
        }
    };
    out.push_str(" -> ");
    out.push_str(answer);

    if !entry.queue.is_empty() {
        out.push_str(&format!(" queued={}", entry.queue.len()));
    }
    if entry.one_shot {
        out.push_str(" [once]");
    }
    if entry.state == EntryState::Consumed {
        out.push_str(" (consumed)");
    }
    out
}
