//! Helpers for golden-event comparisons in tests

use crate::pattern::{Event, Pattern};
use crate::rational::Rational;

/// A sequence of string atoms, one step each.
pub fn seq_of(items: &[&str]) -> Pattern {
    Pattern::sequence(items.iter().map(|s| Pattern::pure(*s)).collect())
}

/// The `value` slots rendered as strings, in event order.
pub fn values(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.value().to_string()).collect()
}

/// The part begins, in event order.
pub fn starts(events: &[Event]) -> Vec<Rational> {
    events.iter().map(|e| e.part.begin).collect()
}

/// Compact `(begin, end, value)` rendering for golden comparisons.
pub fn summarize(events: &[Event]) -> Vec<(String, String, String)> {
    events
        .iter()
        .map(|e| {
            (
                e.part.begin.to_string(),
                e.part.end.to_string(),
                e.value().to_string(),
            )
        })
        .collect()
}
