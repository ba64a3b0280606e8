//! Structure intersection and Euclidean rhythms
//!
//! `struct`/`mask` intersect one pattern's time structure with another's
//! values; the Euclidean family builds its masks with Bjorklund's algorithm.

use crate::context::QueryContext;
use crate::pattern::{Event, Pattern, Query, TimeSpan};
use crate::pattern_join::ControlArg;
use crate::rational::Rational;
use crate::value::VoiceValue;

#[derive(Clone, Copy, PartialEq, Eq)]
enum StructureMode {
    /// Timing from `other`, values sampled from the source.
    Out,
    /// Timing from the source, gated by `other`.
    In,
}

struct StructureNode {
    source: Pattern,
    other: Pattern,
    mode: StructureMode,
    filter_truthy: bool,
    invert: bool,
}

impl Query for StructureNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        match self.mode {
            StructureMode::Out => self
                .other
                .query_span(span, ctx)
                .into_iter()
                .filter(|o| !self.filter_truthy || o.value().truthy())
                .filter_map(|o| {
                    let sampled = self.source.sample_at(o.begin(), ctx)?;
                    Some(Event {
                        whole: o.whole,
                        part: o.part,
                        data: sampled.data,
                        source_locations: sampled.source_locations,
                    })
                })
                .collect(),
            StructureMode::In => self
                .source
                .query_span(span, ctx)
                .into_iter()
                .filter(|e| {
                    let gate = self
                        .other
                        .sample_at(e.begin(), ctx)
                        .map(|g| !self.filter_truthy || g.value().truthy())
                        .unwrap_or(false);
                    gate != self.invert
                })
                .collect(),
        }
    }
}

impl Pattern {
    fn structured(
        &self,
        other: impl Into<ControlArg>,
        mode: StructureMode,
        filter_truthy: bool,
        invert: bool,
    ) -> Pattern {
        Pattern::from_node(StructureNode {
            source: self.clone(),
            other: other.into().to_pattern(),
            mode,
            filter_truthy,
            invert,
        })
    }

    /// Take timing from the truthy events of `mask`, values from `self`.
    pub fn struct_(&self, mask: impl Into<ControlArg>) -> Pattern {
        self.structured(mask, StructureMode::Out, true, false)
    }

    /// As `struct_`, but every mask event contributes, truthy or not.
    pub fn struct_all(&self, mask: impl Into<ControlArg>) -> Pattern {
        self.structured(mask, StructureMode::Out, false, false)
    }

    /// Keep own events where `mask` is truthy at the event's start.
    pub fn mask(&self, mask: impl Into<ControlArg>) -> Pattern {
        self.structured(mask, StructureMode::In, true, false)
    }

    /// Keep own events wherever `mask` has any event at all.
    pub fn mask_all(&self, mask: impl Into<ControlArg>) -> Pattern {
        self.structured(mask, StructureMode::In, false, false)
    }

    /// The logical negation of `mask`.
    pub fn bypass(&self, mask: impl Into<ControlArg>) -> Pattern {
        self.structured(mask, StructureMode::In, true, true)
    }

    // ============= Euclidean rhythms =============

    /// Distribute `pulses` onsets over `steps` slots as evenly as possible
    /// and use them as a structure mask over this pattern.
    pub fn euclid(&self, pulses: i64, steps: i64, rotation: i64) -> Pattern {
        self.struct_(euclid_mask(pulses, steps, rotation))
    }

    /// As `euclid`, holding each onset until the next instead of resting.
    pub fn euclid_legato(&self, pulses: i64, steps: i64, rotation: i64) -> Pattern {
        if pulses <= 0 || steps <= 0 {
            return Pattern::silence();
        }
        let bools = rotated_bjorklund(pulses, steps, rotation);
        let onsets: Vec<usize> = bools
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| i)
            .collect();
        if onsets.is_empty() {
            return Pattern::silence();
        }
        // Each onset stretches to the next; the last wraps to the cycle end.
        let mut held = Vec::with_capacity(onsets.len());
        for (i, onset) in onsets.iter().enumerate() {
            let next = onsets.get(i + 1).copied().unwrap_or(bools.len());
            let gap = (next - onset) as f64;
            held.push(Pattern::pure(VoiceValue::int(1)).with_weight(gap));
        }
        self.struct_(Pattern::sequence(held))
    }

    /// Morph between the rotation-0 Euclidean rhythm (`g == 0`) and a
    /// perfectly even placement of the same pulse count (`g == 1`).
    pub fn euclidish(&self, pulses: i64, steps: i64, g: f64) -> Pattern {
        if pulses <= 0 || steps <= 0 {
            return Pattern::silence();
        }
        let g = Rational::approx(g.clamp(0.0, 1.0));
        let bools = rotated_bjorklund(pulses, steps, 0);
        let onsets: Vec<i64> = bools
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| i as i64)
            .collect();
        let width = Rational::new(1, steps);
        let mut mask = Vec::with_capacity(onsets.len());
        for (i, onset) in onsets.iter().enumerate() {
            let uneven = Rational::new(*onset, steps);
            let even = Rational::new(i as i64, pulses);
            let position = uneven * (Rational::ONE - g) + even * g;
            mask.push(Pattern::pure(VoiceValue::int(1)).compress(position, position + width));
        }
        self.struct_(Pattern::stack(mask))
    }
}

/// Bjorklund's iterative grouping, before rotation.
pub fn bjorklund(pulses: i64, steps: i64) -> Vec<bool> {
    if steps <= 0 {
        return Vec::new();
    }
    let steps = steps as usize;
    if pulses <= 0 {
        return vec![false; steps];
    }
    let pulses = (pulses as usize).min(steps);
    if pulses == steps {
        return vec![true; steps];
    }
    let mut a: Vec<Vec<bool>> = vec![vec![true]; pulses];
    let mut b: Vec<Vec<bool>> = vec![vec![false]; steps - pulses];
    while b.len() > 1 {
        let n = a.len().min(b.len());
        let mut merged: Vec<Vec<bool>> = Vec::with_capacity(n);
        for i in 0..n {
            let mut group = a[i].clone();
            group.extend_from_slice(&b[i]);
            merged.push(group);
        }
        if a.len() > n {
            b = a.split_off(n);
        } else {
            b = b.split_off(n);
        }
        a = merged;
    }
    a.into_iter().chain(b).flatten().collect()
}

fn rotated_bjorklund(pulses: i64, steps: i64, rotation: i64) -> Vec<bool> {
    let mut bools = bjorklund(pulses, steps);
    if bools.is_empty() {
        return bools;
    }
    let len = bools.len();
    let r = rotation.rem_euclid(len as i64) as usize;
    bools.rotate_left(r);
    bools
}

/// The Euclidean onsets as a boolean step mask pattern.
pub fn euclid_mask(pulses: i64, steps: i64, rotation: i64) -> Pattern {
    if pulses <= 0 || steps <= 0 {
        return Pattern::silence();
    }
    let bools = rotated_bjorklund(pulses, steps, rotation);
    Pattern::sequence(
        bools
            .into_iter()
            .map(|on| Pattern::pure(VoiceValue::int(if on { 1 } else { 0 })))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{seq_of, starts, values};

    fn ctx() -> QueryContext {
        QueryContext::new()
    }

    #[test]
    fn bjorklund_three_eight() {
        let hits: Vec<usize> = bjorklund(3, 8)
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(hits, vec![0, 3, 6]);
    }

    #[test]
    fn bjorklund_five_eight() {
        assert_eq!(
            bjorklund(5, 8),
            vec![true, false, true, true, false, true, true, false]
        );
    }

    #[test]
    fn bjorklund_degenerate_cases() {
        assert_eq!(bjorklund(0, 4), vec![false; 4]);
        assert_eq!(bjorklund(4, 4), vec![true; 4]);
        assert_eq!(bjorklund(9, 4), vec![true; 4]);
        assert!(bjorklund(3, 0).is_empty());
    }

    #[test]
    fn struct_takes_timing_from_truthy_mask_events() {
        let mask = seq_of(&["1", "0", "1", "0"]);
        let p = seq_of(&["a", "b", "c", "d"]).struct_(mask);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["a", "c"]);
        assert_eq!(
            starts(&events),
            vec![Rational::ZERO, Rational::new(1, 2)]
        );
    }

    #[test]
    fn struct_all_keeps_falsy_slots() {
        let mask = seq_of(&["1", "0"]);
        let p = seq_of(&["a", "b"]).struct_all(mask);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["a", "b"]);
    }

    #[test]
    fn mask_gates_own_events() {
        let mask = seq_of(&["1", "0"]);
        let p = seq_of(&["a", "b", "c", "d"]).mask(mask);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["a", "b"]);
    }

    #[test]
    fn bypass_is_the_negated_mask() {
        let mask = seq_of(&["1", "0"]);
        let p = seq_of(&["a", "b", "c", "d"]).bypass(mask);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["c", "d"]);
    }

    #[test]
    fn euclid_three_eight_over_a_source() {
        let p = Pattern::pure("x").euclid(3, 8, 0);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(
            starts(&events),
            vec![Rational::ZERO, Rational::new(3, 8), Rational::new(6, 8)]
        );
        assert_eq!(
            events[0].part,
            TimeSpan::new(Rational::ZERO, Rational::new(1, 8))
        );
    }

    #[test]
    fn euclid_rotation_shifts_onsets() {
        let p = Pattern::pure("x").euclid(3, 8, 3);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        // [1,0,0,1,0,0,1,0] rotated left by 3: onsets at 0, 3, 5.
        assert_eq!(
            starts(&events),
            vec![Rational::ZERO, Rational::new(3, 8), Rational::new(5, 8)]
        );
    }

    #[test]
    fn euclid_legato_holds_to_the_next_onset() {
        let p = Pattern::pure("x").euclid_legato(3, 8, 0);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0].part,
            TimeSpan::new(Rational::ZERO, Rational::new(3, 8))
        );
        assert_eq!(
            events[2].part,
            TimeSpan::new(Rational::new(6, 8), Rational::ONE)
        );
    }

    #[test]
    fn euclidish_morphs_toward_even_spacing() {
        let base = Pattern::pure("x").euclidish(3, 8, 0.0);
        assert_eq!(
            starts(&base.query_arc(Rational::ZERO, Rational::ONE, &ctx())),
            vec![Rational::ZERO, Rational::new(3, 8), Rational::new(6, 8)]
        );
        let even = Pattern::pure("x").euclidish(3, 8, 1.0);
        assert_eq!(
            starts(&even.query_arc(Rational::ZERO, Rational::ONE, &ctx())),
            vec![Rational::ZERO, Rational::new(1, 3), Rational::new(2, 3)]
        );
    }
}
