//! Time transforms
//!
//! Every transform here composes two dual mappings: a query-time map applied
//! to the arc before asking the child, and the inverse event-time map applied
//! to each returned event's whole and part. Keeping the two exact and
//! mutually inverse is what makes `fast(k).slow(k)` the identity.

use crate::context::QueryContext;
use crate::pattern::{Event, Pattern, Query, TimeSpan};
use crate::rational::Rational;

/// Exact affine time warp: query time `q(t) = t*scale + offset`, event time
/// `h(t) = (t - offset) / scale`. Negative scales reverse the time axis.
struct LinearWarpNode {
    source: Pattern,
    scale: Rational,
    offset: Rational,
}

impl Query for LinearWarpNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let scale = self.scale;
        let offset = self.offset;
        let q = |t: Rational| t * scale + offset;
        let h = |t: Rational| (t - offset) / scale;
        let child_span = span.map(q);
        self.source
            .query_span(child_span, ctx)
            .into_iter()
            .map(|e| e.map_spans(|s| s.map(h)))
            .collect()
    }
}

/// Reflect each `group`-cycle block independently: within `[k·g, (k+1)·g)`
/// time maps to `(2k+1)·g - t`.
struct RevNode {
    source: Pattern,
    group: Rational,
}

impl Query for RevNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let g = self.group;
        let first = (span.begin / g).floor();
        let last = (span.end / g).ceil();
        let mut events = Vec::new();
        for k in first..last {
            let block = TimeSpan::new(g * Rational::int(k), g * Rational::int(k + 1));
            let clip = match span.intersect(&block) {
                Some(c) if !c.is_empty() => c,
                _ => continue,
            };
            let pivot = g * Rational::int(2 * k + 1);
            let r = move |t: Rational| pivot - t;
            let child_span = clip.map(r);
            for event in self.source.query_span(child_span, ctx) {
                events.push(event.map_spans(|s| s.map(r)));
            }
        }
        events
    }
}

/// Stretch the `[s, e)` slice of each source cycle over the whole cycle.
struct ZoomNode {
    source: Pattern,
    begin: Rational,
    end: Rational,
}

impl Query for ZoomNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let (s, e) = (self.begin, self.end);
        let width = e - s;
        let mut events = Vec::new();
        for cs in span.cycle_walk() {
            let cycle = cs.begin.sam();
            let to_child = move |t: Rational| cycle + s + (t - cycle) * width;
            let from_child = move |t: Rational| cycle + (t - cycle - s) / width;
            let child_span = cs.map(to_child);
            for event in self.source.query_span(child_span, ctx) {
                events.push(event.map_spans(|sp| sp.map(from_child)));
            }
        }
        events
    }
}

/// Squeeze one source cycle into `[s, e)` of each cycle, silence elsewhere.
struct CompressNode {
    source: Pattern,
    begin: Rational,
    end: Rational,
}

impl Query for CompressNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let (s, e) = (self.begin, self.end);
        let width = e - s;
        let mut events = Vec::new();
        for cs in span.cycle_walk() {
            let cycle = cs.begin.sam();
            let window = TimeSpan::new(cycle + s, cycle + e);
            let clip = match cs.intersect(&window) {
                Some(c) if !c.is_empty() => c,
                _ => continue,
            };
            let to_child = move |t: Rational| cycle + (t - cycle - s) / width;
            let from_child = move |t: Rational| cycle + s + (t - cycle) * width;
            let child_span = clip.map(to_child);
            for event in self.source.query_span(child_span, ctx) {
                events.push(event.map_spans(|sp| sp.map(from_child)));
            }
        }
        events
    }
}

impl Pattern {
    // ============= Tempo =============

    /// Speed up by `k`; `fast(0)` and negative factors give silence.
    pub fn fast(&self, k: Rational) -> Pattern {
        if k <= Rational::ZERO {
            tracing::debug!(factor = %k, "fast with non-positive factor, yielding silence");
            return Pattern::silence();
        }
        if k == Rational::ONE {
            return self.clone();
        }
        Pattern::from_node(LinearWarpNode {
            source: self.clone(),
            scale: k,
            offset: Rational::ZERO,
        })
        .with_weight(self.weight())
        .with_steps(self.num_steps().map(|s| s * k))
        .with_cycles(self.estimate_cycle_duration() / k)
    }

    pub fn slow(&self, k: Rational) -> Pattern {
        if k <= Rational::ZERO {
            tracing::debug!(factor = %k, "slow with non-positive factor, yielding silence");
            return Pattern::silence();
        }
        self.fast(Rational::ONE / k)
    }

    /// Shift later in time by `x` cycles.
    pub fn late(&self, x: Rational) -> Pattern {
        if x.is_zero() {
            return self.clone();
        }
        Pattern::from_node(LinearWarpNode {
            source: self.clone(),
            scale: Rational::ONE,
            offset: -x,
        })
        .with_weight(self.weight())
        .with_steps(self.num_steps())
        .with_cycles(self.estimate_cycle_duration())
    }

    pub fn early(&self, x: Rational) -> Pattern {
        self.late(-x)
    }

    // ============= Reversal =============

    /// Reverse each cycle independently.
    pub fn rev(&self) -> Pattern {
        self.rev_groups(Rational::ONE)
    }

    /// Reverse over groups of `n` cycles.
    pub fn rev_groups(&self, n: Rational) -> Pattern {
        if n <= Rational::ZERO {
            tracing::debug!(group = %n, "rev with non-positive group, yielding silence");
            return Pattern::silence();
        }
        Pattern::from_node(RevNode {
            source: self.clone(),
            group: n,
        })
        .with_weight(self.weight())
        .with_steps(self.num_steps())
        .with_cycles(self.estimate_cycle_duration())
    }

    /// Negate the whole time axis; `t -> -t` with span endpoints swapped.
    pub fn revv(&self) -> Pattern {
        Pattern::from_node(LinearWarpNode {
            source: self.clone(),
            scale: Rational::MINUS_ONE,
            offset: Rational::ZERO,
        })
        .with_weight(self.weight())
        .with_steps(self.num_steps())
        .with_cycles(self.estimate_cycle_duration())
    }

    /// Forward for one cycle, backward for the next.
    pub fn palindrome(&self) -> Pattern {
        Pattern::slowcat(vec![self.clone(), self.rev()])
    }

    // ============= Windows =============

    /// Stretch the `[s, e)` slice of each cycle over the whole cycle.
    pub fn zoom(&self, s: Rational, e: Rational) -> Pattern {
        if !valid_window(s, e) {
            tracing::debug!(begin = %s, end = %e, "zoom with invalid window, yielding silence");
            return Pattern::silence();
        }
        Pattern::from_node(ZoomNode {
            source: self.clone(),
            begin: s,
            end: e,
        })
        .with_weight(self.weight())
        .with_cycles(self.estimate_cycle_duration())
    }

    /// Inverse of `zoom`: the source's cycle start lands on `s` and one cycle
    /// takes `e - s`; the source keeps cycling, so no gap appears.
    pub fn focus(&self, s: Rational, e: Rational) -> Pattern {
        if !valid_window(s, e) {
            tracing::debug!(begin = %s, end = %e, "focus with invalid window, yielding silence");
            return Pattern::silence();
        }
        self.fast(Rational::ONE / (e - s)).late(s)
    }

    /// Place one source cycle inside `[s, e)` of each cycle, silence
    /// elsewhere.
    pub fn compress(&self, s: Rational, e: Rational) -> Pattern {
        if !valid_window(s, e) {
            tracing::debug!(begin = %s, end = %e, "compress with invalid window, yielding silence");
            return Pattern::silence();
        }
        Pattern::from_node(CompressNode {
            source: self.clone(),
            begin: s,
            end: e,
        })
        .with_weight(self.weight())
        .with_cycles(self.estimate_cycle_duration())
    }

    /// Squeeze each cycle into its first `1/k`, leaving a gap; unlike `fast`
    /// the source's cycles are not repeated to fill the remainder.
    pub fn fast_gap(&self, k: Rational) -> Pattern {
        if k <= Rational::ZERO {
            tracing::debug!(factor = %k, "fastGap with non-positive factor, yielding silence");
            return Pattern::silence();
        }
        if k <= Rational::ONE {
            return self.clone();
        }
        self.compress(Rational::ZERO, Rational::ONE / k)
    }

    /// `fast(k)` that also scales the `speed` voice field by `k`.
    pub fn hurry(&self, k: Rational) -> Pattern {
        let factor = k.to_f64();
        self.fast(k).map_data(move |d, _| {
            let speed = d
                .get("speed")
                .and_then(|v| v.as_f64())
                .unwrap_or(1.0);
            Some(d.with_field("speed", speed * factor))
        })
    }

    /// Play `n` steps per cycle; undefined (silence) without a step count.
    pub fn pace(&self, n: Rational) -> Pattern {
        match self.num_steps() {
            Some(steps) if !steps.is_zero() => self.fast(n / steps),
            _ => {
                tracing::debug!("pace on a pattern without steps, yielding silence");
                Pattern::silence()
            }
        }
    }

    // ============= Cycle-indexed conveniences =============

    /// Apply `f` on every `n`th cycle (cycle numbers divisible by `n`).
    pub fn every(
        &self,
        n: i64,
        f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static,
    ) -> Pattern {
        if n <= 0 {
            return self.clone();
        }
        let plain = self.clone();
        let transformed = f(self.clone());
        Pattern::per_cycle(move |cycle, _| {
            if cycle.rem_euclid(n) == 0 {
                transformed.clone()
            } else {
                plain.clone()
            }
        })
        .with_steps(self.num_steps())
    }

    /// Apply `f` on the cycles selected by the predicate.
    pub fn when_cycle(
        &self,
        pred: impl Fn(i64) -> bool + Send + Sync + 'static,
        f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static,
    ) -> Pattern {
        let plain = self.clone();
        let transformed = f(self.clone());
        Pattern::per_cycle(move |cycle, _| {
            if pred(cycle) {
                transformed.clone()
            } else {
                plain.clone()
            }
        })
        .with_steps(self.num_steps())
    }

    /// Rotate the pattern one `1/n` step earlier each cycle.
    pub fn iter(&self, n: i64) -> Pattern {
        if n <= 0 {
            return self.clone();
        }
        let base = self.clone();
        Pattern::per_cycle(move |cycle, _| base.early(Rational::new(cycle.rem_euclid(n), n)))
            .with_steps(self.num_steps())
    }

    /// As `iter`, rotating the other way.
    pub fn iter_back(&self, n: i64) -> Pattern {
        if n <= 0 {
            return self.clone();
        }
        let base = self.clone();
        Pattern::per_cycle(move |cycle, _| base.late(Rational::new(cycle.rem_euclid(n), n)))
            .with_steps(self.num_steps())
    }

    /// Loop the first `k` of each cycle for the whole cycle.
    pub fn linger(&self, k: Rational) -> Pattern {
        if k <= Rational::ZERO || k > Rational::ONE {
            tracing::debug!(amount = %k, "linger with amount outside (0, 1], yielding silence");
            return Pattern::silence();
        }
        if k == Rational::ONE {
            return self.clone();
        }
        self.zoom(Rational::ZERO, k).fast(Rational::ONE / k)
    }

    /// The pattern plus a transformed copy of itself.
    pub fn superimpose(&self, f: impl Fn(Pattern) -> Pattern) -> Pattern {
        Pattern::stack(vec![self.clone(), f(self.clone())])
    }

    /// Superimpose a copy shifted later by `t`.
    pub fn off(&self, t: Rational, f: impl Fn(Pattern) -> Pattern) -> Pattern {
        Pattern::stack(vec![self.clone(), f(self.late(t))])
    }

    pub fn overlay(&self, other: Pattern) -> Pattern {
        Pattern::stack(vec![self.clone(), other])
    }

    pub fn append(&self, other: Pattern) -> Pattern {
        Pattern::sequence(vec![self.clone(), other])
    }
}

fn valid_window(s: Rational, e: Rational) -> bool {
    Rational::ZERO <= s && s < e && e <= Rational::ONE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryContext;
    use crate::test_utils::{seq_of, starts, values};

    fn ctx() -> QueryContext {
        QueryContext::new()
    }

    #[test]
    fn fast_doubles_events_per_cycle() {
        let p = seq_of(&["a", "b"]).fast(Rational::int(2));
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["a", "b", "a", "b"]);
        assert_eq!(
            events[1].part,
            TimeSpan::new(Rational::new(1, 4), Rational::new(1, 2))
        );
    }

    #[test]
    fn fast_zero_is_silence() {
        let p = seq_of(&["a"]).fast(Rational::ZERO);
        assert!(p.query_arc(Rational::ZERO, Rational::ONE, &ctx()).is_empty());
    }

    #[test]
    fn fast_slow_inverse() {
        let p = seq_of(&["c", "d"]);
        let roundtrip = p.fast(Rational::int(3)).slow(Rational::int(3));
        assert_eq!(
            p.query_arc(Rational::ZERO, Rational::ONE, &ctx()),
            roundtrip.query_arc(Rational::ZERO, Rational::ONE, &ctx())
        );
    }

    #[test]
    fn late_early_inverse() {
        let p = seq_of(&["c", "d", "e"]);
        let x = Rational::new(5, 16);
        let roundtrip = p.late(x).early(x);
        assert_eq!(
            p.query_arc(Rational::ZERO, Rational::int(2), &ctx()),
            roundtrip.query_arc(Rational::ZERO, Rational::int(2), &ctx())
        );
    }

    #[test]
    fn late_shifts_wholes_and_parts_together() {
        let p = seq_of(&["a", "b"]).late(Rational::new(1, 4));
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        // "b" from the previous cycle leaks into [0, 1/4).
        assert_eq!(values(&events), vec!["b", "a", "b"]);
        assert_eq!(
            events[1].whole,
            Some(TimeSpan::new(Rational::new(1, 4), Rational::new(3, 4)))
        );
    }

    #[test]
    fn rev_reverses_each_cycle() {
        let p = seq_of(&["a", "b", "c", "d"]).rev();
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["d", "c", "b", "a"]);
        assert_eq!(
            starts(&events),
            vec![
                Rational::ZERO,
                Rational::new(1, 4),
                Rational::new(1, 2),
                Rational::new(3, 4)
            ]
        );
    }

    #[test]
    fn rev_twice_is_identity() {
        let p = seq_of(&["a", "b", "c"]);
        assert_eq!(
            p.query_arc(Rational::ZERO, Rational::int(2), &ctx()),
            p.rev().rev().query_arc(Rational::ZERO, Rational::int(2), &ctx())
        );
    }

    #[test]
    fn revv_mirrors_around_zero() {
        let p = seq_of(&["a", "b"]).revv();
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        // Cycle -1 of the source, mirrored: "b" first.
        assert_eq!(values(&events), vec!["b", "a"]);
        assert_eq!(
            p.revv().query_arc(Rational::ZERO, Rational::ONE, &ctx()),
            seq_of(&["a", "b"]).query_arc(Rational::ZERO, Rational::ONE, &ctx())
        );
    }

    #[test]
    fn zoom_stretches_the_window() {
        let p = seq_of(&["a", "b", "c", "d"]).zoom(Rational::new(1, 4), Rational::new(3, 4));
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["b", "c"]);
        assert_eq!(
            events[0].part,
            TimeSpan::new(Rational::ZERO, Rational::new(1, 2))
        );
    }

    #[test]
    fn focus_inverts_zoom() {
        let p = seq_of(&["a", "b"]);
        let s = Rational::new(1, 4);
        let e = Rational::new(1, 2);
        let roundtrip = p.focus(s, e).zoom(s, e);
        assert_eq!(
            p.query_arc(Rational::ZERO, Rational::ONE, &ctx()),
            roundtrip.query_arc(Rational::ZERO, Rational::ONE, &ctx())
        );
    }

    #[test]
    fn compress_places_the_cycle_in_a_window() {
        let p = seq_of(&["a", "b"]).compress(Rational::new(1, 4), Rational::new(3, 4));
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["a", "b"]);
        assert_eq!(
            events[0].part,
            TimeSpan::new(Rational::new(1, 4), Rational::new(1, 2))
        );
        assert_eq!(
            events[1].part,
            TimeSpan::new(Rational::new(1, 2), Rational::new(3, 4))
        );
    }

    #[test]
    fn compress_invalid_window_is_silence() {
        let p = seq_of(&["a"]).compress(Rational::new(3, 4), Rational::new(1, 4));
        assert!(p.query_arc(Rational::ZERO, Rational::ONE, &ctx()).is_empty());
    }

    #[test]
    fn fast_gap_leaves_the_tail_silent() {
        let p = seq_of(&["a", "b"]).fast_gap(Rational::int(2));
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["a", "b"]);
        assert_eq!(
            events[1].part,
            TimeSpan::new(Rational::new(1, 4), Rational::new(1, 2))
        );
        let second_half =
            p.query_arc(Rational::new(1, 2), Rational::ONE, &ctx());
        assert!(second_half.is_empty());
    }

    #[test]
    fn hurry_scales_the_speed_field() {
        let p = seq_of(&["a"]).hurry(Rational::int(2));
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].data.get("speed").and_then(|v| v.as_f64()),
            Some(2.0)
        );
    }

    #[test]
    fn pace_uses_declared_steps() {
        let p = seq_of(&["a", "b", "c", "d"]).pace(Rational::int(8));
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(events.len(), 8);
    }

    #[test]
    fn every_applies_on_matching_cycles() {
        let p = seq_of(&["a", "b"]).every(2, |p| p.rev());
        let cycle0 = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&cycle0), vec!["b", "a"]);
        let cycle1 = p.query_arc(Rational::ONE, Rational::int(2), &ctx());
        assert_eq!(values(&cycle1), vec!["a", "b"]);
    }

    #[test]
    fn iter_rotates_each_cycle() {
        let p = seq_of(&["a", "b", "c", "d"]).iter(4);
        let cycle0 = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&cycle0)[0], "a");
        let cycle1 = p.query_arc(Rational::ONE, Rational::int(2), &ctx());
        assert_eq!(values(&cycle1)[0], "b");
        let cycle3 = p.query_arc(Rational::int(3), Rational::int(4), &ctx());
        assert_eq!(values(&cycle3)[0], "d");
    }

    #[test]
    fn linger_repeats_the_head() {
        let p = seq_of(&["a", "b", "c", "d"]).linger(Rational::new(1, 2));
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn palindrome_alternates_direction() {
        let p = seq_of(&["a", "b"]).palindrome();
        let forward = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&forward), vec!["a", "b"]);
        let backward = p.query_arc(Rational::ONE, Rational::int(2), &ctx());
        assert_eq!(values(&backward), vec!["b", "a"]);
    }
}
