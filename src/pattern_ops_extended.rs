//! Arrangement, placement and step-wise operators
//!
//! Absolute-time arrangement, window placement for stack alignment, the ply
//! family, bite/segment slicing and the step-count operators.

use crate::context::QueryContext;
use crate::pattern::{Event, Pattern, Query, TimeSpan};
use crate::rational::Rational;
use crate::value::VoiceValue;

/// Plays segments end-to-end in absolute time; nothing repeats and queries
/// outside a segment's span return nothing.
struct ArrangementNode {
    segments: Vec<(Rational, Rational, Pattern)>, // (start, duration, pattern)
}

impl Query for ArrangementNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let mut events = Vec::new();
        for (start, duration, pattern) in &self.segments {
            let window = TimeSpan::new(*start, *start + *duration);
            let clip = match span.intersect(&window) {
                Some(c) if !c.is_empty() => c,
                _ => continue,
            };
            // The segment's pattern starts from its own time zero.
            let shift = *start;
            for event in pattern.query_span(clip.shift(-shift), ctx) {
                events.push(event.map_spans(|s| s.shift(shift)));
            }
        }
        events
    }
}

/// Plays `window` cycles of the source at `offset` inside every `period`
/// cycles, restarting the source each repetition; silence elsewhere.
struct PlaceNode {
    source: Pattern,
    offset: Rational,
    window: Rational,
    period: Rational,
}

impl Query for PlaceNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let period = self.period;
        let first = (span.begin / period).floor();
        let last = (span.end / period).ceil();
        let mut events = Vec::new();
        for k in first..last {
            let base = period * Rational::int(k) + self.offset;
            let window = TimeSpan::new(base, base + self.window);
            let clip = match span.intersect(&window) {
                Some(c) if !c.is_empty() => c,
                _ => continue,
            };
            for event in self.source.query_span(clip.shift(-base), ctx) {
                events.push(event.map_spans(|s| s.shift(base)));
            }
        }
        events
    }
}

impl Pattern {
    /// Play `(cycles, pattern)` segments end-to-end in absolute time.
    pub fn arrangement(segments: Vec<(Rational, Pattern)>) -> Pattern {
        let mut placed = Vec::new();
        let mut start = Rational::ZERO;
        for (duration, pattern) in segments {
            if duration <= Rational::ZERO {
                continue;
            }
            placed.push((start, duration, pattern));
            start = start + duration;
        }
        if placed.is_empty() {
            return Pattern::silence();
        }
        Pattern::from_node(ArrangementNode { segments: placed }).with_cycles(start)
    }

    // ============= Stack alignment =============

    /// Stack children, placing shorter ones at fraction `alpha` of the
    /// longest child's natural duration; 0 aligns starts, 1 aligns ends.
    pub fn stack_by(children: Vec<Pattern>, alpha: f64) -> Pattern {
        let children: Vec<Pattern> = children
            .into_iter()
            .filter(|c| !c.is_identity_silence())
            .collect();
        if children.is_empty() {
            return Pattern::silence();
        }
        let longest = children
            .iter()
            .map(|c| c.estimate_cycle_duration())
            .fold(Rational::ONE, Rational::max);
        let alpha = Rational::approx(alpha.clamp(0.0, 1.0));
        let aligned = children
            .into_iter()
            .map(|child| {
                let d = child.estimate_cycle_duration();
                if d >= longest {
                    return child;
                }
                let offset = alpha * (longest - d);
                Pattern::from_node(PlaceNode {
                    source: child,
                    offset,
                    window: d,
                    period: longest,
                })
                .with_cycles(longest)
            })
            .collect();
        Pattern::stack(aligned)
    }

    pub fn stack_left(children: Vec<Pattern>) -> Pattern {
        Pattern::stack_by(children, 0.0)
    }

    pub fn stack_right(children: Vec<Pattern>) -> Pattern {
        Pattern::stack_by(children, 1.0)
    }

    pub fn stack_centre(children: Vec<Pattern>) -> Pattern {
        Pattern::stack_by(children, 0.5)
    }

    // ============= Cycle-bounded playback =============

    /// Keep only events beginning before cycle `n`.
    pub fn take(&self, n: Rational) -> Pattern {
        self.filter_events(move |e, _| e.begin() < n)
    }

    /// Play the first `r` cycles, then silence forever.
    pub fn repeat_cycles(&self, r: i64) -> Pattern {
        let source = self.clone();
        Pattern::per_cycle(move |cycle, _| {
            if (0..r).contains(&cycle) {
                source.clone()
            } else {
                Pattern::silence()
            }
        })
        .with_steps(self.num_steps())
    }

    /// Skip the first `n` steps and stretch the remainder over the cycle.
    pub fn drop_steps(&self, n: Rational) -> Pattern {
        let steps = match self.num_steps() {
            Some(s) if !s.is_zero() => s,
            _ => {
                tracing::debug!("drop on a pattern without steps, yielding silence");
                return Pattern::silence();
            }
        };
        if n <= Rational::ZERO {
            return self.clone();
        }
        if n >= steps {
            return Pattern::silence();
        }
        self.zoom(n / steps, Rational::ONE)
            .with_steps(Some(steps - n))
    }

    // ============= Ply =============

    /// Re-emit each event as `n` equal copies inside its span.
    pub fn ply(&self, n: i64) -> Pattern {
        if n <= 0 {
            return Pattern::silence();
        }
        self.bind_squeeze(move |e| {
            Some(Pattern::atom_infinite(e.data.clone()).fast(Rational::int(n)))
        })
        .with_steps(self.num_steps().map(|s| s * Rational::int(n)))
    }

    /// As `ply`, copy `i` being `f` applied `i` times; copy 0 is untouched.
    pub fn ply_with(
        &self,
        n: i64,
        f: impl Fn(&Event) -> Event + Send + Sync + 'static,
    ) -> Pattern {
        if n <= 0 {
            return Pattern::silence();
        }
        self.bind_squeeze(move |e| {
            let mut current = e.clone();
            let mut steps = Vec::with_capacity(n as usize);
            for i in 0..n {
                if i > 0 {
                    current = f(&current);
                }
                steps.push(Pattern::atom(current.data.clone()));
            }
            Some(Pattern::sequence(steps))
        })
    }

    /// As `ply`, copy `i` being `f(event, i)`; the index is zero-based.
    pub fn ply_for_each(
        &self,
        n: i64,
        f: impl Fn(&Event, i64) -> Event + Send + Sync + 'static,
    ) -> Pattern {
        if n <= 0 {
            return Pattern::silence();
        }
        self.bind_squeeze(move |e| {
            let steps = (0..n)
                .map(|i| {
                    let data = if i == 0 {
                        e.data.clone()
                    } else {
                        f(e, i).data
                    };
                    Pattern::atom(data)
                })
                .collect();
            Some(Pattern::sequence(steps))
        })
    }

    // ============= Slicing =============

    /// Slice the pattern into `n` parts; the selector pattern picks which
    /// slice plays in each of its events.
    pub fn bite(&self, n: i64, selector: &Pattern) -> Pattern {
        if n <= 0 {
            return Pattern::silence();
        }
        let source = self.clone();
        selector.bind_squeeze(move |e| {
            let index = e.value().as_i64()?.rem_euclid(n);
            Some(source.zoom(
                Rational::new(index, n),
                Rational::new(index + 1, n),
            ))
        })
    }

    /// Discretise into `n` events per cycle, sampling the source at each
    /// step start.
    pub fn segment(&self, n: i64) -> Pattern {
        if n <= 0 {
            return Pattern::silence();
        }
        let trigger = Pattern::pure(VoiceValue::int(1)).fast(Rational::int(n));
        trigger
            .app_left(self, |_, sampled| Some(sampled.clone()))
            .with_steps(Some(Rational::int(n)))
    }
}

/// A step ramp: the integers `0..n` as one cycle.
pub fn run(n: i64) -> Pattern {
    if n <= 0 {
        return Pattern::silence();
    }
    Pattern::sequence((0..n).map(Pattern::pure).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{seq_of, values};

    fn ctx() -> QueryContext {
        QueryContext::new()
    }

    #[test]
    fn arrangement_is_absolute_and_finite() {
        let p = Pattern::arrangement(vec![
            (Rational::int(1), seq_of(&["a", "b"])),
            (Rational::int(2), Pattern::pure("c")),
        ]);
        let events = p.query_arc(Rational::ZERO, Rational::int(4), &ctx());
        assert_eq!(values(&events), vec!["a", "b", "c", "c"]);
        // Nothing after the last segment.
        assert!(p
            .query_arc(Rational::int(3), Rational::int(5), &ctx())
            .is_empty());
        assert_eq!(p.estimate_cycle_duration(), Rational::int(3));
    }

    #[test]
    fn take_cuts_at_the_limit() {
        let p = seq_of(&["a", "b"]).take(Rational::new(1, 2));
        let events = p.query_arc(Rational::ZERO, Rational::int(2), &ctx());
        assert_eq!(values(&events), vec!["a"]);
    }

    #[test]
    fn repeat_cycles_goes_silent() {
        let p = Pattern::pure("x").repeat_cycles(2);
        assert_eq!(
            p.query_arc(Rational::ZERO, Rational::int(2), &ctx()).len(),
            2
        );
        assert!(p
            .query_arc(Rational::int(2), Rational::int(5), &ctx())
            .is_empty());
    }

    #[test]
    fn drop_steps_rescales_the_tail() {
        let p = seq_of(&["a", "b", "c", "d"]).drop_steps(Rational::int(1));
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["b", "c", "d"]);
        assert_eq!(
            events[0].part,
            TimeSpan::new(Rational::ZERO, Rational::new(1, 3))
        );
        assert_eq!(p.num_steps(), Some(Rational::int(3)));
        // No declared steps: silence.
        let no_steps = Pattern::pure("x").with_steps(None).drop_steps(Rational::int(1));
        assert!(no_steps
            .query_arc(Rational::ZERO, Rational::ONE, &ctx())
            .is_empty());
    }

    #[test]
    fn ply_subdivides_each_event() {
        let p = seq_of(&["a", "b"]).ply(3);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["a", "a", "a", "b", "b", "b"]);
        assert_eq!(
            events[1].part,
            TimeSpan::new(Rational::new(1, 6), Rational::new(2, 6))
        );
        assert_eq!(events[1].whole, Some(events[1].part));
    }

    #[test]
    fn ply_for_each_indexes_copies() {
        let p = seq_of(&["a"]).ply_for_each(2, |e, i| {
            e.with_data(e.data.with_field("echo", i))
        });
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(events.len(), 2);
        assert!(events[0].data.get("echo").is_none());
        assert_eq!(events[1].data.get("echo"), Some(&VoiceValue::int(1)));
    }

    #[test]
    fn bite_plays_selected_slices() {
        let source = seq_of(&["a", "b", "c", "d"]);
        let selector = Pattern::sequence(vec![Pattern::pure(2i64), Pattern::pure(0i64)]);
        let p = source.bite(4, &selector);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["c", "a"]);
        assert_eq!(
            events[0].part,
            TimeSpan::new(Rational::ZERO, Rational::new(1, 2))
        );
    }

    #[test]
    fn segment_discretises() {
        let p = seq_of(&["a", "b"]).segment(4);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["a", "a", "b", "b"]);
        assert_eq!(
            events[1].part,
            TimeSpan::new(Rational::new(1, 4), Rational::new(1, 2))
        );
    }

    #[test]
    fn run_counts_steps() {
        let events = run(4).query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn stack_alignment_places_short_patterns() {
        let long = Pattern::slowcat(vec![Pattern::pure("l1"), Pattern::pure("l2")]);
        let short = Pattern::pure("s");
        let p = Pattern::stack_right(vec![long.clone(), short.clone()]);
        // Period is 2 cycles; the short child plays only in the second.
        let first = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&first), vec!["l1"]);
        let second = p.query_arc(Rational::ONE, Rational::int(2), &ctx());
        assert_eq!(values(&second), vec!["l2", "s"]);

        let left = Pattern::stack_left(vec![long, short]);
        let first = left.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&first), vec!["l1", "s"]);
    }
}
