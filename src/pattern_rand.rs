//! Degradation, probabilistic application and selection
//!
//! Every draw here comes from the query context's seeded streams, so equal
//! seeds give bit-identical results and `degrade_by`/`undegrade_by` are
//! exact complements of one another.

use crate::pattern::Pattern;
use crate::pattern_signal::{continuous, irand};
use crate::rational::Rational;
use crate::value::VoiceValue;
use rand::seq::SliceRandom;

const DEGRADE_SALT: &str = "degrade";
const SOME_CYCLES_SALT: &str = "someCycles";
const CHOOSE_SALT: &str = "choose";
const CHOOSE_CYCLES_SALT: &str = "chooseCycles";
const RANDRUN_SALT: &str = "randrun";

impl Pattern {
    // ============= Degradation =============

    /// Keep an event when its draw is at least `x`; drops roughly `x` of
    /// the events.
    pub fn degrade_by(&self, x: f64) -> Pattern {
        self.filter_events(move |e, ctx| ctx.draw(e.begin(), DEGRADE_SALT) >= x)
    }

    /// The exact complement of `degrade_by` under the same seed.
    pub fn undegrade_by(&self, x: f64) -> Pattern {
        self.filter_events(move |e, ctx| ctx.draw(e.begin(), DEGRADE_SALT) < x)
    }

    pub fn degrade(&self) -> Pattern {
        self.degrade_by(0.5)
    }

    /// As `degrade_by`, drawing randomness from `with` instead of the
    /// context stream.
    pub fn degrade_by_with(&self, with: &Pattern, x: f64) -> Pattern {
        self.app_left(with, move |data, ctl| {
            let draw = ctl.value().as_f64()?;
            (draw >= x).then(|| data.clone())
        })
    }

    pub fn undegrade_by_with(&self, with: &Pattern, x: f64) -> Pattern {
        self.app_left(with, move |data, ctl| {
            let draw = ctl.value().as_f64()?;
            (draw < x).then(|| data.clone())
        })
    }

    // ============= Probabilistic application =============

    /// Apply `f` to the events whose per-event draw is below `p`; the rest
    /// pass through unchanged.
    pub fn sometimes_by(
        &self,
        p: f64,
        f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static,
    ) -> Pattern {
        let untouched = self.degrade_by(p);
        let transformed = f(self.undegrade_by(p));
        Pattern::stack(vec![untouched, transformed])
    }

    pub fn sometimes(&self, f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static) -> Pattern {
        self.sometimes_by(0.5, f)
    }

    pub fn often(&self, f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static) -> Pattern {
        self.sometimes_by(0.75, f)
    }

    pub fn rarely(&self, f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static) -> Pattern {
        self.sometimes_by(0.25, f)
    }

    pub fn almost_always(
        &self,
        f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static,
    ) -> Pattern {
        self.sometimes_by(0.9, f)
    }

    pub fn almost_never(
        &self,
        f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static,
    ) -> Pattern {
        self.sometimes_by(0.1, f)
    }

    pub fn never(&self, _f: impl Fn(Pattern) -> Pattern) -> Pattern {
        self.clone()
    }

    pub fn always(&self, f: impl Fn(Pattern) -> Pattern) -> Pattern {
        f(self.clone())
    }

    /// One decision per cycle: all of a cycle's events are transformed or
    /// none are.
    pub fn some_cycles_by(
        &self,
        p: f64,
        f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static,
    ) -> Pattern {
        let plain = self.clone();
        let transformed = f(self.clone());
        Pattern::per_cycle(move |cycle, ctx| {
            if ctx.draw_cycle(cycle, SOME_CYCLES_SALT) < p {
                transformed.clone()
            } else {
                plain.clone()
            }
        })
        .with_steps(self.num_steps())
    }

    pub fn some_cycles(&self, f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static) -> Pattern {
        self.some_cycles_by(0.5, f)
    }

    // ============= Slicing permutations =============

    /// Slice into `n` parts and play them in a fresh random order each cycle.
    pub fn shuffle(&self, n: i64) -> Pattern {
        self.bite(n, &randrun(n))
    }

    /// Slice into `n` parts and pick `n` slices with replacement each cycle.
    pub fn scramble(&self, n: i64) -> Pattern {
        self.bite(n, &irand(n).segment(n))
    }
}

// ============= Selection =============

/// A continuous pattern choosing uniformly among `values`.
pub fn choose(values: Vec<VoiceValue>) -> Pattern {
    if values.is_empty() {
        return Pattern::silence();
    }
    continuous(move |span, ctx| {
        let draw = ctx.draw(ctx.quantise(span.begin), CHOOSE_SALT);
        let index = ((draw * values.len() as f64) as usize).min(values.len() - 1);
        values[index].clone()
    })
}

/// Weighted continuous choice.
pub fn wchoose(pairs: Vec<(VoiceValue, f64)>) -> Pattern {
    let pairs: Vec<(VoiceValue, f64)> = pairs
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .collect();
    if pairs.is_empty() {
        return Pattern::silence();
    }
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    continuous(move |span, ctx| {
        let mut draw = ctx.draw(ctx.quantise(span.begin), CHOOSE_SALT) * total;
        for (value, weight) in &pairs {
            if draw < *weight {
                return value.clone();
            }
            draw -= weight;
        }
        pairs[pairs.len() - 1].0.clone()
    })
}

/// Structure from the selector: its unipolar values index into `values`.
pub fn choose_with(selector: &Pattern, values: Vec<VoiceValue>) -> Pattern {
    if values.is_empty() {
        return Pattern::silence();
    }
    selector.map_value(move |v| {
        let draw = v.as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
        let index = ((draw * values.len() as f64) as usize).min(values.len() - 1);
        values[index].clone()
    })
}

/// Structure from the chosen pattern: the selector's value picks which
/// pattern each of its events binds into.
pub fn choose_in_with(selector: &Pattern, patterns: Vec<Pattern>) -> Pattern {
    if patterns.is_empty() {
        return Pattern::silence();
    }
    selector.bind(move |e| {
        let draw = e.value().as_f64()?.clamp(0.0, 1.0);
        let index = ((draw * patterns.len() as f64) as usize).min(patterns.len() - 1);
        Some(patterns[index].clone())
    })
}

/// One whole cycle of one of `patterns`, chosen per cycle.
pub fn choose_cycles(patterns: Vec<Pattern>) -> Pattern {
    if patterns.is_empty() {
        return Pattern::silence();
    }
    Pattern::per_cycle(move |cycle, ctx| {
        let draw = ctx.draw_cycle(cycle, CHOOSE_CYCLES_SALT);
        let index = ((draw * patterns.len() as f64) as usize).min(patterns.len() - 1);
        patterns[index].clone()
    })
}

/// Weighted per-cycle choice.
pub fn wchoose_cycles(pairs: Vec<(Pattern, f64)>) -> Pattern {
    let pairs: Vec<(Pattern, f64)> = pairs
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .collect();
    if pairs.is_empty() {
        return Pattern::silence();
    }
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    Pattern::per_cycle(move |cycle, ctx| {
        let mut draw = ctx.draw_cycle(cycle, CHOOSE_CYCLES_SALT) * total;
        for (pattern, weight) in &pairs {
            if draw < *weight {
                return pattern.clone();
            }
            draw -= weight;
        }
        pairs[pairs.len() - 1].0.clone()
    })
}

/// A fresh random permutation of `0..n` as `n` steps, per cycle.
pub fn randrun(n: i64) -> Pattern {
    if n <= 0 {
        return Pattern::silence();
    }
    Pattern::per_cycle(move |cycle, ctx| {
        let mut order: Vec<i64> = (0..n).collect();
        let mut rng = ctx.rng_cycle(cycle, RANDRUN_SALT);
        order.shuffle(&mut rng);
        Pattern::sequence(order.into_iter().map(Pattern::pure).collect())
    })
    .with_steps(Some(Rational::int(n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryContext;
    use crate::test_utils::{seq_of, values};
    use std::collections::HashSet;

    fn ctx() -> QueryContext {
        QueryContext::new()
    }

    #[test]
    fn degrade_is_deterministic_per_seed() {
        let p = seq_of(&["a", "b", "c", "d", "e", "f", "g", "h"]).degrade_by(0.5);
        let seeded = p.seed(1);
        let first = seeded.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        let second = seeded.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(first, second);

        let other_seed = p.seed(2).query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_ne!(values(&first), values(&other_seed));
    }

    #[test]
    fn degrade_and_undegrade_partition_the_events() {
        let p = seq_of(&["a", "b", "c", "d", "e", "f", "g", "h"]);
        let kept = p.degrade_by(0.5).seed(42);
        let dropped = p.undegrade_by(0.5).seed(42);
        let all: Vec<String> = values(&p.query_arc(Rational::ZERO, Rational::ONE, &ctx()));
        let kept_vals = values(&kept.query_arc(Rational::ZERO, Rational::ONE, &ctx()));
        let dropped_vals = values(&dropped.query_arc(Rational::ZERO, Rational::ONE, &ctx()));
        let mut union: Vec<String> = kept_vals.clone();
        union.extend(dropped_vals.clone());
        union.sort();
        let mut expected = all;
        expected.sort();
        assert_eq!(union, expected);
        let overlap: HashSet<_> = kept_vals.iter().collect();
        assert!(dropped_vals.iter().all(|v| !overlap.contains(v)));
    }

    #[test]
    fn sometimes_by_keeps_every_event_once() {
        let p = seq_of(&["a", "b", "c", "d"]).sometimes_by(0.5, |p| {
            p.map_data(|d, _| Some(d.with_field("hit", 1i64)))
        });
        let events = p
            .seed(9)
            .query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(events.len(), 4);
        // With probability strictly between 0 and 1 and four events, both
        // branches are generally populated; at minimum the union is stable.
        let marked = events
            .iter()
            .filter(|e| e.data.get("hit").is_some())
            .count();
        assert!(marked <= 4);
    }

    #[test]
    fn never_and_always_are_the_endpoints() {
        let p = seq_of(&["a", "b"]);
        assert_eq!(
            values(&p.never(|q| q.rev()).query_arc(Rational::ZERO, Rational::ONE, &ctx())),
            vec!["a", "b"]
        );
        assert_eq!(
            values(&p.always(|q| q.rev()).query_arc(Rational::ZERO, Rational::ONE, &ctx())),
            vec!["b", "a"]
        );
    }

    #[test]
    fn some_cycles_decides_per_cycle() {
        let p = seq_of(&["a", "b"]).some_cycles_by(0.5, |p| {
            p.map_data(|d, _| Some(d.with_field("hit", 1i64)))
        });
        let seeded = p.seed(3);
        for cycle in 0..8 {
            let events =
                seeded.query_arc(Rational::int(cycle), Rational::int(cycle + 1), &ctx());
            let marked = events
                .iter()
                .filter(|e| e.data.get("hit").is_some())
                .count();
            assert!(marked == 0 || marked == events.len());
        }
    }

    #[test]
    fn randrun_is_a_permutation_every_cycle() {
        let p = randrun(4).seed(5);
        for cycle in 0..4 {
            let events = p.query_arc(Rational::int(cycle), Rational::int(cycle + 1), &ctx());
            let mut seen: Vec<i64> = events
                .iter()
                .filter_map(|e| e.value().as_i64())
                .collect();
            seen.sort();
            assert_eq!(seen, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn shuffle_reorders_whole_slices() {
        let p = seq_of(&["a", "b", "c", "d"]).shuffle(4).seed(7);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        let mut names = values(&events);
        names.sort();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn choose_cycles_is_stable_within_a_cycle() {
        let p = choose_cycles(vec![Pattern::pure("x"), Pattern::pure("y")]).seed(11);
        let a = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        let b = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn choose_with_follows_selector_structure() {
        let selector = Pattern::sequence(vec![Pattern::pure(0.0), Pattern::pure(0.99)]);
        let p = choose_with(&selector, vec!["lo".into(), "hi".into()]);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["lo", "hi"]);
    }
}
