//! Continuous patterns and the range/context lift
//!
//! A continuous pattern has no discrete events: each query yields exactly one
//! event covering the span, its value computed from the span start and the
//! context. Unipolar signals rescale their natural `0..1` output by the
//! context's min/max; `range` and friends set those slots for their child.

use crate::context::QueryContext;
use crate::noise::{BerlinNoise, PerlinNoise};
use crate::pattern::{Event, Pattern, Query, TimeSpan};
use crate::rational::Rational;
use crate::value::{VoiceData, VoiceValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct ContinuousNode {
    f: Arc<dyn Fn(&TimeSpan, &QueryContext) -> VoiceValue + Send + Sync>,
}

impl Query for ContinuousNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let value = (self.f)(&span, ctx);
        vec![Event::new(
            Some(span),
            span,
            VoiceData::from_value(value),
        )]
    }
}

/// A continuous pattern from a span/context function.
pub fn continuous(
    f: impl Fn(&TimeSpan, &QueryContext) -> VoiceValue + Send + Sync + 'static,
) -> Pattern {
    Pattern::from_node(ContinuousNode { f: Arc::new(f) })
}

/// A signal sampled at the query start, rescaled by the context range.
pub fn signal(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Pattern {
    continuous(move |span, ctx| {
        VoiceValue::Float(ctx.scale_unipolar(f(span.begin.to_f64())))
    })
}

/// A constant-valued continuous pattern.
pub fn steady(value: impl Into<VoiceValue>) -> Pattern {
    let value = value.into();
    continuous(move |_, _| value.clone())
}

/// The identity signal: exact cycle time as a rational value.
pub fn time() -> Pattern {
    continuous(|span, _| VoiceValue::Rational(span.begin))
}

// ============= Periodic waves, phase 0 at cycle boundaries =============

pub fn sine() -> Pattern {
    signal(|t| ((t * std::f64::consts::TAU).sin() + 1.0) * 0.5)
}

pub fn cosine() -> Pattern {
    signal(|t| ((t * std::f64::consts::TAU).cos() + 1.0) * 0.5)
}

pub fn saw() -> Pattern {
    signal(|t| t.rem_euclid(1.0))
}

pub fn isaw() -> Pattern {
    signal(|t| 1.0 - t.rem_euclid(1.0))
}

pub fn tri() -> Pattern {
    signal(|t| {
        let phase = t.rem_euclid(1.0);
        if phase < 0.5 {
            phase * 2.0
        } else {
            2.0 - phase * 2.0
        }
    })
}

pub fn itri() -> Pattern {
    signal(|t| {
        let phase = t.rem_euclid(1.0);
        if phase < 0.5 {
            1.0 - phase * 2.0
        } else {
            phase * 2.0 - 1.0
        }
    })
}

pub fn square() -> Pattern {
    signal(|t| if t.rem_euclid(1.0) < 0.5 { 0.0 } else { 1.0 })
}

pub fn sine2() -> Pattern {
    to_bipolar(&sine())
}

pub fn cosine2() -> Pattern {
    to_bipolar(&cosine())
}

pub fn saw2() -> Pattern {
    to_bipolar(&saw())
}

pub fn isaw2() -> Pattern {
    to_bipolar(&isaw())
}

pub fn tri2() -> Pattern {
    to_bipolar(&tri())
}

pub fn itri2() -> Pattern {
    to_bipolar(&itri())
}

pub fn square2() -> Pattern {
    to_bipolar(&square())
}

// ============= Random signals =============

/// Uniform noise in the context range, quantised by the context granularity.
pub fn rand() -> Pattern {
    continuous(|span, ctx| VoiceValue::Float(ctx.scale_unipolar(ctx.draw(span.begin, "rand"))))
}

/// One uniform draw per integer cycle.
pub fn rand_cycle() -> Pattern {
    continuous(|span, ctx| {
        VoiceValue::Float(ctx.scale_unipolar(ctx.draw_cycle(span.begin.floor(), "randCycle")))
    })
}

/// Binary 0/1 at probability one half.
pub fn brand() -> Pattern {
    brand_by(0.5)
}

/// Binary 0/1 at probability `p`.
pub fn brand_by(p: f64) -> Pattern {
    continuous(move |span, ctx| {
        VoiceValue::Float(if ctx.draw(span.begin, "brand") < p {
            1.0
        } else {
            0.0
        })
    })
}

/// Uniform integer in `0..n`.
pub fn irand(n: i64) -> Pattern {
    if n <= 0 {
        return Pattern::silence();
    }
    continuous(move |span, ctx| {
        let draw = ctx.draw(span.begin, "irand");
        VoiceValue::int(((draw * n as f64) as i64).min(n - 1))
    })
}

/// Uniform integer in `0..n`, fixed per cycle.
pub fn rand_l(n: i64) -> Pattern {
    if n <= 0 {
        return Pattern::silence();
    }
    continuous(move |span, ctx| {
        let draw = ctx.draw_cycle(span.begin.floor(), "randL");
        VoiceValue::int(((draw * n as f64) as i64).min(n - 1))
    })
}

// ============= Noise =============

/// Smooth gradient noise over cycle time, one table per seed.
pub fn perlin() -> Pattern {
    let cache: Mutex<HashMap<u64, Arc<PerlinNoise>>> = Mutex::new(HashMap::new());
    continuous(move |span, ctx| {
        let seed = ctx.seed().unwrap_or(0) as u64;
        let noise = {
            let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            cache
                .entry(seed)
                .or_insert_with(|| Arc::new(PerlinNoise::new(seed)))
                .clone()
        };
        VoiceValue::Float(ctx.scale_unipolar(noise.at(span.begin.to_f64())))
    })
}

/// Cosine-interpolated value noise, one table per seed.
pub fn berlin() -> Pattern {
    let cache: Mutex<HashMap<u64, Arc<BerlinNoise>>> = Mutex::new(HashMap::new());
    continuous(move |span, ctx| {
        let seed = ctx.seed().unwrap_or(0) as u64;
        let noise = {
            let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            cache
                .entry(seed)
                .or_insert_with(|| Arc::new(BerlinNoise::new(seed)))
                .clone()
        };
        VoiceValue::Float(ctx.scale_unipolar(noise.at(span.begin.to_f64())))
    })
}

// ============= Range lifts =============

/// Unipolar value under the default range mapped onto `[-1, 1]`.
pub fn to_bipolar(p: &Pattern) -> Pattern {
    let hidden = p.with_context(|ctx| ctx.with_range(0.0, 1.0));
    hidden.map_data(|data, _| {
        let value = match data.value().as_f64() {
            Some(v) => VoiceValue::Float(v * 2.0 - 1.0),
            None => data.value(),
        };
        Some(data.with_value(value))
    })
}

/// Bipolar child folded into the *outer* context's range; the child itself
/// sees the default range, so nesting keeps observing the original bounds.
pub fn from_bipolar(p: &Pattern) -> Pattern {
    let hidden = p.with_context(|ctx| ctx.with_range(0.0, 1.0));
    hidden.map_data(|data, ctx| {
        let value = match data.value().as_f64() {
            Some(v) => VoiceValue::Float(ctx.scale_unipolar((v + 1.0) * 0.5)),
            None => data.value(),
        };
        Some(data.with_value(value))
    })
}

impl Pattern {
    /// Rescale downstream unipolar signals into `[lo, hi]`.
    pub fn range(&self, lo: f64, hi: f64) -> Pattern {
        self.with_context(move |ctx| ctx.with_range(lo, hi))
    }

    /// Exponential range: the child scales between the logarithms and the
    /// result is exponentiated, for frequency-like parameters.
    pub fn rangex(&self, lo: f64, hi: f64) -> Pattern {
        if lo <= 0.0 || hi <= 0.0 {
            tracing::debug!(lo, hi, "rangex with non-positive bound, yielding silence");
            return Pattern::silence();
        }
        let scaled = self.with_context(move |ctx| ctx.with_range(lo.ln(), hi.ln()));
        scaled.map_data(|data, _| {
            let value = match data.value().as_f64() {
                Some(v) => VoiceValue::Float(v.exp()),
                None => data.value(),
            };
            Some(data.with_value(value))
        })
    }

    /// Range for bipolar sources: `from_bipolar` composed with `range`.
    pub fn range2(&self, lo: f64, hi: f64) -> Pattern {
        from_bipolar(self).range(lo, hi)
    }

    /// Quantise downstream random draws to `g` cycles.
    pub fn granularity(&self, g: Rational) -> Pattern {
        self.with_context(move |ctx| ctx.with_granularity(g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> QueryContext {
        QueryContext::new()
    }

    fn value_at(p: &Pattern, t: Rational) -> f64 {
        p.sample_at(t, &ctx())
            .and_then(|e| e.value().as_f64())
            .unwrap()
    }

    #[test]
    fn continuous_covers_the_query_span() {
        let p = steady(VoiceValue::Float(0.25));
        let events = p.query_arc(Rational::ZERO, Rational::new(3, 2), &ctx());
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].part,
            TimeSpan::new(Rational::ZERO, Rational::new(3, 2))
        );
        assert_eq!(events[0].whole, Some(events[0].part));
    }

    #[test]
    fn waves_hit_their_landmarks() {
        assert!((value_at(&sine(), Rational::ZERO) - 0.5).abs() < 1e-9);
        assert!((value_at(&sine(), Rational::new(1, 4)) - 1.0).abs() < 1e-9);
        assert!((value_at(&saw(), Rational::new(1, 2)) - 0.5).abs() < 1e-9);
        assert!((value_at(&isaw(), Rational::new(1, 4)) - 0.75).abs() < 1e-9);
        assert!((value_at(&tri(), Rational::new(1, 2)) - 1.0).abs() < 1e-9);
        assert_eq!(value_at(&square(), Rational::ZERO), 0.0);
        assert_eq!(value_at(&square(), Rational::new(1, 2)), 1.0);
    }

    #[test]
    fn bipolar_forms_are_shifted_and_doubled() {
        assert!((value_at(&sine2(), Rational::ZERO) - 0.0).abs() < 1e-9);
        assert!((value_at(&sine2(), Rational::new(1, 4)) - 1.0).abs() < 1e-9);
        assert!((value_at(&saw2(), Rational::ZERO) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn range_rescales_signals() {
        let p = saw().range(10.0, 20.0);
        assert!((value_at(&p, Rational::new(1, 2)) - 15.0).abs() < 1e-9);
        let x = rand().range(5.0, 6.0);
        let v = value_at(&x, Rational::new(1, 8));
        assert!((5.0..=6.0).contains(&v));
    }

    #[test]
    fn rangex_is_exponential() {
        let p = saw().rangex(1.0, std::f64::consts::E.powi(2));
        // Halfway between ln(1)=0 and 2 is 1; exp(1) = e.
        assert!((value_at(&p, Rational::new(1, 2)) - std::f64::consts::E).abs() < 1e-9);
    }

    #[test]
    fn range2_folds_bipolar_sources() {
        let p = sine2().range2(0.0, 10.0);
        assert!((value_at(&p, Rational::new(1, 4)) - 10.0).abs() < 1e-9);
        assert!((value_at(&p, Rational::ZERO) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn rand_is_deterministic_and_granular() {
        let p = rand().granularity(Rational::new(1, 4));
        let a = value_at(&p.seed(3), Rational::new(1, 16));
        let b = value_at(&p.seed(3), Rational::new(3, 16));
        assert_eq!(a, b);
        let c = value_at(&p.seed(3), Rational::new(5, 16));
        assert_ne!(a, c);
    }

    #[test]
    fn rand_cycle_holds_for_the_whole_cycle() {
        let p = rand_cycle().seed(1);
        let a = value_at(&p, Rational::new(1, 8));
        let b = value_at(&p, Rational::new(7, 8));
        assert_eq!(a, b);
        let next = value_at(&p, Rational::new(9, 8));
        assert_ne!(a, next);
    }

    #[test]
    fn irand_stays_in_bounds() {
        let p = irand(8);
        for i in 0..32 {
            let v = value_at(&p, Rational::new(i, 32));
            assert!((0.0..8.0).contains(&v));
            assert_eq!(v.fract(), 0.0);
        }
    }

    #[test]
    fn perlin_is_smooth_and_seeded() {
        let p = perlin();
        let a = value_at(&p.seed(4), Rational::new(1, 3));
        let b = value_at(&p.seed(4), Rational::new(1, 3));
        assert_eq!(a, b);
        let near = value_at(&p.seed(4), Rational::new(34, 100));
        assert!((a - near).abs() < 0.2);
    }

    #[test]
    fn brand_is_binary() {
        let p = brand_by(0.5).seed(2);
        for i in 0..16 {
            let v = value_at(&p, Rational::new(i, 16));
            assert!(v == 0.0 || v == 1.0);
        }
    }
}
