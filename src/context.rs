//! Query context and deterministic random streams
//!
//! Every query carries an immutable context: the random seed, the active
//! value range for continuous signals, and the time granularity used to
//! quantise random draws. Children never observe mutation of a parent's
//! context; combinators build modified copies.

use crate::rational::Rational;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    seed: Option<i64>,
    min: f64,
    max: f64,
    granularity: Rational,
}

impl Default for QueryContext {
    fn default() -> Self {
        QueryContext {
            seed: None,
            min: 0.0,
            max: 1.0,
            granularity: Rational::ONE,
        }
    }
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self) -> Option<i64> {
        self.seed
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn granularity(&self) -> Rational {
        self.granularity
    }

    pub fn with_seed(&self, seed: i64) -> Self {
        QueryContext {
            seed: Some(seed),
            ..self.clone()
        }
    }

    pub fn without_seed(&self) -> Self {
        QueryContext {
            seed: None,
            ..self.clone()
        }
    }

    pub fn with_range(&self, min: f64, max: f64) -> Self {
        QueryContext {
            min,
            max,
            ..self.clone()
        }
    }

    pub fn with_granularity(&self, granularity: Rational) -> Self {
        QueryContext {
            granularity,
            ..self.clone()
        }
    }

    /// Rescale a unipolar `0..1` sample into the active range.
    pub fn scale_unipolar(&self, x: f64) -> f64 {
        self.min + x * (self.max - self.min)
    }

    /// Time quantised to the context granularity (identity for granularity 0).
    pub fn quantise(&self, t: Rational) -> Rational {
        if self.granularity.is_zero() {
            return t;
        }
        let steps = (t / self.granularity).floor();
        self.granularity * Rational::int(steps)
    }

    /// Derive the deterministic stream for `(seed, salt, quantised time)`.
    /// Equal inputs give bit-identical streams, which is what makes degrade
    /// and its complement line up and re-queries reproducible.
    pub fn rng(&self, t: Rational, salt: &str) -> StdRng {
        let q = self.quantise(t);
        let mut h = self.seed.unwrap_or(0) as u64;
        h = splitmix64(h ^ fnv64(salt.as_bytes()));
        h = splitmix64(h ^ q.numerator() as u64);
        h = splitmix64(h ^ q.denominator() as u64);
        StdRng::seed_from_u64(h)
    }

    /// One uniform draw in `[0, 1)` from the derived stream.
    pub fn draw(&self, t: Rational, salt: &str) -> f64 {
        use rand::Rng;
        self.rng(t, salt).gen::<f64>()
    }

    /// Per-cycle draw: seeded from the cycle number regardless of granularity.
    pub fn draw_cycle(&self, cycle: i64, salt: &str) -> f64 {
        use rand::Rng;
        let mut h = self.seed.unwrap_or(0) as u64;
        h = splitmix64(h ^ fnv64(salt.as_bytes()));
        h = splitmix64(h ^ cycle as u64);
        StdRng::seed_from_u64(h).gen::<f64>()
    }

    /// Per-cycle stream, for permutations and weighted picks.
    pub fn rng_cycle(&self, cycle: i64, salt: &str) -> StdRng {
        let mut h = self.seed.unwrap_or(0) as u64;
        h = splitmix64(h ^ fnv64(salt.as_bytes()));
        h = splitmix64(h ^ cycle as u64);
        StdRng::seed_from_u64(h)
    }
}

pub(crate) fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub(crate) fn fnv64(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xCBF2_9CE4_8422_2325;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01B3);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let ctx = QueryContext::new();
        assert_eq!(ctx.seed(), None);
        assert_eq!(ctx.min(), 0.0);
        assert_eq!(ctx.max(), 1.0);
        assert_eq!(ctx.granularity(), Rational::ONE);
    }

    #[test]
    fn builders_do_not_mutate_parent() {
        let parent = QueryContext::new();
        let child = parent.with_seed(7).with_range(-1.0, 1.0);
        assert_eq!(parent.seed(), None);
        assert_eq!(parent.min(), 0.0);
        assert_eq!(child.seed(), Some(7));
        assert_eq!(child.min(), -1.0);
    }

    #[test]
    fn draws_are_deterministic_per_seed_salt_time() {
        let ctx = QueryContext::new().with_seed(1);
        let t = Rational::new(3, 2);
        assert_eq!(ctx.draw(t, "degrade"), ctx.draw(t, "degrade"));
        assert_ne!(ctx.draw(t, "degrade"), ctx.draw(t, "rand"));
        assert_ne!(
            ctx.draw(t, "degrade"),
            ctx.with_seed(2).draw(t, "degrade")
        );
    }

    #[test]
    fn granularity_quantises_time() {
        let ctx = QueryContext::new().with_granularity(Rational::new(1, 4));
        assert_eq!(ctx.quantise(Rational::new(3, 8)), Rational::new(1, 4));
        assert_eq!(
            ctx.draw(Rational::new(3, 8), "rand"),
            ctx.draw(Rational::new(5, 16), "rand")
        );
    }
}
