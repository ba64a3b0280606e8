//! Seeded smooth-noise generators
//!
//! One-dimensional gradient noise (Perlin) and cosine-interpolated value
//! noise (Berlin). Tables are built once per seed and read-only afterwards,
//! so instances are safe to share across queries.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TABLE_SIZE: usize = 256;

fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Classic 1D gradient noise, unipolar output.
pub struct PerlinNoise {
    perm: [u8; TABLE_SIZE],
    grads: [f64; TABLE_SIZE],
}

impl PerlinNoise {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut perm = [0u8; TABLE_SIZE];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = i as u8;
        }
        for i in (1..TABLE_SIZE).rev() {
            let j = rng.gen_range(0..=i);
            perm.swap(i, j);
        }
        let mut grads = [0.0; TABLE_SIZE];
        for g in grads.iter_mut() {
            *g = rng.gen_range(-1.0..=1.0);
        }
        PerlinNoise { perm, grads }
    }

    fn gradient(&self, lattice: i64) -> f64 {
        let index = self.perm[lattice.rem_euclid(TABLE_SIZE as i64) as usize];
        self.grads[index as usize]
    }

    /// Noise value at `t`, in `[0, 1]`; zero-centred before normalisation.
    pub fn at(&self, t: f64) -> f64 {
        let x0 = t.floor();
        let d0 = t - x0;
        let g0 = self.gradient(x0 as i64);
        let g1 = self.gradient(x0 as i64 + 1);
        let value = lerp(g0 * d0, g1 * (d0 - 1.0), fade(d0));
        (value + 0.5).clamp(0.0, 1.0)
    }
}

/// Value noise with cosine interpolation, unipolar output.
pub struct BerlinNoise {
    perm: [u8; TABLE_SIZE],
    values: [f64; TABLE_SIZE],
}

impl BerlinNoise {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut perm = [0u8; TABLE_SIZE];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = i as u8;
        }
        for i in (1..TABLE_SIZE).rev() {
            let j = rng.gen_range(0..=i);
            perm.swap(i, j);
        }
        let mut values = [0.0; TABLE_SIZE];
        for v in values.iter_mut() {
            *v = rng.gen_range(0.0..=1.0);
        }
        BerlinNoise { perm, values }
    }

    fn value(&self, lattice: i64) -> f64 {
        let index = self.perm[lattice.rem_euclid(TABLE_SIZE as i64) as usize];
        self.values[index as usize]
    }

    pub fn at(&self, t: f64) -> f64 {
        let x0 = t.floor();
        let d0 = t - x0;
        let v0 = self.value(x0 as i64);
        let v1 = self.value(x0 as i64 + 1);
        let u = (1.0 - (std::f64::consts::PI * d0).cos()) * 0.5;
        lerp(v0, v1, u)
    }
}
