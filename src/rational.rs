//! Exact rational time values
//!
//! All span endpoints, cycle positions and Euclidean distributions go through
//! this type; floating point only appears inside continuous signal functions
//! and the `value` field of voice data.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A reduced fraction with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    num: i64,
    den: i64,
}

pub const ZERO: Rational = Rational { num: 0, den: 1 };
pub const ONE: Rational = Rational { num: 1, den: 1 };
pub const MINUS_ONE: Rational = Rational { num: -1, den: 1 };

pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

pub fn lcm(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return 0;
    }
    (a / gcd(a, b) * b).abs()
}

fn reduce128(num: i128, den: i128) -> Rational {
    debug_assert!(den != 0, "rational denominator must not be zero");
    let sign = if den < 0 { -1 } else { 1 };
    let (mut n, mut d) = (num * sign, den * sign);
    let (mut a, mut b) = (n.abs(), d);
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    if a > 1 {
        n /= a;
        d /= a;
    }
    Rational {
        num: n as i64,
        den: d as i64,
    }
}

impl Rational {
    pub const ZERO: Rational = ZERO;
    pub const ONE: Rational = ONE;
    pub const MINUS_ONE: Rational = MINUS_ONE;

    pub fn new(num: i64, den: i64) -> Self {
        reduce128(num as i128, den as i128)
    }

    pub const fn int(n: i64) -> Self {
        Rational { num: n, den: 1 }
    }

    pub fn numerator(&self) -> i64 {
        self.num
    }

    pub fn denominator(&self) -> i64 {
        self.den
    }

    /// Best rational approximation of a double, by continued fractions.
    pub fn approx(x: f64) -> Self {
        if !x.is_finite() {
            return ZERO;
        }
        let negative = x < 0.0;
        let mut x = x.abs();
        if x > i64::MAX as f64 / 2.0 {
            return ZERO;
        }
        let (mut h0, mut h1): (i64, i64) = (0, 1);
        let (mut k0, mut k1): (i64, i64) = (1, 0);
        const MAX_DEN: i64 = 1_000_000_000;
        for _ in 0..64 {
            let a = x.floor();
            let ai = a as i64;
            let h2 = ai.saturating_mul(h1).saturating_add(h0);
            let k2 = ai.saturating_mul(k1).saturating_add(k0);
            if k2 > MAX_DEN || h2 < 0 {
                break;
            }
            h0 = h1;
            h1 = h2;
            k0 = k1;
            k1 = k2;
            let frac = x - a;
            if frac < 1e-12 {
                break;
            }
            x = 1.0 / frac;
        }
        let r = Rational::new(h1, k1.max(1));
        if negative {
            -r
        } else {
            r
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Truncation toward zero.
    pub fn to_int(&self) -> i64 {
        self.num / self.den
    }

    /// Largest integer not greater than the value.
    pub fn floor(&self) -> i64 {
        self.num.div_euclid(self.den)
    }

    pub fn ceil(&self) -> i64 {
        -((-*self).floor())
    }

    /// Nearest integer, half rounds up.
    pub fn round(&self) -> i64 {
        (*self + Rational::new(1, 2)).floor()
    }

    /// Cycle start: the floor as a rational ("sam" in pattern-speak).
    pub fn sam(&self) -> Rational {
        Rational::int(self.floor())
    }

    pub fn next_sam(&self) -> Rational {
        self.sam() + ONE
    }

    /// Position within the enclosing cycle, always in `[0, 1)`.
    pub fn cycle_pos(&self) -> Rational {
        *self - self.sam()
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub fn abs(&self) -> Rational {
        Rational {
            num: self.num.abs(),
            den: self.den,
        }
    }

    pub fn recip(&self) -> Option<Rational> {
        if self.num == 0 {
            None
        } else {
            Some(Rational::new(self.den, self.num))
        }
    }

    pub fn checked_div(&self, other: Rational) -> Option<Rational> {
        if other.num == 0 {
            None
        } else {
            Some(*self / other)
        }
    }

    pub fn min(self, other: Rational) -> Rational {
        if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Rational) -> Rational {
        if self >= other {
            self
        } else {
            other
        }
    }

    /// Euclidean remainder; the result has the sign of the divisor's magnitude,
    /// i.e. it is in `[0, m)` for positive `m`, matching cycle wrapping.
    pub fn modulo(&self, m: Rational) -> Option<Rational> {
        if m.num == 0 {
            return None;
        }
        let q = (*self / m).floor();
        Some(*self - m * Rational::int(q))
    }
}

impl Default for Rational {
    fn default() -> Self {
        ZERO
    }
}

impl From<i64> for Rational {
    fn from(n: i64) -> Self {
        Rational::int(n)
    }
}

impl From<(i64, i64)> for Rational {
    fn from((n, d): (i64, i64)) -> Self {
        Rational::new(n, d)
    }
}

impl std::ops::Add for Rational {
    type Output = Rational;
    fn add(self, rhs: Rational) -> Rational {
        reduce128(
            self.num as i128 * rhs.den as i128 + rhs.num as i128 * self.den as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

impl std::ops::Sub for Rational {
    type Output = Rational;
    fn sub(self, rhs: Rational) -> Rational {
        reduce128(
            self.num as i128 * rhs.den as i128 - rhs.num as i128 * self.den as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

impl std::ops::Mul for Rational {
    type Output = Rational;
    fn mul(self, rhs: Rational) -> Rational {
        reduce128(
            self.num as i128 * rhs.num as i128,
            self.den as i128 * rhs.den as i128,
        )
    }
}

impl std::ops::Div for Rational {
    type Output = Rational;
    /// Division by zero is a programmer error on the exact-time path; query
    /// code guards divisors and uses `checked_div` where zero can flow in.
    fn div(self, rhs: Rational) -> Rational {
        debug_assert!(rhs.num != 0, "rational division by zero");
        reduce128(
            self.num as i128 * rhs.den as i128,
            self.den as i128 * rhs.num as i128,
        )
    }
}

impl std::ops::Rem for Rational {
    type Output = Rational;
    fn rem(self, rhs: Rational) -> Rational {
        self.modulo(rhs).unwrap_or(ZERO)
    }
}

impl std::ops::Neg for Rational {
    type Output = Rational;
    fn neg(self) -> Rational {
        Rational {
            num: -self.num,
            den: self.den,
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}
