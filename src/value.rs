//! Voice values and voice-parameter records
//!
//! A `VoiceValue` is the tagged payload carried in an event's `value` slot and
//! in every other named voice parameter. Arithmetic stays exact while both
//! operands are rational and falls back to doubles otherwise. Fallible
//! operations return `None`, which downstream combinators treat as "drop".

use crate::rational::Rational;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VoiceValue {
    Rational(Rational),
    Float(f64),
    Str(String),
    Seq(Vec<VoiceValue>),
    Null,
}

impl VoiceValue {
    pub fn int(n: i64) -> Self {
        VoiceValue::Rational(Rational::int(n))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, VoiceValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, VoiceValue::Rational(_) | VoiceValue::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            VoiceValue::Rational(r) => Some(r.to_f64()),
            VoiceValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_rational(&self) -> Option<Rational> {
        match self {
            VoiceValue::Rational(r) => Some(*r),
            VoiceValue::Float(f) => Some(Rational::approx(*f)),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            VoiceValue::Rational(r) => Some(r.to_int()),
            VoiceValue::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            VoiceValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness: nonzero numbers, nonempty strings and sequences.
    pub fn truthy(&self) -> bool {
        match self {
            VoiceValue::Rational(r) => !r.is_zero(),
            VoiceValue::Float(f) => *f != 0.0 && !f.is_nan(),
            VoiceValue::Str(s) => !s.is_empty(),
            VoiceValue::Seq(xs) => !xs.is_empty(),
            VoiceValue::Null => false,
        }
    }

    fn exact_pair(&self, other: &VoiceValue) -> Option<(Rational, Rational)> {
        match (self, other) {
            (VoiceValue::Rational(a), VoiceValue::Rational(b)) => Some((*a, *b)),
            _ => None,
        }
    }

    fn float_pair(&self, other: &VoiceValue) -> Option<(f64, f64)> {
        Some((self.as_f64()?, other.as_f64()?))
    }

    // ============= Binary arithmetic =============

    pub fn add(&self, other: &VoiceValue) -> Option<VoiceValue> {
        if let Some((a, b)) = self.exact_pair(other) {
            return Some(VoiceValue::Rational(a + b));
        }
        let (a, b) = self.float_pair(other)?;
        Some(VoiceValue::Float(a + b))
    }

    pub fn sub(&self, other: &VoiceValue) -> Option<VoiceValue> {
        if let Some((a, b)) = self.exact_pair(other) {
            return Some(VoiceValue::Rational(a - b));
        }
        let (a, b) = self.float_pair(other)?;
        Some(VoiceValue::Float(a - b))
    }

    pub fn mul(&self, other: &VoiceValue) -> Option<VoiceValue> {
        if let Some((a, b)) = self.exact_pair(other) {
            return Some(VoiceValue::Rational(a * b));
        }
        let (a, b) = self.float_pair(other)?;
        Some(VoiceValue::Float(a * b))
    }

    pub fn div(&self, other: &VoiceValue) -> Option<VoiceValue> {
        if let Some((a, b)) = self.exact_pair(other) {
            return a.checked_div(b).map(VoiceValue::Rational);
        }
        let (a, b) = self.float_pair(other)?;
        if b == 0.0 {
            return None;
        }
        Some(VoiceValue::Float(a / b))
    }

    pub fn rem(&self, other: &VoiceValue) -> Option<VoiceValue> {
        if let Some((a, b)) = self.exact_pair(other) {
            return a.modulo(b).map(VoiceValue::Rational);
        }
        let (a, b) = self.float_pair(other)?;
        if b == 0.0 {
            return None;
        }
        Some(VoiceValue::Float(a.rem_euclid(b)))
    }

    pub fn pow(&self, other: &VoiceValue) -> Option<VoiceValue> {
        if let Some((a, b)) = self.exact_pair(other) {
            if b.is_integer() {
                let e = b.to_int();
                if (-16..=16).contains(&e) {
                    let mut acc = Rational::ONE;
                    for _ in 0..e.unsigned_abs() {
                        acc = acc * a;
                    }
                    return if e < 0 {
                        acc.recip().map(VoiceValue::Rational)
                    } else {
                        Some(VoiceValue::Rational(acc))
                    };
                }
            }
        }
        let (a, b) = self.float_pair(other)?;
        let r = a.powf(b);
        r.is_finite().then_some(VoiceValue::Float(r))
    }

    // ============= Bitwise (integer-truncated) =============

    fn int_pair(&self, other: &VoiceValue) -> Option<(i64, i64)> {
        Some((self.as_i64()?, other.as_i64()?))
    }

    pub fn band(&self, other: &VoiceValue) -> Option<VoiceValue> {
        let (a, b) = self.int_pair(other)?;
        Some(VoiceValue::int(a & b))
    }

    pub fn bor(&self, other: &VoiceValue) -> Option<VoiceValue> {
        let (a, b) = self.int_pair(other)?;
        Some(VoiceValue::int(a | b))
    }

    pub fn bxor(&self, other: &VoiceValue) -> Option<VoiceValue> {
        let (a, b) = self.int_pair(other)?;
        Some(VoiceValue::int(a ^ b))
    }

    pub fn shl(&self, other: &VoiceValue) -> Option<VoiceValue> {
        let (a, b) = self.int_pair(other)?;
        if !(0..64).contains(&b) {
            return None;
        }
        Some(VoiceValue::int(a << b))
    }

    pub fn shr(&self, other: &VoiceValue) -> Option<VoiceValue> {
        let (a, b) = self.int_pair(other)?;
        if !(0..64).contains(&b) {
            return None;
        }
        Some(VoiceValue::int(a >> b))
    }

    // ============= Comparisons (0.0 / 1.0) =============

    fn bool_value(b: bool) -> VoiceValue {
        VoiceValue::Float(if b { 1.0 } else { 0.0 })
    }

    pub fn lt(&self, other: &VoiceValue) -> Option<VoiceValue> {
        let (a, b) = self.float_pair(other)?;
        Some(Self::bool_value(a < b))
    }

    pub fn gt(&self, other: &VoiceValue) -> Option<VoiceValue> {
        let (a, b) = self.float_pair(other)?;
        Some(Self::bool_value(a > b))
    }

    pub fn le(&self, other: &VoiceValue) -> Option<VoiceValue> {
        let (a, b) = self.float_pair(other)?;
        Some(Self::bool_value(a <= b))
    }

    pub fn ge(&self, other: &VoiceValue) -> Option<VoiceValue> {
        let (a, b) = self.float_pair(other)?;
        Some(Self::bool_value(a >= b))
    }

    /// Equality across tags: numeric comparison when both sides are numbers,
    /// structural otherwise.
    pub fn eq_value(&self, other: &VoiceValue) -> Option<VoiceValue> {
        let equal = if self.is_numeric() && other.is_numeric() {
            self.as_f64() == other.as_f64()
        } else {
            self == other
        };
        Some(Self::bool_value(equal))
    }

    pub fn ne_value(&self, other: &VoiceValue) -> Option<VoiceValue> {
        self.eq_value(other).map(|v| Self::bool_value(!v.truthy()))
    }

    /// Truthy-equality: compares `value != 0` on both sides.
    pub fn eqt(&self, other: &VoiceValue) -> Option<VoiceValue> {
        Some(Self::bool_value(self.truthy() == other.truthy()))
    }

    pub fn net(&self, other: &VoiceValue) -> Option<VoiceValue> {
        Some(Self::bool_value(self.truthy() != other.truthy()))
    }

    /// Returns the right operand when the left is truthy, else 0.
    pub fn and(&self, other: &VoiceValue) -> Option<VoiceValue> {
        if self.truthy() {
            Some(other.clone())
        } else {
            Some(VoiceValue::int(0))
        }
    }

    /// Returns the left operand when truthy, else the right.
    pub fn or(&self, other: &VoiceValue) -> Option<VoiceValue> {
        if self.truthy() {
            Some(self.clone())
        } else {
            Some(other.clone())
        }
    }

    // ============= Unary =============

    pub fn log2(&self) -> Option<VoiceValue> {
        let x = self.as_f64()?;
        if x <= 0.0 {
            return None;
        }
        Some(VoiceValue::Float(x.log2()))
    }

    pub fn round(&self) -> Option<VoiceValue> {
        match self {
            VoiceValue::Rational(r) => Some(VoiceValue::int(r.round())),
            VoiceValue::Float(f) => Some(VoiceValue::Float(f.round())),
            _ => None,
        }
    }

    pub fn floor(&self) -> Option<VoiceValue> {
        match self {
            VoiceValue::Rational(r) => Some(VoiceValue::int(r.floor())),
            VoiceValue::Float(f) => Some(VoiceValue::Float(f.floor())),
            _ => None,
        }
    }

    pub fn ceil(&self) -> Option<VoiceValue> {
        match self {
            VoiceValue::Rational(r) => Some(VoiceValue::int(r.ceil())),
            VoiceValue::Float(f) => Some(VoiceValue::Float(f.ceil())),
            _ => None,
        }
    }

    /// Parse leaf text the way the mini-notation does: integers and decimals
    /// become exact rationals, colon compounds become sequences, anything
    /// else stays a string.
    pub fn parse(text: &str) -> VoiceValue {
        if text.contains(':') {
            return VoiceValue::Seq(text.split(':').map(VoiceValue::parse).collect());
        }
        if let Ok(n) = text.parse::<i64>() {
            return VoiceValue::int(n);
        }
        if let Ok(f) = text.parse::<f64>() {
            return VoiceValue::Rational(Rational::approx(f));
        }
        VoiceValue::Str(text.to_string())
    }
}

impl From<f64> for VoiceValue {
    fn from(f: f64) -> Self {
        VoiceValue::Float(f)
    }
}

impl From<i64> for VoiceValue {
    fn from(n: i64) -> Self {
        VoiceValue::int(n)
    }
}

impl From<Rational> for VoiceValue {
    fn from(r: Rational) -> Self {
        VoiceValue::Rational(r)
    }
}

impl From<&str> for VoiceValue {
    fn from(s: &str) -> Self {
        VoiceValue::Str(s.to_string())
    }
}

impl From<String> for VoiceValue {
    fn from(s: String) -> Self {
        VoiceValue::Str(s)
    }
}

impl fmt::Display for VoiceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceValue::Rational(r) => write!(f, "{r}"),
            VoiceValue::Float(x) => write!(f, "{x}"),
            VoiceValue::Str(s) => write!(f, "{s}"),
            VoiceValue::Seq(xs) => {
                let parts: Vec<String> = xs.iter().map(|x| x.to_string()).collect();
                write!(f, "{}", parts.join(":"))
            }
            VoiceValue::Null => write!(f, "null"),
        }
    }
}

/// The distinguished slot used by arithmetic and control combinators.
pub const VALUE_FIELD: &str = "value";

/// An ordered map of voice parameters. The engine never interprets parameter
/// names beyond the `value` slot; `gain`, `pan`, `cutoff` and friends are
/// opaque keys written by the DSL surface.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VoiceData {
    fields: IndexMap<String, VoiceValue>,
}

impl VoiceData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_value(value: impl Into<VoiceValue>) -> Self {
        VoiceData::empty().with_field(VALUE_FIELD, value)
    }

    pub fn get(&self, name: &str) -> Option<&VoiceValue> {
        self.fields.get(name)
    }

    pub fn value(&self) -> VoiceValue {
        self.fields
            .get(VALUE_FIELD)
            .cloned()
            .unwrap_or(VoiceValue::Null)
    }

    /// Total: setting any field on any record succeeds.
    pub fn with_field(&self, name: &str, value: impl Into<VoiceValue>) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(name.to_string(), value.into());
        VoiceData { fields }
    }

    pub fn with_value(&self, value: impl Into<VoiceValue>) -> Self {
        self.with_field(VALUE_FIELD, value)
    }

    pub fn without_field(&self, name: &str) -> Self {
        let mut fields = self.fields.clone();
        fields.shift_remove(name);
        VoiceData { fields }
    }

    /// Right-biased union: `other`'s fields win on collision.
    pub fn union(&self, other: &VoiceData) -> Self {
        let mut fields = self.fields.clone();
        for (k, v) in &other.fields {
            fields.insert(k.clone(), v.clone());
        }
        VoiceData { fields }
    }

    /// Parse an `"a:d:s:r"`-style compound into this record's named field.
    pub fn with_compound_field(&self, name: &str, text: &str) -> Self {
        self.with_field(name, VoiceValue::parse(text))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_arithmetic_survives_rational_operands() {
        let a = VoiceValue::Rational(Rational::new(1, 3));
        let b = VoiceValue::Rational(Rational::new(1, 6));
        assert_eq!(
            a.add(&b),
            Some(VoiceValue::Rational(Rational::new(1, 2)))
        );
        let f = VoiceValue::Float(0.5);
        match a.add(&f) {
            Some(VoiceValue::Float(x)) => assert!((x - (1.0 / 3.0 + 0.5)).abs() < 1e-12),
            other => panic!("expected float fallback, got {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_is_null() {
        let a = VoiceValue::int(4);
        assert_eq!(a.div(&VoiceValue::int(0)), None);
        assert_eq!(a.rem(&VoiceValue::Float(0.0)), None);
        assert_eq!(
            a.div(&VoiceValue::int(2)),
            Some(VoiceValue::int(2))
        );
    }

    #[test]
    fn comparisons_yield_float_bits() {
        let a = VoiceValue::int(1);
        let b = VoiceValue::int(2);
        assert_eq!(a.lt(&b), Some(VoiceValue::Float(1.0)));
        assert_eq!(a.ge(&b), Some(VoiceValue::Float(0.0)));
        assert_eq!(a.eq_value(&VoiceValue::Float(1.0)), Some(VoiceValue::Float(1.0)));
    }

    #[test]
    fn truthy_logic() {
        let t = VoiceValue::int(2);
        let z = VoiceValue::int(0);
        assert_eq!(t.and(&VoiceValue::int(7)), Some(VoiceValue::int(7)));
        assert_eq!(z.and(&VoiceValue::int(7)), Some(VoiceValue::int(0)));
        assert_eq!(t.or(&VoiceValue::int(7)), Some(t.clone()));
        assert_eq!(z.or(&VoiceValue::int(7)), Some(VoiceValue::int(7)));
        assert_eq!(t.eqt(&VoiceValue::Float(5.0)), Some(VoiceValue::Float(1.0)));
        assert_eq!(t.net(&z), Some(VoiceValue::Float(1.0)));
    }

    #[test]
    fn bitwise_truncates() {
        let a = VoiceValue::Float(6.9);
        let b = VoiceValue::int(3);
        assert_eq!(a.band(&b), Some(VoiceValue::int(2)));
        assert_eq!(a.shl(&VoiceValue::int(1)), Some(VoiceValue::int(12)));
        assert_eq!(a.shl(&VoiceValue::int(-1)), None);
    }

    #[test]
    fn type_mismatch_drops() {
        let s = VoiceValue::Str("bd".into());
        assert_eq!(s.add(&VoiceValue::int(1)), None);
        assert_eq!(s.log2(), None);
    }

    #[test]
    fn compound_fields_parse() {
        let d = VoiceData::empty().with_compound_field("adsr", "0.01:0.2:0.7:0.3");
        match d.get("adsr") {
            Some(VoiceValue::Seq(parts)) => assert_eq!(parts.len(), 4),
            other => panic!("expected seq, got {other:?}"),
        }
    }

    #[test]
    fn copy_with_is_total_and_immutable() {
        let d = VoiceData::from_value(1i64);
        let d2 = d.with_field("gain", 0.5);
        assert!(d.get("gain").is_none());
        assert_eq!(d2.get("gain"), Some(&VoiceValue::Float(0.5)));
        assert_eq!(d2.value(), VoiceValue::int(1));
    }
}
