//! Monadic joins, control sampling and arithmetic lifts
//!
//! The three joins differ in whose structure survives: `bind` keeps the inner
//! pattern's native structure, `bind_squeeze` compresses one inner cycle into
//! each outer event, and `inner_join` clips the inner structure to the outer
//! event's part. `app_left` is the point-sampling specialisation that backs
//! control patterns and the degrade-with family.

use crate::context::QueryContext;
use crate::pattern::{Event, Pattern, Query, TimeSpan};
use crate::rational::Rational;
use crate::value::{VoiceData, VoiceValue};
use std::sync::Arc;

#[derive(Clone, Copy, PartialEq, Eq)]
enum JoinMode {
    Bind,
    Squeeze,
    Inner,
}

struct JoinNode {
    outer: Pattern,
    f: Arc<dyn Fn(&Event) -> Option<Pattern> + Send + Sync>,
    mode: JoinMode,
}

impl Query for JoinNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let mut events = Vec::new();
        for outer in self.outer.query_span(span, ctx) {
            let inner = match (self.f)(&outer) {
                Some(p) => p,
                None => continue,
            };
            match self.mode {
                JoinMode::Bind => {
                    events.extend(inner.query_span(outer.part, ctx));
                }
                JoinMode::Inner => {
                    for event in inner.query_span(outer.part, ctx) {
                        if let Some(clipped) = event.clipped(&outer.part) {
                            events.push(clipped);
                        }
                    }
                }
                JoinMode::Squeeze => {
                    let target = outer.whole.unwrap_or(outer.part);
                    let duration = target.duration();
                    if duration.is_zero() {
                        continue;
                    }
                    let focused = inner
                        .fast(Rational::ONE / duration)
                        .late(target.begin);
                    for event in focused.query_span(outer.part, ctx) {
                        // A squeezed infinite atom becomes discrete: the
                        // focused part bounds it.
                        let whole = event.whole.or(Some(event.part));
                        events.push(Event {
                            whole,
                            ..event
                        });
                    }
                }
            }
        }
        events
    }
}

/// Structure from the source; the control is sampled once per source event,
/// at the event's own start.
struct ControlNode {
    source: Pattern,
    control: Pattern,
    combine: Arc<dyn Fn(&VoiceData, &VoiceData) -> Option<VoiceData> + Send + Sync>,
}

impl Query for ControlNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        self.source
            .query_span(span, ctx)
            .into_iter()
            .filter_map(|event| {
                let sampled = self.control.sample_at(event.begin(), ctx)?;
                let data = (self.combine)(&event.data, &sampled.data)?;
                Some(event.with_data(data))
            })
            .collect()
    }
}

/// A combinator argument that is either a constant or a control pattern.
#[derive(Clone)]
pub enum ControlArg {
    Scalar(VoiceValue),
    Pattern(Pattern),
}

impl ControlArg {
    /// View the argument as a pattern; scalars become infinite atoms.
    pub fn to_pattern(&self) -> Pattern {
        match self {
            ControlArg::Scalar(v) => Pattern::atom_infinite(VoiceData::from_value(v.clone())),
            ControlArg::Pattern(p) => p.clone(),
        }
    }
}

impl From<VoiceValue> for ControlArg {
    fn from(v: VoiceValue) -> Self {
        ControlArg::Scalar(v)
    }
}

impl From<f64> for ControlArg {
    fn from(v: f64) -> Self {
        ControlArg::Scalar(VoiceValue::Float(v))
    }
}

impl From<i64> for ControlArg {
    fn from(v: i64) -> Self {
        ControlArg::Scalar(VoiceValue::int(v))
    }
}

impl From<Rational> for ControlArg {
    fn from(v: Rational) -> Self {
        ControlArg::Scalar(VoiceValue::Rational(v))
    }
}

impl From<Pattern> for ControlArg {
    fn from(p: Pattern) -> Self {
        ControlArg::Pattern(p)
    }
}

impl From<&Pattern> for ControlArg {
    fn from(p: &Pattern) -> Self {
        ControlArg::Pattern(p.clone())
    }
}

/// Binary value operations liftable over the `value` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Eqt,
    Net,
    And,
    Or,
}

impl ArithOp {
    pub fn apply(&self, left: &VoiceValue, right: &VoiceValue) -> Option<VoiceValue> {
        match self {
            ArithOp::Add => left.add(right),
            ArithOp::Sub => left.sub(right),
            ArithOp::Mul => left.mul(right),
            ArithOp::Div => left.div(right),
            ArithOp::Rem => left.rem(right),
            ArithOp::Pow => left.pow(right),
            ArithOp::BAnd => left.band(right),
            ArithOp::BOr => left.bor(right),
            ArithOp::BXor => left.bxor(right),
            ArithOp::Shl => left.shl(right),
            ArithOp::Shr => left.shr(right),
            ArithOp::Lt => left.lt(right),
            ArithOp::Gt => left.gt(right),
            ArithOp::Le => left.le(right),
            ArithOp::Ge => left.ge(right),
            ArithOp::Eq => left.eq_value(right),
            ArithOp::Ne => left.ne_value(right),
            ArithOp::Eqt => left.eqt(right),
            ArithOp::Net => left.net(right),
            ArithOp::And => left.and(right),
            ArithOp::Or => left.or(right),
        }
    }
}

/// Unary value operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Log2,
    Round,
    Floor,
    Ceil,
}

impl UnaryOp {
    pub fn apply(&self, value: &VoiceValue) -> Option<VoiceValue> {
        match self {
            UnaryOp::Log2 => value.log2(),
            UnaryOp::Round => value.round(),
            UnaryOp::Floor => value.floor(),
            UnaryOp::Ceil => value.ceil(),
        }
    }
}

impl Pattern {
    // ============= Joins =============

    /// For every event, query `f(event)` over the event's part, keeping the
    /// produced pattern's native structure.
    pub fn bind(&self, f: impl Fn(&Event) -> Option<Pattern> + Send + Sync + 'static) -> Pattern {
        Pattern::from_node(JoinNode {
            outer: self.clone(),
            f: Arc::new(f),
            mode: JoinMode::Bind,
        })
    }

    /// For every event, compress one full cycle of `f(event)` into the
    /// event's whole.
    pub fn bind_squeeze(
        &self,
        f: impl Fn(&Event) -> Option<Pattern> + Send + Sync + 'static,
    ) -> Pattern {
        Pattern::from_node(JoinNode {
            outer: self.clone(),
            f: Arc::new(f),
            mode: JoinMode::Squeeze,
        })
    }

    /// As `bind`, but inner events are clipped to the outer event's part, so
    /// the factor pattern of `fast`/`slow` is sampled at each event's own
    /// time.
    pub fn inner_join(
        &self,
        f: impl Fn(&Event) -> Option<Pattern> + Send + Sync + 'static,
    ) -> Pattern {
        Pattern::from_node(JoinNode {
            outer: self.clone(),
            f: Arc::new(f),
            mode: JoinMode::Inner,
        })
    }

    /// Structure from `self`; `control` sampled at each event's start and
    /// combined into the event's data. Returning None drops the event.
    pub fn app_left(
        &self,
        control: &Pattern,
        combine: impl Fn(&VoiceData, &VoiceData) -> Option<VoiceData> + Send + Sync + 'static,
    ) -> Pattern {
        Pattern::from_node(ControlNode {
            source: self.clone(),
            control: control.clone(),
            combine: Arc::new(combine),
        })
        .with_weight(self.weight())
        .with_steps(self.num_steps())
        .with_cycles(self.estimate_cycle_duration())
    }

    /// The general control combinator: sample `control` per source event and
    /// merge with `combine`.
    pub fn control(
        &self,
        control: impl Into<ControlArg>,
        combine: impl Fn(&VoiceData, &VoiceData) -> Option<VoiceData> + Send + Sync + 'static,
    ) -> Pattern {
        let control = control.into().to_pattern();
        self.app_left(&control, combine)
    }

    // ============= Field and arithmetic lifts =============

    /// Sample `factor` at every event's time and rebuild the event's data
    /// with `mutator(data, factor_value)`.
    pub fn lift_numeric_field(
        &self,
        factor: impl Into<ControlArg>,
        mutator: impl Fn(&VoiceData, &VoiceValue) -> VoiceData + Send + Sync + 'static,
    ) -> Pattern {
        self.control(factor, move |data, ctl| Some(mutator(data, &ctl.value())))
    }

    /// Write the sampled factor straight into a named voice field.
    pub fn set_field(&self, field: &str, factor: impl Into<ControlArg>) -> Pattern {
        let field = field.to_string();
        self.lift_numeric_field(factor, move |data, value| {
            data.with_field(&field, value.clone())
        })
    }

    /// Lift a binary op over the `value` slot; all other fields pass through
    /// untouched. A null result drops the event.
    pub fn apply_arithmetic(&self, arg: impl Into<ControlArg>, op: ArithOp) -> Pattern {
        self.control(arg, move |data, ctl| {
            let result = op.apply(&data.value(), &ctl.value())?;
            Some(data.with_value(result))
        })
    }

    /// Lift a unary op over the `value` slot.
    pub fn apply_unary(&self, op: UnaryOp) -> Pattern {
        self.map_data(move |data, _| {
            let result = op.apply(&data.value())?;
            Some(data.with_value(result))
        })
    }

    pub fn add(&self, arg: impl Into<ControlArg>) -> Pattern {
        self.apply_arithmetic(arg, ArithOp::Add)
    }

    pub fn sub(&self, arg: impl Into<ControlArg>) -> Pattern {
        self.apply_arithmetic(arg, ArithOp::Sub)
    }

    pub fn mul(&self, arg: impl Into<ControlArg>) -> Pattern {
        self.apply_arithmetic(arg, ArithOp::Mul)
    }

    pub fn div(&self, arg: impl Into<ControlArg>) -> Pattern {
        self.apply_arithmetic(arg, ArithOp::Div)
    }

    // ============= Patterned tempo arguments =============

    /// `fast` with a control pattern as the factor; the factor is sampled at
    /// each event's own time via the inner join.
    pub fn fast_by(&self, factor: impl Into<ControlArg>) -> Pattern {
        match factor.into() {
            ControlArg::Scalar(v) => match v.as_rational() {
                Some(k) => self.fast(k),
                None => Pattern::silence(),
            },
            ControlArg::Pattern(factor) => {
                let source = self.clone();
                factor.inner_join(move |e| {
                    let k = e.value().as_rational()?;
                    Some(source.fast(k))
                })
            }
        }
    }

    pub fn slow_by(&self, factor: impl Into<ControlArg>) -> Pattern {
        match factor.into() {
            ControlArg::Scalar(v) => match v.as_rational() {
                Some(k) => self.slow(k),
                None => Pattern::silence(),
            },
            ControlArg::Pattern(factor) => {
                let source = self.clone();
                factor.inner_join(move |e| {
                    let k = e.value().as_rational()?;
                    Some(source.slow(k))
                })
            }
        }
    }

    pub fn late_by(&self, amount: impl Into<ControlArg>) -> Pattern {
        match amount.into() {
            ControlArg::Scalar(v) => match v.as_rational() {
                Some(x) => self.late(x),
                None => self.clone(),
            },
            ControlArg::Pattern(amount) => {
                let source = self.clone();
                amount.inner_join(move |e| {
                    let x = e.value().as_rational()?;
                    Some(source.late(x))
                })
            }
        }
    }

    pub fn early_by(&self, amount: impl Into<ControlArg>) -> Pattern {
        match amount.into() {
            ControlArg::Scalar(v) => match v.as_rational() {
                Some(x) => self.early(x),
                None => self.clone(),
            },
            ControlArg::Pattern(amount) => {
                let source = self.clone();
                amount.inner_join(move |e| {
                    let x = e.value().as_rational()?;
                    Some(source.early(x))
                })
            }
        }
    }
}
