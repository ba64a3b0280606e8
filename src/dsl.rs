//! The DSL registry surface
//!
//! A process-start-constructed lookup from names to pattern producers and
//! pattern methods, consumed by whatever host language binds the engine.
//! Patterns themselves never touch this table; it is plain data built once
//! and read-only afterwards. Aliases resolve through a flat table to one
//! canonical implementation each.

use crate::mini_notation::{self, field_leaf};
use crate::pattern::{Pattern, SourceLocation};
use crate::pattern_join::{ArithOp, ControlArg, UnaryOp};
use crate::pattern_ops_extended::run;
use crate::pattern_rand::{
    choose, choose_cycles, choose_in_with, choose_with, randrun, wchoose, wchoose_cycles,
};
use crate::pattern_signal as sig;
use crate::rational::Rational;
use crate::value::VoiceValue;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;

/// A pattern-to-pattern function passed in from the host.
pub type PatternTransform = Arc<dyn Fn(Pattern) -> Pattern + Send + Sync>;

/// A tagged argument value, with the call site when the host knows it.
#[derive(Clone)]
pub enum DslValue {
    Num(f64),
    Str(String),
    Pattern(Pattern),
    List(Vec<DslValue>),
    Transform(PatternTransform),
}

#[derive(Clone)]
pub struct DslArg {
    pub value: DslValue,
    pub call_site: Option<SourceLocation>,
}

impl DslArg {
    pub fn num(value: f64) -> Self {
        DslArg {
            value: DslValue::Num(value),
            call_site: None,
        }
    }

    pub fn str(value: impl Into<String>) -> Self {
        DslArg {
            value: DslValue::Str(value.into()),
            call_site: None,
        }
    }

    pub fn pattern(value: Pattern) -> Self {
        DslArg {
            value: DslValue::Pattern(value),
            call_site: None,
        }
    }

    pub fn transform(f: impl Fn(Pattern) -> Pattern + Send + Sync + 'static) -> Self {
        DslArg {
            value: DslValue::Transform(Arc::new(f)),
            call_site: None,
        }
    }

    pub fn at(mut self, site: SourceLocation) -> Self {
        self.call_site = Some(site);
        self
    }
}

impl DslValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DslValue::Num(n) => Some(*n),
            DslValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|f| f as i64)
    }

    pub fn as_rational(&self) -> Option<Rational> {
        self.as_f64().map(Rational::approx)
    }

    /// Any value can stand in as a pattern: strings parse as mini-notation,
    /// numbers become atoms.
    pub fn as_pattern(&self) -> Option<Pattern> {
        match self {
            DslValue::Pattern(p) => Some(p.clone()),
            DslValue::Str(s) => Some(mini_notation::pattern(s)),
            DslValue::Num(n) => Some(Pattern::pure(VoiceValue::Float(*n))),
            _ => None,
        }
    }

    /// Scalar-or-pattern view for control arguments.
    pub fn as_control(&self) -> Option<ControlArg> {
        match self {
            DslValue::Num(n) => Some(ControlArg::Scalar(VoiceValue::Float(*n))),
            DslValue::Str(s) => Some(ControlArg::Pattern(mini_notation::pattern(s))),
            DslValue::Pattern(p) => Some(ControlArg::Pattern(p.clone())),
            _ => None,
        }
    }

    pub fn as_transform(&self) -> Option<PatternTransform> {
        match self {
            DslValue::Transform(f) => Some(f.clone()),
            _ => None,
        }
    }
}

pub type Producer = Arc<dyn Fn(&[DslArg]) -> Pattern + Send + Sync>;
pub type Method = Arc<dyn Fn(&Pattern, &[DslArg]) -> Pattern + Send + Sync>;

lazy_static! {
    /// Alias -> canonical name. One implementation per behavior.
    static ref ALIASES: HashMap<&'static str, &'static str> = {
        let mut table = HashMap::new();
        table.insert("lp", "lpf");
        table.insert("cutoff", "lpf");
        table.insert("hp", "hpf");
        table.insert("res", "resonance");
        table.insert("vol", "gain");
        table.insert("cat", "seq");
        table.insert("alt", "slowcat");
        table.insert("steps", "pace");
        table.insert("mod", "rem");
        table
    };
}

#[derive(Default)]
pub struct DslRegistry {
    producers: IndexMap<String, Producer>,
    methods: IndexMap<String, Method>,
}

impl DslRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_producer(
        &mut self,
        name: &str,
        f: impl Fn(&[DslArg]) -> Pattern + Send + Sync + 'static,
    ) {
        self.producers.insert(name.to_string(), Arc::new(f));
    }

    pub fn register_method(
        &mut self,
        name: &str,
        f: impl Fn(&Pattern, &[DslArg]) -> Pattern + Send + Sync + 'static,
    ) {
        self.methods.insert(name.to_string(), Arc::new(f));
    }

    fn canonical<'a>(&self, name: &'a str) -> &'a str {
        ALIASES.get(name).copied().unwrap_or(name)
    }

    pub fn producer(&self, name: &str) -> Option<Producer> {
        self.producers.get(self.canonical(name)).cloned()
    }

    pub fn method(&self, name: &str) -> Option<Method> {
        self.methods.get(self.canonical(name)).cloned()
    }

    pub fn producer_names(&self) -> impl Iterator<Item = &str> {
        self.producers.keys().map(|k| k.as_str())
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(|k| k.as_str())
    }

    /// Unbound names yield silence and a diagnostic, never a panic; the
    /// query path downstream must keep running.
    pub fn produce(&self, name: &str, args: &[DslArg]) -> Pattern {
        match self.producer(name) {
            Some(f) => f(args),
            None => {
                tracing::warn!(name, "unbound DSL producer, yielding silence");
                Pattern::silence()
            }
        }
    }

    /// Unbound method names leave the receiver unchanged, with a diagnostic.
    pub fn apply(&self, name: &str, receiver: &Pattern, args: &[DslArg]) -> Pattern {
        match self.method(name) {
            Some(f) => f(receiver, args),
            None => {
                tracing::warn!(name, "unbound DSL method, leaving pattern unchanged");
                receiver.clone()
            }
        }
    }

    /// The full default surface.
    pub fn with_defaults() -> Self {
        let mut reg = DslRegistry::new();
        reg.install_producers();
        reg.install_methods();
        reg.install_field_writers();
        reg.install_arithmetic();
        reg
    }

    fn install_producers(&mut self) {
        self.register_producer("silence", |_| Pattern::silence());
        self.register_producer("rest", |_| Pattern::rest());
        self.register_producer("pure", |args| {
            arg_pattern(args, 0).unwrap_or_else(Pattern::silence)
        });
        self.register_producer("seq", |args| {
            Pattern::sequence(all_patterns(args))
        });
        self.register_producer("stack", |args| Pattern::stack(all_patterns(args)));
        self.register_producer("stackLeft", |args| {
            Pattern::stack_left(all_patterns(args))
        });
        self.register_producer("stackRight", |args| {
            Pattern::stack_right(all_patterns(args))
        });
        self.register_producer("stackCentre", |args| {
            Pattern::stack_centre(all_patterns(args))
        });
        self.register_producer("stackBy", |args| {
            let alpha = arg_f64(args, 0).unwrap_or(0.0);
            let rest = args.get(1..).unwrap_or(&[]);
            Pattern::stack_by(all_patterns(rest), alpha)
        });
        self.register_producer("slowcat", |args| Pattern::slowcat(all_patterns(args)));
        self.register_producer("arrange", |args| {
            let mut segments = Vec::new();
            for pair in args.chunks(2) {
                if pair.len() < 2 {
                    break;
                }
                let cycles = pair[0].value.as_rational().unwrap_or(Rational::ONE);
                if let Some(p) = pair[1].value.as_pattern() {
                    segments.push((cycles, p));
                }
            }
            Pattern::arrangement(segments)
        });
        self.register_producer("run", |args| run(arg_i64(args, 0).unwrap_or(8)));
        self.register_producer("time", |_| sig::time());
        self.register_producer("steady", |args| {
            sig::steady(VoiceValue::Float(arg_f64(args, 0).unwrap_or(0.0)))
        });
        self.register_producer("sine", |_| sig::sine());
        self.register_producer("cosine", |_| sig::cosine());
        self.register_producer("saw", |_| sig::saw());
        self.register_producer("isaw", |_| sig::isaw());
        self.register_producer("tri", |_| sig::tri());
        self.register_producer("itri", |_| sig::itri());
        self.register_producer("square", |_| sig::square());
        self.register_producer("sine2", |_| sig::sine2());
        self.register_producer("cosine2", |_| sig::cosine2());
        self.register_producer("saw2", |_| sig::saw2());
        self.register_producer("isaw2", |_| sig::isaw2());
        self.register_producer("tri2", |_| sig::tri2());
        self.register_producer("itri2", |_| sig::itri2());
        self.register_producer("square2", |_| sig::square2());
        self.register_producer("rand", |_| sig::rand());
        self.register_producer("randCycle", |_| sig::rand_cycle());
        self.register_producer("brand", |_| sig::brand());
        self.register_producer("brandBy", |args| {
            sig::brand_by(arg_f64(args, 0).unwrap_or(0.5))
        });
        self.register_producer("irand", |args| sig::irand(arg_i64(args, 0).unwrap_or(8)));
        self.register_producer("randL", |args| sig::rand_l(arg_i64(args, 0).unwrap_or(8)));
        self.register_producer("randrun", |args| randrun(arg_i64(args, 0).unwrap_or(8)));
        self.register_producer("perlin", |_| sig::perlin());
        self.register_producer("berlin", |_| sig::berlin());
        self.register_producer("choose", |args| {
            choose(args.iter().filter_map(arg_value).collect())
        });
        self.register_producer("wchoose", |args| {
            let mut pairs = Vec::new();
            for pair in args.chunks(2) {
                if pair.len() < 2 {
                    break;
                }
                if let (Some(value), Some(weight)) =
                    (arg_value(&pair[0]), pair[1].value.as_f64())
                {
                    pairs.push((value, weight));
                }
            }
            wchoose(pairs)
        });
        self.register_producer("chooseWith", |args| {
            match arg_pattern(args, 0) {
                Some(selector) => choose_with(
                    &selector,
                    args[1..].iter().filter_map(arg_value).collect(),
                ),
                None => Pattern::silence(),
            }
        });
        self.register_producer("chooseInWith", |args| {
            match arg_pattern(args, 0) {
                Some(selector) => choose_in_with(
                    &selector,
                    args[1..].iter().filter_map(|a| a.value.as_pattern()).collect(),
                ),
                None => Pattern::silence(),
            }
        });
        self.register_producer("chooseCycles", |args| choose_cycles(all_patterns(args)));
        self.register_producer("wchooseCycles", |args| {
            let mut pairs = Vec::new();
            for pair in args.chunks(2) {
                if pair.len() < 2 {
                    break;
                }
                if let (Some(p), Some(weight)) =
                    (pair[0].value.as_pattern(), pair[1].value.as_f64())
                {
                    pairs.push((p, weight));
                }
            }
            wchoose_cycles(pairs)
        });
        self.register_producer("note", |args| {
            parse_field_pattern(args, "note")
        });
        self.register_producer("sound", |args| {
            parse_field_pattern(args, "sound")
        });
        self.register_producer("s", |args| parse_field_pattern(args, "sound"));
        self.register_producer("n", |args| parse_field_pattern(args, "note"));
    }

    fn install_methods(&mut self) {
        self.register_method("fast", |p, args| p.fast_by(arg_control_or(args, 0, 2.0)));
        self.register_method("slow", |p, args| p.slow_by(arg_control_or(args, 0, 2.0)));
        self.register_method("late", |p, args| p.late_by(arg_control_or(args, 0, 0.0)));
        self.register_method("early", |p, args| {
            p.early_by(arg_control_or(args, 0, 0.0))
        });
        self.register_method("hurry", |p, args| {
            p.hurry(arg_rational(args, 0).unwrap_or(Rational::int(2)))
        });
        self.register_method("pace", |p, args| {
            p.pace(arg_rational(args, 0).unwrap_or(Rational::int(4)))
        });
        self.register_method("rev", |p, _| p.rev());
        self.register_method("revGroups", |p, args| {
            p.rev_groups(arg_rational(args, 0).unwrap_or(Rational::ONE))
        });
        self.register_method("revv", |p, _| p.revv());
        self.register_method("palindrome", |p, _| p.palindrome());
        self.register_method("zoom", |p, args| {
            p.zoom(
                arg_rational(args, 0).unwrap_or(Rational::ZERO),
                arg_rational(args, 1).unwrap_or(Rational::ONE),
            )
        });
        self.register_method("focus", |p, args| {
            p.focus(
                arg_rational(args, 0).unwrap_or(Rational::ZERO),
                arg_rational(args, 1).unwrap_or(Rational::ONE),
            )
        });
        self.register_method("compress", |p, args| {
            p.compress(
                arg_rational(args, 0).unwrap_or(Rational::ZERO),
                arg_rational(args, 1).unwrap_or(Rational::ONE),
            )
        });
        self.register_method("fastGap", |p, args| {
            p.fast_gap(arg_rational(args, 0).unwrap_or(Rational::int(2)))
        });
        self.register_method("ply", |p, args| p.ply(arg_i64(args, 0).unwrap_or(2)));
        self.register_method("repeatCycles", |p, args| {
            p.repeat_cycles(arg_i64(args, 0).unwrap_or(1))
        });
        self.register_method("take", |p, args| {
            p.take(arg_rational(args, 0).unwrap_or(Rational::ONE))
        });
        self.register_method("drop", |p, args| {
            p.drop_steps(arg_rational(args, 0).unwrap_or(Rational::ZERO))
        });
        self.register_method("linger", |p, args| {
            p.linger(arg_rational(args, 0).unwrap_or(Rational::ONE))
        });
        self.register_method("iter", |p, args| p.iter(arg_i64(args, 0).unwrap_or(4)));
        self.register_method("iterBack", |p, args| {
            p.iter_back(arg_i64(args, 0).unwrap_or(4))
        });
        self.register_method("every", |p, args| {
            let n = arg_i64(args, 0).unwrap_or(2);
            match arg_transform(args, 1) {
                Some(f) => p.every(n, move |q| f(q)),
                None => p.clone(),
            }
        });
        self.register_method("superimpose", |p, args| match arg_transform(args, 0) {
            Some(f) => p.superimpose(move |q| f(q)),
            None => p.clone(),
        });
        self.register_method("off", |p, args| {
            let t = arg_rational(args, 0).unwrap_or(Rational::ZERO);
            match arg_transform(args, 1) {
                Some(f) => p.off(t, move |q| f(q)),
                None => p.clone(),
            }
        });
        self.register_method("overlay", |p, args| match arg_pattern(args, 0) {
            Some(other) => p.overlay(other),
            None => p.clone(),
        });
        self.register_method("append", |p, args| match arg_pattern(args, 0) {
            Some(other) => p.append(other),
            None => p.clone(),
        });
        self.register_method("struct", |p, args| {
            p.struct_(arg_control_or(args, 0, 1.0))
        });
        self.register_method("structAll", |p, args| {
            p.struct_all(arg_control_or(args, 0, 1.0))
        });
        self.register_method("mask", |p, args| p.mask(arg_control_or(args, 0, 1.0)));
        self.register_method("maskAll", |p, args| {
            p.mask_all(arg_control_or(args, 0, 1.0))
        });
        self.register_method("bypass", |p, args| p.bypass(arg_control_or(args, 0, 0.0)));
        self.register_method("euclid", |p, args| {
            p.euclid(
                arg_i64(args, 0).unwrap_or(3),
                arg_i64(args, 1).unwrap_or(8),
                arg_i64(args, 2).unwrap_or(0),
            )
        });
        self.register_method("euclidLegato", |p, args| {
            p.euclid_legato(
                arg_i64(args, 0).unwrap_or(3),
                arg_i64(args, 1).unwrap_or(8),
                arg_i64(args, 2).unwrap_or(0),
            )
        });
        self.register_method("euclidish", |p, args| {
            p.euclidish(
                arg_i64(args, 0).unwrap_or(3),
                arg_i64(args, 1).unwrap_or(8),
                arg_f64(args, 2).unwrap_or(0.0),
            )
        });
        self.register_method("segment", |p, args| p.segment(arg_i64(args, 0).unwrap_or(16)));
        self.register_method("bite", |p, args| {
            let n = arg_i64(args, 0).unwrap_or(4);
            match arg_pattern(args, 1) {
                Some(selector) => p.bite(n, &selector),
                None => p.clone(),
            }
        });
        self.register_method("shuffle", |p, args| p.shuffle(arg_i64(args, 0).unwrap_or(4)));
        self.register_method("scramble", |p, args| {
            p.scramble(arg_i64(args, 0).unwrap_or(4))
        });
        self.register_method("degrade", |p, _| p.degrade());
        self.register_method("degradeBy", |p, args| {
            p.degrade_by(arg_f64(args, 0).unwrap_or(0.5))
        });
        self.register_method("undegradeBy", |p, args| {
            p.undegrade_by(arg_f64(args, 0).unwrap_or(0.5))
        });
        self.register_method("degradeByWith", |p, args| {
            let x = arg_f64(args, 1).unwrap_or(0.5);
            match arg_pattern(args, 0) {
                Some(with) => p.degrade_by_with(&with, x),
                None => p.degrade_by(x),
            }
        });
        self.register_method("sometimesBy", |p, args| {
            let prob = arg_f64(args, 0).unwrap_or(0.5);
            match arg_transform(args, 1) {
                Some(f) => p.sometimes_by(prob, move |q| f(q)),
                None => p.clone(),
            }
        });
        for (name, prob) in [
            ("sometimes", 0.5),
            ("often", 0.75),
            ("rarely", 0.25),
            ("almostNever", 0.1),
            ("almostAlways", 0.9),
        ] {
            self.register_method(name, move |p, args| match arg_transform(args, 0) {
                Some(f) => p.sometimes_by(prob, move |q| f(q)),
                None => p.clone(),
            });
        }
        self.register_method("never", |p, _| p.clone());
        self.register_method("always", |p, args| match arg_transform(args, 0) {
            Some(f) => f(p.clone()),
            None => p.clone(),
        });
        self.register_method("someCyclesBy", |p, args| {
            let prob = arg_f64(args, 0).unwrap_or(0.5);
            match arg_transform(args, 1) {
                Some(f) => p.some_cycles_by(prob, move |q| f(q)),
                None => p.clone(),
            }
        });
        self.register_method("someCycles", |p, args| match arg_transform(args, 0) {
            Some(f) => p.some_cycles(move |q| f(q)),
            None => p.clone(),
        });
        self.register_method("range", |p, args| {
            p.range(
                arg_f64(args, 0).unwrap_or(0.0),
                arg_f64(args, 1).unwrap_or(1.0),
            )
        });
        self.register_method("rangex", |p, args| {
            p.rangex(
                arg_f64(args, 0).unwrap_or(1.0),
                arg_f64(args, 1).unwrap_or(2.0),
            )
        });
        self.register_method("range2", |p, args| {
            p.range2(
                arg_f64(args, 0).unwrap_or(-1.0),
                arg_f64(args, 1).unwrap_or(1.0),
            )
        });
        self.register_method("toBipolar", |p, _| sig::to_bipolar(p));
        self.register_method("fromBipolar", |p, _| sig::from_bipolar(p));
        self.register_method("granularity", |p, args| {
            p.granularity(arg_rational(args, 0).unwrap_or(Rational::ONE))
        });
        self.register_method("seed", |p, args| p.seed(arg_i64(args, 0).unwrap_or(0)));
    }

    fn install_field_writers(&mut self) {
        for field in [
            "gain",
            "pan",
            "speed",
            "orbit",
            "lpf",
            "hpf",
            "resonance",
            "shape",
            "adsr",
            "attack",
            "decay",
            "sustain",
            "release",
            "room",
            "size",
            "coarse",
            "crush",
        ] {
            self.register_method(field, move |p, args| match arg_control(args, 0) {
                Some(control) => p.set_field(field, control),
                None => p.clone(),
            });
        }
    }

    fn install_arithmetic(&mut self) {
        for (name, op) in [
            ("add", ArithOp::Add),
            ("sub", ArithOp::Sub),
            ("mul", ArithOp::Mul),
            ("div", ArithOp::Div),
            ("rem", ArithOp::Rem),
            ("pow", ArithOp::Pow),
            ("band", ArithOp::BAnd),
            ("bor", ArithOp::BOr),
            ("bxor", ArithOp::BXor),
            ("shl", ArithOp::Shl),
            ("shr", ArithOp::Shr),
            ("lt", ArithOp::Lt),
            ("gt", ArithOp::Gt),
            ("le", ArithOp::Le),
            ("ge", ArithOp::Ge),
            ("eq", ArithOp::Eq),
            ("ne", ArithOp::Ne),
            ("eqt", ArithOp::Eqt),
            ("net", ArithOp::Net),
            ("and", ArithOp::And),
            ("or", ArithOp::Or),
        ] {
            self.register_method(name, move |p, args| match arg_control(args, 0) {
                Some(control) => p.apply_arithmetic(control, op),
                None => p.clone(),
            });
        }
        for (name, op) in [
            ("log2", UnaryOp::Log2),
            ("round", UnaryOp::Round),
            ("floor", UnaryOp::Floor),
            ("ceil", UnaryOp::Ceil),
        ] {
            self.register_method(name, move |p, _| p.apply_unary(op));
        }
    }
}

// ============= Argument helpers =============

fn arg_f64(args: &[DslArg], index: usize) -> Option<f64> {
    args.get(index).and_then(|a| a.value.as_f64())
}

fn arg_i64(args: &[DslArg], index: usize) -> Option<i64> {
    args.get(index).and_then(|a| a.value.as_i64())
}

fn arg_rational(args: &[DslArg], index: usize) -> Option<Rational> {
    args.get(index).and_then(|a| a.value.as_rational())
}

fn arg_pattern(args: &[DslArg], index: usize) -> Option<Pattern> {
    args.get(index).and_then(|a| a.value.as_pattern())
}

fn arg_control(args: &[DslArg], index: usize) -> Option<ControlArg> {
    args.get(index).and_then(|a| a.value.as_control())
}

fn arg_control_or(args: &[DslArg], index: usize, default: f64) -> ControlArg {
    arg_control(args, index).unwrap_or(ControlArg::Scalar(VoiceValue::Float(default)))
}

fn arg_transform(args: &[DslArg], index: usize) -> Option<PatternTransform> {
    args.get(index).and_then(|a| a.value.as_transform())
}

fn arg_value(arg: &DslArg) -> Option<VoiceValue> {
    match &arg.value {
        DslValue::Num(n) => Some(VoiceValue::Float(*n)),
        DslValue::Str(s) => Some(VoiceValue::parse(s)),
        _ => None,
    }
}

fn all_patterns(args: &[DslArg]) -> Vec<Pattern> {
    args.iter().filter_map(|a| a.value.as_pattern()).collect()
}

fn parse_field_pattern(args: &[DslArg], field: &str) -> Pattern {
    match args.first().map(|a| &a.value) {
        Some(DslValue::Str(s)) => mini_notation::parse_with(s, field_leaf(field)).pattern,
        Some(DslValue::Pattern(p)) => p.clone(),
        Some(DslValue::Num(n)) => Pattern::atom(
            crate::value::VoiceData::from_value(VoiceValue::Float(*n))
                .with_field(field, VoiceValue::Float(*n)),
        ),
        _ => Pattern::silence(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryContext;
    use crate::test_utils::values;

    fn ctx() -> QueryContext {
        QueryContext::new()
    }

    #[test]
    fn defaults_cover_the_surface() {
        let reg = DslRegistry::with_defaults();
        for name in ["seq", "stack", "sine", "rand", "perlin", "chooseCycles"] {
            assert!(reg.producer(name).is_some(), "missing producer {name}");
        }
        for name in ["fast", "struct", "degradeBy", "euclid", "gain", "add"] {
            assert!(reg.method(name).is_some(), "missing method {name}");
        }
    }

    #[test]
    fn aliases_resolve_to_canonical_names() {
        let reg = DslRegistry::with_defaults();
        assert!(reg.method("lp").is_some());
        assert!(reg.method("cutoff").is_some());
        assert!(reg.method("vol").is_some());
        // The canonical table holds only one implementation.
        assert!(reg.method_names().all(|n| n != "lp"));
    }

    #[test]
    fn unbound_producer_is_silence() {
        let reg = DslRegistry::with_defaults();
        let p = reg.produce("definitelyNotAThing", &[]);
        assert!(p.query_arc(Rational::ZERO, Rational::ONE, &ctx()).is_empty());
    }

    #[test]
    fn unbound_method_keeps_the_receiver() {
        let reg = DslRegistry::with_defaults();
        let p = mini_notation::pattern("a b");
        let out = reg.apply("definitelyNotAThing", &p, &[]);
        assert_eq!(
            values(&out.query_arc(Rational::ZERO, Rational::ONE, &ctx())),
            vec!["a", "b"]
        );
    }

    #[test]
    fn seq_producer_accepts_strings() {
        let reg = DslRegistry::with_defaults();
        let p = reg.produce("seq", &[DslArg::str("a b"), DslArg::str("c")]);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(values(&events), vec!["a", "b", "c"]);
    }

    #[test]
    fn field_writer_takes_a_pattern_argument() {
        let reg = DslRegistry::with_defaults();
        let p = mini_notation::pattern("x x");
        let out = reg.apply("gain", &p, &[DslArg::str("0.25 0.75")]);
        let events = out.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(
            events[0].data.get("gain"),
            Some(&VoiceValue::Rational(Rational::new(1, 4)))
        );
        assert_eq!(
            events[1].data.get("gain"),
            Some(&VoiceValue::Rational(Rational::new(3, 4)))
        );
    }

    #[test]
    fn every_method_applies_a_transform() {
        let reg = DslRegistry::with_defaults();
        let p = mini_notation::pattern("a b");
        let out = reg.apply(
            "every",
            &p,
            &[DslArg::num(2.0), DslArg::transform(|q| q.rev())],
        );
        assert_eq!(
            values(&out.query_arc(Rational::ZERO, Rational::ONE, &ctx())),
            vec!["b", "a"]
        );
        assert_eq!(
            values(&out.query_arc(Rational::ONE, Rational::int(2), &ctx())),
            vec!["a", "b"]
        );
    }

    #[test]
    fn sound_producer_writes_the_field() {
        let reg = DslRegistry::with_defaults();
        let p = reg.produce("s", &[DslArg::str("bd sn")]);
        let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        assert_eq!(
            events[0].data.get("sound"),
            Some(&VoiceValue::Str("bd".into()))
        );
    }
}
