//! The pattern algebra core
//!
//! A pattern is a pure function from a time span and query context to a list
//! of events. This module holds the time types, the event record, the `Query`
//! trait and its core implementers, and the `Pattern` handle everything else
//! composes through.
//!
//! The implementer set of `Query` is finite and closed: Silence, Atom,
//! AtomInfinite, Continuous (pattern_signal), Sequence, Stack, Slowcat,
//! Arrangement and Place (pattern_ops_extended), LinearWarp, Rev, Zoom and
//! Compress (pattern_ops), Structure (pattern_structure), Control and Join
//! (pattern_join), plus the generic ValueMap, Filter, ContextMap and
//! CyclePattern nodes defined here. New operators are compositions of these,
//! not new implementers.

use crate::context::QueryContext;
use crate::rational::Rational;
use crate::value::{VoiceData, VoiceValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A byte range in the source text that produced a leaf, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub offset: usize,
    pub len: usize,
}

/// Half-open interval `[begin, end)` over rational time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub begin: Rational,
    pub end: Rational,
}

impl TimeSpan {
    pub fn new(begin: Rational, end: Rational) -> Self {
        TimeSpan { begin, end }
    }

    pub fn cycle(c: i64) -> Self {
        TimeSpan::new(Rational::int(c), Rational::int(c + 1))
    }

    pub fn duration(&self) -> Rational {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    pub fn contains(&self, t: Rational) -> bool {
        self.begin <= t && t < self.end
    }

    pub fn shift(&self, x: Rational) -> Self {
        TimeSpan::new(self.begin + x, self.end + x)
    }

    /// Scales both endpoints around 0.
    pub fn scale(&self, x: Rational) -> Self {
        TimeSpan::new(self.begin * x, self.end * x).normalised()
    }

    /// Apply a time map to both endpoints, keeping begin <= end.
    pub fn map(&self, f: impl Fn(Rational) -> Rational) -> Self {
        TimeSpan::new(f(self.begin), f(self.end)).normalised()
    }

    fn normalised(self) -> Self {
        if self.begin <= self.end {
            self
        } else {
            TimeSpan::new(self.end, self.begin)
        }
    }

    pub fn intersect(&self, other: &TimeSpan) -> Option<TimeSpan> {
        let begin = self.begin.max(other.begin);
        let end = self.end.min(other.end);
        if begin > end {
            None
        } else {
            Some(TimeSpan::new(begin, end))
        }
    }

    /// Lazy walk over the sub-spans obtained by splitting at each integer
    /// cycle boundary.
    pub fn cycle_walk(&self) -> CycleWalk {
        CycleWalk {
            cur: self.begin,
            end: self.end,
        }
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

pub struct CycleWalk {
    cur: Rational,
    end: Rational,
}

impl Iterator for CycleWalk {
    type Item = TimeSpan;

    fn next(&mut self) -> Option<TimeSpan> {
        if self.cur >= self.end {
            return None;
        }
        let next = self.cur.next_sam().min(self.end);
        let span = TimeSpan::new(self.cur, next);
        self.cur = next;
        Some(span)
    }
}

/// One musical happening: the note's intrinsic span (`whole`), the fragment
/// visible through the query window (`part`), and its voice data.
/// `whole == None` encodes the unbounded span of the infinite atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub whole: Option<TimeSpan>,
    pub part: TimeSpan,
    pub data: VoiceData,
    pub source_locations: Vec<SourceLocation>,
}

impl Event {
    pub fn new(whole: Option<TimeSpan>, part: TimeSpan, data: VoiceData) -> Self {
        Event {
            whole,
            part,
            data,
            source_locations: Vec::new(),
        }
    }

    pub fn with_locations(mut self, locs: Vec<SourceLocation>) -> Self {
        self.source_locations = locs;
        self
    }

    /// The event's own start: whole begin where known, else part begin.
    pub fn begin(&self) -> Rational {
        self.whole.map(|w| w.begin).unwrap_or(self.part.begin)
    }

    pub fn value(&self) -> VoiceValue {
        self.data.value()
    }

    /// True when the visible part is only a fragment of the whole note.
    pub fn is_fragment(&self) -> bool {
        match self.whole {
            Some(w) => w != self.part,
            None => true,
        }
    }

    pub fn with_data(&self, data: VoiceData) -> Self {
        Event {
            data,
            ..self.clone()
        }
    }

    /// Apply a time map to whole and part together.
    pub fn map_spans(&self, f: impl Fn(TimeSpan) -> TimeSpan) -> Self {
        Event {
            whole: self.whole.map(&f),
            part: f(self.part),
            data: self.data.clone(),
            source_locations: self.source_locations.clone(),
        }
    }

    /// Clip the part to a window; None when nothing remains visible.
    pub fn clipped(&self, window: &TimeSpan) -> Option<Event> {
        let part = self.part.intersect(window)?;
        if part.is_empty() && !self.part.is_empty() {
            return None;
        }
        Some(Event {
            part,
            ..self.clone()
        })
    }
}

/// The single behavior of a pattern variant. Implementations must be pure:
/// the same span and context always produce the same events, and the query
/// path never panics.
pub trait Query: Send + Sync + 'static {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event>;
}

/// A cheap-to-clone handle to an immutable pattern tree, carrying the
/// metadata that proportional sequencing and tempo combinators consult.
#[derive(Clone)]
pub struct Pattern {
    node: Arc<dyn Query>,
    weight: f64,
    steps: Option<Rational>,
    cycles: Rational,
    identity_silence: bool,
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("weight", &self.weight)
            .field("steps", &self.steps)
            .field("cycles", &self.cycles)
            .finish()
    }
}

impl Pattern {
    pub(crate) fn from_node(node: impl Query) -> Self {
        Pattern {
            node: Arc::new(node),
            weight: 1.0,
            steps: None,
            cycles: Rational::ONE,
            identity_silence: false,
        }
    }

    /// Proportional weight inside a sequence.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn with_weight(&self, weight: f64) -> Self {
        Pattern {
            weight,
            ..self.clone()
        }
    }

    /// Declared metrical step count; None when undefined.
    pub fn num_steps(&self) -> Option<Rational> {
        self.steps
    }

    pub fn with_steps(&self, steps: Option<Rational>) -> Self {
        Pattern {
            steps,
            ..self.clone()
        }
    }

    /// Natural cycle length reported to tempo combinators.
    pub fn estimate_cycle_duration(&self) -> Rational {
        self.cycles
    }

    pub(crate) fn with_cycles(&self, cycles: Rational) -> Self {
        Pattern {
            cycles,
            ..self.clone()
        }
    }

    pub(crate) fn is_identity_silence(&self) -> bool {
        self.identity_silence
    }

    /// Query without ordering guarantees; `query_arc` is the public surface.
    pub(crate) fn query_span(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        if span.is_empty() {
            return Vec::new();
        }
        self.node.query(span, ctx)
    }

    /// Evaluate the pattern over `[from, to)`. Events come back ordered by
    /// `part.begin`, construction order breaking ties.
    pub fn query_arc(&self, from: Rational, to: Rational, ctx: &QueryContext) -> Vec<Event> {
        let mut events = self.query_span(TimeSpan::new(from, to), ctx);
        events.sort_by(|a, b| a.part.begin.cmp(&b.part.begin));
        events
    }

    /// Same result as `query_arc`, computed cycle-by-cycle in parallel.
    /// Sound because queries are pure and arcs are disjoint.
    pub fn query_arc_par(&self, from: Rational, to: Rational, ctx: &QueryContext) -> Vec<Event> {
        use rayon::prelude::*;
        let spans: Vec<TimeSpan> = TimeSpan::new(from, to).cycle_walk().collect();
        spans
            .into_par_iter()
            .map(|s| self.query_arc(s.begin, s.end, ctx))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Sample the event active at `t`, if any.
    pub fn sample_at(&self, t: Rational, ctx: &QueryContext) -> Option<Event> {
        let probe = TimeSpan::new(t, t + Rational::new(1, 1_000_000));
        let events = self.query_span(probe, ctx);
        events
            .iter()
            .find(|e| e.whole.map(|w| w.contains(t)).unwrap_or(true) || e.part.contains(t))
            .or_else(|| events.first())
            .cloned()
    }

    // ============= Core constructors =============

    /// The empty pattern; identity of `sequence` and `stack`.
    pub fn silence() -> Self {
        Pattern {
            identity_silence: true,
            ..Pattern::from_node(SilenceNode)
        }
    }

    /// A rest: emits nothing but occupies its step inside a sequence.
    pub fn rest() -> Self {
        Pattern::from_node(SilenceNode)
    }

    /// One event per cycle carrying `data`.
    pub fn atom(data: VoiceData) -> Self {
        Pattern::from_node(AtomNode {
            data,
            locations: Vec::new(),
        })
        .with_steps(Some(Rational::ONE))
    }

    pub fn atom_at(data: VoiceData, locations: Vec<SourceLocation>) -> Self {
        Pattern::from_node(AtomNode { data, locations }).with_steps(Some(Rational::ONE))
    }

    pub fn pure(value: impl Into<VoiceValue>) -> Self {
        Pattern::atom(VoiceData::from_value(value))
    }

    /// Like `atom`, but the whole is unbounded; the unit of the joins.
    pub fn atom_infinite(data: VoiceData) -> Self {
        Pattern::from_node(AtomInfiniteNode { data })
    }

    /// Squash children into a single cycle, each taking time proportional
    /// to its weight. `silence()` children are dropped (monoid identity);
    /// rests occupy their slot.
    pub fn sequence(children: Vec<Pattern>) -> Self {
        let children: Vec<Pattern> = children
            .into_iter()
            .filter(|c| !c.is_identity_silence())
            .collect();
        if children.is_empty() {
            return Pattern::silence();
        }
        if children.len() == 1 {
            return children.into_iter().next().unwrap();
        }
        let steps = if children.iter().all(|c| c.num_steps().is_some()) {
            Some(
                children
                    .iter()
                    .filter_map(|c| c.num_steps())
                    .fold(Rational::ZERO, |a, b| a + b),
            )
        } else {
            Some(Rational::int(children.len() as i64))
        };
        let weights: Vec<Rational> = children
            .iter()
            .map(|c| {
                let w = Rational::approx(c.weight());
                if w <= Rational::ZERO {
                    Rational::ONE
                } else {
                    w
                }
            })
            .collect();
        let total = weights.iter().fold(Rational::ZERO, |a, b| a + *b);
        let mut slots = Vec::with_capacity(children.len());
        let mut acc = Rational::ZERO;
        for (child, w) in children.into_iter().zip(weights) {
            let begin = acc / total;
            acc = acc + w;
            let end = acc / total;
            slots.push(SequenceSlot { begin, end, child });
        }
        Pattern::from_node(SequenceNode { slots }).with_steps(steps)
    }

    /// Play all children simultaneously; the union of their events.
    pub fn stack(children: Vec<Pattern>) -> Self {
        let children: Vec<Pattern> = children
            .into_iter()
            .filter(|c| !c.is_identity_silence())
            .collect();
        if children.is_empty() {
            return Pattern::silence();
        }
        if children.len() == 1 {
            return children.into_iter().next().unwrap();
        }
        let weight = children.iter().map(|c| c.weight()).fold(1.0, f64::max);
        let cycles = children
            .iter()
            .map(|c| c.estimate_cycle_duration())
            .fold(Rational::ONE, Rational::max);
        let steps = children.iter().filter_map(|c| c.num_steps()).max();
        Pattern::from_node(StackNode { children })
            .with_weight(weight)
            .with_steps(steps)
            .with_cycles(cycles)
    }

    /// One child per cycle, round-robin; each child advances through its own
    /// cycles one per visit.
    pub fn slowcat(children: Vec<Pattern>) -> Self {
        let children: Vec<Pattern> = children
            .into_iter()
            .filter(|c| !c.is_identity_silence())
            .collect();
        if children.is_empty() {
            return Pattern::silence();
        }
        if children.len() == 1 {
            return children.into_iter().next().unwrap();
        }
        let cycles = Rational::int(children.len() as i64);
        Pattern::from_node(SlowcatNode { children }).with_cycles(cycles)
    }

    // ============= Generic wrappers =============

    /// Map event data; returning None drops the event.
    pub fn map_data(
        &self,
        f: impl Fn(&VoiceData, &QueryContext) -> Option<VoiceData> + Send + Sync + 'static,
    ) -> Self {
        Pattern::from_node(ValueMapNode {
            source: self.clone(),
            f: Arc::new(f),
        })
        .with_weight(self.weight)
        .with_steps(self.steps)
        .with_cycles(self.cycles)
    }

    /// Map just the `value` slot.
    pub fn map_value(
        &self,
        f: impl Fn(&VoiceValue) -> VoiceValue + Send + Sync + 'static,
    ) -> Self {
        self.map_data(move |d, _| Some(d.with_value(f(&d.value()))))
    }

    /// Keep events satisfying the predicate.
    pub fn filter_events(
        &self,
        pred: impl Fn(&Event, &QueryContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Pattern::from_node(FilterNode {
            source: self.clone(),
            pred: Arc::new(pred),
        })
        .with_weight(self.weight)
        .with_steps(self.steps)
        .with_cycles(self.cycles)
    }

    /// Query the child under a modified context.
    pub fn with_context(
        &self,
        f: impl Fn(&QueryContext) -> QueryContext + Send + Sync + 'static,
    ) -> Self {
        Pattern::from_node(ContextMapNode {
            source: self.clone(),
            f: Arc::new(f),
        })
        .with_weight(self.weight)
        .with_steps(self.steps)
        .with_cycles(self.cycles)
    }

    /// Fix the random seed for everything under this point.
    pub fn seed(&self, seed: i64) -> Self {
        self.with_context(move |ctx| ctx.with_seed(seed))
    }

    /// Build a (possibly different) pattern for every integer cycle.
    pub(crate) fn per_cycle(
        build: impl Fn(i64, &QueryContext) -> Pattern + Send + Sync + 'static,
    ) -> Self {
        Pattern::from_node(CyclePatternNode {
            build: Arc::new(build),
        })
    }
}

// ============= Core nodes =============

struct SilenceNode;

impl Query for SilenceNode {
    fn query(&self, _span: TimeSpan, _ctx: &QueryContext) -> Vec<Event> {
        Vec::new()
    }
}

struct AtomNode {
    data: VoiceData,
    locations: Vec<SourceLocation>,
}

impl Query for AtomNode {
    fn query(&self, span: TimeSpan, _ctx: &QueryContext) -> Vec<Event> {
        span.cycle_walk()
            .map(|part| {
                let whole = TimeSpan::new(part.begin.sam(), part.begin.sam() + Rational::ONE);
                Event::new(Some(whole), part, self.data.clone())
                    .with_locations(self.locations.clone())
            })
            .collect()
    }
}

struct AtomInfiniteNode {
    data: VoiceData,
}

impl Query for AtomInfiniteNode {
    fn query(&self, span: TimeSpan, _ctx: &QueryContext) -> Vec<Event> {
        span.cycle_walk()
            .map(|part| Event::new(None, part, self.data.clone()))
            .collect()
    }
}

struct SequenceSlot {
    begin: Rational,
    end: Rational,
    child: Pattern,
}

struct SequenceNode {
    slots: Vec<SequenceSlot>,
}

impl Query for SequenceNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let mut events = Vec::new();
        for cs in span.cycle_walk() {
            let cycle = cs.begin.sam();
            for slot in &self.slots {
                let width = slot.end - slot.begin;
                if width.is_zero() {
                    continue;
                }
                let window = TimeSpan::new(cycle + slot.begin, cycle + slot.end);
                let clip = match cs.intersect(&window) {
                    Some(c) if !c.is_empty() => c,
                    _ => continue,
                };
                // Map the slot onto the child's full cycle and back.
                let slot_begin = slot.begin;
                let to_child = |t: Rational| cycle + (t - cycle - slot_begin) / width;
                let from_child = |t: Rational| cycle + slot_begin + (t - cycle) * width;
                let child_span = clip.map(to_child);
                for event in slot.child.query_span(child_span, ctx) {
                    events.push(event.map_spans(|s| s.map(from_child)));
                }
            }
        }
        events
    }
}

struct StackNode {
    children: Vec<Pattern>,
}

impl Query for StackNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        self.children
            .iter()
            .flat_map(|c| c.query_span(span, ctx))
            .collect()
    }
}

struct SlowcatNode {
    children: Vec<Pattern>,
}

impl Query for SlowcatNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let n = self.children.len() as i64;
        let mut events = Vec::new();
        for cs in span.cycle_walk() {
            let cycle = cs.begin.floor();
            let index = cycle.rem_euclid(n) as usize;
            // The chosen child experiences consecutive cycles of its own.
            let shift = Rational::int(cycle - cycle.div_euclid(n));
            let child_span = cs.shift(-shift);
            for event in self.children[index].query_span(child_span, ctx) {
                events.push(event.map_spans(|s| s.shift(shift)));
            }
        }
        events
    }
}

struct ValueMapNode {
    source: Pattern,
    f: Arc<dyn Fn(&VoiceData, &QueryContext) -> Option<VoiceData> + Send + Sync>,
}

impl Query for ValueMapNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        self.source
            .query_span(span, ctx)
            .into_iter()
            .filter_map(|e| (self.f)(&e.data, ctx).map(|d| e.with_data(d)))
            .collect()
    }
}

struct FilterNode {
    source: Pattern,
    pred: Arc<dyn Fn(&Event, &QueryContext) -> bool + Send + Sync>,
}

impl Query for FilterNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        self.source
            .query_span(span, ctx)
            .into_iter()
            .filter(|e| (self.pred)(e, ctx))
            .collect()
    }
}

struct ContextMapNode {
    source: Pattern,
    f: Arc<dyn Fn(&QueryContext) -> QueryContext + Send + Sync>,
}

impl Query for ContextMapNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let child_ctx = (self.f)(ctx);
        self.source.query_span(span, &child_ctx)
    }
}

struct CyclePatternNode {
    build: Arc<dyn Fn(i64, &QueryContext) -> Pattern + Send + Sync>,
}

impl Query for CyclePatternNode {
    fn query(&self, span: TimeSpan, ctx: &QueryContext) -> Vec<Event> {
        let mut events = Vec::new();
        for cs in span.cycle_walk() {
            let cycle = cs.begin.floor();
            let pattern = (self.build)(cycle, ctx);
            events.extend(pattern.query_span(cs, ctx));
        }
        events
    }
}
