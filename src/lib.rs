//! # Weft — a live-codable musical pattern engine
//!
//! Weft is an algebra of temporal patterns in the TidalCycles/Strudel
//! family: compound pattern expressions are evaluated on demand over any
//! requested time arc, producing a finite list of events with exact rational
//! timing. Nothing plays sound here; a host scheduler queries patterns per
//! audio block and renders the events however it likes.
//!
//! ## Quick start
//!
//! ```rust
//! use weft::mini_notation::pattern;
//! use weft::{QueryContext, Rational};
//!
//! let p = pattern("bd ~ [sn sn] ~").fast(Rational::int(2));
//! let events = p.query_arc(Rational::ZERO, Rational::ONE, &QueryContext::new());
//! for e in &events {
//!     println!("{} -> {}", e.part, e.value());
//! }
//! ```
//!
//! ## Design in one paragraph
//!
//! A [`Pattern`] is an immutable handle to a pure query function from a time
//! span and a [`QueryContext`] to events; combinators build new trees and
//! never mutate. Time math is exact (`Rational`), randomness is a pure
//! function of `(seed, salt, quantised time)` carried in the context, and
//! the query path never throws: every recoverable condition degrades to
//! silence or a dropped event. See `DESIGN.md` for the decision ledger.

pub mod context;
pub mod dsl;
pub mod mini_notation;
pub mod noise;
pub mod pattern;
pub mod pattern_join;
pub mod pattern_ops;
pub mod pattern_ops_extended;
pub mod pattern_rand;
pub mod pattern_signal;
pub mod pattern_structure;
pub mod rational;
pub mod test_utils;
pub mod value;

pub use context::QueryContext;
pub use pattern::{Event, Pattern, Query, SourceLocation, TimeSpan};
pub use pattern_join::{ArithOp, ControlArg, UnaryOp};
pub use rational::Rational;
pub use value::{VoiceData, VoiceValue};
