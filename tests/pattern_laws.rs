//! Universal laws of the pattern algebra.
//!
//! These hold for every pattern and every query arc; each test spot-checks a
//! representative family of inputs with exact event-list equality.

use pretty_assertions::assert_eq;
use weft::mini_notation::pattern;
use weft::test_utils::{seq_of, starts, values};
use weft::{Pattern, QueryContext, Rational, VoiceValue};

fn ctx() -> QueryContext {
    QueryContext::new()
}

fn arcs() -> Vec<(Rational, Rational)> {
    vec![
        (Rational::ZERO, Rational::ONE),
        (Rational::new(1, 4), Rational::new(7, 4)),
        (Rational::int(3), Rational::int(5)),
        (Rational::new(-1, 2), Rational::new(1, 2)),
    ]
}

fn subjects() -> Vec<Pattern> {
    vec![
        seq_of(&["a", "b", "c"]),
        pattern("bd ~ [sn sn] cp"),
        Pattern::pure("x").euclid(3, 8, 0),
        Pattern::stack(vec![seq_of(&["a", "b"]), seq_of(&["c"])]),
    ]
}

#[test]
fn sequence_monoid_identity() {
    for p in subjects() {
        let left = Pattern::sequence(vec![Pattern::silence(), p.clone()]);
        let right = Pattern::sequence(vec![p.clone(), Pattern::silence()]);
        for (from, to) in arcs() {
            let expected = p.query_arc(from, to, &ctx());
            assert_eq!(left.query_arc(from, to, &ctx()), expected);
            assert_eq!(right.query_arc(from, to, &ctx()), expected);
        }
    }
}

#[test]
fn tempo_inverse() {
    for p in subjects() {
        for k in [Rational::int(2), Rational::int(3), Rational::new(3, 2)] {
            let roundtrip = p.fast(k).slow(k);
            for (from, to) in arcs() {
                assert_eq!(
                    roundtrip.query_arc(from, to, &ctx()),
                    p.query_arc(from, to, &ctx()),
                    "fast({k}).slow({k})"
                );
            }
        }
        for x in [Rational::new(1, 3), Rational::new(7, 16)] {
            let roundtrip = p.late(x).early(x);
            for (from, to) in arcs() {
                assert_eq!(
                    roundtrip.query_arc(from, to, &ctx()),
                    p.query_arc(from, to, &ctx()),
                    "late({x}).early({x})"
                );
            }
        }
    }
}

#[test]
fn palindrome_is_forward_then_backward() {
    for p in subjects() {
        let palindrome = p.palindrome();
        let mut expected = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
        expected.extend(p.rev().query_arc(Rational::ONE, Rational::int(2), &ctx()));
        assert_eq!(
            palindrome.query_arc(Rational::ZERO, Rational::int(2), &ctx()),
            expected
        );
    }
}

#[test]
fn randomised_queries_are_deterministic() {
    let randomised = vec![
        pattern("a b c d e f g h").degrade_by(0.5),
        pattern("a? b? c? d?"),
        seq_of(&["x", "y"]).sometimes(|p| p.rev()),
        seq_of(&["x", "y", "z"]).shuffle(3),
    ];
    for p in randomised {
        let seeded = p.seed(17);
        for (from, to) in arcs() {
            assert_eq!(
                seeded.query_arc(from, to, &ctx()),
                seeded.query_arc(from, to, &ctx())
            );
        }
    }
}

#[test]
fn requerying_is_side_effect_free() {
    for p in subjects() {
        let before = p.query_arc(Rational::ZERO, Rational::int(4), &ctx());
        // Interleave other queries, then repeat the original.
        let _ = p.query_arc(Rational::int(2), Rational::int(3), &ctx());
        let _ = p.rev().query_arc(Rational::ZERO, Rational::ONE, &ctx());
        let after = p.query_arc(Rational::ZERO, Rational::int(4), &ctx());
        assert_eq!(before, after);
    }
}

#[test]
fn struct_timing_comes_from_truthy_mask_events() {
    let mask = pattern("1 0 1 1 0 1 0 0");
    let source = seq_of(&["a", "b", "c"]);
    let structured = source.struct_(mask.clone());
    let mask_events = mask.query_arc(Rational::ZERO, Rational::int(2), &ctx());
    let truthy_starts: Vec<Rational> = mask_events
        .iter()
        .filter(|e| e.value().truthy())
        .map(|e| e.part.begin)
        .collect();
    let out = structured.query_arc(Rational::ZERO, Rational::int(2), &ctx());
    assert!(!out.is_empty());
    for e in &out {
        assert!(
            truthy_starts.contains(&e.part.begin),
            "event at {} has no truthy mask event",
            e.part.begin
        );
    }
}

#[test]
fn degrade_complement_partitions_exactly() {
    let p = pattern("a b c d e f g h");
    for seed in [1, 2, 77] {
        for x in [0.25, 0.5, 0.9] {
            let kept = p.degrade_by(x).seed(seed);
            let dropped = p.undegrade_by(x).seed(seed);
            let mut union = kept.query_arc(Rational::ZERO, Rational::int(2), &ctx());
            union.extend(dropped.query_arc(Rational::ZERO, Rational::int(2), &ctx()));
            union.sort_by(|a, b| a.part.begin.cmp(&b.part.begin));
            let everything = p.query_arc(Rational::ZERO, Rational::int(2), &ctx());
            assert_eq!(union, everything, "seed {seed} x {x}");
        }
    }
}

#[test]
fn arithmetic_touches_only_the_value_field() {
    let p = pattern("1 2 3")
        .set_field("gain", 0.8)
        .set_field("pan", 0.5)
        .add(10i64);
    let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
    assert_eq!(values(&events), vec!["11", "12", "13"]);
    for e in &events {
        assert_eq!(e.data.get("gain"), Some(&VoiceValue::Float(0.8)));
        assert_eq!(e.data.get("pan"), Some(&VoiceValue::Float(0.5)));
    }
}

#[test]
fn query_order_is_by_part_begin_with_stable_ties() {
    let p = Pattern::stack(vec![
        seq_of(&["a1", "a2"]),
        seq_of(&["b1", "b2"]),
        seq_of(&["c1", "c2", "c3", "c4"]),
    ]);
    let events = p.query_arc(Rational::ZERO, Rational::ONE, &ctx());
    let begins = starts(&events);
    let mut sorted = begins.clone();
    sorted.sort();
    assert_eq!(begins, sorted);
    // Ties at 0 and 1/2 keep child order.
    assert_eq!(
        values(&events),
        vec!["a1", "b1", "c1", "c2", "a2", "b2", "c3", "c4"]
    );
}
