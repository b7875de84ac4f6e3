//! Property tests for arena borrow/clear sequences.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use proptest::prelude::*;
use sqlsession_pool::{PoolError, PooledValue, ValueArena, ValuePool};
use sqlsession_types::{SqlValue, ValueKind};

#[derive(Debug, Clone)]
enum Op {
    Acquire(ValueKind, Option<i64>),
    Clear,
}

fn kind() -> impl Strategy<Value = ValueKind> {
    prop_oneof![
        Just(ValueKind::String),
        Just(ValueKind::Int64),
        Just(ValueKind::Float64),
        Just(ValueKind::Bool),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (kind(), proptest::option::of(0i64..2)).prop_map(|(k, v)| Op::Acquire(k, v)),
        1 => Just(Op::Clear),
    ]
}

fn driver_value(kind: ValueKind, seed: i64) -> SqlValue {
    match kind {
        ValueKind::String => SqlValue::String(format!("v{seed}")),
        ValueKind::Int64 => SqlValue::Int(seed + 1),
        ValueKind::Float64 => SqlValue::Float(seed as f64 + 0.5),
        ValueKind::Bool => SqlValue::Bool(seed == 1),
    }
}

// =============================================================================
// Invariants
// =============================================================================

proptest! {
    #[test]
    fn clear_leaves_nothing_in_use(ops in proptest::collection::vec(op(), 0..64)) {
        let pool = Arc::new(ValuePool::with_max_idle(16));
        let mut arena = ValueArena::new(pool.clone());
        let mut handles: Vec<PooledValue> = Vec::new();

        for op in ops {
            match op {
                Op::Acquire(kind, value) => {
                    let slot = arena.acquire_kind(kind).unwrap();
                    if let Some(seed) = value {
                        slot.scan(&driver_value(kind, seed)).unwrap();
                    }
                    handles.push(slot);
                }
                Op::Clear => arena.clear(),
            }
            prop_assert_eq!(pool.stats().in_use, arena.len() as i64);
        }

        arena.clear();
        prop_assert_eq!(pool.stats().in_use, 0);
        prop_assert!(arena.is_empty());
        for handle in &handles {
            prop_assert!(!handle.is_valid());
            prop_assert_eq!(handle.to_sql_value(), SqlValue::Null);
        }
    }

    #[test]
    fn live_handles_are_never_shared(n in 1usize..32) {
        let pool = Arc::new(ValuePool::with_max_idle(64));

        // Warm the free list so both arenas draw recycled slots.
        let mut warm = ValueArena::new(pool.clone());
        for _ in 0..n {
            warm.int64().unwrap();
        }
        warm.clear();

        let mut a = ValueArena::new(pool.clone());
        let mut b = ValueArena::new(pool.clone());
        let live_a: Vec<_> = (0..n).map(|_| a.int64().unwrap()).collect();
        let live_b: Vec<_> = (0..n).map(|_| b.int64().unwrap()).collect();

        for x in &live_a {
            for y in &live_b {
                prop_assert!(!x.same_slot(y));
            }
        }
    }

    #[test]
    fn clear_twice_equals_clear_once(n in 0usize..32) {
        let pool = Arc::new(ValuePool::with_max_idle(8));
        let mut arena = ValueArena::new(pool.clone());
        for _ in 0..n {
            arena.string().unwrap();
        }
        arena.clear();
        let once = pool.stats();
        arena.clear();
        prop_assert_eq!(pool.stats(), once);
    }
}

// =============================================================================
// Reuse
// =============================================================================

#[test]
fn test_four_kinds_come_back_reset() {
    let pool = Arc::new(ValuePool::with_max_idle(16));
    let mut arena = ValueArena::new(pool.clone());

    let s = arena.string().unwrap();
    let i = arena.int64().unwrap();
    let f = arena.float64().unwrap();
    let b = arena.bool().unwrap();
    s.scan(&SqlValue::String("hello".into())).unwrap();
    i.scan(&SqlValue::Int(42)).unwrap();
    f.scan(&SqlValue::Float(1.5)).unwrap();
    b.scan(&SqlValue::Bool(true)).unwrap();

    arena.clear();

    let s2 = arena.string().unwrap();
    let i2 = arena.int64().unwrap();
    let f2 = arena.float64().unwrap();
    let b2 = arena.bool().unwrap();

    assert!(s2.same_slot(&s));
    assert!(i2.same_slot(&i));
    assert!(f2.same_slot(&f));
    assert!(b2.same_slot(&b));

    assert_eq!(s2.get().value(), "");
    assert_eq!(*i2.get().value(), 0);
    assert_eq!(*f2.get().value(), 0.0);
    assert!(!*b2.get().value());
    assert!(!s2.is_valid() && !i2.is_valid() && !f2.is_valid() && !b2.is_valid());
}

#[test]
fn test_released_handle_cannot_reach_next_arena() {
    let pool = Arc::new(ValuePool::with_max_idle(16));
    let mut first = ValueArena::new(pool.clone());
    let kept = first.string().unwrap();
    kept.scan(&SqlValue::String("first tree".into())).unwrap();
    first.close();

    let mut second = ValueArena::new(pool.clone());
    let reused = second.string().unwrap();
    assert!(reused.same_slot(&kept));
    reused.scan(&SqlValue::String("second tree".into())).unwrap();

    assert_eq!(kept.value(), None);
    assert!(!kept.is_valid());
    assert_eq!(
        kept.scan(&SqlValue::String("written late".into())),
        Err(PoolError::ArenaClosed)
    );
    assert_eq!(reused.value().as_deref(), Some("second tree"));
}

#[test]
fn test_concurrent_arenas_share_one_pool() {
    let pool = Arc::new(ValuePool::with_max_idle(1024));
    let threads: Vec<_> = (0..8)
        .map(|t| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let mut arena = ValueArena::new(pool);
                for round in 0..50 {
                    for n in 0..10 {
                        let slot = arena.int64().unwrap();
                        slot.scan(&SqlValue::Int(t * 1000 + round * 10 + n)).unwrap();
                        assert_eq!(slot.value(), Some(t * 1000 + round * 10 + n));
                    }
                    arena.clear();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(pool.stats().in_use, 0);
}
