use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_store::{Arena, SharedPriorityQueue, Value, ValueKind};

mod common {
    use std::io::Write;

    pub fn init() {
        let _ = env_logger::builder()
            .format(|buf, record| writeln!(buf, "{}", record.args()))
            .is_test(true)
            .try_init();
    }
}

fn arena() -> Arena {
    Arena::new(SharedPriorityQueue::family_layout())
}

#[test]
fn min_queue_orders_by_priority(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let q = SharedPriorityQueue::new(&a, ValueKind::String, false)
        .enqueue(&mut a, 3.0, &Value::from("low"))?
        .enqueue(&mut a, 1.0, &Value::from("high"))?
        .enqueue(&mut a, 2.0, &Value::from("med"))?;

    assert_eq!(q.peek(&a)?, Some(Value::from("high")));
    assert_eq!(q.peek_priority(&a), Some(1.0));

    let q = q.dequeue(&mut a)?;
    assert_eq!(q.peek(&a)?, Some(Value::from("med")));
    let q = q.dequeue(&mut a)?;
    assert_eq!(q.peek(&a)?, Some(Value::from("low")));
    let q = q.dequeue(&mut a)?;
    assert!(q.is_empty());
    assert_eq!(q.peek(&a)?, None);
    // Dequeuing empty returns the same handle.
    let same = q.dequeue(&mut a)?;
    assert!(same.is_empty());
    Ok(())
}

#[test]
fn max_queue_reverses_the_direction(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let q = SharedPriorityQueue::new(&a, ValueKind::String, true)
        .enqueue(&mut a, 3.0, &Value::from("low"))?
        .enqueue(&mut a, 1.0, &Value::from("high"))?
        .enqueue(&mut a, 2.0, &Value::from("med"))?;
    assert_eq!(q.peek(&a)?, Some(Value::from("low")));
    assert_eq!(q.peek_priority(&a), Some(3.0));
    let q = q.dequeue(&mut a)?;
    assert_eq!(q.peek(&a)?, Some(Value::from("med")));
    Ok(())
}

#[test]
fn leftist_versions_are_independent(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let base = SharedPriorityQueue::new(&a, ValueKind::String, false)
        .enqueue(&mut a, 5.0, &Value::from("five"))?
        .enqueue(&mut a, 9.0, &Value::from("nine"))?;

    let with_one = base.enqueue(&mut a, 1.0, &Value::from("one"))?;
    let drained = base.dequeue(&mut a)?;

    // peek(ins(h, p, v)) is the better of peek(h) and (p, v).
    assert_eq!(with_one.peek(&a)?, Some(Value::from("one")));
    assert_eq!(base.peek(&a)?, Some(Value::from("five")));
    assert_eq!(drained.peek(&a)?, Some(Value::from("nine")));
    assert_eq!(base.len(), 2);
    Ok(())
}

#[test]
fn draining_is_priority_monotone(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut rng = StdRng::seed_from_u64(99);
    let mut q = SharedPriorityQueue::new(&a, ValueKind::Number, false);
    for _ in 0..250 {
        let p: f64 = rng.random_range(-500.0..500.0);
        q = q.enqueue(&mut a, p, &Value::from(p))?;
    }
    let mut last = f64::NEG_INFINITY;
    while let Some(p) = q.peek_priority(&a) {
        assert!(p >= last);
        last = p;
        q = q.dequeue(&mut a)?;
    }
    assert!(q.is_empty());
    Ok(())
}

#[test]
fn binary_variant_matches_leftist_order(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut rng = StdRng::seed_from_u64(1234);
    let mut bin = SharedPriorityQueue::new_binary(
        &mut a,
        ValueKind::Number,
        false,
        8,
    )?;
    let mut left = SharedPriorityQueue::new(&a, ValueKind::Number, false);
    for _ in 0..100 {
        let p: f64 = rng.random_range(0.0..1000.0);
        bin = bin.enqueue(&mut a, p, &Value::from(p))?;
        left = left.enqueue(&mut a, p, &Value::from(p))?;
    }
    assert_eq!(bin.len(), left.len());
    for _ in 0..100 {
        assert_eq!(bin.peek_priority(&a), left.peek_priority(&a));
        assert_eq!(bin.peek(&a)?, left.peek(&a)?);
        bin = bin.dequeue(&mut a)?;
        left = left.dequeue(&mut a)?;
    }
    assert!(bin.is_empty());
    Ok(())
}

#[test]
fn binary_peek_cache_answers_for_the_handle(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let q1 = SharedPriorityQueue::new_binary(
        &mut a,
        ValueKind::String,
        false,
        4,
    )?
    .enqueue(&mut a, 2.0, &Value::from("two"))?;
    // The block mutates underneath, but each handle cached its own top.
    let q2 = q1.enqueue(&mut a, 1.0, &Value::from("one"))?;
    assert_eq!(q1.peek_priority(&a), Some(2.0));
    assert_eq!(q2.peek_priority(&a), Some(1.0));
    assert_eq!(q2.peek(&a)?, Some(Value::from("one")));
    Ok(())
}
