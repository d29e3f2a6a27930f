use strata_store::{Arena, SharedList, Value, ValueKind};

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
    Arena::new(SharedList::family_layout())
}

#[test]
fn push_get_set_pop_laws() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut list = SharedList::new(&a, ValueKind::Number);

    for i in 0..1100 {
        let before = list.len();
        list = list.push(&mut a, &Value::from(f64::from(i)))?;
        // get(push(h, v), size(h)) == v and size grows by one.
        assert_eq!(list.len(), before + 1);
        assert_eq!(list.get(&a, before)?, Some(Value::from(f64::from(i))));
    }

    let updated = list.set(&mut a, 513, &Value::from(-1.0))?;
    assert_eq!(updated.get(&a, 513)?, Some(Value::from(-1.0)));
    assert_eq!(updated.len(), list.len());
    // The pre-set version is untouched.
    assert_eq!(list.get(&a, 513)?, Some(Value::from(513.0)));

    // Out-of-range access: absent reads, no-op writes.
    assert_eq!(list.get(&a, 1100)?, None);
    let same = list.set(&mut a, 1100, &Value::from(0.0))?;
    assert_eq!(same, list);

    let mut shrinking = list.clone();
    for i in (0..1100u32).rev() {
        shrinking = shrinking.pop(&mut a)?;
        assert_eq!(shrinking.len(), i);
    }
    assert!(shrinking.is_empty());
    // Popping empty stays a no-op.
    let still = shrinking.pop(&mut a)?;
    assert!(still.is_empty());
    // The full version was never disturbed by the pops.
    assert_eq!(list.len(), 1100);
    assert_eq!(list.get(&a, 1099)?, Some(Value::from(1099.0)));
    Ok(())
}

#[test]
fn iteration_is_positional() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut list = SharedList::new(&a, ValueKind::String);
    for i in 0..100 {
        list =
            list.push(&mut a, &Value::from(format!("s{}", i).as_str()))?;
    }
    let collected: Vec<Value> =
        list.iter(&a).collect::<Result<_, _>>()?;
    assert_eq!(collected.len(), 100);
    for (i, v) in collected.iter().enumerate() {
        assert_eq!(*v, Value::from(format!("s{}", i).as_str()));
    }
    assert_eq!(list.last(&a)?, Some(Value::from("s99")));
    Ok(())
}

#[test]
fn branching_histories_stay_independent(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut base = SharedList::new(&a, ValueKind::Number);
    for i in 0..40 {
        base = base.push(&mut a, &Value::from(f64::from(i)))?;
    }
    let left = base.push(&mut a, &Value::from(100.0))?;
    let right = base.push(&mut a, &Value::from(200.0))?;
    assert_eq!(left.get(&a, 40)?, Some(Value::from(100.0)));
    assert_eq!(right.get(&a, 40)?, Some(Value::from(200.0)));
    assert_eq!(base.len(), 40);
    Ok(())
}

#[test]
fn boolean_and_string_slots() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut flags = SharedList::new(&a, ValueKind::Boolean);
    flags = flags.push(&mut a, &Value::from(false))?;
    flags = flags.push(&mut a, &Value::from(true))?;
    assert_eq!(flags.get(&a, 0)?, Some(Value::from(false)));
    assert_eq!(flags.get(&a, 1)?, Some(Value::from(true)));

    let mut texts = SharedList::new(&a, ValueKind::String);
    texts = texts.push(&mut a, &Value::from(""))?;
    texts = texts.push(&mut a, &Value::from("payload"))?;
    assert_eq!(texts.get(&a, 0)?, Some(Value::from("")));
    assert_eq!(texts.get(&a, 1)?, Some(Value::from("payload")));
    Ok(())
}
