use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_store::{
    Arena, SharedSortedMap, SharedSortedSet, SortOrder, Value, ValueKind,
};

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
    Arena::new(SharedSortedMap::family_layout())
}

fn key_strings(arena: &Arena, map: &SharedSortedMap) -> Vec<String> {
    map.iter(arena)
        .map(|e| match e.unwrap().0 {
            Value::String(s) => s,
            other => panic!("expected string key, got {:?}", other),
        })
        .collect()
}

#[test]
fn iteration_is_sorted_both_ways(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut asc = SharedSortedMap::new(&a, ValueKind::String);
    for k in ["m", "a", "z", "c"] {
        asc = asc.insert(&mut a, k, &Value::from("v"))?;
    }
    assert_eq!(key_strings(&a, &asc), vec!["a", "c", "m", "z"]);

    let mut desc = SharedSortedMap::with_order(
        &a,
        ValueKind::String,
        SortOrder::BytesDesc,
    );
    for k in ["m", "a", "z", "c"] {
        desc = desc.insert(&mut a, k, &Value::from("v"))?;
    }
    assert_eq!(key_strings(&a, &desc), vec!["z", "m", "c", "a"]);
    Ok(())
}

#[test]
fn numeric_keys_sort_numerically(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut map = SharedSortedMap::with_order(
        &a,
        ValueKind::String,
        SortOrder::NumericAsc,
    );
    for n in [10.0, -2.5, 3.0, 100.0, 0.0] {
        map = map.insert(&mut a, n, &Value::from("v"))?;
    }
    let got: Vec<f64> = map
        .iter(&a)
        .map(|e| match e.unwrap().0 {
            Value::Number(n) => n,
            other => panic!("expected numeric key, got {:?}", other),
        })
        .collect();
    assert_eq!(got, vec![-2.5, 0.0, 3.0, 10.0, 100.0]);

    assert_eq!(map.get(&a, 3.0)?, Some(Value::from("v")));
    assert!(!map.contains(&a, 4.0));
    let (min_key, _) = map.first_entry(&a)?.unwrap();
    let (max_key, _) = map.last_entry(&a)?.unwrap();
    assert_eq!(min_key, Value::Number(-2.5));
    assert_eq!(max_key, Value::Number(100.0));
    Ok(())
}

#[test]
fn consecutive_keys_compare_strictly(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut rng = StdRng::seed_from_u64(0x50f7);
    let mut map = SharedSortedMap::new(&a, ValueKind::String);
    for _ in 0..400 {
        let key = format!("key-{:04}", rng.random_range(0..1000));
        map = map.insert(&mut a, key.as_str(), &Value::from("v"))?;
    }
    let keys = key_strings(&a, &map);
    assert_eq!(keys.len() as u32, map.len());
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1]);
    }

    // Random deletions keep the order strict.
    let victims: Vec<String> = keys.iter().step_by(3).cloned().collect();
    for v in &victims {
        map = map.remove(&mut a, v.as_str())?;
    }
    let keys = key_strings(&a, &map);
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1]);
    }
    assert!(victims.iter().all(|v| !map.contains(&a, v.as_str())));
    Ok(())
}

#[test]
fn old_roots_unchanged_by_tree_writes(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut map = SharedSortedMap::new(&a, ValueKind::String);
    for k in ["d", "b", "f", "a", "c", "e", "g"] {
        map = map.insert(&mut a, k, &Value::from(k))?;
    }
    let old = map.clone();
    map = map.remove(&mut a, "d")?;
    map = map.insert(&mut a, "b", &Value::from("B!"))?;

    assert_eq!(old.get(&a, "d")?, Some(Value::from("d")));
    assert_eq!(old.get(&a, "b")?, Some(Value::from("b")));
    assert_eq!(old.len(), 7);
    assert_eq!(map.get(&a, "d")?, None);
    assert_eq!(map.get(&a, "b")?, Some(Value::from("B!")));
    assert_eq!(map.len(), 6);
    Ok(())
}

#[test]
fn sorted_set_orders_members() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = Arena::new(SharedSortedSet::family_layout());
    let mut set = SharedSortedSet::new(&a);
    for m in ["pear", "apple", "quince", "apple"] {
        set = set.insert(&mut a, m)?;
    }
    assert_eq!(set.len(), 3);
    let members: Vec<String> = set
        .iter(&a)
        .map(|e| match e.unwrap().0 {
            Value::String(s) => s,
            other => panic!("expected string member, got {:?}", other),
        })
        .collect();
    assert_eq!(members, vec!["apple", "pear", "quince"]);

    set = set.remove(&mut a, "pear")?;
    assert!(!set.contains(&a, "pear"));
    assert!(set.contains(&a, "quince"));
    assert_eq!(set.len(), 2);
    Ok(())
}
