use strata_store::{
    Arena, SharedOrderedMap, SharedOrderedSet, Value, ValueKind,
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
    Arena::new(SharedOrderedMap::family_layout())
}

fn keys(arena: &Arena, map: &SharedOrderedMap) -> Vec<String> {
    map.iter(arena).map(|e| e.unwrap().0).collect()
}

#[test]
fn iteration_follows_insertion_order(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let map = SharedOrderedMap::new(&a, ValueKind::String)
        .insert(&mut a, "c", &Value::from("C"))?
        .insert(&mut a, "a", &Value::from("A"))?
        .insert(&mut a, "b", &Value::from("B"))?;
    assert_eq!(keys(&a, &map), vec!["c", "a", "b"]);

    // Updating an existing key replaces in place, it does not move it.
    let map = map.insert(&mut a, "a", &Value::from("A2"))?;
    assert_eq!(keys(&a, &map), vec!["c", "a", "b"]);
    assert_eq!(map.get(&a, "a")?, Some(Value::from("A2")));
    assert_eq!(map.len(), 3);
    Ok(())
}

#[test]
fn removal_keeps_the_thread_intact(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut map = SharedOrderedMap::new(&a, ValueKind::String);
    for k in ["one", "two", "three", "four", "five"] {
        map = map.insert(&mut a, k, &Value::from("x"))?;
    }
    map = map.remove(&mut a, "three")?;
    assert_eq!(keys(&a, &map), vec!["one", "two", "four", "five"]);
    map = map.remove(&mut a, "one")?;
    map = map.remove(&mut a, "five")?;
    assert_eq!(keys(&a, &map), vec!["two", "four"]);

    // Absent key: same handle.
    let same = map.remove(&mut a, "missing")?;
    assert_eq!(same.len(), map.len());
    assert_eq!(keys(&a, &same), keys(&a, &map));
    Ok(())
}

#[test]
fn membership_survives_on_old_roots(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut map = SharedOrderedMap::new(&a, ValueKind::String);
    for i in 0..40 {
        map = map.insert(
            &mut a,
            &format!("k{}", i),
            &Value::from(format!("v{}", i).as_str()),
        )?;
    }
    let old = map.clone();
    map = map.insert(&mut a, "k11", &Value::from("fresh"))?;
    map = map.remove(&mut a, "k12")?;

    // The trie side is path copy: old membership and values hold.
    assert_eq!(old.get(&a, "k11")?, Some(Value::from("v11")));
    assert!(old.contains(&a, "k12"));
    assert_eq!(map.get(&a, "k11")?, Some(Value::from("fresh")));
    assert!(!map.contains(&a, "k12"));
    Ok(())
}

#[test]
fn ordered_set_tracks_first_insertion(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut set = SharedOrderedSet::new(&a);
    for m in ["zeta", "alpha", "mu", "alpha"] {
        set = set.insert(&mut a, m)?;
    }
    assert_eq!(set.len(), 3);
    assert!(set.contains(&a, "mu"));
    let members: Vec<String> =
        set.iter(&a).map(|e| e.unwrap().0).collect();
    assert_eq!(members, vec!["zeta", "alpha", "mu"]);

    set = set.remove(&mut a, "alpha")?;
    let members: Vec<String> =
        set.iter(&a).map(|e| e.unwrap().0).collect();
    assert_eq!(members, vec!["zeta", "mu"]);
    Ok(())
}
