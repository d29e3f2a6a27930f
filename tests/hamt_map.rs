use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_store::{Arena, SharedMap, StoreError, Value, ValueKind};

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
    Arena::new(SharedMap::family_layout())
}

#[test]
fn set_get_has_delete() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let map = SharedMap::new(&a, ValueKind::String);
    let map = map.insert(&mut a, "alpha", &Value::from("A"))?;
    let map = map.insert(&mut a, "beta", &Value::from("B"))?;
    let map = map.insert(&mut a, "alpha", &Value::from("A2"))?;

    assert_eq!(map.get(&a, "alpha")?, Some(Value::from("A2")));
    assert!(map.contains(&a, "beta"));
    assert_eq!(map.len(), 2);

    let map = map.remove(&mut a, "beta")?;
    assert!(!map.contains(&a, "beta"));
    assert_eq!(map.len(), 1);
    Ok(())
}

#[test]
fn branching_versions_diverge() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let base = SharedMap::new(&a, ValueKind::String)
        .insert(&mut a, "a", &Value::from("A"))?
        .insert(&mut a, "b", &Value::from("B"))?
        .insert(&mut a, "c", &Value::from("C"))?;

    let b1 = base.remove(&mut a, "a")?;
    let b2 = base.remove(&mut a, "c")?;

    let keys = |m: &SharedMap| -> Vec<String> {
        let mut ks: Vec<String> = m
            .iter(&a)
            .map(|e| e.unwrap().0)
            .collect();
        ks.sort();
        ks
    };
    assert_eq!(keys(&base), vec!["a", "b", "c"]);
    assert_eq!(keys(&b1), vec!["b", "c"]);
    assert_eq!(keys(&b2), vec!["a", "b"]);
    Ok(())
}

#[test]
fn lookup_laws_against_a_model() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let mut rng = StdRng::seed_from_u64(0xbeef);
    let mut map = SharedMap::new(&a, ValueKind::String);
    let mut model: HashMap<String, String> = HashMap::new();

    for _ in 0..1500 {
        let key = format!("key-{}", rng.random_range(0..400));
        if rng.random_range(0..3) < 2 {
            let val = format!("v{}", rng.random_range(0..1_000_000));
            map = map.insert(&mut a, &key, &Value::from(val.as_str()))?;
            model.insert(key, val);
        } else {
            map = map.remove(&mut a, &key)?;
            model.remove(&key);
        }
        assert_eq!(map.len() as usize, model.len());
    }

    for (k, v) in &model {
        assert_eq!(map.get(&a, k)?, Some(Value::from(v.as_str())));
    }
    // Iteration visits exactly `size` entries.
    assert_eq!(map.iter(&a).count(), model.len());
    Ok(())
}

#[test]
fn batch_ops_match_sequential() -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();
    let entries: Vec<(String, String)> = (0..200)
        .map(|i| (format!("b{}", i), format!("v{}", i)))
        .collect();

    let mut seq = SharedMap::new(&a, ValueKind::String);
    for (k, v) in &entries {
        seq = seq.insert(&mut a, k, &Value::from(v.as_str()))?;
    }

    let borrowed: Vec<(&str, Value)> = entries
        .iter()
        .map(|(k, v)| (k.as_str(), Value::from(v.as_str())))
        .collect();
    let batched = SharedMap::new(&a, ValueKind::String)
        .insert_many(&mut a, &borrowed)?;

    assert_eq!(batched.len(), seq.len());
    for (k, _) in &entries {
        assert_eq!(batched.get(&a, k)?, seq.get(&a, k)?);
    }

    let keys: Vec<&str> =
        entries.iter().take(50).map(|(k, _)| k.as_str()).collect();
    let pruned = batched.remove_many(&mut a, &keys)?;
    assert_eq!(pruned.len(), 150);
    let found = pruned.get_many(&a, &keys)?;
    assert!(found.iter().all(Option::is_none));
    Ok(())
}

#[test]
fn number_boolean_and_object_values(
) -> Result<(), Box<dyn std::error::Error>> {
    common::init();
    let mut a = arena();

    let nums = SharedMap::new(&a, ValueKind::Number)
        .insert(&mut a, "pi", &Value::from(3.25))?;
    assert_eq!(nums.get(&a, "pi")?, Some(Value::Number(3.25)));

    let flags = SharedMap::new(&a, ValueKind::Boolean)
        .insert(&mut a, "on", &Value::from(true))?
        .insert(&mut a, "off", &Value::from(false))?;
    assert_eq!(flags.get(&a, "on")?, Some(Value::Boolean(true)));
    assert_eq!(flags.get(&a, "off")?, Some(Value::Boolean(false)));

    let objs = SharedMap::new(&a, ValueKind::Object).insert(
        &mut a,
        "cfg",
        &Value::Object(serde_json::json!({"depth": 7, "tags": ["x"]})),
    )?;
    assert_eq!(
        objs.get(&a, "cfg")?,
        Some(Value::Object(
            serde_json::json!({"depth": 7, "tags": ["x"]})
        ))
    );
    Ok(())
}

#[test]
fn wrong_value_kind_is_rejected() {
    common::init();
    let mut a = arena();
    let map = SharedMap::new(&a, ValueKind::String);
    assert_eq!(
        map.insert(&mut a, "n", &Value::from(1.0)).unwrap_err(),
        StoreError::ValueKindMismatch
    );
}

#[test]
fn immutability_across_updates() -> Result<(), Box<dyn std::error::Error>>
{
    common::init();
    let mut a = arena();
    let mut versions = Vec::new();
    let mut map = SharedMap::new(&a, ValueKind::String);
    for i in 0..60 {
        versions.push(map.clone());
        map = map.insert(
            &mut a,
            &format!("k{}", i % 20),
            &Value::from(format!("v{}", i).as_str()),
        )?;
    }
    // Every old version still reads what it read when it was current.
    for (i, v) in versions.iter().enumerate() {
        assert_eq!(v.len() as usize, i.min(20));
        if i > 0 {
            let last = (i - 1) % 20;
            assert_eq!(
                v.get(&a, &format!("k{}", last))?,
                Some(Value::from(format!("v{}", i - 1).as_str()))
            );
        }
    }
    Ok(())
}
