mod common;

use bee_tree::{Config, MemoryFeed};
use common::{check_arity, check_reference_validity, collect_all};
use rand::prelude::*;
use std::collections::BTreeMap;
use test_log::test;

#[test]
fn random_ops_match_oracle() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    let mut rng = rand::rng();
    let mut oracle: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    for _ in 0..400 {
        let key = format!("{:03}", rng.random_range(0..60u32));

        if rng.random_bool(0.3) {
            tree.delete(&key)?;
            oracle.remove(key.as_bytes());
        } else {
            let value = format!("{}", rng.random::<u32>());
            tree.put(&key, &value)?;
            oracle.insert(key.into_bytes(), value.into_bytes());
        }
    }

    // Full scan matches, in order, without duplicates
    let expected: Vec<_> = oracle
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    assert_eq!(expected, collect_all(&tree));

    // Reverse scan is the mirror image
    let mut reversed = expected.clone();
    reversed.reverse();
    let scanned_rev: Vec<_> = tree
        .iter()
        .rev()
        .map(|item| {
            let entry = item.unwrap();
            (entry.key.to_vec(), entry.value.to_vec())
        })
        .collect();
    assert_eq!(reversed, scanned_rev);

    // Point lookups agree for hits and misses alike
    for i in 0..60u32 {
        let key = format!("{i:03}");
        let got = tree.get(&key)?.map(|entry| entry.value.to_vec());
        assert_eq!(oracle.get(key.as_bytes()).cloned(), got, "key {key}");
    }

    check_reference_validity(&feed);
    check_arity(&feed, tree.version());

    Ok(())
}

#[test]
fn random_batches_match_oracle() -> bee_tree::Result<()> {
    let feed = MemoryFeed::new();
    let tree = Config::new(feed.clone()).open()?;

    let mut rng = rand::rng();
    let mut oracle: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    for _ in 0..20 {
        let mut batch = tree.batch();

        for _ in 0..rng.random_range(1..=15) {
            let key = format!("{:03}", rng.random_range(0..40u32));

            if rng.random_bool(0.25) {
                batch.delete(&key)?;
                oracle.remove(key.as_bytes());
            } else {
                let value = format!("{}", rng.random::<u32>());
                batch.put(&key, &value)?;
                oracle.insert(key.into_bytes(), value.into_bytes());
            }
        }

        batch.flush()?;
    }

    let expected: Vec<_> = oracle
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    assert_eq!(expected, collect_all(&tree));

    check_reference_validity(&feed);
    check_arity(&feed, tree.version());

    Ok(())
}

#[test]
fn random_historical_lookups_stay_consistent() -> bee_tree::Result<()> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    let mut rng = rand::rng();
    let mut oracle: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    // Remember the full oracle state at a handful of versions
    let mut pins: Vec<(u64, BTreeMap<Vec<u8>, Vec<u8>>)> = Vec::new();

    for round in 0..150 {
        let key = format!("{:03}", rng.random_range(0..25u32));

        if rng.random_bool(0.3) {
            tree.delete(&key)?;
            oracle.remove(key.as_bytes());
        } else {
            let value = format!("{round}");
            tree.put(&key, &value)?;
            oracle.insert(key.into_bytes(), value.into_bytes());
        }

        if round % 30 == 0 {
            pins.push((tree.version(), oracle.clone()));
        }
    }

    for (version, state) in pins {
        let pinned = tree.checkout(version);

        for i in 0..25u32 {
            let key = format!("{i:03}");
            let got = pinned.get(&key)?.map(|entry| entry.value.to_vec());
            assert_eq!(
                state.get(key.as_bytes()).cloned(),
                got,
                "key {key} at version {version}"
            );
        }
    }

    Ok(())
}
