use bee_tree::{Config, MemoryFeed};
use std::ops::Bound;
use test_log::test;

fn seeded_tree() -> bee_tree::Result<bee_tree::Tree<MemoryFeed>> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    // Insert shuffled so the scan order is earned, not inherited
    for i in [7u32, 2, 19, 4, 11, 0, 16, 9, 13, 5, 18, 1, 8, 14, 3, 17, 6, 12, 10, 15] {
        tree.put(format!("{i:02}"), format!("v{i}"))?;
    }

    Ok(tree)
}

fn scan_keys<I>(iter: I) -> Vec<String>
where
    I: Iterator<Item = bee_tree::Result<bee_tree::Entry>>,
{
    iter.map(|item| String::from_utf8(item.unwrap().key.to_vec()).unwrap())
        .collect()
}

fn expected(range: std::ops::RangeInclusive<u32>) -> Vec<String> {
    range.map(|i| format!("{i:02}")).collect()
}

#[test]
fn range_full_scan_is_sorted() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    assert_eq!(expected(0..=19), scan_keys(tree.iter()));

    Ok(())
}

#[test]
fn range_full_scan_reverse() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    let mut keys = expected(0..=19);
    keys.reverse();
    assert_eq!(keys, scan_keys(tree.iter().rev()));

    Ok(())
}

#[test]
fn range_inclusive_bounds() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    assert_eq!(expected(5..=11), scan_keys(tree.range("05"..="11")));

    Ok(())
}

#[test]
fn range_exclusive_bounds() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    let range: (Bound<&str>, Bound<&str>) = (Bound::Excluded("05"), Bound::Excluded("11"));
    assert_eq!(
        expected(6..=10),
        scan_keys(tree.range::<&str, _>(range))
    );

    Ok(())
}

#[test]
fn range_half_open() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    assert_eq!(expected(0..=9), scan_keys(tree.range(.."10")));
    assert_eq!(expected(15..=19), scan_keys(tree.range("15"..)));

    Ok(())
}

#[test]
fn range_bounds_between_keys() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    // Bounds that do not hit an existing key
    assert_eq!(expected(6..=10), scan_keys(tree.range("05a".."10a")));

    Ok(())
}

#[test]
fn range_reverse_with_bounds() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    let mut keys = expected(5..=11);
    keys.reverse();
    assert_eq!(keys, scan_keys(tree.range("05"..="11").rev()));

    Ok(())
}

#[test]
fn range_limit_via_take() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    assert_eq!(expected(3..=5), scan_keys(tree.range("03"..).take(3)));
    assert_eq!(
        vec!["19", "18"],
        scan_keys(tree.iter().rev().take(2))
    );

    Ok(())
}

#[test]
fn range_empty_tree() -> bee_tree::Result<()> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    assert_eq!(0, tree.iter().count());
    assert_eq!(0, tree.range("a".."z").rev().count());

    Ok(())
}

#[test]
fn range_empty_window() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    assert_eq!(0, tree.range("50".."60").count());
    assert_eq!(0, tree.range("05".."05").count());

    Ok(())
}

#[test]
fn range_skips_deleted_keys() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    tree.delete("07")?;
    tree.delete("13")?;

    let keys = scan_keys(tree.iter());
    assert_eq!(18, keys.len());
    assert!(!keys.contains(&"07".to_owned()));
    assert!(!keys.contains(&"13".to_owned()));

    Ok(())
}

#[test]
fn range_is_a_stable_snapshot() -> bee_tree::Result<()> {
    let tree = seeded_tree()?;

    let mut iter = tree.iter();
    let first = iter.next().expect("non-empty")?;
    assert_eq!(b"00", &*first.key);

    // Writes land after the iterator pinned its root
    tree.delete("19")?;
    tree.put("05", "overwritten")?;

    let rest = scan_keys(iter);
    assert_eq!(expected(1..=19), rest);

    Ok(())
}

#[test]
fn range_yields_seq_and_value() -> bee_tree::Result<()> {
    let tree = Config::new(MemoryFeed::new()).open()?;

    tree.put("a", "1")?;
    tree.put("b", "2")?;
    tree.put("a", "3")?;

    let entries: Vec<_> = tree.iter().collect::<bee_tree::Result<_>>()?;

    assert_eq!(2, entries.len());
    assert_eq!((3, &b"3"[..]), (entries[0].seq, &*entries[0].value));
    assert_eq!((2, &b"2"[..]), (entries[1].seq, &*entries[1].value));

    Ok(())
}
