use super::*;

use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Checks the structural invariants of one table and returns its entry count.
fn validate_table(map: &TrieMap, table: TableHandle) -> usize {
    fn walk(map: &TrieMap, node_idx: usize, level: u32, path: u32) -> usize {
        let node = map.arena.slots[node_idx];
        assert!(!node.is_terminal(), "table node must be a bitmap slot");
        assert!(level <= MAX_LEVEL, "bitmap node below the deepest level");

        let run = node.run() as usize;
        let n = node.run_len();
        if n > 0 {
            assert!(run + n <= map.arena.slots.len(), "run out of bounds");
        }

        let mut count = 0;
        let mut bits = node.bits();
        let mut pos = 0;
        while bits != 0 {
            let l = bits.trailing_zeros();
            bits &= bits - 1;
            let child_path = path | (l << (level * LABEL_BITS));
            let slot = map.arena.slots[run + pos];
            if slot.is_terminal() {
                let mask = if level == MAX_LEVEL {
                    u32::MAX
                } else {
                    (1u32 << ((level + 1) * LABEL_BITS)) - 1
                };
                assert_eq!(
                    slot.key() as u32 & mask,
                    child_path,
                    "terminal key must match its path labels"
                );
                assert!(slot.value() <= TrieMap::MAX_VALUE);
                count += 1;
            } else {
                count += walk(map, run + pos, level + 1, child_path);
            }
            pos += 1;
        }
        count
    }

    walk(map, table.slot(), 0, 0)
}

#[derive(Clone, Debug)]
enum Op {
    Put(usize, i32, u64),
    Remove(usize, i32),
    Get(usize, i32),
    NextLevel(usize, i32),
}

fn key_strategy() -> impl Strategy<Value = i32> + Clone {
    prop_oneof![
        4 => -40i32..40,
        2 => any::<i32>(),
        // Keys that only differ in the two most significant bits.
        1 => (0i32..4).prop_map(|k| k << 30),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = key_strategy();
    let value = 0..=TrieMap::MAX_VALUE;
    let op = prop_oneof![
        45 => (any::<usize>(), key.clone(), value).prop_map(|(t, k, v)| Op::Put(t, k, v)),
        15 => (any::<usize>(), key.clone()).prop_map(|(t, k)| Op::Remove(t, k)),
        25 => (any::<usize>(), key.clone()).prop_map(|(t, k)| Op::Get(t, k)),
        15 => (any::<usize>(), key).prop_map(|(t, k)| Op::NextLevel(t, k)),
    ];
    prop::collection::vec(op, 0..=1500)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 20_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_across_tables(ops in ops_strategy()) {
        let mut map = TrieMap::new();
        let mut handles = vec![map.root()];
        let mut model: Vec<BTreeMap<i32, u64>> = vec![BTreeMap::new()];
        let mut children: HashMap<(usize, i32), usize> = HashMap::new();

        for op in ops {
            match op {
                Op::Put(t, key, value) => {
                    let t = t % handles.len();
                    prop_assert!(map.put(key, value, handles[t]).is_ok());
                    model[t].insert(key, value);
                }
                Op::Remove(t, key) => {
                    let t = t % handles.len();
                    let removed = map.remove(key, handles[t]);
                    prop_assert_eq!(removed, model[t].remove(&key).is_some());
                    children.remove(&(t, key));
                }
                Op::Get(t, key) => {
                    let t = t % handles.len();
                    prop_assert_eq!(map.get(key, handles[t]), model[t].get(&key).copied());
                }
                Op::NextLevel(t, key) => {
                    let t = t % handles.len();
                    let got = map.get_or_create_next_level(key, handles[t]);
                    if !model[t].contains_key(&key) {
                        prop_assert_eq!(got, None);
                        continue;
                    }
                    let got = got.expect("existing key must yield a table");
                    match children.get(&(t, key)) {
                        Some(&child) => prop_assert_eq!(got, handles[child]),
                        None => {
                            prop_assert!(!handles.contains(&got));
                            children.insert((t, key), handles.len());
                            handles.push(got);
                            model.push(BTreeMap::new());
                        }
                    }
                }
            }
        }

        let mut total = 0;
        for (t, expected) in model.iter().enumerate() {
            prop_assert_eq!(validate_table(&map, handles[t]), expected.len());
            let got: BTreeMap<i32, u64> =
                map.entries(handles[t]).map(|e| (e.key, e.value)).collect();
            prop_assert_eq!(&got, expected);
            total += expected.len();
        }
        prop_assert_eq!(map.len(), total);

        let mut bytes = Vec::new();
        map.write_to(&mut bytes).unwrap();
        let loaded = TrieMap::read_from(&mut bytes.as_slice()).unwrap();
        for (t, expected) in model.iter().enumerate() {
            for (&key, &value) in expected {
                prop_assert_eq!(loaded.get(key, handles[t]), Some(value));
            }
        }
    }
}

#[test]
fn exhaustive_insert_order_colliding_keys() {
    // Every pair collides at level 0; several collide down to the top bits.
    let keys = [0i32, 32, 1 << 10, 1 << 30, i32::MIN, 32 | (1 << 30)];

    fn for_each_permutation(items: &[i32], f: &mut impl FnMut(&[i32])) {
        fn rec(items: &[i32], used: &mut [bool], out: &mut Vec<i32>, f: &mut impl FnMut(&[i32])) {
            if out.len() == items.len() {
                f(out);
                return;
            }
            for i in 0..items.len() {
                if used[i] {
                    continue;
                }
                used[i] = true;
                out.push(items[i]);
                rec(items, used, out, f);
                out.pop();
                used[i] = false;
            }
        }
        let mut used = vec![false; items.len()];
        rec(items, &mut used, &mut Vec::new(), f);
    }

    for_each_permutation(&keys, &mut |perm| {
        let mut map = TrieMap::new();
        for (i, &k) in perm.iter().enumerate() {
            map.put_root(k, i as u64).unwrap();
        }
        assert_eq!(validate_table(&map, map.root()), keys.len());
        for (i, &k) in perm.iter().enumerate() {
            assert_eq!(map.get_root(k), Some(i as u64));
        }
        for &k in perm {
            assert!(map.remove(k, map.root()));
        }
        assert!(map.is_empty());
        assert_eq!(map.entries(map.root()).count(), 0);
    });
}
