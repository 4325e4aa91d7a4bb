#![no_main]

use arbitrary::Arbitrary;
use basket_crdt::{CCounter, ORMap};
use libfuzzer_sys::fuzz_target;

const KEYS: [&str; 4] = ["milk", "eggs", "bread", "salt"];

#[derive(Arbitrary, Debug)]
enum Op {
    Inc(u8, u8, i16),
    Remove(u8, u8),
    Reset(u8),
}

#[derive(Arbitrary, Debug)]
struct Input {
    ops: Vec<Op>,
    /// Delivery permutation seed, duplicates allowed
    order: Vec<u16>,
}

fuzz_target!(|input: Input| {
    let mut replicas: Vec<ORMap<String, CCounter>> =
        ["a", "b", "c"].iter().map(|id| ORMap::new(*id)).collect();
    let n = replicas.len();
    let mut deltas = Vec::new();

    for op in input.ops {
        let delta = match op {
            Op::Inc(r, k, v) => {
                let key = KEYS[k as usize % KEYS.len()].to_string();
                replicas[r as usize % n].apply(key, |c| c.inc(v as i64))
            }
            Op::Remove(r, k) => {
                let key = KEYS[k as usize % KEYS.len()].to_string();
                replicas[r as usize % n].remove(&key)
            }
            Op::Reset(r) => replicas[r as usize % n].reset(),
        };
        deltas.push(delta);
    }

    let mut full = replicas[0].clone();
    full.join(&replicas[1]);
    full.join(&replicas[2]);

    // every delta at least once, in fuzzer-chosen order, with repeats
    let mut observer: ORMap<String, CCounter> = ORMap::new("observer");
    if !deltas.is_empty() {
        for &i in &input.order {
            observer.join(&deltas[i as usize % deltas.len()]);
        }
    }
    for delta in deltas.iter().rev() {
        observer.join(delta);
    }
    assert!(observer == full);
});
