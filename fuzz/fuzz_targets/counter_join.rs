#![no_main]

use arbitrary::Arbitrary;
use basket_crdt::{joined, CCounter, DeltaCrdt};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Inc(u8, i16),
    Dec(u8, i16),
    Reset(u8),
    Sync(u8, u8),
}

fuzz_target!(|ops: Vec<Op>| {
    let mut replicas: Vec<CCounter> = ["a", "b", "c"].iter().map(|id| CCounter::new(*id)).collect();
    let n = replicas.len();

    for op in ops {
        match op {
            Op::Inc(r, v) => {
                replicas[r as usize % n].inc(v as i64);
            }
            Op::Dec(r, v) => {
                replicas[r as usize % n].dec(v as i64);
            }
            Op::Reset(r) => {
                replicas[r as usize % n].reset();
            }
            Op::Sync(from, to) => {
                let state = replicas[from as usize % n].clone();
                replicas[to as usize % n].join(&state);
            }
        }
    }

    let (a, b, c) = (&replicas[0], &replicas[1], &replicas[2]);
    assert_eq!(joined(a, b), joined(b, a));
    assert_eq!(joined(&joined(a, b), c), joined(a, &joined(b, c)));
    assert_eq!(joined(a, a), *a);
});
