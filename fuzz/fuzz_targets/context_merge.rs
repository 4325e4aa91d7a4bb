#![no_main]

use basket_crdt::{Dot, DotContext};
use libfuzzer_sys::fuzz_target;

const REPLICAS: [&str; 3] = ["a", "b", "c"];

fn build(dots: &[(u8, u8)]) -> DotContext {
    let mut ctx = DotContext::new();
    for &(replica, seq) in dots {
        let dot = Dot::new(REPLICAS[replica as usize % REPLICAS.len()], seq as u64 + 1);
        ctx.insert_dot(&dot);
    }
    ctx
}

fn merged(a: &DotContext, b: &DotContext) -> DotContext {
    let mut out = a.clone();
    out.merge(b);
    out
}

fuzz_target!(|input: (Vec<(u8, u8)>, Vec<(u8, u8)>, Vec<(u8, u8)>)| {
    let (a, b, c) = (build(&input.0), build(&input.1), build(&input.2));

    assert_eq!(merged(&a, &b), merged(&b, &a));
    assert_eq!(merged(&merged(&a, &b), &c), merged(&a, &merged(&b, &c)));
    assert_eq!(merged(&a, &a), a);

    let ab = merged(&a, &b);
    for &(replica, seq) in input.0.iter().chain(&input.1) {
        let dot = Dot::new(REPLICAS[replica as usize % REPLICAS.len()], seq as u64 + 1);
        assert!(ab.contains(&dot));
    }
});
