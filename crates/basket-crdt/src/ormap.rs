//! Observed-remove map
//!
//! Every value in the map records its dots in the map's own context. Joining
//! two maps therefore has to judge each nested value against the causal
//! history of the *other* map: a key held only locally survives when the other
//! side has never seen its dots, and is dropped when it has seen them and
//! removed them since.

use std::collections::BTreeMap;
use std::fmt;

use basket_core::ReplicaId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::trace;

use crate::{DeltaCrdt, DotContext, SharedContext};

/// Map from keys to nested delta CRDTs with observed-remove semantics
#[derive(Debug)]
pub struct ORMap<K, V> {
    id: ReplicaId,
    entries: BTreeMap<K, V>,
    context: SharedContext,
}

impl<K, V> ORMap<K, V>
where
    K: Ord + Clone + fmt::Debug,
    V: DeltaCrdt,
{
    pub fn new(id: impl Into<ReplicaId>) -> Self {
        ORMap {
            id: id.into(),
            entries: BTreeMap::new(),
            context: SharedContext::new(),
        }
    }

    pub fn id(&self) -> &ReplicaId {
        &self.id
    }

    /// Mutable access to the value under `key`, created empty if absent.
    ///
    /// An empty value is bottom, so creating it is not visible to readers.
    pub fn get(&mut self, key: &K) -> &mut V {
        let id = &self.id;
        let context = &self.context;
        self.entries.entry(key.clone()).or_insert_with(|| {
            let mut value = V::new_empty(id);
            value.set_context(context);
            value
        })
    }

    /// The value under `key`, if it holds anything
    pub fn value(&self, key: &K) -> Option<&V> {
        self.entries.get(key).filter(|v| !v.is_bottom())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.value(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().filter(|(_, v)| !v.is_bottom())
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run a mutator on the value under `key` and wrap its delta in a map delta
    pub fn apply<F>(&mut self, key: K, mutate: F) -> ORMap<K, V>
    where
        F: FnOnce(&mut V) -> V,
    {
        let mut value_delta = mutate(self.get(&key));
        if self.entries.get(&key).map_or(false, |v| v.is_bottom()) {
            self.entries.remove(&key);
        }

        let mut delta = ORMap::new(self.id.clone());
        delta.context.borrow_mut().merge(&value_delta.context().borrow());
        value_delta.set_context(&delta.context);
        delta.entries.insert(key, value_delta);
        delta
    }

    /// Remove `key`. The delta carries the removed dots and no entry.
    pub fn remove(&mut self, key: &K) -> ORMap<K, V> {
        let delta = ORMap::new(self.id.clone());
        if let Some(mut value) = self.entries.remove(key) {
            let value_delta = value.reset();
            delta.context.borrow_mut().merge(&value_delta.context().borrow());
        }
        delta
    }

    /// Remove every key
    pub fn reset(&mut self) -> ORMap<K, V> {
        let delta = ORMap::new(self.id.clone());
        for value in self.entries.values_mut() {
            let value_delta = value.reset();
            delta.context.borrow_mut().merge(&value_delta.context().borrow());
        }
        self.entries.clear();
        delta
    }

    /// Join `other` into this map
    pub fn join(&mut self, other: &ORMap<K, V>) {
        let snapshot = self.context.snapshot();
        let id = &self.id;
        let context = &self.context;

        // keys only we hold: removed iff the other side observed their dots
        for (key, ours) in self.entries.iter_mut() {
            if other.entries.contains_key(key) {
                continue;
            }
            let mut empty = V::new_empty(id);
            empty.set_context(&other.context);
            ours.join(&empty);
            context.restore(&snapshot);
        }

        for (key, theirs) in &other.entries {
            let ours = self.entries.entry(key.clone()).or_insert_with(|| {
                let mut value = V::new_empty(id);
                value.set_context(context);
                value
            });
            ours.join(theirs);
            context.restore(&snapshot);
        }

        self.entries.retain(|key, value| {
            if value.is_bottom() {
                trace!(key = ?key, "entry causally removed");
                false
            } else {
                true
            }
        });
        self.context.merge_from(&other.context);
    }
}

/// Deep copy: the clone owns a fresh context and every value is rebound to it
impl<K: Ord + Clone, V: DeltaCrdt> Clone for ORMap<K, V> {
    fn clone(&self) -> Self {
        let context = SharedContext::from_context(self.context.snapshot());
        let entries = self
            .entries
            .iter()
            .map(|(key, value)| {
                let mut value = value.clone();
                value.set_context(&context);
                (key.clone(), value)
            })
            .collect();
        ORMap {
            id: self.id.clone(),
            entries,
            context,
        }
    }
}

impl<K: Ord, V: DeltaCrdt> PartialEq for ORMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        let ours = self.entries.iter().filter(|(_, v)| !v.is_bottom());
        let theirs = other.entries.iter().filter(|(_, v)| !v.is_bottom());
        self.context == other.context && ours.eq(theirs)
    }
}

#[derive(Serialize)]
struct MapRef<'a, K, V> {
    id: &'a ReplicaId,
    entries: Vec<(&'a K, &'a V)>,
    context: &'a DotContext,
}

#[derive(Deserialize)]
struct MapRepr<K, V> {
    id: ReplicaId,
    entries: Vec<(K, V)>,
    context: DotContext,
}

/// Bottom entries are skipped
impl<K: Serialize, V: Serialize + DeltaCrdt> Serialize for ORMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let context = self.context.borrow();
        MapRef {
            id: &self.id,
            entries: self
                .entries
                .iter()
                .filter(|(_, v)| !v.is_bottom())
                .collect(),
            context: &context,
        }
        .serialize(serializer)
    }
}

/// Decoded values are rebound to the decoded map context
impl<'de, K, V> Deserialize<'de> for ORMap<K, V>
where
    K: Ord + Deserialize<'de>,
    V: DeltaCrdt + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let MapRepr {
            id,
            entries,
            context,
        }: MapRepr<K, V> = MapRepr::deserialize(deserializer)?;
        let context = SharedContext::from_context(context);
        let entries = entries
            .into_iter()
            .map(|(key, mut value)| {
                context.merge_from(value.context());
                value.set_context(&context);
                (key, value)
            })
            .collect();
        Ok(ORMap {
            id,
            entries,
            context,
        })
    }
}

impl<K, V> DeltaCrdt for ORMap<K, V>
where
    K: Ord + Clone + fmt::Debug,
    V: DeltaCrdt,
{
    fn context(&self) -> &SharedContext {
        &self.context
    }

    fn set_context(&mut self, context: &SharedContext) {
        self.context = context.share();
        for value in self.entries.values_mut() {
            value.set_context(context);
        }
    }

    fn new_empty(id: &ReplicaId) -> Self {
        ORMap::new(id.clone())
    }

    fn join(&mut self, other: &Self) {
        ORMap::join(self, other);
    }

    fn reset(&mut self) -> Self {
        ORMap::reset(self)
    }

    fn is_bottom(&self) -> bool {
        self.entries.values().all(|v| v.is_bottom())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{joined, CCounter, EWFlag};

    type Counters = ORMap<String, CCounter>;

    fn key(k: &str) -> String {
        k.to_string()
    }

    fn read(map: &Counters, k: &str) -> Option<i64> {
        map.value(&key(k)).map(|c| c.read())
    }

    #[test]
    fn test_get_creates_invisible_entry() {
        let mut map = Counters::new("a");
        assert_eq!(map.get(&key("x")).read(), 0);
        assert!(!map.contains_key(&key("x")));
        assert!(map.is_empty());
        assert!(map.is_bottom());
    }

    #[test]
    fn test_get_binds_value_to_map_context() {
        let mut map = Counters::new("a");
        map.get(&key("x")).inc(1);
        let value = map.value(&key("x")).unwrap();
        assert!(value.context().is_shared_with(map.context()));
        assert_eq!(map.context().borrow().base(&ReplicaId::new("a")), 1);
    }

    #[test]
    fn test_apply_delta_reproduces_state() {
        let mut a = Counters::new("a");
        let mut b = a.clone();

        let delta = a.apply(key("x"), |c| c.inc(5));
        assert_eq!(read(&a, "x"), Some(5));
        assert_eq!(delta.len(), 1);
        assert!(delta
            .value(&key("x"))
            .map(|v| v.context().is_shared_with(delta.context()))
            .unwrap_or(false));

        b.join(&delta);
        assert_eq!(a, b);
        assert_eq!(read(&b, "x"), Some(5));
    }

    #[test]
    fn test_apply_delta_is_minimal() {
        let mut a = Counters::new("a");
        a.apply(key("x"), |c| c.inc(1));
        let delta = a.apply(key("y"), |c| c.inc(2));

        assert_eq!(delta.keys().collect::<Vec<_>>(), vec![&key("y")]);
        assert!(!delta.context().borrow().contains(&crate::Dot::new("a", 1)));
    }

    #[test]
    fn test_remove_delta_reproduces_state() {
        let mut a = Counters::new("a");
        a.apply(key("x"), |c| c.inc(3));
        a.apply(key("y"), |c| c.inc(4));
        let mut b = a.clone();

        let delta = a.remove(&key("x"));
        assert!(delta.is_empty());
        assert!(!a.contains_key(&key("x")));

        b.join(&delta);
        assert_eq!(a, b);
        assert_eq!(b.keys().collect::<Vec<_>>(), vec![&key("y")]);
    }

    #[test]
    fn test_remove_missing_key() {
        let mut a = Counters::new("a");
        let delta = a.remove(&key("nope"));
        assert!(delta.context().borrow().is_empty());
    }

    #[test]
    fn test_reset_delta_reproduces_state() {
        let mut a = Counters::new("a");
        a.apply(key("x"), |c| c.inc(3));
        a.apply(key("y"), |c| c.dec(1));
        let mut b = a.clone();

        let delta = a.reset();
        assert!(a.is_empty());

        b.join(&delta);
        assert!(b.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_concurrent_update_survives_remove() {
        let mut a = Counters::new("a");
        let mut b = Counters::new("b");
        b.join(&a.apply(key("x"), |c| c.inc(1)));

        let removal = a.remove(&key("x"));
        let update = b.apply(key("x"), |c| c.inc(10));

        a.join(&update);
        b.join(&removal);
        assert_eq!(read(&a, "x"), Some(10));
        assert_eq!(read(&b, "x"), Some(10));
        assert_eq!(a, b);
    }

    #[test]
    fn test_removal_reaches_replica_that_never_saw_the_key() {
        let mut a = Counters::new("a");
        let mut b = Counters::new("b");
        let mut c = Counters::new("c");

        let add = a.apply(key("x"), |v| v.inc(1));
        b.join(&add);
        let removal = b.remove(&key("x"));

        // c learns of the removal before the add
        c.join(&removal);
        c.join(&add);
        assert!(!c.contains_key(&key("x")));

        // a still holds x locally and drops it on seeing b's history
        a.join(&b);
        assert!(!a.contains_key(&key("x")));
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_unseen_local_key_survives_join() {
        let mut a = Counters::new("a");
        let mut b = Counters::new("b");
        a.apply(key("x"), |v| v.inc(2));
        b.apply(key("y"), |v| v.inc(3));

        a.join(&b);
        assert_eq!(read(&a, "x"), Some(2));
        assert_eq!(read(&a, "y"), Some(3));
    }

    #[test]
    fn test_join_commutative_and_idempotent() {
        let mut a = Counters::new("a");
        let mut b = Counters::new("b");
        a.apply(key("x"), |v| v.inc(2));
        b.apply(key("x"), |v| v.inc(3));
        b.apply(key("z"), |v| v.dec(1));
        a.remove(&key("x"));

        let ab = joined(&a, &b);
        assert_eq!(ab, joined(&b, &a));
        assert_eq!(joined(&ab, &ab), ab);
        assert_eq!(read(&ab, "x"), Some(3));
        assert_eq!(read(&ab, "z"), Some(-1));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut a = Counters::new("a");
        a.apply(key("x"), |v| v.inc(1));
        let copy = a.clone();

        a.apply(key("x"), |v| v.inc(1));
        assert_eq!(read(&copy, "x"), Some(1));
        assert!(!copy.context().is_shared_with(a.context()));
        assert!(copy
            .value(&key("x"))
            .map(|v| v.context().is_shared_with(copy.context()))
            .unwrap_or(false));
    }

    #[test]
    fn test_flags_in_a_map() {
        let mut a: ORMap<String, EWFlag> = ORMap::new("a");
        let mut b: ORMap<String, EWFlag> = ORMap::new("b");
        b.join(&a.apply(key("done"), |f| f.enable()));

        let off = a.apply(key("done"), |f| f.disable());
        let on = b.apply(key("done"), |f| f.enable());
        a.join(&on);
        b.join(&off);

        assert!(a.value(&key("done")).map(|f| f.read()).unwrap_or(false));
        assert_eq!(a, b);
    }

    #[test]
    fn test_nested_maps() {
        let mut a: ORMap<String, Counters> = ORMap::new("a");
        let mut b: ORMap<String, Counters> = ORMap::new("b");

        let da = a.apply(key("outer"), |inner| inner.apply(key("x"), |c| c.inc(1)));
        let db = b.apply(key("outer"), |inner| inner.apply(key("y"), |c| c.inc(2)));
        a.join(&db);
        b.join(&da);

        assert_eq!(a, b);
        let inner = a.value(&key("outer")).map(|m| m.len());
        assert_eq!(inner, Some(2));

        let removal = a.remove(&key("outer"));
        b.join(&removal);
        assert!(b.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_reset_of_empty_map_changes_nothing() {
        let mut empty = Counters::new("a");
        let delta = empty.reset();
        assert!(delta.is_empty());
        assert!(delta.context().borrow().is_empty());

        let mut other = Counters::new("b");
        other.apply(key("x"), |c| c.inc(2));
        let before = other.clone();
        other.join(&delta);
        assert_eq!(other, before);

        // a second reset has nothing left to remove
        other.reset();
        assert!(other.reset().context().borrow().is_empty());
    }

    #[test]
    fn test_delta_json_roundtrip() {
        let mut a = Counters::new("a");
        let mut b = a.clone();
        let first = a.apply(key("x"), |c| c.inc(1));
        let delta = a.apply(key("y"), |c| c.dec(4));

        let json = serde_json::to_string(&delta).unwrap();
        let decoded: Counters = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, delta);
        assert_eq!(decoded.id().as_str(), "a");
        assert!(decoded
            .value(&key("y"))
            .map(|v| v.context().is_shared_with(decoded.context()))
            .unwrap_or(false));

        b.join(&first);
        b.join(&decoded);
        assert_eq!(a, b);
        assert_eq!(read(&b, "y"), Some(-4));
    }

    #[test]
    fn test_removal_delta_json_roundtrip() {
        let mut a = Counters::new("a");
        a.apply(key("x"), |c| c.inc(3));
        let mut b = a.clone();

        let removal = a.remove(&key("x"));
        let json = serde_json::to_string(&removal).unwrap();
        let decoded: Counters = serde_json::from_str(&json).unwrap();
        assert!(decoded.is_empty());

        b.join(&decoded);
        assert!(!b.contains_key(&key("x")));
        assert_eq!(a, b);
    }

    #[test]
    fn test_nested_map_json_rebinds_every_level() {
        let mut a: ORMap<String, Counters> = ORMap::new("a");
        a.apply(key("outer"), |inner| inner.apply(key("x"), |c| c.inc(7)));

        let json = serde_json::to_string(&a).unwrap();
        let mut decoded: ORMap<String, Counters> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, a);

        let inner = decoded.get(&key("outer"));
        assert_eq!(inner.value(&key("x")).map(|c| c.read()), Some(7));
        let counter_shared = inner
            .value(&key("x"))
            .map(|c| c.context().is_shared_with(inner.context()))
            .unwrap_or(false);
        assert!(counter_shared);

        // local mutation after decode records its dot in the outer context
        decoded.apply(key("outer"), |inner| inner.apply(key("x"), |c| c.inc(1)));
        assert_eq!(decoded.context().borrow().base(&ReplicaId::new("a")), 2);
    }

    mod laws {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Inc(usize, usize, i64),
            Remove(usize, usize),
            Reset(usize),
            Sync(usize, usize),
        }

        const KEYS: [&str; 3] = ["milk", "eggs", "bread"];

        fn arb_op() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => (0..3usize, 0..3usize, 1..10i64).prop_map(|(r, k, n)| Op::Inc(r, k, n)),
                2 => (0..3usize, 0..3usize).prop_map(|(r, k)| Op::Remove(r, k)),
                1 => (0..3usize).prop_map(Op::Reset),
                2 => (0..3usize, 0..3usize).prop_map(|(from, to)| Op::Sync(from, to)),
            ]
        }

        fn run(ops: &[Op]) -> Vec<Counters> {
            let mut replicas: Vec<Counters> =
                ["r0", "r1", "r2"].iter().map(|id| Counters::new(*id)).collect();
            for op in ops {
                match *op {
                    Op::Inc(r, k, n) => {
                        replicas[r].apply(key(KEYS[k]), |c| c.inc(n));
                    }
                    Op::Remove(r, k) => {
                        replicas[r].remove(&key(KEYS[k]));
                    }
                    Op::Reset(r) => {
                        replicas[r].reset();
                    }
                    Op::Sync(from, to) => {
                        let state = replicas[from].clone();
                        replicas[to].join(&state);
                    }
                }
            }
            replicas
        }

        proptest! {
            #[test]
            fn join_is_commutative(ops in prop::collection::vec(arb_op(), 0..25)) {
                let r = run(&ops);
                prop_assert_eq!(joined(&r[0], &r[1]), joined(&r[1], &r[0]));
            }

            #[test]
            fn join_is_associative(ops in prop::collection::vec(arb_op(), 0..25)) {
                let r = run(&ops);
                prop_assert_eq!(
                    joined(&joined(&r[0], &r[1]), &r[2]),
                    joined(&r[0], &joined(&r[1], &r[2]))
                );
            }

            #[test]
            fn join_is_idempotent(ops in prop::collection::vec(arb_op(), 0..25)) {
                let r = run(&ops);
                prop_assert_eq!(joined(&r[1], &r[1]), r[1].clone());
            }
        }
    }
}
