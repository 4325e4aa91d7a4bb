//! Replica convergence simulator
//!
//! Shopping list replicas mutate concurrently and ship their deltas over a
//! channel that duplicates, reorders and drops messages. Dropped messages are
//! retried after the run. Every replica must end in the same state.

use basket_crdt::{DeltaCrdt, ItemView, ShoppingList};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const ITEM_NAMES: [&str; 8] = [
    "milk", "eggs", "bread", "apples", "coffee", "rice", "butter", "salt",
];

/// Simulation configuration
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Number of replicas
    pub replica_count: usize,
    /// Local mutations across all replicas
    pub operation_count: usize,
    /// Distinct item names in play
    pub item_count: usize,
    /// Probability a pending batch is delivered after each operation
    pub delivery_prob: f64,
    /// Probability a message is delivered twice
    pub duplicate_prob: f64,
    /// Probability a message is delivered out of order
    pub reorder_prob: f64,
    /// Probability a message is lost and retried after the run
    pub drop_prob: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            replica_count: 4,
            operation_count: 300,
            item_count: 5,
            delivery_prob: 0.3,
            duplicate_prob: 0.1,
            reorder_prob: 0.3,
            drop_prob: 0.05,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    /// Light simulation for quick tests
    pub fn light() -> Self {
        SimulationConfig {
            replica_count: 3,
            operation_count: 50,
            item_count: 3,
            delivery_prob: 0.5,
            duplicate_prob: 0.05,
            reorder_prob: 0.1,
            drop_prob: 0.0,
            seed: 42,
        }
    }

    /// Heavy simulation for thorough testing
    pub fn heavy() -> Self {
        SimulationConfig {
            replica_count: 8,
            operation_count: 2000,
            item_count: 8,
            delivery_prob: 0.2,
            duplicate_prob: 0.3,
            reorder_prob: 0.5,
            drop_prob: 0.2,
            seed: 42,
        }
    }
}

/// A delta in flight to one replica
struct Envelope {
    to: usize,
    delivery_order: u64,
    delta: ShoppingList,
}

/// Delivery counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub operations: u64,
    pub delivered: u64,
    pub duplicated: u64,
    pub retried: u64,
}

/// Convergence check result
#[derive(Debug, PartialEq, Eq)]
pub enum ConvergenceResult {
    Converged,
    /// Replica indices that differ from replica 0
    Diverged(Vec<usize>),
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Simulation result
#[derive(Debug)]
pub struct SimulationResult {
    pub convergence: ConvergenceResult,
    pub stats: DeliveryStats,
    /// Final list as seen by replica 0
    pub items: Vec<ItemView>,
}

/// Shopping list convergence simulator
pub struct Simulation {
    config: SimulationConfig,
    replicas: Vec<ShoppingList>,
    pending: Vec<Envelope>,
    retries: Vec<Envelope>,
    rng: StdRng,
    seq: u64,
    stats: DeliveryStats,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let replicas = (0..config.replica_count)
            .map(|i| ShoppingList::new(format!("replica-{}", i), "simulation"))
            .collect();

        Simulation {
            config,
            replicas,
            pending: Vec::new(),
            retries: Vec::new(),
            rng,
            seq: 0,
            stats: DeliveryStats::default(),
        }
    }

    pub fn replicas(&self) -> &[ShoppingList] {
        &self.replicas
    }

    /// Run every operation, drain the channel, then check convergence
    pub fn run(&mut self) -> SimulationResult {
        for _ in 0..self.config.operation_count {
            self.step();
            if self.rng.gen::<f64>() < self.config.delivery_prob {
                self.deliver_pending();
            }
        }
        self.deliver_pending();

        let retries = std::mem::take(&mut self.retries);
        self.stats.retried = retries.len() as u64;
        for envelope in retries {
            self.replicas[envelope.to].join(&envelope.delta);
            self.stats.delivered += 1;
        }

        let result = SimulationResult {
            convergence: self.check_convergence(),
            stats: self.stats.clone(),
            items: self.replicas.first().map(|r| r.items()).unwrap_or_default(),
        };
        debug!(stats = ?result.stats, converged = result.convergence.is_converged(), "simulation finished");
        result
    }

    /// One random local mutation, broadcast to every other replica
    fn step(&mut self) {
        let origin = self.rng.gen_range(0..self.replicas.len());
        let item_count = self.config.item_count.clamp(1, ITEM_NAMES.len());
        let item = ITEM_NAMES[self.rng.gen_range(0..item_count)];

        let replica = &mut self.replicas[origin];
        let delta = match self.rng.gen_range(0..4) {
            0 => replica.add_item(item, self.rng.gen_range(1..5)),
            1 => replica.change_quantity(item, self.rng.gen_range(0..10)),
            2 => replica.acquire(item, self.rng.gen_range(1..3)),
            _ => replica.remove_item(item),
        };
        self.stats.operations += 1;

        for to in 0..self.replicas.len() {
            if to == origin {
                continue;
            }
            self.seq += 1;
            let delivery_order = if self.rng.gen::<f64>() < self.config.reorder_prob {
                self.rng.gen_range(0..self.seq)
            } else {
                self.seq
            };
            let copies = if self.rng.gen::<f64>() < self.config.duplicate_prob {
                self.stats.duplicated += 1;
                2
            } else {
                1
            };
            for _ in 0..copies {
                self.pending.push(Envelope {
                    to,
                    delivery_order,
                    delta: delta.clone(),
                });
            }
        }
    }

    fn deliver_pending(&mut self) {
        let mut batch = std::mem::take(&mut self.pending);
        batch.sort_by_key(|e| e.delivery_order);

        for envelope in batch {
            if self.rng.gen::<f64>() < self.config.drop_prob {
                self.retries.push(envelope);
                continue;
            }
            self.replicas[envelope.to].join(&envelope.delta);
            self.stats.delivered += 1;
        }
    }

    fn check_convergence(&self) -> ConvergenceResult {
        let Some(reference) = self.replicas.first() else {
            return ConvergenceResult::Converged;
        };
        let divergent: Vec<usize> = self
            .replicas
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, r)| *r != reference || r.items() != reference.items())
            .map(|(i, _)| i)
            .collect();

        if divergent.is_empty() {
            ConvergenceResult::Converged
        } else {
            ConvergenceResult::Diverged(divergent)
        }
    }
}
