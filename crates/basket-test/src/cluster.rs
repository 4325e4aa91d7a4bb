//! In-memory gossip cluster
//!
//! Nodes exchange join announcements through a shared [`MemoryNetwork`]
//! instead of sockets. Announcements still pass through their byte encoding so
//! the codec is exercised on every hop. Any node can be marked down to test
//! that forwarding survives a dead neighbour.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use basket_core::{BasketError, BasketResult, GossipConfig, NodeId};
use basket_ring::{Gossiper, GossipTransport, JoinAnnouncement, RingView};
use parking_lot::RwLock;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Transport handle held by every node's gossiper
pub struct MemoryTransport {
    network: Weak<MemoryNetwork>,
}

impl MemoryTransport {
    fn deliver(&self, target: &NodeId, announcement: &JoinAnnouncement) -> BasketResult<()> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| BasketError::Transport("network shut down".into()))?;
        let bytes = announcement.encode()?;
        network.deliver(target, &bytes)
    }
}

impl GossipTransport for MemoryTransport {
    fn send_join(
        &self,
        target: &NodeId,
        announcement: &JoinAnnouncement,
    ) -> impl Future<Output = BasketResult<()>> + Send {
        let result = self.deliver(target, announcement);
        async move { result }
    }
}

/// Shared medium connecting the nodes of one test cluster
pub struct MemoryNetwork {
    config: GossipConfig,
    peers: RwLock<HashMap<NodeId, Gossiper<MemoryTransport>>>,
    down: RwLock<HashSet<NodeId>>,
}

impl MemoryNetwork {
    pub fn new(config: GossipConfig) -> Arc<Self> {
        Arc::new(MemoryNetwork {
            config,
            peers: RwLock::new(HashMap::new()),
            down: RwLock::new(HashSet::new()),
        })
    }

    /// Register a node.
    ///
    /// With a `seed`, the new node starts from a copy of the seed's ring, the
    /// way a joining node fetches the ring before announcing itself.
    pub fn add_node(
        self: &Arc<Self>,
        id: NodeId,
        seed: Option<&NodeId>,
    ) -> BasketResult<Gossiper<MemoryTransport>> {
        let ring = match seed {
            Some(seed) => {
                let seed = self.peer(seed)?;
                RingView::from_token_map(seed.ring().token_to_node())
            }
            None => RingView::new(),
        };
        let transport = Arc::new(MemoryTransport {
            network: Arc::downgrade(self),
        });
        let gossiper = Gossiper::new(id.clone(), Arc::new(ring), transport, self.config.clone())?;
        self.peers.write().insert(id, gossiper.clone());
        Ok(gossiper)
    }

    pub fn peer(&self, id: &NodeId) -> BasketResult<Gossiper<MemoryTransport>> {
        self.peers
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| BasketError::UnknownPeer(id.clone()))
    }

    /// Mark a node unreachable (or reachable again)
    pub fn set_down(&self, id: &NodeId, down: bool) {
        let mut set = self.down.write();
        if down {
            set.insert(id.clone());
        } else {
            set.remove(id);
        }
    }

    fn is_down(&self, id: &NodeId) -> bool {
        self.down.read().contains(id)
    }

    fn deliver(&self, target: &NodeId, bytes: &[u8]) -> BasketResult<()> {
        if self.is_down(target) {
            return Err(BasketError::Transport(format!("{} is down", target)));
        }
        let peer = self.peer(target)?;
        let announcement = JoinAnnouncement::decode(bytes)?;
        let outcome = peer.handle_join(announcement);
        debug!(to = %target, ?outcome, "delivered announcement");
        Ok(())
    }

    /// Member count seen by every reachable node
    pub fn views(&self) -> Vec<(NodeId, usize)> {
        let mut views: Vec<_> = self
            .peers
            .read()
            .iter()
            .filter(|(id, _)| !self.is_down(id))
            .map(|(id, g)| (id.clone(), g.ring().len()))
            .collect();
        views.sort();
        views
    }

    /// Whether every reachable node holds the same token map
    pub fn converged(&self) -> bool {
        let peers = self.peers.read();
        let mut maps = peers
            .iter()
            .filter(|(id, _)| !self.is_down(id))
            .map(|(_, g)| g.ring().token_to_node());
        match maps.next() {
            Some(first) => maps.all(|m| m == first),
            None => true,
        }
    }

    /// Poll until [`MemoryNetwork::converged`] holds or `timeout` passes
    pub async fn wait_for_convergence(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.converged() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(5)).await;
        }
    }
}
