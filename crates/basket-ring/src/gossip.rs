//! Join gossip
//!
//! A node admitted to the local ring is announced onward to a few ring
//! neighbours. A node that is already known stops the epidemic at this hop, so
//! every announcement eventually dies out.

use std::future::Future;
use std::sync::Arc;

use basket_core::{BasketError, BasketResult, GossipConfig, NodeId};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::RingView;

/// A node and the tokens it chose for itself
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAnnouncement {
    pub node: NodeId,
    pub tokens: Vec<u64>,
}

impl JoinAnnouncement {
    pub fn new(node: NodeId, tokens: Vec<u64>) -> Self {
        JoinAnnouncement { node, tokens }
    }

    pub fn encode(&self) -> BasketResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BasketError::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> BasketResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| BasketError::Codec(e.to_string()))
    }
}

/// Carries announcements to peers
pub trait GossipTransport: Send + Sync + 'static {
    fn send_join(
        &self,
        target: &NodeId,
        announcement: &JoinAnnouncement,
    ) -> impl Future<Output = BasketResult<()>> + Send;
}

/// What a node did with an incoming announcement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// New member, forwarded to neighbours
    Admitted,
    /// Already known or nothing to add; propagation stops here
    Ignored,
}

/// Membership gossip for one node
pub struct Gossiper<T> {
    node: NodeId,
    ring: Arc<RingView>,
    transport: Arc<T>,
    config: GossipConfig,
}

impl<T> Clone for Gossiper<T> {
    fn clone(&self) -> Self {
        Gossiper {
            node: self.node.clone(),
            ring: Arc::clone(&self.ring),
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
        }
    }
}

impl<T: GossipTransport> Gossiper<T> {
    pub fn new(
        node: NodeId,
        ring: Arc<RingView>,
        transport: Arc<T>,
        config: GossipConfig,
    ) -> BasketResult<Self> {
        config.validate()?;
        Ok(Gossiper {
            node,
            ring,
            transport,
            config,
        })
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn ring(&self) -> &Arc<RingView> {
        &self.ring
    }

    /// Handle an announcement from a peer.
    ///
    /// Forwarding runs in a background task; this returns as soon as the ring
    /// has been updated. Must be called from within a tokio runtime.
    pub fn handle_join(&self, announcement: JoinAnnouncement) -> JoinOutcome {
        if !self.ring.add_node(&announcement.node, &announcement.tokens) {
            debug!(
                node = %self.node,
                joining = %announcement.node,
                "join already known, not forwarding"
            );
            return JoinOutcome::Ignored;
        }

        info!(node = %self.node, joining = %announcement.node, "admitted node to ring");
        self.forward(announcement);
        JoinOutcome::Admitted
    }

    /// Join the local ring and tell the neighbours.
    ///
    /// Returns `None` if this node was already a member.
    pub fn announce_self(&self) -> Option<JoinHandle<()>> {
        let tokens = self.ring.join_to_ring(&self.node);
        if tokens.is_empty() {
            return None;
        }
        info!(node = %self.node, "announcing self to ring");
        Some(self.forward(JoinAnnouncement::new(self.node.clone(), tokens)))
    }

    fn forward(&self, announcement: JoinAnnouncement) -> JoinHandle<()> {
        let targets: Vec<NodeId> = self
            .ring
            .successors(&self.node)
            .into_iter()
            .filter(|peer| *peer != announcement.node)
            .take(self.config.fanout)
            .collect();

        let transport = Arc::clone(&self.transport);
        let origin = self.node.clone();
        tokio::spawn(async move {
            for target in targets {
                match transport.send_join(&target, &announcement).await {
                    Ok(()) => debug!(from = %origin, to = %target, joining = %announcement.node, "gossip sent"),
                    Err(e) => warn!(from = %origin, to = %target, "gossip send failed: {}", e),
                }
            }
        })
    }
}
