//! Ring and gossip configuration

use serde::{Deserialize, Serialize};

use crate::{BasketError, BasketResult};

/// Virtual tokens each node occupies on the ring
pub const DEFAULT_TOKENS_PER_NODE: usize = 3;

/// Neighbours a node forwards a join announcement to
pub const DEFAULT_GOSSIP_FANOUT: usize = 2;

/// Consistent-hashing ring configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    /// Number of tokens minted by `join_to_ring`
    pub tokens_per_node: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        RingConfig {
            tokens_per_node: DEFAULT_TOKENS_PER_NODE,
        }
    }
}

impl RingConfig {
    /// Finer load distribution for larger clusters
    pub fn fine_grained() -> Self {
        RingConfig { tokens_per_node: 16 }
    }

    pub fn validate(&self) -> BasketResult<()> {
        if self.tokens_per_node == 0 {
            return Err(BasketError::InvalidConfig(
                "tokens_per_node must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Gossip membership configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Ring neighbours each newly admitted announcement is forwarded to
    pub fanout: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        GossipConfig {
            fanout: DEFAULT_GOSSIP_FANOUT,
        }
    }
}

impl GossipConfig {
    /// Wider fan-out for lossy networks
    pub fn redundant() -> Self {
        GossipConfig { fanout: 4 }
    }

    pub fn validate(&self) -> BasketResult<()> {
        if self.fanout == 0 {
            return Err(BasketError::InvalidConfig("fanout must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RingConfig::default().validate().is_ok());
        assert!(GossipConfig::default().validate().is_ok());
        assert_eq!(RingConfig::default().tokens_per_node, 3);
    }

    #[test]
    fn test_zero_values_rejected() {
        let ring = RingConfig { tokens_per_node: 0 };
        assert!(matches!(ring.validate(), Err(BasketError::InvalidConfig(_))));

        let gossip = GossipConfig { fanout: 0 };
        assert!(matches!(gossip.validate(), Err(BasketError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_from_json() {
        let config: GossipConfig = serde_json::from_str(r#"{"fanout": 3}"#).unwrap();
        assert_eq!(config.fanout, 3);
    }
}
