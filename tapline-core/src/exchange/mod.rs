//! Exchange registry: maps L4 ports to exchange identities and latency targets
//!
//! The registry is immutable after construction; updating it requires a full
//! pipeline quiesce. Port lookup is a flat linear scan over a handful of
//! descriptors with small port sets (typically <= 16 ports each), which stays
//! L1-resident and beats hashing at this size.

use crate::core::{ExchangeId, RegistryError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Wire protocol an exchange feed speaks.
///
/// Carried on the descriptor for operator visibility and sample tagging;
/// the parser itself classifies by port, not by protocol tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireProtocol {
    /// FIX sessions over TCP (`8=FIX` framing expected on the payload)
    #[serde(rename = "FIX/TCP")]
    FixTcp,
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
}

impl fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireProtocol::FixTcp => write!(f, "FIX/TCP"),
            WireProtocol::Tcp => write!(f, "TCP"),
            WireProtocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Static description of one monitored exchange uplink.
///
/// Created at startup from configuration (or the built-in seeds) and never
/// mutated during a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDescriptor {
    /// Registry identifier, `> 0` (`0` is reserved for "unknown").
    pub id: ExchangeId,
    /// Human-readable name ("NYSE", "NASDAQ", ...).
    pub name: String,
    /// Known uplink addresses; informational, classification is port-driven.
    pub hosts: Vec<Ipv4Addr>,
    /// Ports the exchange feed uses. First match wins during classification.
    pub ports: Vec<u16>,
    /// Feed protocol tag.
    pub protocol: WireProtocol,
    /// Per-exchange latency target in microseconds.
    pub latency_target_us: u64,
}

impl ExchangeDescriptor {
    fn validate(&self) -> Result<(), RegistryError> {
        if self.id == 0 || self.name.is_empty() {
            return Err(RegistryError::InvalidExchange {
                name: self.name.clone(),
            });
        }
        if self.ports.is_empty() || self.ports.contains(&0) {
            return Err(RegistryError::InvalidPorts {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Immutable port -> exchange mapping consulted by the parser.
#[derive(Debug, Clone)]
pub struct ExchangeRegistry {
    descriptors: Vec<ExchangeDescriptor>,
}

impl ExchangeRegistry {
    /// Build a registry from validated descriptors.
    ///
    /// Rejects the reserved id `0`, duplicate ids, empty or zero port sets,
    /// and ports claimed by more than one exchange (classification would be
    /// ambiguous). Failing here is a startup error, never a hot-path one.
    pub fn with_descriptors(
        descriptors: Vec<ExchangeDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut seen_ids = Vec::with_capacity(descriptors.len());
        let mut seen_ports: Vec<u16> = Vec::new();

        for desc in &descriptors {
            desc.validate()?;
            if seen_ids.contains(&desc.id) {
                return Err(RegistryError::DuplicateId { id: desc.id });
            }
            seen_ids.push(desc.id);
            for &port in &desc.ports {
                if seen_ports.contains(&port) {
                    return Err(RegistryError::DuplicatePort { port });
                }
                seen_ports.push(port);
            }
        }

        Ok(Self { descriptors })
    }

    /// Default US equities seed: NYSE=1, NASDAQ=2, CBOE=3.
    ///
    /// Port sets and latency targets follow the conventional demo feeds;
    /// production deployments override these via configuration.
    pub fn default_us_equities() -> Self {
        let seed = |id, name: &str, base: u16, target_us| ExchangeDescriptor {
            id,
            name: name.to_string(),
            hosts: Vec::new(),
            ports: vec![4000 + base, 9000 + base, 8000 + base, 7000 + base],
            protocol: WireProtocol::FixTcp,
            latency_target_us: target_us,
        };

        // Seed data is internally consistent, so the validation cannot fail.
        Self::with_descriptors(vec![
            seed(1, "NYSE", 1, 500),
            seed(2, "NASDAQ", 2, 600),
            seed(3, "CBOE", 3, 800),
        ])
        .expect("seed registry is valid")
    }

    /// Find the exchange owning `port`, if any. Flat linear scan.
    #[inline]
    pub fn lookup_port(&self, port: u16) -> Option<&ExchangeDescriptor> {
        self.descriptors
            .iter()
            .find(|desc| desc.ports.contains(&port))
    }

    /// Classify a packet by its port pair: destination port wins, source
    /// port is the fallback.
    #[inline]
    pub fn classify(&self, dst_port: u16, src_port: u16) -> Option<&ExchangeDescriptor> {
        self.lookup_port(dst_port)
            .or_else(|| self.lookup_port(src_port))
    }

    /// Descriptor for a known exchange id.
    pub fn descriptor(&self, id: ExchangeId) -> Option<&ExchangeDescriptor> {
        self.descriptors.iter().find(|desc| desc.id == id)
    }

    /// All descriptors, in declaration order.
    pub fn descriptors(&self) -> &[ExchangeDescriptor] {
        &self.descriptors
    }

    /// Highest exchange id in the registry (`0` when empty).
    pub fn max_id(&self) -> ExchangeId {
        self.descriptors.iter().map(|d| d.id).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_seed_layout() {
        let registry = ExchangeRegistry::default_us_equities();
        assert_eq!(registry.descriptors().len(), 3);
        assert_eq!(registry.max_id(), 3);

        let nyse = registry.descriptor(1).unwrap();
        assert_eq!(nyse.name, "NYSE");
        assert_eq!(nyse.ports, vec![4001, 9001, 8001, 7001]);
        assert_eq!(nyse.latency_target_us, 500);

        let nasdaq = registry.descriptor(2).unwrap();
        assert_eq!(nasdaq.ports, vec![4002, 9002, 8002, 7002]);

        let cboe = registry.descriptor(3).unwrap();
        assert_eq!(cboe.ports, vec![4003, 9003, 8003, 7003]);
    }

    #[test]
    fn test_port_lookup() {
        let registry = ExchangeRegistry::default_us_equities();
        assert_eq!(registry.lookup_port(4001).unwrap().id, 1);
        assert_eq!(registry.lookup_port(9002).unwrap().id, 2);
        assert_eq!(registry.lookup_port(7003).unwrap().id, 3);
        assert!(registry.lookup_port(53).is_none());
        assert!(registry.lookup_port(4004).is_none());
    }

    #[test]
    fn test_destination_port_wins() {
        let registry = ExchangeRegistry::default_us_equities();

        // Both ports match different exchanges: destination decides.
        let desc = registry.classify(4001, 4002).unwrap();
        assert_eq!(desc.id, 1);

        // Destination unknown, source known: fall back to source.
        let desc = registry.classify(54321, 4002).unwrap();
        assert_eq!(desc.id, 2);

        // Neither matches.
        assert!(registry.classify(53, 54321).is_none());
    }

    #[test]
    fn test_rejects_reserved_id() {
        let desc = ExchangeDescriptor {
            id: 0,
            name: "BAD".to_string(),
            hosts: Vec::new(),
            ports: vec![4001],
            protocol: WireProtocol::Tcp,
            latency_target_us: 500,
        };
        assert!(matches!(
            ExchangeRegistry::with_descriptors(vec![desc]),
            Err(RegistryError::InvalidExchange { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_port() {
        let mk = |id, port| ExchangeDescriptor {
            id,
            name: format!("EX{}", id),
            hosts: Vec::new(),
            ports: vec![port],
            protocol: WireProtocol::Udp,
            latency_target_us: 500,
        };
        assert!(matches!(
            ExchangeRegistry::with_descriptors(vec![mk(1, 4001), mk(2, 4001)]),
            Err(RegistryError::DuplicatePort { port: 4001 })
        ));
    }

    #[test]
    fn test_rejects_empty_ports() {
        let desc = ExchangeDescriptor {
            id: 1,
            name: "EX".to_string(),
            hosts: Vec::new(),
            ports: Vec::new(),
            protocol: WireProtocol::Tcp,
            latency_target_us: 500,
        };
        assert!(matches!(
            ExchangeRegistry::with_descriptors(vec![desc]),
            Err(RegistryError::InvalidPorts { .. })
        ));
    }
}
