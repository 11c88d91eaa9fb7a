//! Serde configuration types consumed at startup.

use crate::exchange::WireProtocol;
use serde::{Deserialize, Serialize};

/// Top-level core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub queues: QueueConfig,

    /// Monitored exchanges; empty means the built-in US equities seed.
    #[serde(default)]
    pub exchanges: Vec<ExchangeEntry>,

    #[serde(default)]
    pub latency: LatencyConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            queues: QueueConfig::default(),
            exchanges: Vec::new(),
            latency: LatencyConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// Fixed-block pool geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Total arena reservation in bytes
    #[serde(default = "default_pool_bytes")]
    pub pool_bytes: usize,

    /// Block size in bytes; rounded up to a power of two
    #[serde(default = "default_block_bytes")]
    pub block_bytes: usize,

    /// Back the arena with an anonymous mmap region instead of the heap
    #[serde(default)]
    pub use_mapped_arena: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_bytes: default_pool_bytes(),
            block_bytes: default_block_bytes(),
            use_mapped_arena: false,
        }
    }
}

/// Ring capacities; rounded up to powers of two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub ingress_capacity: usize,

    #[serde(default = "default_queue_capacity")]
    pub egress_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ingress_capacity: default_queue_capacity(),
            egress_capacity: default_queue_capacity(),
        }
    }
}

/// One monitored exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeEntry {
    /// Registry id, must be > 0
    pub id: u16,

    pub name: String,

    /// Uplink IPv4 addresses, informational
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Feed ports; classification is first-match on these
    pub ports: Vec<u16>,

    /// "FIX/TCP" | "TCP" | "UDP"
    #[serde(default = "default_protocol")]
    pub protocol: WireProtocol,

    #[serde(default = "default_target_us")]
    pub latency_target_us: u64,
}

/// Latency tracker window and default target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyConfig {
    /// Trailing samples kept for percentile queries
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Target applied to exchanges without their own
    #[serde(default = "default_target_us")]
    pub default_target_us: u64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            default_target_us: default_target_us(),
        }
    }
}

/// Worker topology and back-pressure tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_parser_workers")]
    pub parser_workers: usize,

    /// Shed mode opens above this ingress/egress fill ratio
    #[serde(default = "default_shed_high")]
    pub shed_high_watermark: f64,

    /// Shed mode clears below this fill ratio
    #[serde(default = "default_shed_low")]
    pub shed_low_watermark: f64,

    /// Bounded push attempts before shedding
    #[serde(default = "default_backoff_spins")]
    pub backoff_spins: u32,

    /// Attempt number where spinning turns into yielding
    #[serde(default = "default_backoff_yield_after")]
    pub backoff_yield_after: u32,

    /// Cores to pin parser workers to, round-robin; empty disables pinning
    #[serde(default)]
    pub worker_cores: Vec<usize>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parser_workers: default_parser_workers(),
            shed_high_watermark: default_shed_high(),
            shed_low_watermark: default_shed_low(),
            backoff_spins: default_backoff_spins(),
            backoff_yield_after: default_backoff_yield_after(),
            worker_cores: Vec::new(),
        }
    }
}

// Default value functions

fn default_pool_bytes() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_block_bytes() -> usize {
    2048
}

fn default_queue_capacity() -> usize {
    65_536
}

fn default_protocol() -> WireProtocol {
    WireProtocol::FixTcp
}

fn default_window_size() -> usize {
    100_000
}

fn default_target_us() -> u64 {
    500
}

fn default_parser_workers() -> usize {
    2
}

fn default_shed_high() -> f64 {
    0.9
}

fn default_shed_low() -> f64 {
    0.7
}

fn default_backoff_spins() -> u32 {
    64
}

fn default_backoff_yield_after() -> u32 {
    32
}
