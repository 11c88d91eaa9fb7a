//! Configuration loading, normalization, and validation
//!
//! A TOML file plus `TAPLINE`-prefixed environment overrides feed the serde
//! types in [`types`]. Operator-supplied capacities that are not powers of
//! two are rounded up with a warning rather than rejected; genuinely
//! inconsistent values (inverted watermarks, zero workers) fail startup.

pub mod types;

pub use types::{
    CoreConfig, ExchangeEntry, LatencyConfig, OrchestratorConfig, PoolConfig, QueueConfig,
};

use crate::exchange::{ExchangeDescriptor, ExchangeRegistry};
use anyhow::{Context, Result};
use ::config::{Config as ConfigLoader, Environment, File};
use std::path::Path;

impl CoreConfig {
    /// Load configuration from a TOML file with environment overrides
    /// (`TAPLINE__POOL__BLOCK_BYTES=4096` style).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let loader = ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("TAPLINE").separator("__"))
            .build()
            .context("failed to build configuration")?;

        let cfg: CoreConfig = loader
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        let cfg = cfg.normalized();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the default location (`./config/default.toml`).
    pub fn load_default() -> Result<Self> {
        Self::load("config/default.toml")
    }

    /// Round power-of-two-expected values up, warning when a value moved.
    pub fn normalized(&self) -> Self {
        let mut cfg = self.clone();

        let round = |name: &str, value: usize| {
            let rounded = value.max(2).next_power_of_two();
            if rounded != value {
                tracing::warn!(
                    "{} = {} is not a power of two, rounding up to {}",
                    name,
                    value,
                    rounded
                );
            }
            rounded
        };

        cfg.queues.ingress_capacity = round("queues.ingress_capacity", cfg.queues.ingress_capacity);
        cfg.queues.egress_capacity = round("queues.egress_capacity", cfg.queues.egress_capacity);
        cfg.pool.block_bytes = round("pool.block_bytes", cfg.pool.block_bytes);
        cfg
    }

    /// Check cross-field consistency. Call after [`CoreConfig::normalized`].
    pub fn validate(&self) -> Result<()> {
        if self.pool.pool_bytes < self.pool.block_bytes {
            anyhow::bail!(
                "pool.pool_bytes ({}) must cover at least one block ({})",
                self.pool.pool_bytes,
                self.pool.block_bytes
            );
        }

        if self.orchestrator.parser_workers == 0 {
            anyhow::bail!("orchestrator.parser_workers must be at least 1");
        }

        let high = self.orchestrator.shed_high_watermark;
        let low = self.orchestrator.shed_low_watermark;
        if !(0.0..=1.0).contains(&high) || !(0.0..=1.0).contains(&low) || low >= high {
            anyhow::bail!(
                "shed watermarks must satisfy 0 <= low < high <= 1, got low={} high={}",
                low,
                high
            );
        }

        if self.orchestrator.backoff_yield_after > self.orchestrator.backoff_spins {
            anyhow::bail!(
                "orchestrator.backoff_yield_after ({}) cannot exceed backoff_spins ({})",
                self.orchestrator.backoff_yield_after,
                self.orchestrator.backoff_spins
            );
        }

        if self.latency.window_size == 0 {
            anyhow::bail!("latency.window_size must be at least 1");
        }

        Ok(())
    }

    /// Build the exchange registry this configuration describes, falling
    /// back to the built-in US equities seed when no exchanges are listed.
    pub fn registry(&self) -> Result<ExchangeRegistry> {
        if self.exchanges.is_empty() {
            return Ok(ExchangeRegistry::default_us_equities());
        }

        let mut descriptors = Vec::with_capacity(self.exchanges.len());
        for entry in &self.exchanges {
            let mut hosts = Vec::with_capacity(entry.hosts.len());
            for host in &entry.hosts {
                hosts.push(host.parse().with_context(|| {
                    format!("exchange '{}': invalid host address '{}'", entry.name, host)
                })?);
            }
            descriptors.push(ExchangeDescriptor {
                id: entry.id,
                name: entry.name.clone(),
                hosts,
                ports: entry.ports.clone(),
                protocol: entry.protocol,
                latency_target_us: entry.latency_target_us,
            });
        }

        ExchangeRegistry::with_descriptors(descriptors).context("invalid exchange registry")
    }
}
