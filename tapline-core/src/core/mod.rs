//! Core domain types and errors shared by every stage of the pipeline.

pub mod errors;
pub mod types;

pub use errors::{PoolError, RegistryError};
pub use types::{
    ExchangeId, L4Protocol, LatencySample, ParsedRecord, EXCHANGE_UNKNOWN, LATENCY_CLAMP_NS,
};
