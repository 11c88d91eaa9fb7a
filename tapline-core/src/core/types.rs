//! Zero-overhead core types for the capture hot path
//!
//! All types in this module are designed for:
//! - Zero heap allocations
//! - Copy semantics
//! - Minimal memory footprint (one-byte enums, fixed-layout records)

use std::fmt;
use std::net::Ipv4Addr;

/// Numeric exchange identifier.
///
/// `0` means "unknown / not a configured exchange"; configured exchanges use
/// small positive integers assigned by the registry.
pub type ExchangeId = u16;

/// The reserved "unknown exchange" identifier.
pub const EXCHANGE_UNKNOWN: ExchangeId = 0;

/// Latency values are clamped to this ceiling (~4.29 s) before recording.
pub const LATENCY_CLAMP_NS: u64 = u32::MAX as u64;

/// Layer-4 transport protocol of a classified packet.
///
/// Single byte enum, discriminants match the IPv4 protocol numbers so the
/// parser can tag records without a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum L4Protocol {
    Tcp = 6,
    Udp = 17,
}

impl L4Protocol {
    /// Map an IPv4 `protocol` field to a supported transport.
    ///
    /// Anything other than TCP (6) or UDP (17) is rejected on the hot path.
    #[inline(always)]
    pub const fn from_ip_proto(proto: u8) -> Option<Self> {
        match proto {
            6 => Some(L4Protocol::Tcp),
            17 => Some(L4Protocol::Udp),
            _ => None,
        }
    }

    /// The IPv4 protocol number for this transport.
    #[inline(always)]
    pub const fn ip_proto(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for L4Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            L4Protocol::Tcp => write!(f, "TCP"),
            L4Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Immutable descriptor of a classified trading packet.
///
/// Produced by the parser, travels alongside the block handle through the
/// egress queue, and is discarded when the consumer releases the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRecord {
    /// Source IPv4 address (network header order).
    pub src_addr: Ipv4Addr,
    /// Destination IPv4 address.
    pub dst_addr: Ipv4Addr,
    /// Source L4 port.
    pub src_port: u16,
    /// Destination L4 port.
    pub dst_port: u16,
    /// Transport protocol.
    pub protocol: L4Protocol,
    /// Classified exchange, never [`EXCHANGE_UNKNOWN`] for records the parser
    /// emits (non-trading traffic is discarded before a record exists).
    pub exchange_id: ExchangeId,
    /// Whether the payload starts with the FIX framing prefix (`8=FIX`).
    pub is_fix: bool,
    /// Total frame length in bytes, including the Ethernet header.
    pub frame_len: u32,
    /// Capture timestamp in nanoseconds, carried from the capture source.
    pub capture_ts_ns: u64,
}

/// One latency observation.
///
/// Stored packed inside the tracker window; this is the unpacked form handed
/// to snapshot readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    /// Timestamp of the observation in nanoseconds.
    pub capture_ts_ns: u64,
    /// Observed latency, clamped to [`LATENCY_CLAMP_NS`].
    pub latency_ns: u32,
    /// Exchange the sample belongs to (`0` = unknown).
    pub exchange_id: ExchangeId,
    /// Transport the packet arrived on.
    pub protocol: L4Protocol,
}
