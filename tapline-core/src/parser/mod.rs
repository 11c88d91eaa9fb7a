//! Zero-copy trading-packet parser
//!
//! Walks Ethernet II -> IPv4 -> TCP|UDP headers over a borrowed frame,
//! classifies the packet against the exchange registry by port, and marks
//! FIX framing by prefix. No allocation, no retained references; the parser
//! is a pure function of the frame bytes and the registry snapshot, plus
//! relaxed counters.
//!
//! Rejection taxonomy (kept distinct on purpose):
//! - malformed frames (short headers, non-IPv4, bad IHL, unsupported L4)
//!   bump `malformed_rejected`
//! - well-formed frames whose ports match no configured exchange bump
//!   `non_trading_skipped`

use crate::core::{L4Protocol, ParsedRecord};
use crate::exchange::ExchangeRegistry;
use crossbeam::utils::CachePadded;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ethernet II header length.
pub const ETH_HEADER_LEN: usize = 14;
/// EtherType for IPv4, the only accepted network protocol.
pub const ETHERTYPE_IPV4: u16 = 0x0800;
/// Minimum IPv4 header length (IHL = 5).
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// Minimum TCP header length (data offset = 5).
pub const TCP_MIN_HEADER_LEN: usize = 20;
/// Fixed UDP header length.
pub const UDP_HEADER_LEN: usize = 8;
/// FIX session framing prefix.
pub const FIX_PREFIX: &[u8; 5] = b"8=FIX";
/// Minimum payload length before FIX detection is attempted.
pub const FIX_MIN_PAYLOAD: usize = 8;

/// Per-worker parser counters. Each counter sits on its own cache line so
/// concurrent snapshot reads never bounce the writer's line.
#[derive(Debug, Default)]
pub struct ParserCounters {
    packets_parsed: CachePadded<AtomicU64>,
    bytes_processed: CachePadded<AtomicU64>,
    malformed_rejected: CachePadded<AtomicU64>,
    non_trading_skipped: CachePadded<AtomicU64>,
}

/// Copyable snapshot of one parser's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Frames that produced a [`ParsedRecord`]
    pub packets_parsed: u64,
    /// Bytes of every frame offered to the parser (parsed or not)
    pub bytes_processed: u64,
    /// Frames discarded as malformed (short, non-IPv4, unsupported L4)
    pub malformed_rejected: u64,
    /// Well-formed frames that matched no configured exchange port
    pub non_trading_skipped: u64,
}

impl ParserStats {
    /// Merge another worker's stats into this one (used by the C7 snapshot).
    pub fn merge(&mut self, other: &ParserStats) {
        self.packets_parsed += other.packets_parsed;
        self.bytes_processed += other.bytes_processed;
        self.malformed_rejected += other.malformed_rejected;
        self.non_trading_skipped += other.non_trading_skipped;
    }
}

/// Trading-packet parser bound to a registry snapshot.
///
/// One instance per parser worker; counters are aggregated only at snapshot
/// time.
pub struct PacketParser {
    registry: Arc<ExchangeRegistry>,
    counters: ParserCounters,
}

impl PacketParser {
    pub fn new(registry: Arc<ExchangeRegistry>) -> Self {
        Self {
            registry,
            counters: ParserCounters::default(),
        }
    }

    /// Parse one Ethernet II frame.
    ///
    /// Returns `None` when the frame is malformed, uses an unsupported
    /// protocol, or matches no configured exchange port; the corresponding
    /// counter records which. `capture_ts_ns` is carried into the record
    /// untouched.
    #[inline]
    pub fn parse(&self, frame: &[u8], capture_ts_ns: u64) -> Option<ParsedRecord> {
        self.counters
            .bytes_processed
            .fetch_add(frame.len() as u64, Ordering::Relaxed);

        let record = match self.walk(frame, capture_ts_ns) {
            Ok(record) => record,
            Err(Discard::Malformed) => {
                self.counters
                    .malformed_rejected
                    .fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(Discard::NonTrading) => {
                self.counters
                    .non_trading_skipped
                    .fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        self.counters.packets_parsed.fetch_add(1, Ordering::Relaxed);
        Some(record)
    }

    /// The header walk itself, free of counter noise.
    #[inline]
    fn walk(&self, frame: &[u8], capture_ts_ns: u64) -> Result<ParsedRecord, Discard> {
        // Ethernet II: EtherType at offset 12, big-endian.
        if frame.len() < ETH_HEADER_LEN {
            return Err(Discard::Malformed);
        }
        let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
        if ethertype != ETHERTYPE_IPV4 {
            return Err(Discard::Malformed);
        }

        // IPv4 fixed header.
        if frame.len() < ETH_HEADER_LEN + IPV4_MIN_HEADER_LEN {
            return Err(Discard::Malformed);
        }
        let ip = &frame[ETH_HEADER_LEN..];
        let version_ihl = ip[0];
        if version_ihl >> 4 != 4 {
            return Err(Discard::Malformed);
        }
        let ihl = ((version_ihl & 0x0F) as usize) * 4;
        if ihl < IPV4_MIN_HEADER_LEN || frame.len() < ETH_HEADER_LEN + ihl {
            return Err(Discard::Malformed);
        }
        let protocol =
            L4Protocol::from_ip_proto(ip[9]).ok_or(Discard::Malformed)?;
        let src_addr = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
        let dst_addr = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);

        // Transport header: ports first, then the payload offset.
        let l4_off = ETH_HEADER_LEN + ihl;
        let (src_port, dst_port, payload_off) = match protocol {
            L4Protocol::Tcp => {
                if frame.len() < l4_off + TCP_MIN_HEADER_LEN {
                    return Err(Discard::Malformed);
                }
                let tcp = &frame[l4_off..];
                let src_port = u16::from_be_bytes([tcp[0], tcp[1]]);
                let dst_port = u16::from_be_bytes([tcp[2], tcp[3]]);
                let tcp_hdr_len = ((tcp[12] >> 4) & 0x0F) as usize * 4;
                (src_port, dst_port, l4_off + tcp_hdr_len)
            }
            L4Protocol::Udp => {
                if frame.len() < l4_off + UDP_HEADER_LEN {
                    return Err(Discard::Malformed);
                }
                let udp = &frame[l4_off..];
                let src_port = u16::from_be_bytes([udp[0], udp[1]]);
                let dst_port = u16::from_be_bytes([udp[2], udp[3]]);
                (src_port, dst_port, l4_off + UDP_HEADER_LEN)
            }
        };

        // Port classification: destination wins, source is the fallback;
        // anything else is non-trading traffic and leaves the hot path here.
        let exchange = self
            .registry
            .classify(dst_port, src_port)
            .ok_or(Discard::NonTrading)?;

        let payload = frame.get(payload_off..).unwrap_or(&[]);
        let is_fix = payload.len() >= FIX_MIN_PAYLOAD && &payload[..FIX_PREFIX.len()] == FIX_PREFIX;

        Ok(ParsedRecord {
            src_addr,
            dst_addr,
            src_port,
            dst_port,
            protocol,
            exchange_id: exchange.id,
            is_fix,
            frame_len: frame.len() as u32,
            capture_ts_ns,
        })
    }

    /// Snapshot this parser's counters.
    pub fn stats(&self) -> ParserStats {
        ParserStats {
            packets_parsed: self.counters.packets_parsed.load(Ordering::Relaxed),
            bytes_processed: self.counters.bytes_processed.load(Ordering::Relaxed),
            malformed_rejected: self.counters.malformed_rejected.load(Ordering::Relaxed),
            non_trading_skipped: self.counters.non_trading_skipped.load(Ordering::Relaxed),
        }
    }

    /// Zero the counters. Intended for quiesced maintenance windows.
    pub fn reset_stats(&self) {
        self.counters.packets_parsed.store(0, Ordering::Relaxed);
        self.counters.bytes_processed.store(0, Ordering::Relaxed);
        self.counters.malformed_rejected.store(0, Ordering::Relaxed);
        self.counters.non_trading_skipped.store(0, Ordering::Relaxed);
    }

    /// The registry snapshot this parser classifies against.
    pub fn registry(&self) -> &ExchangeRegistry {
        &self.registry
    }
}

/// Why a frame left the hot path without producing a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Discard {
    Malformed,
    NonTrading,
}
