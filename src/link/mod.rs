//! The link layer: reliable, packet-shaped delivery over a physical port.
//!
//! Two encodings exist.  [`serial::SerialLink`] speaks the DLE/ETX framing
//! with checksums and ACK/NAK (L000/L001); [`usb::UsbLink`] rides the USB
//! transport's own packetization (L002), which needs neither.  Everything
//! above sees the same [`Link`] trait.

pub mod serial;
pub mod usb;

use crate::error::Result;
use crate::packet::Packet;
use std::time::Duration;

/// Read timeout used when the caller doesn't supply one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub trait Link {
    /// Send one application packet.  Blocks until the device acknowledges
    /// it (serial) or the transport write completes (USB).
    fn send(&mut self, pkt: &Packet) -> Result<()>;

    /// Receive the next application packet, waiting up to
    /// [`DEFAULT_TIMEOUT`].
    fn recv(&mut self) -> Result<Packet>;

    /// Receive the next application packet, or `None` if the wire stays
    /// quiet for `timeout`.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Packet>>;

    /// Largest payload one packet may carry on this link.
    fn max_payload(&self) -> usize;

    /// Counters for diagnostics and tests.
    fn stats(&self) -> LinkStats;
}

/// Running totals kept by every link.
#[derive(Clone, Copy, Default, Debug)]
pub struct LinkStats {
    /// Packets handed to `send`.
    pub sent: u64,
    /// Packets delivered by `recv`.
    pub received: u64,
    /// Retransmissions after a NAK or an ACK timeout.
    pub retransmits: u64,
    /// NAKs we sent because an incoming frame was damaged.
    pub naks_sent: u64,
    /// NAKs the device sent us.
    pub naks_received: u64,
}
