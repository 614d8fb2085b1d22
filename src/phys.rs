//! The provider contract for the physical layer.
//!
//! This crate deliberately ships no OS serial or USB driver.  The caller
//! brings one and implements [`SerialPhys`] or [`UsbPhys`] over it; the
//! test suite and the demo binaries show in-memory and TCP-bridge
//! implementations.  What lives here is the part of the physical layer
//! that is protocol, not platform: the 12-byte USB packet header and its
//! reassembly rule.

use crate::error::RecordError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use std::time::Duration;

/// Garmin's USB vendor id.
pub const VENDOR_ID: u16 = 0x091e;

/// A byte-stream port: RS-232 or a USB-serial bridge.  9600 8N1, no flow
/// control, unless the session renegotiates the baud rate.
pub trait SerialPhys {
    /// Read at most `buf.len()` bytes.  Blocks up to the configured
    /// timeout; a timeout surfaces as `io::ErrorKind::TimedOut`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole buffer.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Set the read timeout.  The default is 5 seconds.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Reconfigure the port speed.  Callers guarantee a quiescent wire.
    fn set_baudrate(&mut self, baud: u32) -> io::Result<()>;

    /// Push any buffered output onto the wire.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A packetized USB port: one bulk pipe out, one bulk plus one interrupt
/// pipe in.  The provider services both IN pipes and hands back whole
/// logical packets; [`UsbPacket`] supplies the header codec, and a bulk
/// read shorter than the endpoint max-packet size terminates a logical
/// packet.
pub trait UsbPhys {
    /// Read the next logical packet from the device, either pipe.
    /// Blocks up to the configured timeout; a timeout surfaces as
    /// `io::ErrorKind::TimedOut`.
    fn read_packet(&mut self) -> io::Result<UsbPacket>;

    /// Write one logical packet to the bulk out pipe.
    fn write_packet(&mut self, pkt: &UsbPacket) -> io::Result<()>;

    /// Set the read timeout.  The default is 5 seconds.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

/// Which layer a USB packet belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UsbLayer {
    /// USB session management: start session, data available.
    Transport,
    /// Everything the application protocols exchange.
    Application,
}

/// One packet as it crosses the USB wire: a 12-byte header
/// (`type, reserved[3], id, reserved[2], size`) followed by `size` payload
/// bytes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UsbPacket {
    pub layer: UsbLayer,
    pub id: u16,
    pub data: Bytes,
}

impl UsbPacket {
    pub const HEADER_LEN: usize = 12;

    pub fn transport(id: u16) -> UsbPacket {
        UsbPacket {
            layer: UsbLayer::Transport,
            id,
            data: Bytes::new(),
        }
    }

    pub fn application(id: u16, data: impl Into<Bytes>) -> UsbPacket {
        UsbPacket {
            layer: UsbLayer::Application,
            id,
            data: data.into(),
        }
    }

    /// Encode header and payload, ready for a bulk out transfer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::HEADER_LEN + self.data.len());
        buf.put_u8(match self.layer {
            UsbLayer::Transport => 0,
            UsbLayer::Application => 20,
        });
        buf.put_bytes(0, 3);
        buf.put_u16_le(self.id);
        buf.put_bytes(0, 2);
        buf.put_u32_le(self.data.len() as u32);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Decode one reassembled logical packet.
    pub fn decode(mut buf: Bytes) -> Result<UsbPacket, RecordError> {
        crate::wire::ensure_remaining!(buf, Self::HEADER_LEN);
        let layer = match buf.get_u8() {
            0 => UsbLayer::Transport,
            20 => UsbLayer::Application,
            other => {
                return Err(RecordError::FieldRange {
                    field: "usb packet type",
                    value: u32::from(other),
                })
            }
        };
        buf.advance(3);
        let id = buf.get_u16_le();
        buf.advance(2);
        let size = buf.get_u32_le() as usize;
        crate::wire::ensure_remaining!(buf, size);
        Ok(UsbPacket {
            layer,
            id,
            data: buf.slice(..size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::usb_pid;

    #[test]
    fn header_round_trip() {
        let pkt = UsbPacket::application(990, &b"\x01\x02\x03"[..]);
        let wire = pkt.encode();
        assert_eq!(wire.len(), 15);
        assert_eq!(wire[0], 20);
        assert_eq!(&wire[4..6], &[0xde, 0x03]); // 990 LE
        assert_eq!(&wire[8..12], &[3, 0, 0, 0]);
        assert_eq!(UsbPacket::decode(wire).unwrap(), pkt);
    }

    #[test]
    fn transport_packets_are_empty() {
        let wire = UsbPacket::transport(usb_pid::START_SESSION).encode();
        assert_eq!(wire.len(), UsbPacket::HEADER_LEN);
        assert_eq!(wire[0], 0);
        let back = UsbPacket::decode(wire).unwrap();
        assert_eq!(back.layer, UsbLayer::Transport);
        assert_eq!(back.id, usb_pid::START_SESSION);
        assert!(back.data.is_empty());
    }

    #[test]
    fn bad_type_byte_is_rejected() {
        let mut wire = UsbPacket::transport(5).encode().to_vec();
        wire[0] = 7;
        assert!(UsbPacket::decode(wire.into()).is_err());
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(UsbPacket::decode(Bytes::from_static(&[20, 0, 0])).is_err());
    }
}
