//! The link-layer unit: a packet id plus an opaque payload.
//!
//! Packet ids identify the application-layer meaning of a payload on both
//! links.  On the serial link the id is a single byte on the wire; the USB
//! link carries the full 16-bit value, which the fitness-era record types
//! (runs, courses) need.

use crate::error::RecordError;
use bytes::{Buf, BufMut, Bytes};
use std::fmt;

/// Application-layer packet ids.
pub mod pid {
    pub const ACK: u16 = 6;
    pub const COMMAND_A010: u16 = 10;
    pub const COMMAND_A011: u16 = 11;
    pub const XFER_CMPLT: u16 = 12;
    pub const DATE_TIME: u16 = 14;
    pub const POSITION: u16 = 17;
    pub const PRX_WPT: u16 = 19;
    pub const NAK: u16 = 21;
    pub const RECORDS: u16 = 27;
    pub const RTE_HDR: u16 = 29;
    pub const RTE_WPT: u16 = 30;
    pub const ALMANAC: u16 = 31;
    pub const TRK_DATA: u16 = 34;
    pub const WPT_DATA: u16 = 35;
    pub const UNIT_ID: u16 = 38;
    pub const BAUD_RQST: u16 = 48;
    pub const BAUD_ACPT: u16 = 49;
    pub const PVT: u16 = 51;
    pub const RTE_LINK: u16 = 98;
    pub const TRK_HDR: u16 = 99;
    pub const FLIGHTBOOK: u16 = 134;
    pub const LAP: u16 = 149;
    pub const EXT_PRODUCT_DATA: u16 = 248;
    pub const PROTOCOL_ARRAY: u16 = 253;
    pub const PRODUCT_RQST: u16 = 254;
    pub const PRODUCT_DATA: u16 = 255;
    pub const RUN: u16 = 990;
    pub const WORKOUT: u16 = 991;
    pub const WORKOUT_OCCURRENCE: u16 = 992;
    pub const FITNESS_USER_PROFILE: u16 = 993;
    pub const WORKOUT_LIMITS: u16 = 994;
    pub const COURSE: u16 = 1061;
    pub const COURSE_LAP: u16 = 1062;
    pub const COURSE_POINT: u16 = 1063;
    pub const COURSE_TRK_HDR: u16 = 1064;
    pub const COURSE_TRK_DATA: u16 = 1065;
    pub const COURSE_LIMITS: u16 = 1066;

    // Image and map flash transfer.  These ids come from the unofficial
    // flash extension; no published table covers them.
    pub const IMG_PROPS_RQST: u16 = 875;
    pub const IMG_PROPS: u16 = 876;
    pub const IMG_PALETTE: u16 = 877;
    pub const IMG_ROW: u16 = 878;
    pub const IMG_WRITE_RQST: u16 = 879;
    pub const IMG_DONE: u16 = 880;
    pub const MAP_RQST: u16 = 948;
    pub const MAP_HDR: u16 = 949;
    pub const MAP_CHUNK: u16 = 950;
}

/// Transport-layer packet ids on the USB link.
pub mod usb_pid {
    pub const DATA_AVAILABLE: u16 = 2;
    pub const START_SESSION: u16 = 5;
    pub const SESSION_STARTED: u16 = 6;
}

/// One application-layer packet: an id and a payload.  The framing bytes,
/// checksums and USB headers live below this in the link layer.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u16,
    pub data: Bytes,
}

impl Packet {
    pub fn new(id: u16, data: impl Into<Bytes>) -> Packet {
        Packet {
            id,
            data: data.into(),
        }
    }

    pub fn empty(id: u16) -> Packet {
        Packet {
            id,
            data: Bytes::new(),
        }
    }

    /// Build a packet whose payload is a single LE u16 (Records counts,
    /// command opcodes, Transfer Complete echoes).
    pub fn with_u16(id: u16, value: u16) -> Packet {
        let mut buf = Vec::with_capacity(2);
        buf.put_u16_le(value);
        Packet::new(id, buf)
    }

    /// Decode a single-LE-u16 payload.
    pub fn as_u16(&self) -> Result<u16, RecordError> {
        let mut buf = &self.data[..];
        crate::wire::ensure_remaining!(buf, 2);
        Ok(buf.get_u16_le())
    }

    /// Decode a single-LE-u32 payload.
    pub fn as_u32(&self) -> Result<u32, RecordError> {
        let mut buf = &self.data[..];
        crate::wire::ensure_remaining!(buf, 4);
        Ok(buf.get_u32_le())
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Packet {{ id: {}, len: {} }}", self.id, self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_payload_round_trip() {
        let pkt = Packet::with_u16(pid::RECORDS, 513);
        assert_eq!(&pkt.data[..], &[0x01, 0x02]);
        assert_eq!(pkt.as_u16().unwrap(), 513);
    }

    #[test]
    fn short_payload_is_an_error() {
        let pkt = Packet::empty(pid::RECORDS);
        assert!(pkt.as_u16().is_err());
    }
}
