//! L000/L001: the async serial link.
//!
//! Frame = `DLE, id, length, payload, checksum, DLE, ETX`.  Any DLE byte
//! inside id, length, payload or checksum is stuffed as `DLE DLE`; the
//! checksum is the two's complement of the byte sum of id, length and
//! payload.  Every data packet is answered with an ACK carrying the
//! acknowledged id, or a NAK requesting retransmission.

use crate::error::{LinkError, Result};
use crate::link::{Link, LinkStats, DEFAULT_TIMEOUT};
use crate::packet::{pid, Packet};
use crate::phys::SerialPhys;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::*;

pub const DLE: u8 = 0x10;
pub const ETX: u8 = 0x03;

/// How long to wait for an ACK before retransmitting.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);
/// How many times to retransmit before giving up.
pub const SEND_RETRIES: u32 = 5;
/// How many damaged copies of the same packet we NAK in a row before
/// aborting the transfer.
const NAK_BUDGET: u32 = 3;

fn checksum(id: u8, payload: &[u8]) -> u8 {
    let mut sum = id.wrapping_add(payload.len() as u8);
    for &b in payload {
        sum = sum.wrapping_add(b);
    }
    sum.wrapping_neg()
}

fn put_stuffed(buf: &mut BytesMut, byte: u8) {
    buf.put_u8(byte);
    if byte == DLE {
        buf.put_u8(DLE);
    }
}

/// Encode one packet into a serial frame.
pub fn frame(pkt: &Packet) -> std::result::Result<Bytes, LinkError> {
    let id = u8::try_from(pkt.id).map_err(|_| LinkError::IdTooWide(pkt.id))?;
    if pkt.data.len() > 255 {
        return Err(LinkError::PayloadTooLong(pkt.data.len()));
    }
    let mut buf = BytesMut::with_capacity(pkt.data.len() + 8);
    buf.put_u8(DLE);
    put_stuffed(&mut buf, id);
    put_stuffed(&mut buf, pkt.data.len() as u8);
    for &b in pkt.data.iter() {
        put_stuffed(&mut buf, b);
    }
    put_stuffed(&mut buf, checksum(id, &pkt.data));
    buf.put_u8(DLE);
    buf.put_u8(ETX);
    Ok(buf.freeze())
}

/// A frame arrived damaged.  The receiver NAKs it and resynchronizes on
/// the next DLE.
#[derive(Debug, Error)]
pub enum FrameDefect {
    #[error("frame too short to hold id, length and checksum")]
    Truncated,
    #[error("declared length {declared} but carried {got} payload bytes")]
    LengthMismatch { declared: u8, got: usize },
    #[error("bad checksum: computed {computed:#04x}, received {received:#04x}")]
    Checksum { computed: u8, received: u8 },
    #[error("lone DLE followed by {0:#04x} inside a frame")]
    BadEscape(u8),
}

enum State {
    Idle,
    SawDle,
    InFrame,
    InFrameDle,
}

/// The receive state machine.  Bytes go in one at a time; complete frames
/// or defects come out.
pub struct Deframer {
    state: State,
    buf: Vec<u8>,
    /// Id byte of the most recently completed (or damaged) frame, for
    /// NAK payloads.
    last_id: Option<u8>,
}

pub enum Deframed {
    Frame(Packet),
    Defect(FrameDefect),
}

impl Default for Deframer {
    fn default() -> Self {
        Deframer {
            state: State::Idle,
            buf: Vec::with_capacity(264),
            last_id: None,
        }
    }
}

impl Deframer {
    pub fn push(&mut self, byte: u8) -> Option<Deframed> {
        match self.state {
            State::Idle => {
                if byte == DLE {
                    self.state = State::SawDle;
                } else {
                    // Anything outside a frame, including an unescaped
                    // ETX, is noise.
                    trace!("discarding {byte:#04x} outside frame");
                }
                None
            }
            State::SawDle => {
                match byte {
                    // A stray end-of-frame with no frame before it.
                    ETX => self.state = State::Idle,
                    // DLE right after the sentinel: the id itself is a
                    // stuffed 0x10.
                    DLE => {
                        self.buf.clear();
                        self.state = State::InFrameDle;
                    }
                    b => {
                        self.buf.clear();
                        self.buf.push(b);
                        self.state = State::InFrame;
                    }
                }
                None
            }
            State::InFrame => {
                if byte == DLE {
                    self.state = State::InFrameDle;
                } else {
                    self.buf.push(byte);
                }
                None
            }
            State::InFrameDle => {
                if byte == ETX {
                    self.state = State::Idle;
                    Some(self.finish())
                } else if byte == DLE {
                    self.buf.push(DLE);
                    self.state = State::InFrame;
                    None
                } else {
                    self.state = State::Idle;
                    Some(Deframed::Defect(FrameDefect::BadEscape(byte)))
                }
            }
        }
    }

    fn finish(&mut self) -> Deframed {
        self.last_id = self.buf.first().copied();
        if self.buf.len() < 3 {
            return Deframed::Defect(FrameDefect::Truncated);
        }
        let id = self.buf[0];
        let declared = self.buf[1];
        let got = self.buf.len() - 3;
        if usize::from(declared) != got {
            return Deframed::Defect(FrameDefect::LengthMismatch { declared, got });
        }
        let received = self.buf[self.buf.len() - 1];
        let computed = checksum(id, &self.buf[2..self.buf.len() - 1]);
        if computed != received {
            return Deframed::Defect(FrameDefect::Checksum { computed, received });
        }
        let payload = Bytes::copy_from_slice(&self.buf[2..self.buf.len() - 1]);
        Deframed::Frame(Packet::new(u16::from(id), payload))
    }
}

/// The serial link: framing plus the ACK/NAK discipline.
pub struct SerialLink<P> {
    phys: P,
    deframer: Deframer,
    inbuf: VecDeque<u8>,
    /// Packets that arrived while we were waiting for an ACK.  Already
    /// acknowledged; delivered by the next `recv`.
    pending: VecDeque<Packet>,
    /// Running count of damaged copies of one packet id, kept across
    /// reads; any good frame clears it.
    nak_run: Option<(u8, u32)>,
    stats: LinkStats,
    ack_timeout: Duration,
    retries: u32,
}

impl<P: SerialPhys> SerialLink<P> {
    pub fn new(phys: P) -> SerialLink<P> {
        SerialLink {
            phys,
            deframer: Deframer::default(),
            inbuf: VecDeque::new(),
            pending: VecDeque::new(),
            nak_run: None,
            stats: LinkStats::default(),
            ack_timeout: ACK_TIMEOUT,
            retries: SEND_RETRIES,
        }
    }

    pub(crate) fn set_baudrate(&mut self, baud: u32) -> io::Result<()> {
        self.phys.set_baudrate(baud)
    }

    /// Release the port.
    pub fn into_phys(self) -> P {
        self.phys
    }

    fn write_frame(&mut self, pkt: &Packet) -> Result<()> {
        let bytes = frame(pkt)?;
        self.phys.write_all(&bytes)?;
        self.phys.flush()?;
        Ok(())
    }

    fn write_ack(&mut self, id: u16) -> Result<()> {
        self.write_frame(&Packet::new(pid::ACK, vec![id as u8]))
    }

    fn write_nak(&mut self, id: u16) -> Result<()> {
        self.stats.naks_sent += 1;
        self.write_frame(&Packet::new(pid::NAK, vec![id as u8]))
    }

    /// Pull bytes until a whole good frame arrives, the NAK budget for a
    /// single packet is spent, or the deadline passes.  Damaged frames
    /// are NAKed here.  The budget only counts consecutive damaged
    /// copies of the same packet id: a good frame, or damage on a
    /// different packet, starts a fresh count.
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Packet>> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(b) = self.inbuf.pop_front() {
                match self.deframer.push(b) {
                    None => {}
                    Some(Deframed::Frame(pkt)) => {
                        self.nak_run = None;
                        return Ok(Some(pkt));
                    }
                    Some(Deframed::Defect(defect)) => {
                        warn!("damaged frame: {defect}");
                        let id = self.deframer.last_id.unwrap_or(0);
                        self.write_nak(u16::from(id))?;
                        let run = match self.nak_run {
                            Some((prev, n)) if prev == id => n + 1,
                            _ => 1,
                        };
                        self.nak_run = Some((id, run));
                        if run >= NAK_BUDGET {
                            self.nak_run = None;
                            return Err(crate::error::Error::Aborted(
                                "three consecutive NAKs for the same packet",
                            ));
                        }
                    }
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.phys.set_timeout(remaining)?;
            let mut chunk = [0u8; 256];
            match self.phys.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.inbuf.extend(&chunk[..n]),
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<P: SerialPhys> Link for SerialLink<P> {
    fn send(&mut self, pkt: &Packet) -> Result<()> {
        self.write_frame(pkt)?;
        self.stats.sent += 1;
        let mut retries = 0;
        loop {
            match self.read_frame(self.ack_timeout)? {
                Some(reply) if reply.id == pid::ACK => match reply.data.first() {
                    Some(&b) if u16::from(b) == pkt.id & 0xff => return Ok(()),
                    other => warn!("ACK for the wrong packet: {other:?}"),
                },
                Some(reply) if reply.id == pid::NAK => {
                    self.stats.naks_received += 1;
                    debug!("NAK for packet {}", pkt.id);
                }
                Some(other) => {
                    // The device spoke out of turn; acknowledge and hold
                    // the packet for the next recv.
                    debug!("holding {other:?} received while awaiting ACK");
                    self.write_ack(other.id)?;
                    self.pending.push_back(other);
                    continue;
                }
                None => trace!("ACK timeout for packet {}", pkt.id),
            }
            retries += 1;
            if retries > self.retries {
                return Err(LinkError::Unacknowledged {
                    pid: pkt.id,
                    retries: self.retries,
                }
                .into());
            }
            self.stats.retransmits += 1;
            self.write_frame(pkt)?;
        }
    }

    fn recv(&mut self) -> Result<Packet> {
        match self.recv_timeout(DEFAULT_TIMEOUT)? {
            Some(pkt) => Ok(pkt),
            None => Err(LinkError::RecvTimeout(DEFAULT_TIMEOUT).into()),
        }
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Packet>> {
        if let Some(pkt) = self.pending.pop_front() {
            self.stats.received += 1;
            return Ok(Some(pkt));
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.read_frame(remaining)? {
                Some(pkt) if pkt.id == pid::ACK || pkt.id == pid::NAK => {
                    debug!("discarding unsolicited {pkt:?}");
                }
                Some(pkt) => {
                    self.write_ack(pkt.id)?;
                    self.stats.received += 1;
                    return Ok(Some(pkt));
                }
                None => return Ok(None),
            }
        }
    }

    fn max_payload(&self) -> usize {
        255
    }

    fn stats(&self) -> LinkStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unframe(bytes: &[u8]) -> Vec<Deframed> {
        let mut deframer = Deframer::default();
        bytes.iter().filter_map(|&b| deframer.push(b)).collect()
    }

    fn single_frame(bytes: &[u8]) -> Packet {
        let mut events = unframe(bytes);
        assert_eq!(events.len(), 1);
        match events.pop().unwrap() {
            Deframed::Frame(pkt) => pkt,
            Deframed::Defect(d) => panic!("unexpected defect: {d}"),
        }
    }

    #[test]
    fn framing_round_trip() {
        let pkt = Packet::new(pid::WPT_DATA, &b"hello"[..]);
        let wire = frame(&pkt).unwrap();
        assert_eq!(wire[0], DLE);
        assert_eq!(&wire[wire.len() - 2..], &[DLE, ETX]);
        assert_eq!(single_frame(&wire), pkt);
    }

    #[test]
    fn empty_payload_round_trip() {
        let pkt = Packet::empty(pid::PRODUCT_RQST);
        assert_eq!(single_frame(&frame(&pkt).unwrap()), pkt);
    }

    #[test]
    fn dle_bytes_are_stuffed() {
        // Payload full of DLEs; every one must double on the wire, and
        // nothing else may.
        let pkt = Packet::new(pid::WPT_DATA, &[DLE, 0x41, DLE][..]);
        let wire = frame(&pkt).unwrap();
        let dle_pairs = wire.windows(2).filter(|w| w == &[DLE, DLE]).count();
        assert_eq!(dle_pairs, 2);
        assert_eq!(single_frame(&wire), pkt);
    }

    #[test]
    fn stuffed_length_byte() {
        // A 16-byte payload makes the length byte itself a DLE.
        let pkt = Packet::new(pid::WPT_DATA, vec![0u8; 16]);
        let wire = frame(&pkt).unwrap();
        assert_eq!(&wire[2..4], &[DLE, DLE]);
        assert_eq!(single_frame(&wire), pkt);
    }

    #[test]
    fn checksum_matches_known_frame() {
        // An ACK of packet id 254: checksum = -(6 + 1 + 254) mod 256.
        let wire = frame(&Packet::new(pid::ACK, vec![254])).unwrap();
        assert_eq!(&wire[..], &[DLE, 6, 1, 254, 251, DLE, ETX]);
    }

    #[test]
    fn corrupt_checksum_is_a_defect() {
        let mut wire = frame(&Packet::new(pid::WPT_DATA, &b"x"[..]))
            .unwrap()
            .to_vec();
        wire[3] ^= 0x01; // flip a payload bit
        let events = unframe(&wire);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Deframed::Defect(FrameDefect::Checksum { .. })
        ));
    }

    #[test]
    fn resync_after_garbage() {
        // Noise, then an unescaped ETX, then a valid frame.
        let mut wire = vec![0x42, ETX, 0x99];
        let pkt = Packet::new(pid::RECORDS, vec![2, 0]);
        wire.extend_from_slice(&frame(&pkt).unwrap());
        assert_eq!(single_frame(&wire), pkt);
    }

    #[test]
    fn two_frames_back_to_back() {
        let a = Packet::new(pid::RECORDS, vec![1, 0]);
        let b = Packet::empty(pid::XFER_CMPLT);
        let mut wire = frame(&a).unwrap().to_vec();
        wire.extend_from_slice(&frame(&b).unwrap());
        let events = unframe(&wire);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Deframed::Frame(p) if *p == a));
        assert!(matches!(&events[1], Deframed::Frame(p) if *p == b));
    }

    #[test]
    fn wide_ids_are_rejected() {
        let err = frame(&Packet::empty(pid::RUN)).unwrap_err();
        assert!(matches!(err, LinkError::IdTooWide(990)));
    }
}
