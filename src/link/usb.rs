//! L002: the USB link.
//!
//! Framing, integrity and delivery are the USB transport's problem, so
//! this layer neither stuffs bytes nor checksums nor ACKs.  What remains
//! is the start-session handshake and keeping the transport-layer chatter
//! (data-available notifications, keep-alives) away from the application
//! protocols.

use crate::error::{LinkError, Result};
use crate::link::{Link, LinkStats, DEFAULT_TIMEOUT};
use crate::packet::{usb_pid, Packet};
use crate::phys::{UsbLayer, UsbPacket, UsbPhys};
use std::io;
use std::time::Duration;
use tracing::*;

pub struct UsbLink<P> {
    phys: P,
    stats: LinkStats,
    unit_id: Option<u32>,
}

impl<P: UsbPhys> UsbLink<P> {
    /// Perform the start-session handshake and wrap the pipe.
    pub fn start(mut phys: P) -> Result<UsbLink<P>> {
        phys.write_packet(&UsbPacket::transport(usb_pid::START_SESSION))?;
        phys.set_timeout(DEFAULT_TIMEOUT)?;
        let unit_id = loop {
            let pkt = phys.read_packet()?;
            match (pkt.layer, pkt.id) {
                (UsbLayer::Transport, usb_pid::SESSION_STARTED) => {
                    // The reply carries the unit id when the device knows
                    // one.
                    break if pkt.data.len() >= 4 {
                        Some(u32::from_le_bytes([
                            pkt.data[0],
                            pkt.data[1],
                            pkt.data[2],
                            pkt.data[3],
                        ]))
                    } else {
                        None
                    };
                }
                _ => debug!("discarding {pkt:?} before session start"),
            }
        };
        debug!("USB session started, unit id {unit_id:?}");
        Ok(UsbLink {
            phys,
            stats: LinkStats::default(),
            unit_id,
        })
    }

    /// The unit id reported by the session-started reply, if any.
    pub fn unit_id(&self) -> Option<u32> {
        self.unit_id
    }

    /// Release the pipe.
    pub fn into_phys(self) -> P {
        self.phys
    }
}

impl<P: UsbPhys> Link for UsbLink<P> {
    fn send(&mut self, pkt: &Packet) -> Result<()> {
        self.phys
            .write_packet(&UsbPacket::application(pkt.id, pkt.data.clone()))?;
        self.stats.sent += 1;
        Ok(())
    }

    fn recv(&mut self) -> Result<Packet> {
        match self.recv_timeout(DEFAULT_TIMEOUT)? {
            Some(pkt) => Ok(pkt),
            None => Err(LinkError::RecvTimeout(DEFAULT_TIMEOUT).into()),
        }
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Packet>> {
        self.phys.set_timeout(timeout)?;
        loop {
            let pkt = match self.phys.read_packet() {
                Ok(pkt) => pkt,
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            };
            match pkt.layer {
                UsbLayer::Transport => match pkt.id {
                    usb_pid::DATA_AVAILABLE => trace!("data available"),
                    usb_pid::SESSION_STARTED => trace!("duplicate session-started"),
                    other => warn!("unknown transport packet id {other}"),
                },
                UsbLayer::Application => {
                    if pkt.id == 0 && pkt.data.is_empty() {
                        // Keep-alive.
                        trace!("discarding zero-length packet");
                        continue;
                    }
                    self.stats.received += 1;
                    return Ok(Some(Packet::new(pkt.id, pkt.data)));
                }
            }
        }
    }

    fn max_payload(&self) -> usize {
        4096
    }

    fn stats(&self) -> LinkStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::pid;
    use std::collections::VecDeque;

    /// A scripted USB pipe: pops canned packets, records writes.
    struct FakePipe {
        incoming: VecDeque<UsbPacket>,
        outgoing: Vec<UsbPacket>,
    }

    impl FakePipe {
        fn new(incoming: Vec<UsbPacket>) -> FakePipe {
            FakePipe {
                incoming: incoming.into(),
                outgoing: Vec::new(),
            }
        }
    }

    impl UsbPhys for FakePipe {
        fn read_packet(&mut self) -> io::Result<UsbPacket> {
            self.incoming
                .pop_front()
                .ok_or_else(|| io::Error::from(io::ErrorKind::TimedOut))
        }

        fn write_packet(&mut self, pkt: &UsbPacket) -> io::Result<()> {
            self.outgoing.push(pkt.clone());
            Ok(())
        }

        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }
    }

    fn session_started(unit_id: u32) -> UsbPacket {
        UsbPacket {
            layer: UsbLayer::Transport,
            id: usb_pid::SESSION_STARTED,
            data: unit_id.to_le_bytes().to_vec().into(),
        }
    }

    #[test]
    fn handshake_runs_before_traffic() {
        let pipe = FakePipe::new(vec![session_started(123_456)]);
        let link = UsbLink::start(pipe).unwrap();
        assert_eq!(link.unit_id(), Some(123_456));
        assert_eq!(link.phys.outgoing.len(), 1);
        assert_eq!(link.phys.outgoing[0].id, usb_pid::START_SESSION);
    }

    #[test]
    fn transport_chatter_is_invisible() {
        let pipe = FakePipe::new(vec![
            session_started(7),
            UsbPacket::transport(usb_pid::DATA_AVAILABLE),
            UsbPacket::application(0, &b""[..]), // keep-alive
            UsbPacket::application(pid::PRODUCT_DATA, &b"\x69\x00\xe6\x00"[..]),
        ]);
        let mut link = UsbLink::start(pipe).unwrap();
        let pkt = link.recv().unwrap();
        assert_eq!(pkt.id, pid::PRODUCT_DATA);
        assert_eq!(link.stats().received, 1);
    }

    #[test]
    fn wide_ids_survive() {
        let pipe = FakePipe::new(vec![
            session_started(7),
            UsbPacket::application(pid::RUN, &b"\x00"[..]),
        ]);
        let mut link = UsbLink::start(pipe).unwrap();
        assert_eq!(link.recv().unwrap().id, pid::RUN);
    }
}
