//! End-to-end tests against a scripted device.
//!
//! `FakeGps` implements the serial provider contract and behaves like a
//! unit on the other end of the wire: it deframes what the host writes,
//! acknowledges every data packet, answers according to a per-test
//! script, and paces its own data packets one ACK at a time, the way a
//! real unit does.

use bytes::BufMut;
use garlink::link::serial::{frame, Deframed, Deframer, SerialLink};
use garlink::packet::{pid, Packet};
use garlink::phys::SerialPhys;
use garlink::records::*;
use garlink::wire::Position;
use garlink::{Error, Role, Session};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

enum Send {
    Clean(Packet),
    /// Transmit with a flipped payload bit the first time; the clean copy
    /// goes out when the host NAKs.
    CorruptFirst(Packet),
    /// Transmit with a flipped payload bit every time, NAK
    /// retransmissions included.
    CorruptAlways(Packet),
}

type Script = Box<dyn FnMut(&Packet) -> Vec<Send>>;

struct FakeGps {
    script: Script,
    deframer: Deframer,
    /// Bytes available for the host to read.
    outgoing: VecDeque<u8>,
    /// Framed data packets not yet released to the host, with the clean
    /// retransmission copy alongside.
    pending: VecDeque<(Vec<u8>, Vec<u8>)>,
    /// Clean copy of the outstanding data frame.
    last_frame: Vec<u8>,
    await_ack: bool,
    /// Every non-ACK/NAK packet the host sent, in order.
    received: Vec<Packet>,
    /// Baud rates the host configured.
    bauds: Vec<u32>,
}

impl FakeGps {
    fn new(script: Script) -> FakeGps {
        FakeGps {
            script,
            deframer: Deframer::default(),
            outgoing: VecDeque::new(),
            pending: VecDeque::new(),
            last_frame: Vec::new(),
            await_ack: false,
            received: Vec::new(),
            bauds: Vec::new(),
        }
    }

    fn release_next(&mut self) {
        if self.await_ack {
            return;
        }
        if let Some((wire, clean)) = self.pending.pop_front() {
            self.outgoing.extend(&wire);
            self.last_frame = clean;
            self.await_ack = true;
        }
    }

    fn handle_host_packet(&mut self, pkt: Packet) {
        match pkt.id {
            pid::ACK => {
                self.await_ack = false;
                self.release_next();
            }
            pid::NAK => {
                let again = self.last_frame.clone();
                self.outgoing.extend(&again);
            }
            _ => {
                let ack = frame(&Packet::new(pid::ACK, vec![pkt.id as u8])).unwrap();
                self.outgoing.extend(&ack);
                let replies = (self.script)(&pkt);
                self.received.push(pkt);
                for send in replies {
                    let (wire, clean) = match send {
                        Send::Clean(p) => {
                            let f = frame(&p).unwrap().to_vec();
                            (f.clone(), f)
                        }
                        Send::CorruptFirst(p) => {
                            let clean = frame(&p).unwrap().to_vec();
                            let mut bad = clean.clone();
                            // Flip a payload bit; the test payloads are
                            // chosen so this can't fabricate a DLE.
                            bad[3] ^= 0x01;
                            (bad, clean)
                        }
                        Send::CorruptAlways(p) => {
                            let mut bad = frame(&p).unwrap().to_vec();
                            bad[3] ^= 0x01;
                            (bad.clone(), bad)
                        }
                    };
                    self.pending.push_back((wire, clean));
                }
                self.release_next();
            }
        }
    }
}

impl SerialPhys for FakeGps {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outgoing.is_empty() {
            return Err(io::Error::from(io::ErrorKind::TimedOut));
        }
        let mut n = 0;
        while n < buf.len() {
            match self.outgoing.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut done = Vec::new();
        for &b in bytes {
            if let Some(Deframed::Frame(pkt)) = self.deframer.push(b) {
                done.push(pkt);
            }
        }
        for pkt in done {
            self.handle_host_packet(pkt);
        }
        Ok(())
    }

    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn set_baudrate(&mut self, baud: u32) -> io::Result<()> {
        self.bauds.push(baud);
        Ok(())
    }
}

fn product_data(id: u16, ver: u16, strings: &[&str]) -> Packet {
    let mut payload = Vec::new();
    payload.put_u16_le(id);
    payload.put_u16_le(ver);
    for s in strings {
        payload.extend_from_slice(s.as_bytes());
        payload.push(0);
    }
    Packet::new(pid::PRODUCT_DATA, payload)
}

fn protocol_array(tags: &[(u8, u16)]) -> Packet {
    let mut payload = Vec::new();
    for &(tag, number) in tags {
        payload.push(tag);
        payload.put_u16_le(number);
    }
    Packet::new(pid::PROTOCOL_ARRAY, payload)
}

fn records(n: u16) -> Send {
    Send::Clean(Packet::with_u16(pid::RECORDS, n))
}

fn cmplt(opcode: u16) -> Send {
    Send::Clean(Packet::with_u16(pid::XFER_CMPLT, opcode))
}

fn record(id: u16, r: &impl WireFormat) -> Send {
    Send::Clean(Packet::new(id, encode(r)))
}

fn opcode_of(pkt: &Packet) -> Option<u16> {
    (pkt.id == pid::COMMAND_A010).then(|| pkt.as_u16().unwrap())
}

/// A GPS 12XL that answers product inquiries and otherwise follows the
/// given per-opcode script.
fn gps12xl(mut on_command: impl FnMut(u16) -> Vec<Send> + 'static) -> FakeGps {
    FakeGps::new(Box::new(move |pkt| match pkt.id {
        pid::PRODUCT_RQST => vec![Send::Clean(product_data(
            105,
            230,
            &["GPS 12XL", "Software Version 2.30"],
        ))],
        _ => match opcode_of(pkt) {
            Some(op) => on_command(op),
            None => Vec::new(),
        },
    }))
}

#[test]
fn product_info_is_exposed_verbatim() {
    let device = gps12xl(|_| Vec::new());
    let session = Session::start(SerialLink::new(device)).unwrap();
    let info = session.product_info();
    assert_eq!(info.product_id, 105);
    assert_eq!(info.software_version, 230);
    assert_eq!(info.description, ["GPS 12XL", "Software Version 2.30"]);
    // The catalog resolved a protocol set for it.
    assert!(session.protocols().stack(Role::Waypoints).is_ok());
}

#[test]
fn protocol_array_overrides_the_catalog() {
    let device = FakeGps::new(Box::new(|pkt| match pkt.id {
        pid::PRODUCT_RQST => vec![
            Send::Clean(product_data(1292, 320, &["GPSmap 76CSx"])),
            Send::Clean(Packet::new(pid::EXT_PRODUCT_DATA, &b"VER 3.20\0"[..])),
            Send::Clean(protocol_array(&[
                (b'P', 0),
                (b'L', 1),
                (b'A', 10),
                (b'A', 100),
                (b'D', 110),
                (b'A', 201),
                (b'D', 202),
                (b'D', 110),
                (b'D', 210),
            ])),
        ],
        _ => Vec::new(),
    }));
    let session = Session::start(SerialLink::new(device)).unwrap();
    assert_eq!(session.product_info().extended, ["VER 3.20"]);
    let wpt = session.protocols().stack(Role::Waypoints).unwrap();
    assert_eq!(wpt.datatypes, [110]);
    assert!(session.protocols().stack(Role::Pvt).is_err());
}

#[test]
fn unknown_device_without_an_array_is_refused() {
    let device = FakeGps::new(Box::new(|pkt| match pkt.id {
        pid::PRODUCT_RQST => vec![Send::Clean(product_data(1292, 100, &["Mystery"]))],
        _ => Vec::new(),
    }));
    match Session::start(SerialLink::new(device)) {
        Err(Error::UnknownDevice { product_id, .. }) => assert_eq!(product_id, 1292),
        other => panic!("expected UnknownDevice, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn empty_waypoint_download() {
    let device = gps12xl(|op| match op {
        7 => vec![records(0), cmplt(7)],
        _ => Vec::new(),
    });
    let mut session = Session::start(SerialLink::new(device)).unwrap();
    assert_eq!(session.get_waypoints().unwrap(), []);
}

#[test]
fn single_waypoint_upload_is_wire_exact() {
    // A D100-era unit (GPS 12 firmware 2.50).
    let device = FakeGps::new(Box::new(|pkt| match pkt.id {
        pid::PRODUCT_RQST => vec![Send::Clean(product_data(77, 250, &["GPS 12"]))],
        _ => Vec::new(),
    }));
    let mut session = Session::start(SerialLink::new(device)).unwrap();
    let wpt = Wpt::D100(D100 {
        ident: "CHURCH".into(),
        cmnt: "LA SAGRADA FAMILIA".into(),
        posn: Position {
            lat: 493_961_671,
            lon: 25_937_164,
        },
    });
    session.put_waypoints(&[wpt]).unwrap();

    let device = session.into_link().into_phys();
    let uploads: Vec<&Packet> = device
        .received
        .iter()
        .filter(|p| p.id != pid::PRODUCT_RQST)
        .collect();
    assert_eq!(uploads.len(), 3);
    assert_eq!(uploads[0].id, pid::RECORDS);
    assert_eq!(uploads[0].as_u16().unwrap(), 1);
    assert_eq!(uploads[1].id, pid::WPT_DATA);
    let wire = &uploads[1].data;
    assert_eq!(wire.len(), 58);
    assert_eq!(&wire[..6], b"CHURCH");
    assert_eq!(&wire[6..10], &493_961_671i32.to_le_bytes());
    assert_eq!(&wire[10..14], &25_937_164i32.to_le_bytes());
    assert_eq!(&wire[18..36], b"LA SAGRADA FAMILIA");
    assert_eq!(uploads[2].id, pid::XFER_CMPLT);
    assert_eq!(uploads[2].as_u16().unwrap(), 7); // TRANSFER_WPT
}

fn etrex_route_device() -> FakeGps {
    let hdr = |name: &str| {
        record(
            pid::RTE_HDR,
            &D202 {
                ident: name.into(),
            },
        )
    };
    let link = || record(pid::RTE_LINK, &D210::default());
    let wpt = |ident: &str| {
        record(
            pid::RTE_WPT,
            &D108 {
                ident: ident.into(),
                ..D108::default()
            },
        )
    };
    FakeGps::new(Box::new(move |pkt| match pkt.id {
        pid::PRODUCT_RQST => vec![Send::Clean(product_data(154, 290, &["eTrex Vista"]))],
        _ => match opcode_of(pkt) {
            // TRANSFER_RTE: two routes of two and three waypoints.
            Some(4) => vec![
                records(9),
                hdr("TO CAMP"),
                link(),
                wpt("TRAIL1"),
                wpt("CAMP"),
                hdr("TO LAKE"),
                link(),
                wpt("TRAIL2"),
                wpt("FORD"),
                wpt("LAKE"),
                cmplt(4),
            ],
            _ => Vec::new(),
        },
    }))
}

#[test]
fn route_download_groups_by_header() {
    let mut session = Session::start(SerialLink::new(etrex_route_device())).unwrap();
    let routes = session.get_routes().unwrap();
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].waypoints.len(), 2);
    assert_eq!(routes[1].waypoints.len(), 3);
    assert_eq!(routes[0].links.len(), 1);
    assert!(matches!(&routes[0].header, RteHdr::D202(h) if h.ident == "TO CAMP"));
    assert_eq!(routes[1].waypoints[2].ident(), "LAKE");
}

#[test]
fn wrong_record_count_is_a_protocol_error() {
    let device = gps12xl(|op| match op {
        // Announce two but send one.
        7 => vec![
            records(2),
            record(pid::WPT_DATA, &D104::default()),
            cmplt(7),
        ],
        _ => Vec::new(),
    });
    let mut session = Session::start(SerialLink::new(device)).unwrap();
    match session.get_waypoints() {
        Err(Error::Protocol(_)) => {}
        other => panic!("expected a protocol error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn nak_triggers_a_retransmission() {
    let device = gps12xl(|op| match op {
        7 => vec![
            records(1),
            Send::CorruptFirst(Packet::new(
                pid::WPT_DATA,
                encode(&D104 {
                    ident: "AAAAAA".into(),
                    ..D104::default()
                }),
            )),
            cmplt(7),
        ],
        _ => Vec::new(),
    });
    let mut session = Session::start(SerialLink::new(device)).unwrap();
    let waypoints = session.get_waypoints().unwrap();
    assert_eq!(waypoints.len(), 1);
    assert_eq!(waypoints[0].ident(), "AAAAAA");
    // The retry is observable: exactly one NAK went out.
    assert_eq!(session.link_stats().naks_sent, 1);
}

#[test]
fn three_damaged_copies_of_one_packet_abort() {
    // The device answers every NAK with an equally damaged copy.
    let device = gps12xl(|op| match op {
        7 => vec![
            records(1),
            Send::CorruptAlways(Packet::new(
                pid::WPT_DATA,
                encode(&D104 {
                    ident: "AAAAAA".into(),
                    ..D104::default()
                }),
            )),
            cmplt(7),
        ],
        _ => Vec::new(),
    });
    let mut session = Session::start(SerialLink::new(device)).unwrap();
    match session.get_waypoints() {
        Err(Error::Aborted(_)) => {}
        other => panic!("expected Aborted, got {:?}", other.map(|_| ())),
    }
    assert_eq!(session.link_stats().naks_sent, 3);
}

#[test]
fn a_good_frame_resets_the_nak_budget() {
    // Three records, each damaged exactly once.  Without the
    // same-packet scoping this would trip the abort budget; with it,
    // each good retransmission starts a fresh count.
    let damaged = |ident: &str| {
        Send::CorruptFirst(Packet::new(
            pid::WPT_DATA,
            encode(&D104 {
                ident: ident.into(),
                ..D104::default()
            }),
        ))
    };
    let device = gps12xl(move |op| match op {
        7 => vec![
            records(3),
            damaged("AAAAAA"),
            damaged("BBBBBB"),
            damaged("CCCCCC"),
            cmplt(7),
        ],
        _ => Vec::new(),
    });
    let mut session = Session::start(SerialLink::new(device)).unwrap();
    let waypoints = session.get_waypoints().unwrap();
    assert_eq!(waypoints.len(), 3);
    assert_eq!(session.link_stats().naks_sent, 3);
}

#[test]
fn cancellation_aborts_and_drains() {
    let device = gps12xl(|op| match op {
        7 => vec![
            records(2),
            record(pid::WPT_DATA, &D104::default()),
            record(pid::WPT_DATA, &D104::default()),
            cmplt(7),
        ],
        // ABORT_TRANSFER
        0 => Vec::new(),
        _ => Vec::new(),
    });
    let mut session = Session::start(SerialLink::new(device)).unwrap();
    session.cancel_handle().cancel();
    match session.get_waypoints() {
        Err(Error::Cancelled) => {}
        other => panic!("expected Cancelled, got {:?}", other.map(|_| ())),
    }
    // The abort command reached the device.
    let device = session.into_link().into_phys();
    assert!(device
        .received
        .iter()
        .any(|p| opcode_of(p) == Some(0)));
    assert!(device.outgoing.is_empty());
}

fn pvt_fix(tow: f64) -> D800 {
    D800 {
        fix: PvtFix::ThreeD,
        tow,
        ..D800::default()
    }
}

#[test]
fn pvt_stream_pulls_and_stops_cleanly() {
    // An eTrex Vista: its catalog row carries A800.
    let device = FakeGps::new(Box::new(|pkt| match pkt.id {
        pid::PRODUCT_RQST => vec![Send::Clean(product_data(154, 290, &["eTrex Vista"]))],
        _ => match opcode_of(pkt) {
            // START_PVT_DATA: five fixes are already on their way.
            Some(49) => (0..5)
                .map(|i| record(pid::PVT, &pvt_fix(1000.0 + f64::from(i))))
                .collect(),
            Some(50) => Vec::new(), // STOP_PVT_DATA
            Some(7) => vec![records(0), cmplt(7)],
            _ => Vec::new(),
        },
    }));
    let mut session = Session::start(SerialLink::new(device)).unwrap();
    {
        let mut stream = session.pvt().unwrap();
        for i in 0..3 {
            let fix = stream.next().unwrap().unwrap();
            assert_eq!(fix.tow, 1000.0 + f64::from(i));
        }
        stream.stop().unwrap();
    }
    // The stream is gone: the next transfer starts from a clean wire.
    assert_eq!(session.get_waypoints().unwrap(), []);
}

#[test]
fn baud_change_reconfigures_and_confirms() {
    let device = FakeGps::new(Box::new(|pkt| match pkt.id {
        pid::PRODUCT_RQST => vec![Send::Clean(product_data(154, 290, &["eTrex Vista"]))],
        pid::BAUD_RQST => {
            let wanted = pkt.as_u32().unwrap();
            assert_eq!(wanted, 57_600);
            vec![Send::Clean(Packet::new(
                pid::BAUD_ACPT,
                wanted.to_le_bytes().to_vec(),
            ))]
        }
        _ => Vec::new(),
    }));
    let mut session = Session::start(SerialLink::new(device)).unwrap();
    let accepted = session.set_speed(57_600).unwrap();
    assert_eq!(accepted, 57_600);
    let device = session.into_link().into_phys();
    assert_eq!(device.bauds, [57_600]);
    // The confirmation ping went out after the switch.
    assert_eq!(
        device
            .received
            .iter()
            .filter(|p| p.id == pid::PRODUCT_RQST)
            .count(),
        2
    );
}

#[test]
fn unsupported_roles_are_refused_without_touching_the_wire() {
    let device = gps12xl(|_| Vec::new());
    let mut session = Session::start(SerialLink::new(device)).unwrap();
    // A GPS 12XL has no run transfer.
    match session.get_runs() {
        Err(Error::NotSupported(Role::Runs)) => {}
        other => panic!("expected NotSupported, got {:?}", other.map(|_| ())),
    }
    let device = session.into_link().into_phys();
    assert_eq!(
        device.received.iter().filter(|p| p.id != pid::PRODUCT_RQST).count(),
        0
    );
}

/// A scripted USB pipe, for the fitness-era path that serial can't carry.
mod usb {
    use super::*;
    use garlink::link::usb::UsbLink;
    use garlink::packet::usb_pid;
    use garlink::phys::{UsbLayer, UsbPacket, UsbPhys};

    pub struct FakeUsbGps {
        script: Box<dyn FnMut(&UsbPacket) -> Vec<UsbPacket>>,
        outgoing: VecDeque<UsbPacket>,
    }

    impl FakeUsbGps {
        pub fn new(script: Box<dyn FnMut(&UsbPacket) -> Vec<UsbPacket>>) -> FakeUsbGps {
            let mut device = FakeUsbGps {
                script,
                outgoing: VecDeque::new(),
            };
            device.outgoing.push_back(UsbPacket {
                layer: UsbLayer::Transport,
                id: usb_pid::SESSION_STARTED,
                data: 987_654_321u32.to_le_bytes().to_vec().into(),
            });
            device
        }
    }

    impl UsbPhys for FakeUsbGps {
        fn read_packet(&mut self) -> io::Result<UsbPacket> {
            self.outgoing
                .pop_front()
                .ok_or_else(|| io::Error::from(io::ErrorKind::TimedOut))
        }

        fn write_packet(&mut self, pkt: &UsbPacket) -> io::Result<()> {
            if pkt.layer == UsbLayer::Application {
                let replies = (self.script)(pkt);
                self.outgoing.extend(replies);
            }
            Ok(())
        }

        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }
    }

    fn app(id: u16, data: impl Into<bytes::Bytes>) -> UsbPacket {
        UsbPacket::application(id, data)
    }

    #[test]
    fn runs_download_over_usb() {
        let device = FakeUsbGps::new(Box::new(|pkt| match pkt.id {
            pid::PRODUCT_RQST => vec![
                app(pid::PRODUCT_DATA, product_data(484, 280, &["Forerunner 305"]).data),
                app(
                    pid::PROTOCOL_ARRAY,
                    protocol_array(&[
                        (b'P', 0),
                        (b'L', 1),
                        (b'A', 10),
                        (b'A', 906),
                        (b'D', 1011),
                        (b'A', 1000),
                        (b'D', 1009),
                    ])
                    .data,
                ),
            ],
            pid::COMMAND_A010 if pkt.data[..] == [0xc2, 0x01] => vec![
                // TRANSFER_RUNS (450)
                app(pid::RECORDS, vec![1u8, 0]),
                app(pid::RUN, encode(&D1009::default())),
                app(pid::XFER_CMPLT, vec![0xc2u8, 0x01]),
            ],
            _ => Vec::new(),
        }));
        let link = UsbLink::start(device).unwrap();
        assert_eq!(link.unit_id(), Some(987_654_321));
        let mut session = Session::start(link).unwrap();
        let runs = session.get_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert!(matches!(&runs[0], Run::D1009(_)));
        // Laps came from their own application group.
        assert_eq!(
            session.protocols().stack(Role::Laps).unwrap().datatypes,
            [1011]
        );
    }
}
