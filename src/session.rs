//! The session: one negotiated conversation with one device.
//!
//! A session owns its link (and through it the port), negotiates the
//! protocol set at start, and then runs one transfer at a time.  The
//! transfer state machines all follow the same shape: a command, a
//! Records announcement, the records, a Transfer Complete.  PVT streaming
//! is the exception and hands back a pull handle instead.

use crate::capability::{ProductInfo, ProtocolArray, ProtocolSet, Role};
use crate::catalog::{self, FALLBACK, FALLBACK_ID_LIMIT};
use crate::command::Command;
use crate::error::{Error, LinkError, ProtocolError, Result};
use crate::link::serial::SerialLink;
use crate::link::{Link, LinkStats};
use crate::packet::{pid, Packet};
use crate::phys::SerialPhys;
use crate::records::*;
use crate::wire::split_cstrs;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::*;

/// How long we keep listening for extended product data and the protocol
/// array after the product-data reply.
const NEGOTIATION_DRAIN: Duration = Duration::from_millis(400);
/// How long an abort or a PVT stop may spend draining stragglers.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
/// Quiet window that ends a drain.
const DRAIN_QUIET: Duration = Duration::from_millis(250);
/// How many out-of-place packets a single-record query skips before
/// giving up.
const QUERY_STRAY_BUDGET: u32 = 4;

/// A cooperative cancellation flag, cloneable across threads.  Cancelling
/// makes the active transfer send ABORT_TRANSFER, drain, and return
/// [`Error::Cancelled`].
#[derive(Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn new() -> Cancel {
        Cancel::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

pub struct Session<L> {
    link: L,
    product: ProductInfo,
    protocols: ProtocolSet,
    cancel: Cancel,
    /// The role of the most recent transfer, so an out-of-band abort can
    /// name what it is aborting.
    last_role: Option<Role>,
}

impl<L: Link> Session<L> {
    /// Run the capability negotiation and wrap the link.
    pub fn start(mut link: L) -> Result<Session<L>> {
        link.send(&Packet::empty(pid::PRODUCT_RQST))?;
        let reply = link.recv()?;
        if reply.id != pid::PRODUCT_DATA {
            return Err(ProtocolError::UnexpectedPacket {
                expected: "product data",
                got: reply.id,
            }
            .into());
        }
        let mut product = ProductInfo::parse(reply.data)?;
        debug!(
            "product {} v{}: {:?}",
            product.product_id, product.software_version, product.description
        );

        let mut array = None;
        while let Some(pkt) = link.recv_timeout(NEGOTIATION_DRAIN)? {
            match pkt.id {
                pid::EXT_PRODUCT_DATA => product.extended.extend(split_cstrs(&pkt.data[..])),
                pid::PROTOCOL_ARRAY => array = Some(ProtocolArray::parse(&pkt.data)),
                other => debug!("unexpected packet id {other} during negotiation"),
            }
        }

        let protocols = match array {
            Some(array) => {
                debug!("device described itself with a protocol array");
                ProtocolSet::from_protocol_array(&array)
            }
            None => match catalog::lookup(product.product_id, product.software_version) {
                Some(entry) => {
                    debug!("catalog match: {}", entry.name);
                    entry.protocol_set()
                }
                None if product.product_id < FALLBACK_ID_LIMIT => {
                    warn!(
                        "product {} is not in the catalog; assuming the minimal stack",
                        product.product_id
                    );
                    FALLBACK.protocol_set()
                }
                None => {
                    return Err(Error::UnknownDevice {
                        product_id: product.product_id,
                        software_version: product.software_version,
                    })
                }
            },
        };

        Ok(Session {
            link,
            product,
            protocols,
            cancel: Cancel::new(),
            last_role: None,
        })
    }

    pub fn product_info(&self) -> &ProductInfo {
        &self.product
    }

    pub fn protocols(&self) -> &ProtocolSet {
        &self.protocols
    }

    pub fn link_stats(&self) -> LinkStats {
        self.link.stats()
    }

    /// A handle other threads can use to cancel the active transfer.
    pub fn cancel_handle(&self) -> Cancel {
        self.cancel.clone()
    }

    /// Close the session, releasing the link and its port.
    pub fn into_link(self) -> L {
        self.link
    }

    fn command_packet(&self, cmd: Command, role: Role) -> Result<Packet> {
        self.protocols
            .command
            .and_then(|proto| proto.packet(cmd))
            .ok_or(Error::NotSupported(role))
    }

    fn send_command(&mut self, cmd: Command, role: Role) -> Result<()> {
        let pkt = self.command_packet(cmd, role)?;
        self.last_role = Some(role);
        self.link.send(&pkt)
    }

    fn datatype(&self, role: Role, idx: usize) -> Result<u16> {
        let stack = self.protocols.stack(role)?;
        stack
            .datatypes
            .get(idx)
            .copied()
            .ok_or(Error::NotSupported(role))
    }

    /// Send ABORT_TRANSFER and swallow everything up to Transfer Complete
    /// (or a quiet wire).
    fn abort(&mut self, role: Role) -> Result<()> {
        debug!("aborting {role}");
        self.send_command(Command::AbortTransfer, role)?;
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while Instant::now() < deadline {
            match self.link.recv_timeout(DRAIN_QUIET)? {
                Some(pkt) if pkt.id == pid::XFER_CMPLT => break,
                Some(pkt) => trace!("draining {pkt:?}"),
                None => break,
            }
        }
        Ok(())
    }

    fn check_cancel(&mut self, role: Role) -> Result<()> {
        if self.cancel.is_cancelled() {
            self.cancel.clear();
            self.abort(role)?;
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// The generic download: command, Records{N}, N records, Transfer
    /// Complete.  Returns the raw record packets in arrival order.
    fn pull(&mut self, cmd: Command, role: Role, expected: &[u16]) -> Result<Vec<Packet>> {
        self.send_command(cmd, role)?;
        let announce = self.link.recv()?;
        if announce.id != pid::RECORDS {
            return Err(ProtocolError::UnexpectedPacket {
                expected: "records announcement",
                got: announce.id,
            }
            .into());
        }
        let n = announce.as_u16()?;
        debug!("{role}: device announced {n} records");
        let mut out = Vec::with_capacity(usize::from(n));
        loop {
            self.check_cancel(role)?;
            let pkt = match self.link.recv() {
                Ok(pkt) => pkt,
                Err(Error::Link(LinkError::RecvTimeout(_))) => {
                    return Err(ProtocolError::MissingComplete.into())
                }
                Err(e) => return Err(e),
            };
            match pkt.id {
                pid::XFER_CMPLT => {
                    if out.len() != usize::from(n) {
                        return Err(ProtocolError::WrongCount {
                            announced: n,
                            got: out.len() as u16,
                        }
                        .into());
                    }
                    return Ok(out);
                }
                id if expected.contains(&id) => out.push(pkt),
                other => {
                    return Err(ProtocolError::UnexpectedPacket {
                        expected: "a record or transfer complete",
                        got: other,
                    }
                    .into())
                }
            }
        }
    }

    /// The generic upload: Records{N}, N records, Transfer Complete
    /// echoing the matching command opcode.
    fn push(&mut self, complete: Command, role: Role, packets: &[Packet]) -> Result<()> {
        let n = u16::try_from(packets.len())
            .map_err(|_| Error::Aborted("too many records for one transfer"))?;
        let opcode = self
            .protocols
            .command
            .and_then(|proto| proto.opcode(complete))
            .ok_or(Error::NotSupported(role))?;
        self.link.send(&Packet::with_u16(pid::RECORDS, n))?;
        for pkt in packets {
            self.check_cancel(role)?;
            self.link.send(pkt)?;
        }
        self.link.send(&Packet::with_u16(pid::XFER_CMPLT, opcode))
    }

    /// Commands that answer with a single packet rather than a Records
    /// sequence (time, position, unit id).
    fn query(&mut self, cmd: Command, role: Role, want: u16) -> Result<Packet> {
        self.send_command(cmd, role)?;
        let mut strays = 0;
        loop {
            let pkt = self.link.recv()?;
            if pkt.id == want {
                return Ok(pkt);
            }
            debug!("skipping {pkt:?} while waiting for packet id {want}");
            strays += 1;
            if strays >= QUERY_STRAY_BUDGET {
                return Err(ProtocolError::UnexpectedPacket {
                    expected: "the queried record",
                    got: pkt.id,
                }
                .into());
            }
        }
    }

    pub fn get_waypoints(&mut self) -> Result<Vec<Wpt>> {
        let dt = self.datatype(Role::Waypoints, 0)?;
        let packets = self.pull(Command::TransferWpt, Role::Waypoints, &[pid::WPT_DATA])?;
        packets
            .into_iter()
            .map(|pkt| Wpt::parse(dt, pkt.data).map_err(Error::from))
            .collect()
    }

    pub fn put_waypoints(&mut self, waypoints: &[Wpt]) -> Result<()> {
        let dt = self.datatype(Role::Waypoints, 0)?;
        let packets: Vec<Packet> = waypoints
            .iter()
            .map(|wpt| {
                if wpt.datatype() != dt {
                    debug!(
                        "uploading a D{} waypoint to a device that negotiated D{dt}",
                        wpt.datatype()
                    );
                }
                Packet::new(pid::WPT_DATA, wpt.encode())
            })
            .collect();
        self.push(Command::TransferWpt, Role::Waypoints, &packets)
    }

    pub fn get_routes(&mut self) -> Result<Vec<Route>> {
        let stack = self.protocols.stack(Role::Routes)?.clone();
        let hdr_dt = stack
            .datatypes
            .first()
            .copied()
            .ok_or(Error::NotSupported(Role::Routes))?;
        // The route waypoint type is the stack's second entry; devices
        // that don't restate it reuse the waypoint-transfer type.
        let wpt_dt = match stack.datatypes.get(1) {
            Some(&dt) => dt,
            None => self.datatype(Role::Waypoints, 0)?,
        };
        let packets = self.pull(
            Command::TransferRte,
            Role::Routes,
            &[pid::RTE_HDR, pid::RTE_WPT, pid::RTE_LINK],
        )?;
        let mut routes: Vec<Route> = Vec::new();
        for pkt in packets {
            match pkt.id {
                pid::RTE_HDR => routes.push(Route::new(RteHdr::parse(hdr_dt, pkt.data)?)),
                _ => {
                    let route = routes.last_mut().ok_or(Error::Protocol(
                        ProtocolError::UnexpectedPacket {
                            expected: "a route header first",
                            got: pkt.id,
                        },
                    ))?;
                    if pkt.id == pid::RTE_LINK {
                        route.links.push(D210::parse(pkt.data)?);
                    } else {
                        route.waypoints.push(Wpt::parse(wpt_dt, pkt.data)?);
                    }
                }
            }
        }
        Ok(routes)
    }

    pub fn put_routes(&mut self, routes: &[Route]) -> Result<()> {
        let stack = self.protocols.stack(Role::Routes)?.clone();
        // A201 devices expect a link record between consecutive waypoints.
        let with_links = stack.app == 201;
        let mut packets = Vec::new();
        for route in routes {
            packets.push(Packet::new(pid::RTE_HDR, route.header.encode()));
            for (i, wpt) in route.waypoints.iter().enumerate() {
                if i > 0 && with_links {
                    let link = route.links.get(i - 1).cloned().unwrap_or_default();
                    packets.push(Packet::new(pid::RTE_LINK, encode(&link)));
                }
                packets.push(Packet::new(pid::RTE_WPT, wpt.encode()));
            }
        }
        self.push(Command::TransferRte, Role::Routes, &packets)
    }

    pub fn get_tracks(&mut self) -> Result<Vec<Track>> {
        let stack = self.protocols.stack(Role::Tracks)?.clone();
        // A300 is headerless; everything newer leads with a header type.
        let (hdr_dt, pt_dt) = if stack.app == 300 {
            let pt = stack
                .datatypes
                .first()
                .copied()
                .ok_or(Error::NotSupported(Role::Tracks))?;
            (None, pt)
        } else {
            let hdr = stack
                .datatypes
                .first()
                .copied()
                .ok_or(Error::NotSupported(Role::Tracks))?;
            let pt = stack
                .datatypes
                .get(1)
                .copied()
                .ok_or(Error::NotSupported(Role::Tracks))?;
            (Some(hdr), pt)
        };
        let packets = self.pull(
            Command::TransferTrk,
            Role::Tracks,
            &[pid::TRK_HDR, pid::TRK_DATA],
        )?;
        let mut tracks: Vec<Track> = Vec::new();
        for pkt in packets {
            if pkt.id == pid::TRK_HDR {
                let dt = hdr_dt.ok_or(Error::Protocol(ProtocolError::UnexpectedPacket {
                    expected: "track points only on this device",
                    got: pid::TRK_HDR,
                }))?;
                tracks.push(Track {
                    header: Some(TrkHdr::parse(dt, pkt.data)?),
                    points: Vec::new(),
                });
            } else {
                let point = TrkPoint::parse(pt_dt, pkt.data)?;
                match tracks.last_mut() {
                    Some(track) => track.points.push(point),
                    None => tracks.push(Track {
                        header: None,
                        points: vec![point],
                    }),
                }
            }
        }
        Ok(tracks)
    }

    pub fn put_tracks(&mut self, tracks: &[Track]) -> Result<()> {
        self.protocols.stack(Role::Tracks)?;
        let mut packets = Vec::new();
        for track in tracks {
            if let Some(header) = &track.header {
                packets.push(Packet::new(pid::TRK_HDR, header.encode()));
            }
            for point in &track.points {
                packets.push(Packet::new(pid::TRK_DATA, point.encode()));
            }
        }
        self.push(Command::TransferTrk, Role::Tracks, &packets)
    }

    pub fn get_proximity(&mut self) -> Result<Vec<PrxWpt>> {
        let dt = self.datatype(Role::Proximity, 0)?;
        let packets = self.pull(Command::TransferPrx, Role::Proximity, &[pid::PRX_WPT])?;
        packets
            .into_iter()
            .map(|pkt| PrxWpt::parse(dt, pkt.data).map_err(Error::from))
            .collect()
    }

    pub fn put_proximity(&mut self, waypoints: &[PrxWpt]) -> Result<()> {
        let dt = self.datatype(Role::Proximity, 0)?;
        let packets: Vec<Packet> = waypoints
            .iter()
            .map(|prx| Packet::new(pid::PRX_WPT, prx.encode(dt)))
            .collect();
        self.push(Command::TransferPrx, Role::Proximity, &packets)
    }

    pub fn get_almanac(&mut self) -> Result<Vec<Almanac>> {
        let dt = self.datatype(Role::Almanac, 0)?;
        let packets = self.pull(Command::TransferAlm, Role::Almanac, &[pid::ALMANAC])?;
        packets
            .into_iter()
            .map(|pkt| Almanac::parse(dt, pkt.data).map_err(Error::from))
            .collect()
    }

    pub fn get_laps(&mut self) -> Result<Vec<Lap>> {
        let dt = self.datatype(Role::Laps, 0)?;
        let packets = self.pull(Command::TransferLaps, Role::Laps, &[pid::LAP])?;
        packets
            .into_iter()
            .map(|pkt| Lap::parse(dt, pkt.data).map_err(Error::from))
            .collect()
    }

    pub fn get_runs(&mut self) -> Result<Vec<Run>> {
        let dt = self.datatype(Role::Runs, 0)?;
        let packets = self.pull(Command::TransferRuns, Role::Runs, &[pid::RUN])?;
        packets
            .into_iter()
            .map(|pkt| Run::parse(dt, pkt.data).map_err(Error::from))
            .collect()
    }

    pub fn get_workouts(&mut self) -> Result<Vec<Workout>> {
        let dt = self.datatype(Role::Workouts, 0)?;
        let packets = self.pull(Command::TransferWorkouts, Role::Workouts, &[pid::WORKOUT])?;
        packets
            .into_iter()
            .map(|pkt| Workout::parse(dt, pkt.data).map_err(Error::from))
            .collect()
    }

    pub fn get_courses(&mut self) -> Result<Vec<D1006>> {
        self.datatype(Role::Courses, 0)?;
        let packets = self.pull(Command::TransferCourses, Role::Courses, &[pid::COURSE])?;
        packets
            .into_iter()
            .map(|pkt| D1006::parse(pkt.data).map_err(Error::from))
            .collect()
    }

    pub fn get_course_points(&mut self) -> Result<Vec<D1012>> {
        self.datatype(Role::CoursePoints, 0)?;
        let packets = self.pull(
            Command::TransferCoursePoints,
            Role::CoursePoints,
            &[pid::COURSE_POINT],
        )?;
        packets
            .into_iter()
            .map(|pkt| D1012::parse(pkt.data).map_err(Error::from))
            .collect()
    }

    pub fn get_flightbooks(&mut self) -> Result<Vec<D650>> {
        self.protocols.stack(Role::FlightBook)?;
        let packets = self.pull(
            Command::FlightRecords,
            Role::FlightBook,
            &[pid::FLIGHTBOOK],
        )?;
        packets
            .into_iter()
            .map(|pkt| D650::parse(pkt.data).map_err(Error::from))
            .collect()
    }

    pub fn get_datetime(&mut self) -> Result<D600> {
        self.protocols.stack(Role::DateTime)?;
        let pkt = self.query(Command::TransferTime, Role::DateTime, pid::DATE_TIME)?;
        Ok(D600::parse(pkt.data)?)
    }

    pub fn put_datetime(&mut self, datetime: &D600) -> Result<()> {
        self.protocols.stack(Role::DateTime)?;
        self.link
            .send(&Packet::new(pid::DATE_TIME, encode(datetime)))
    }

    pub fn put_position(&mut self, posn: &D700) -> Result<()> {
        self.protocols.stack(Role::PositionInit)?;
        self.link.send(&Packet::new(pid::POSITION, encode(posn)))
    }

    /// The unit's serial number.
    pub fn get_unit_id(&mut self) -> Result<u32> {
        let pkt = self.query(Command::TransferUnitId, Role::UnitId, pid::UNIT_ID)?;
        Ok(pkt.as_u32()?)
    }

    /// Ask the unit to switch itself off.  Some units cut power before
    /// acknowledging, so a missing ACK counts as success.
    pub fn power_off(&mut self) -> Result<()> {
        match self.send_command(Command::TurnOffPwr, Role::PowerOff) {
            Ok(()) => Ok(()),
            Err(Error::Link(LinkError::Unacknowledged { .. })) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Send ABORT_TRANSFER outside the normal cancellation path, for
    /// callers that supervise their own transfers.  The abort names the
    /// most recent transfer; before the first transfer nothing can be in
    /// flight and this is a no-op.
    pub fn abort_transfer(&mut self) -> Result<()> {
        match self.last_role {
            Some(role) => self.abort(role),
            None => Ok(()),
        }
    }

    /// Start PVT streaming and hand back the pull handle.
    pub fn pvt(&mut self) -> Result<PvtStream<'_, L>> {
        let dt = self.datatype(Role::Pvt, 0)?;
        if dt != 800 {
            return Err(Error::NotSupported(Role::Pvt));
        }
        self.send_command(Command::StartPvtData, Role::Pvt)?;
        Ok(PvtStream {
            session: self,
            stopped: false,
        })
    }

    pub fn get_image(&mut self, index: u32) -> Result<Image> {
        self.protocols.stack(Role::Images)?;
        self.last_role = Some(Role::Images);
        self.link
            .send(&Packet::new(pid::IMG_PROPS_RQST, index.to_le_bytes().to_vec()))?;
        let pkt = self.link.recv()?;
        if pkt.id != pid::IMG_PROPS {
            return Err(ProtocolError::UnexpectedPacket {
                expected: "image properties",
                got: pkt.id,
            }
            .into());
        }
        let props = ImageProps::parse(pkt.data)?;
        let mut palette = Bytes::new();
        let mut pixels = Vec::with_capacity(props.row_bytes() * usize::from(props.height));
        let mut next_row: u16 = 0;
        loop {
            self.check_cancel(Role::Images)?;
            let pkt = self.link.recv()?;
            match pkt.id {
                pid::IMG_PALETTE => palette = pkt.data,
                pid::IMG_ROW => {
                    let row = ImageRow::parse(pkt.data)?;
                    if row.index != next_row {
                        return Err(ProtocolError::OutOfOrder {
                            expected: u32::from(next_row),
                            got: u32::from(row.index),
                        }
                        .into());
                    }
                    next_row += 1;
                    pixels.extend_from_slice(&row.data);
                }
                pid::IMG_DONE => break,
                other => {
                    return Err(ProtocolError::UnexpectedPacket {
                        expected: "image data",
                        got: other,
                    }
                    .into())
                }
            }
        }
        if next_row != props.height {
            return Err(ProtocolError::WrongCount {
                announced: props.height,
                got: next_row,
            }
            .into());
        }
        Ok(Image {
            props,
            palette,
            pixels,
        })
    }

    pub fn put_image(&mut self, index: u32, image: &Image) -> Result<()> {
        self.protocols.stack(Role::Images)?;
        self.last_role = Some(Role::Images);
        self.link
            .send(&Packet::new(pid::IMG_WRITE_RQST, index.to_le_bytes().to_vec()))?;
        self.link
            .send(&Packet::new(pid::IMG_PROPS, encode(&image.props)))?;
        if !image.palette.is_empty() {
            self.link
                .send(&Packet::new(pid::IMG_PALETTE, image.palette.clone()))?;
        }
        let row_bytes = image.props.row_bytes().max(1);
        for (i, row) in image.pixels.chunks(row_bytes).enumerate() {
            self.check_cancel(Role::Images)?;
            let row = ImageRow {
                index: i as u16,
                data: Bytes::copy_from_slice(row),
            };
            self.link.send(&Packet::new(pid::IMG_ROW, encode(&row)))?;
        }
        self.link.send(&Packet::empty(pid::IMG_DONE))
    }

    pub fn get_map(&mut self) -> Result<Vec<u8>> {
        self.protocols.stack(Role::Map)?;
        self.last_role = Some(Role::Map);
        self.link.send(&Packet::empty(pid::MAP_RQST))?;
        let pkt = self.link.recv()?;
        if pkt.id != pid::MAP_HDR {
            return Err(ProtocolError::UnexpectedPacket {
                expected: "map header",
                got: pkt.id,
            }
            .into());
        }
        let hdr = MapHdr::parse(pkt.data)?;
        debug!(
            "map product {} v{} {:?}: {} bytes",
            hdr.product_id, hdr.version, hdr.name, hdr.size
        );
        let mut blob = Vec::with_capacity(hdr.size as usize);
        let mut next_chunk: u32 = 0;
        loop {
            self.check_cancel(Role::Map)?;
            let pkt = self.link.recv()?;
            match pkt.id {
                pid::MAP_CHUNK => {
                    let chunk = MapChunk::parse(pkt.data)?;
                    if chunk.index != next_chunk {
                        return Err(ProtocolError::OutOfOrder {
                            expected: next_chunk,
                            got: chunk.index,
                        }
                        .into());
                    }
                    next_chunk += 1;
                    blob.extend_from_slice(&chunk.data);
                }
                pid::XFER_CMPLT => break,
                other => {
                    return Err(ProtocolError::UnexpectedPacket {
                        expected: "a map chunk",
                        got: other,
                    }
                    .into())
                }
            }
        }
        if blob.len() as u32 != hdr.size {
            return Err(ProtocolError::SizeMismatch {
                announced: hdr.size,
                got: blob.len() as u32,
            }
            .into());
        }
        Ok(blob)
    }

    pub fn put_map(&mut self, data: &[u8]) -> Result<()> {
        self.protocols.stack(Role::Map)?;
        self.last_role = Some(Role::Map);
        let hdr = MapHdr {
            size: data.len() as u32,
            ..MapHdr::default()
        };
        self.link.send(&Packet::new(pid::MAP_HDR, encode(&hdr)))?;
        // Leave room in each frame for the chunk index.
        let chunk_bytes = self.link.max_payload().saturating_sub(8).max(1);
        for (i, chunk) in data.chunks(chunk_bytes).enumerate() {
            self.check_cancel(Role::Map)?;
            let chunk = MapChunk {
                index: i as u32,
                data: Bytes::copy_from_slice(chunk),
            };
            self.link.send(&Packet::new(pid::MAP_CHUNK, encode(&chunk)))?;
        }
        self.link.send(&Packet::empty(pid::XFER_CMPLT))
    }
}

impl<P: SerialPhys> Session<SerialLink<P>> {
    /// Negotiate a faster baud rate, reconfigure the port, and confirm
    /// the device is still there.  Reverts to 9600 if the confirmation
    /// ping fails.
    pub fn set_speed(&mut self, baud: u32) -> Result<u32> {
        self.link
            .send(&Packet::new(pid::BAUD_RQST, baud.to_le_bytes().to_vec()))?;
        let reply = self.link.recv()?;
        if reply.id != pid::BAUD_ACPT {
            return Err(ProtocolError::UnexpectedPacket {
                expected: "baud acceptance",
                got: reply.id,
            }
            .into());
        }
        let accepted = reply.as_u32()?;
        debug!("device accepted {accepted} baud");
        // Let in-flight bytes settle before touching the port.
        thread::sleep(Duration::from_millis(100));
        self.link.set_baudrate(accepted)?;
        match self.ping() {
            Ok(()) => Ok(accepted),
            Err(e) => {
                warn!("no reply at {accepted} baud; reverting to 9600");
                self.link.set_baudrate(9600)?;
                Err(e)
            }
        }
    }

    /// A product-data request used as a liveness check.
    fn ping(&mut self) -> Result<()> {
        self.link.send(&Packet::empty(pid::PRODUCT_RQST))?;
        loop {
            let pkt = self.link.recv()?;
            if pkt.id == pid::PRODUCT_DATA {
                break;
            }
        }
        // Swallow any trailing capability packets.
        while self.link.recv_timeout(NEGOTIATION_DRAIN)?.is_some() {}
        Ok(())
    }
}

/// The PVT pull handle.  Dropping it stops the stream.
pub struct PvtStream<'a, L: Link> {
    session: &'a mut Session<L>,
    stopped: bool,
}

/// How long `next` waits for a record before reporting a quiet wire.
const PVT_WAIT: Duration = Duration::from_secs(2);

impl<L: Link> PvtStream<'_, L> {
    /// The next PVT record, or `None` if the device has gone quiet.
    pub fn next(&mut self) -> Result<Option<D800>> {
        if self.stopped {
            return Ok(None);
        }
        if self.session.cancel.is_cancelled() {
            self.session.cancel.clear();
            self.stop_inner()?;
            return Err(Error::Cancelled);
        }
        loop {
            match self.session.link.recv_timeout(PVT_WAIT)? {
                Some(pkt) if pkt.id == pid::PVT => return Ok(Some(D800::parse(pkt.data)?)),
                Some(pkt) => debug!("ignoring {pkt:?} inside the PVT stream"),
                None => return Ok(None),
            }
        }
    }

    /// Stop the stream and drain any packets already in flight.
    pub fn stop(mut self) -> Result<()> {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.session
            .send_command(Command::StopPvtData, Role::Pvt)?;
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while Instant::now() < deadline {
            match self.session.link.recv_timeout(DRAIN_QUIET)? {
                Some(pkt) => trace!("draining {pkt:?}"),
                None => break,
            }
        }
        Ok(())
    }
}

impl<L: Link> Drop for PvtStream<'_, L> {
    fn drop(&mut self) {
        if !self.stopped {
            if let Err(e) = self.stop_inner() {
                warn!("failed to stop the PVT stream: {e}");
            }
        }
    }
}
