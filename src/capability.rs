//! A000/A001: finding out what the device can do.
//!
//! Every session starts with a product inquiry.  Newer units follow the
//! reply with a protocol array describing their whole stack, which
//! supersedes the static [catalog](crate::catalog); older units are
//! looked up by product id and software version.

use crate::command::CommandProto;
use crate::error::{Error, RecordError, Result};
use crate::wire::{ensure_remaining, split_cstrs};
use bytes::{Buf, Bytes};
use std::fmt;
use tracing::*;

/// The logical jobs the session can ask a device to do.  Negotiation maps
/// each role onto a concrete application protocol and its datatypes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Role {
    Waypoints,
    Routes,
    Tracks,
    Proximity,
    Almanac,
    DateTime,
    FlightBook,
    PositionInit,
    Pvt,
    Laps,
    Runs,
    Workouts,
    Courses,
    CoursePoints,
    Images,
    Map,
    /// Not negotiated as a protocol stack; carried by the command table
    /// alone.
    UnitId,
    /// Likewise command-only.
    PowerOff,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Role::Waypoints => "waypoint transfer",
            Role::Routes => "route transfer",
            Role::Tracks => "track transfer",
            Role::Proximity => "proximity waypoint transfer",
            Role::Almanac => "almanac transfer",
            Role::DateTime => "date and time transfer",
            Role::FlightBook => "flight book transfer",
            Role::PositionInit => "position initialisation",
            Role::Pvt => "PVT streaming",
            Role::Laps => "lap transfer",
            Role::Runs => "run transfer",
            Role::Workouts => "workout transfer",
            Role::Courses => "course transfer",
            Role::CoursePoints => "course point transfer",
            Role::Images => "image transfer",
            Role::Map => "map transfer",
            Role::UnitId => "unit id query",
            Role::PowerOff => "remote power-off",
        };
        f.write_str(name)
    }
}

/// The product-data reply, plus any extended product-data strings the
/// device sends after it.  Immutable once received.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProductInfo {
    pub product_id: u16,
    /// Stored as hundredths: 230 means version 2.30.
    pub software_version: u16,
    pub description: Vec<String>,
    pub extended: Vec<String>,
}

impl ProductInfo {
    pub(crate) fn parse(data: Bytes) -> std::result::Result<ProductInfo, RecordError> {
        let mut buf = &data[..];
        ensure_remaining!(buf, 4);
        let product_id = buf.get_u16_le();
        let software_version = buf.get_u16_le();
        Ok(ProductInfo {
            product_id,
            software_version,
            description: split_cstrs(buf),
            extended: Vec::new(),
        })
    }
}

/// One tagged tuple from the protocol array packet.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ProtocolTag {
    /// `b'P'`, `b'L'`, `b'A'` or `b'D'`.
    pub tag: u8,
    pub number: u16,
}

/// The raw protocol array: an ordered sequence of 3-byte tagged tuples.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProtocolArray(pub Vec<ProtocolTag>);

impl ProtocolArray {
    pub(crate) fn parse(data: &[u8]) -> ProtocolArray {
        if data.len() % 3 != 0 {
            warn!(
                "protocol array length {} is not a multiple of 3; ignoring the tail",
                data.len()
            );
        }
        let tags = data
            .chunks_exact(3)
            .map(|c| ProtocolTag {
                tag: c[0],
                number: u16::from_le_bytes([c[1], c[2]]),
            })
            .collect();
        ProtocolArray(tags)
    }
}

/// One application protocol and the datatypes it speaks, e.g.
/// `(A200, [D200, D100])`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AppStack {
    pub app: u16,
    pub datatypes: Vec<u16>,
}

/// The resolved binding after negotiation: which opcode table to use, and
/// which application protocol and datatypes serve each role.
#[derive(Clone, Debug, Default)]
pub struct ProtocolSet {
    pub command: Option<CommandProto>,
    roles: Vec<(Role, AppStack)>,
}

fn role_for_app(app: u16) -> Option<Role> {
    match app {
        100 => Some(Role::Waypoints),
        200 | 201 => Some(Role::Routes),
        300 | 301 | 302 => Some(Role::Tracks),
        400 => Some(Role::Proximity),
        500 => Some(Role::Almanac),
        600 | 601 => Some(Role::DateTime),
        650 => Some(Role::FlightBook),
        700 => Some(Role::PositionInit),
        800 => Some(Role::Pvt),
        900 => Some(Role::Map),
        902 => Some(Role::Images),
        906 => Some(Role::Laps),
        1000 => Some(Role::Runs),
        // The A1002..A1009 fitness family splits into workouts (transfer,
        // occurrences, user profile, limits) and courses (transfer, laps,
        // limits); A1008 carries course points and A1012 course tracks.
        // Every number in the family resolves a role, so no device in the
        // range is left unresolved.
        1002 | 1003 | 1004 | 1005 => Some(Role::Workouts),
        1006 | 1007 | 1009 | 1012 => Some(Role::Courses),
        1008 => Some(Role::CoursePoints),
        _ => None,
    }
}

impl ProtocolSet {
    /// Apply the grouping rule: each stack opens with a `P` tuple, then one
    /// `L`, one `A` and its `D`s; further `A`+`D` groups within the same
    /// P/L frame share that link layer.  Every `A` consumes the `D`s
    /// immediately following it.
    pub fn from_protocol_array(array: &ProtocolArray) -> ProtocolSet {
        let mut set = ProtocolSet::default();
        let mut current: Option<AppStack> = None;
        for t in &array.0 {
            match t.tag {
                b'P' => {
                    set.close(current.take());
                    trace!("physical protocol P{:03}", t.number);
                }
                b'L' => {
                    set.close(current.take());
                    trace!("link protocol L{:03}", t.number);
                }
                b'A' => {
                    set.close(current.take());
                    match t.number {
                        10 => set.command = Some(CommandProto::A010),
                        11 => set.command = Some(CommandProto::A011),
                        n => {
                            current = Some(AppStack {
                                app: n,
                                datatypes: Vec::new(),
                            })
                        }
                    }
                }
                b'D' => match &mut current {
                    Some(stack) => stack.datatypes.push(t.number),
                    None => debug!("datatype D{:03} outside an application group", t.number),
                },
                other => debug!("unknown protocol tag {:?}", char::from(other)),
            }
        }
        set.close(current.take());
        set
    }

    pub(crate) fn from_catalog(
        command: CommandProto,
        stacks: &[(Role, u16, &[u16])],
    ) -> ProtocolSet {
        ProtocolSet {
            command: Some(command),
            roles: stacks
                .iter()
                .map(|&(role, app, datatypes)| {
                    (
                        role,
                        AppStack {
                            app,
                            datatypes: datatypes.to_vec(),
                        },
                    )
                })
                .collect(),
        }
    }

    fn close(&mut self, stack: Option<AppStack>) {
        let Some(stack) = stack else { return };
        match role_for_app(stack.app) {
            Some(role) => {
                if self.resolves(role) {
                    debug!("duplicate {role} (A{}); keeping the first", stack.app);
                } else {
                    self.roles.push((role, stack));
                }
            }
            None => debug!("no role for application protocol A{}", stack.app),
        }
    }

    pub fn resolves(&self, role: Role) -> bool {
        self.roles.iter().any(|(r, _)| *r == role)
    }

    /// Resolve a role, or fail with [`Error::NotSupported`].
    pub fn stack(&self, role: Role) -> Result<&AppStack> {
        self.roles
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, s)| s)
            .ok_or(Error::NotSupported(role))
    }
}
