use crate::capability::Role;
use std::io;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Anything that can go wrong while talking to a device.
///
/// The lower layers have their own error types (see [`LinkError`],
/// [`ProtocolError`], [`RecordError`]); this enum is what the session
/// surfaces to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The port itself failed: open error, I/O error, hard timeout.
    #[error("transport: {0}")]
    Transport(#[from] io::Error),
    /// The link layer gave up.  The conversation cannot continue.
    #[error("link: {0}")]
    Link(#[from] LinkError),
    /// The device deviated from the transfer protocol.
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
    /// A record's payload didn't match its schema.
    #[error("record: {0}")]
    Record(#[from] RecordError),
    /// The product id has no catalog entry and the device didn't send a
    /// protocol array.
    #[error("unknown device: product id {product_id}, software version {software_version}")]
    UnknownDevice {
        product_id: u16,
        software_version: u16,
    },
    /// The negotiated protocol set doesn't resolve the invoked role.
    #[error("device does not support {0}")]
    NotSupported(Role),
    /// The device or the host gave up mid-transfer.
    #[error("transfer aborted: {0}")]
    Aborted(&'static str),
    /// The caller asked us to stop.
    #[error("cancelled")]
    Cancelled,
}

/// The link layer is wedged.  Such errors should be treated as fatal: the
/// sender has exhausted its retry budget, or the wire carries something we
/// cannot frame at all.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no ACK for packet {pid} after {retries} retries")]
    Unacknowledged { pid: u16, retries: u32 },
    #[error("gave up waiting for a frame after {0:?}")]
    RecvTimeout(Duration),
    #[error("packet id {0} does not fit in a serial frame")]
    IdTooWide(u16),
    #[error("payload of {0} bytes does not fit in a serial frame")]
    PayloadTooLong(usize),
}

/// The device broke the conversation rules.  The link is still usable; the
/// current category transfer is not.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("expected {expected}, got packet id {got}")]
    UnexpectedPacket { expected: &'static str, got: u16 },
    #[error("device announced {announced} records but sent {got}")]
    WrongCount { announced: u16, got: u16 },
    #[error("missing transfer complete (device went quiet)")]
    MissingComplete,
    #[error("data arrived out of order: expected row/chunk {expected}, got {got}")]
    OutOfOrder { expected: u32, got: u32 },
    #[error("header announced {announced} bytes but {got} arrived")]
    SizeMismatch { announced: u32, got: u32 },
}

/// A single record failed to decode.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("payload too short: wanted {wanted} bytes, had {had}")]
    ShortPayload { wanted: usize, had: usize },
    #[error("field {field} out of range: {value}")]
    FieldRange { field: &'static str, value: u32 },
    #[error("datatype D{0} is not implemented")]
    UnknownDatatype(u16),
}
