//! The Dxxx record codecs.
//!
//! Each datatype is a plain struct with a `parse`/`write` pair; each
//! category has a sum type keyed by the datatype number the device
//! negotiated.  Decoding never guesses: the session tells the codec which
//! datatype a payload claims to be, because the wire itself only says
//! which *category* (packet id) it belongs to.

mod alm;
mod fitness;
mod img;
mod misc;
mod rte;
mod trk;
mod wpt;

pub use self::alm::*;
pub use self::fitness::*;
pub use self::img::*;
pub use self::misc::*;
pub use self::rte::*;
pub use self::trk::*;
pub use self::wpt::*;

use crate::error::RecordError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Fixed binary layout on the wire.
pub trait WireFormat: Sized {
    fn parse<T: Buf>(buf: T) -> Result<Self, RecordError>;
    fn write<T: BufMut>(&self, buf: &mut T);
}

/// Encode any record into a fresh payload.
pub fn encode<R: WireFormat>(record: &R) -> Bytes {
    let mut buf = BytesMut::new();
    record.write(&mut buf);
    buf.freeze()
}
