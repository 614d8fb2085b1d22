//! Route datatypes: the D200/D201/D202 headers and the D210 link.
//!
//! On the wire a route is a header packet followed by its waypoints, with
//! link records between consecutive waypoints on A201 devices.

use crate::error::RecordError;
use crate::records::wpt::{Wpt, DEFAULT_SUBCLASS};
use crate::records::WireFormat;
use crate::wire::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A bare route number.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct D200 {
    pub nmbr: u8,
}

impl WireFormat for D200 {
    fn parse<T: Buf>(mut buf: T) -> Result<D200, RecordError> {
        ensure_remaining!(buf, 1);
        Ok(D200 { nmbr: buf.get_u8() })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.nmbr);
    }
}

/// A route number plus a 20-character comment.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct D201 {
    pub nmbr: u8,
    pub cmnt: String,
}

impl WireFormat for D201 {
    fn parse<T: Buf>(mut buf: T) -> Result<D201, RecordError> {
        ensure_remaining!(buf, 1);
        let nmbr = buf.get_u8();
        let cmnt = get_fixed_str(&mut buf, 20)?;
        Ok(D201 { nmbr, cmnt })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.nmbr);
        put_fixed_str(buf, &self.cmnt, 20, b' ');
    }
}

/// A named route.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct D202 {
    pub ident: String,
}

impl WireFormat for D202 {
    fn parse<T: Buf>(mut buf: T) -> Result<D202, RecordError> {
        Ok(D202 {
            ident: get_cstr(&mut buf),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        put_cstr(buf, &self.ident);
    }
}

/// A link between two route waypoints.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct D210 {
    /// 0 = line, 1 = link, 2 = net, 3 = direct, 4 = snap.
    pub class: u16,
    pub subclass: [u8; 18],
    pub ident: String,
}

impl Default for D210 {
    fn default() -> D210 {
        D210 {
            class: 3,
            subclass: DEFAULT_SUBCLASS,
            ident: String::new(),
        }
    }
}

impl WireFormat for D210 {
    fn parse<T: Buf>(mut buf: T) -> Result<D210, RecordError> {
        ensure_remaining!(buf, 20);
        let class = buf.get_u16_le();
        let mut subclass = [0u8; 18];
        buf.copy_to_slice(&mut subclass);
        Ok(D210 {
            class,
            subclass,
            ident: get_cstr(&mut buf),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u16_le(self.class);
        buf.put_slice(&self.subclass);
        put_cstr(buf, &self.ident);
    }
}

/// A route header in whichever format the device negotiated.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RteHdr {
    D200(D200),
    D201(D201),
    D202(D202),
}

impl RteHdr {
    pub fn parse(datatype: u16, data: Bytes) -> Result<RteHdr, RecordError> {
        Ok(match datatype {
            200 => RteHdr::D200(D200::parse(data)?),
            201 => RteHdr::D201(D201::parse(data)?),
            202 => RteHdr::D202(D202::parse(data)?),
            other => return Err(RecordError::UnknownDatatype(other)),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            RteHdr::D200(x) => x.write(&mut buf),
            RteHdr::D201(x) => x.write(&mut buf),
            RteHdr::D202(x) => x.write(&mut buf),
        }
        buf.freeze()
    }

    pub fn datatype(&self) -> u16 {
        match self {
            RteHdr::D200(_) => 200,
            RteHdr::D201(_) => 201,
            RteHdr::D202(_) => 202,
        }
    }
}

impl From<D200> for RteHdr {
    fn from(x: D200) -> Self {
        RteHdr::D200(x)
    }
}
impl From<D201> for RteHdr {
    fn from(x: D201) -> Self {
        RteHdr::D201(x)
    }
}
impl From<D202> for RteHdr {
    fn from(x: D202) -> Self {
        RteHdr::D202(x)
    }
}

/// One route, assembled from the header/link/waypoint packet sequence.
#[derive(Clone, PartialEq, Debug)]
pub struct Route {
    pub header: RteHdr,
    pub waypoints: Vec<Wpt>,
    /// Links between consecutive waypoints; empty on A200 devices.
    pub links: Vec<D210>,
}

impl Route {
    pub fn new(header: RteHdr) -> Route {
        Route {
            header,
            waypoints: Vec::new(),
            links: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn d201_comment_is_padded() {
        let hdr = D201 {
            nmbr: 3,
            cmnt: "COASTAL".into(),
        };
        let mut wire = BytesMut::new();
        hdr.write(&mut wire);
        assert_eq!(wire.len(), 21);
        assert_eq!(D201::parse(&wire[..]).unwrap(), hdr);
    }

    #[test]
    fn d210_round_trip() {
        let link = D210 {
            ident: "FERRY".into(),
            ..D210::default()
        };
        let mut wire = BytesMut::new();
        link.write(&mut wire);
        assert_eq!(D210::parse(&wire[..]).unwrap(), link);
    }

    #[test]
    fn header_dispatch() {
        let hdr = RteHdr::D202(D202 {
            ident: "TO WORK".into(),
        });
        assert_eq!(RteHdr::parse(202, hdr.encode()).unwrap(), hdr);
        assert!(RteHdr::parse(205, Bytes::new()).is_err());
    }
}
