//! Track datatypes: the D310/D311/D312 headers and the D300..D304 points.

use crate::error::RecordError;
use crate::records::WireFormat;
use crate::wire::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Timestamp value meaning "not recorded".
pub const INVALID_TIME: u32 = 0xffff_ffff;

/// The original track point: position, time, segment flag.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct D300 {
    pub posn: Position,
    /// Seconds since the Garmin epoch (1989-12-31 00:00 UTC).
    pub time: u32,
    /// True on the first point of a new track segment.
    pub new_trk: bool,
}

impl WireFormat for D300 {
    fn parse<T: Buf>(mut buf: T) -> Result<D300, RecordError> {
        let posn = Position::parse(&mut buf)?;
        ensure_remaining!(buf, 5);
        Ok(D300 {
            posn,
            time: buf.get_u32_le(),
            new_trk: buf.get_u8() != 0,
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        self.posn.write(buf);
        buf.put_u32_le(self.time);
        buf.put_u8(self.new_trk as u8);
    }
}

/// D300 plus altitude and depth.
#[derive(Clone, PartialEq, Debug)]
pub struct D301 {
    pub posn: Position,
    pub time: u32,
    pub alt: f32,
    pub dpth: f32,
    pub new_trk: bool,
}

impl Default for D301 {
    fn default() -> D301 {
        D301 {
            posn: Position::default(),
            time: 0,
            alt: UNSUPPORTED_F32,
            dpth: UNSUPPORTED_F32,
            new_trk: false,
        }
    }
}

impl WireFormat for D301 {
    fn parse<T: Buf>(mut buf: T) -> Result<D301, RecordError> {
        let posn = Position::parse(&mut buf)?;
        ensure_remaining!(buf, 13);
        Ok(D301 {
            posn,
            time: buf.get_u32_le(),
            alt: buf.get_f32_le(),
            dpth: buf.get_f32_le(),
            new_trk: buf.get_u8() != 0,
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        self.posn.write(buf);
        buf.put_u32_le(self.time);
        buf.put_f32_le(self.alt);
        buf.put_f32_le(self.dpth);
        buf.put_u8(self.new_trk as u8);
    }
}

/// D301 plus water temperature.
#[derive(Clone, PartialEq, Debug)]
pub struct D302 {
    pub posn: Position,
    pub time: u32,
    pub alt: f32,
    pub dpth: f32,
    pub temp: f32,
    pub new_trk: bool,
}

impl Default for D302 {
    fn default() -> D302 {
        D302 {
            posn: Position::default(),
            time: 0,
            alt: UNSUPPORTED_F32,
            dpth: UNSUPPORTED_F32,
            temp: UNSUPPORTED_F32,
            new_trk: false,
        }
    }
}

impl WireFormat for D302 {
    fn parse<T: Buf>(mut buf: T) -> Result<D302, RecordError> {
        let posn = Position::parse(&mut buf)?;
        ensure_remaining!(buf, 17);
        Ok(D302 {
            posn,
            time: buf.get_u32_le(),
            alt: buf.get_f32_le(),
            dpth: buf.get_f32_le(),
            temp: buf.get_f32_le(),
            new_trk: buf.get_u8() != 0,
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        self.posn.write(buf);
        buf.put_u32_le(self.time);
        buf.put_f32_le(self.alt);
        buf.put_f32_le(self.dpth);
        buf.put_f32_le(self.temp);
        buf.put_u8(self.new_trk as u8);
    }
}

/// The fitness-era point: no depth, but a heart rate.
#[derive(Clone, PartialEq, Debug)]
pub struct D303 {
    pub posn: Position,
    pub time: u32,
    pub alt: f32,
    /// Beats per minute; 0 when the sensor was absent.
    pub heart_rate: u8,
}

impl Default for D303 {
    fn default() -> D303 {
        D303 {
            posn: Position::default(),
            time: 0,
            alt: UNSUPPORTED_F32,
            heart_rate: 0,
        }
    }
}

impl WireFormat for D303 {
    fn parse<T: Buf>(mut buf: T) -> Result<D303, RecordError> {
        let posn = Position::parse(&mut buf)?;
        ensure_remaining!(buf, 9);
        Ok(D303 {
            posn,
            time: buf.get_u32_le(),
            alt: buf.get_f32_le(),
            heart_rate: buf.get_u8(),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        self.posn.write(buf);
        buf.put_u32_le(self.time);
        buf.put_f32_le(self.alt);
        buf.put_u8(self.heart_rate);
    }
}

/// D303 plus distance, cadence and a wheel-sensor flag.
#[derive(Clone, PartialEq, Debug)]
pub struct D304 {
    pub posn: Position,
    pub time: u32,
    pub alt: f32,
    pub distance: f32,
    pub heart_rate: u8,
    /// Crank revolutions per minute; 0xff when the sensor was absent.
    pub cadence: u8,
    pub sensor: bool,
}

impl Default for D304 {
    fn default() -> D304 {
        D304 {
            posn: Position::default(),
            time: 0,
            alt: UNSUPPORTED_F32,
            distance: UNSUPPORTED_F32,
            heart_rate: 0,
            cadence: 0xff,
            sensor: false,
        }
    }
}

impl WireFormat for D304 {
    fn parse<T: Buf>(mut buf: T) -> Result<D304, RecordError> {
        let posn = Position::parse(&mut buf)?;
        ensure_remaining!(buf, 15);
        Ok(D304 {
            posn,
            time: buf.get_u32_le(),
            alt: buf.get_f32_le(),
            distance: buf.get_f32_le(),
            heart_rate: buf.get_u8(),
            cadence: buf.get_u8(),
            sensor: buf.get_u8() != 0,
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        self.posn.write(buf);
        buf.put_u32_le(self.time);
        buf.put_f32_le(self.alt);
        buf.put_f32_le(self.distance);
        buf.put_u8(self.heart_rate);
        buf.put_u8(self.cadence);
        buf.put_u8(self.sensor as u8);
    }
}

/// The original track header: display flag, colour, 13 bytes of name.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct D310 {
    pub dspl: bool,
    pub color: u8,
    pub ident: String,
}

impl WireFormat for D310 {
    fn parse<T: Buf>(mut buf: T) -> Result<D310, RecordError> {
        ensure_remaining!(buf, 2);
        Ok(D310 {
            dspl: buf.get_u8() != 0,
            color: buf.get_u8(),
            ident: get_cstr(&mut buf),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.dspl as u8);
        buf.put_u8(self.color);
        put_cstr(buf, &self.ident);
    }
}

/// A track identified only by index.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct D311 {
    pub index: u16,
}

impl WireFormat for D311 {
    fn parse<T: Buf>(mut buf: T) -> Result<D311, RecordError> {
        ensure_remaining!(buf, 2);
        Ok(D311 {
            index: buf.get_u16_le(),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u16_le(self.index);
    }
}

/// D310 with the extended colour table.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct D312 {
    pub dspl: bool,
    pub color: u8,
    pub ident: String,
}

impl WireFormat for D312 {
    fn parse<T: Buf>(mut buf: T) -> Result<D312, RecordError> {
        ensure_remaining!(buf, 2);
        Ok(D312 {
            dspl: buf.get_u8() != 0,
            color: buf.get_u8(),
            ident: get_cstr(&mut buf),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.dspl as u8);
        buf.put_u8(self.color);
        put_cstr(buf, &self.ident);
    }
}

/// A track header in whichever format the device negotiated.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TrkHdr {
    D310(D310),
    D311(D311),
    D312(D312),
}

impl TrkHdr {
    pub fn parse(datatype: u16, data: Bytes) -> Result<TrkHdr, RecordError> {
        Ok(match datatype {
            310 => TrkHdr::D310(D310::parse(data)?),
            311 => TrkHdr::D311(D311::parse(data)?),
            312 => TrkHdr::D312(D312::parse(data)?),
            other => return Err(RecordError::UnknownDatatype(other)),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            TrkHdr::D310(x) => x.write(&mut buf),
            TrkHdr::D311(x) => x.write(&mut buf),
            TrkHdr::D312(x) => x.write(&mut buf),
        }
        buf.freeze()
    }

    pub fn datatype(&self) -> u16 {
        match self {
            TrkHdr::D310(_) => 310,
            TrkHdr::D311(_) => 311,
            TrkHdr::D312(_) => 312,
        }
    }
}

/// A track point in whichever format the device negotiated.
#[derive(Clone, PartialEq, Debug)]
pub enum TrkPoint {
    D300(D300),
    D301(D301),
    D302(D302),
    D303(D303),
    D304(D304),
}

impl TrkPoint {
    pub fn parse(datatype: u16, data: Bytes) -> Result<TrkPoint, RecordError> {
        Ok(match datatype {
            300 => TrkPoint::D300(D300::parse(data)?),
            301 => TrkPoint::D301(D301::parse(data)?),
            302 => TrkPoint::D302(D302::parse(data)?),
            303 => TrkPoint::D303(D303::parse(data)?),
            304 => TrkPoint::D304(D304::parse(data)?),
            other => return Err(RecordError::UnknownDatatype(other)),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            TrkPoint::D300(x) => x.write(&mut buf),
            TrkPoint::D301(x) => x.write(&mut buf),
            TrkPoint::D302(x) => x.write(&mut buf),
            TrkPoint::D303(x) => x.write(&mut buf),
            TrkPoint::D304(x) => x.write(&mut buf),
        }
        buf.freeze()
    }

    pub fn datatype(&self) -> u16 {
        match self {
            TrkPoint::D300(_) => 300,
            TrkPoint::D301(_) => 301,
            TrkPoint::D302(_) => 302,
            TrkPoint::D303(_) => 303,
            TrkPoint::D304(_) => 304,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            TrkPoint::D300(x) => x.posn,
            TrkPoint::D301(x) => x.posn,
            TrkPoint::D302(x) => x.posn,
            TrkPoint::D303(x) => x.posn,
            TrkPoint::D304(x) => x.posn,
        }
    }

    /// The segment-start flag; always false for the fitness-era points,
    /// which delimit segments by track instead.
    pub fn new_trk(&self) -> bool {
        match self {
            TrkPoint::D300(x) => x.new_trk,
            TrkPoint::D301(x) => x.new_trk,
            TrkPoint::D302(x) => x.new_trk,
            TrkPoint::D303(_) | TrkPoint::D304(_) => false,
        }
    }
}

/// One track, assembled from the header/point packet sequence.  A300
/// devices have no headers; the whole log arrives as a single `Track`
/// with `header == None`.
#[derive(Clone, PartialEq, Debug)]
pub struct Track {
    pub header: Option<TrkHdr>,
    pub points: Vec<TrkPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn d300_round_trip() {
        let pt = D300 {
            posn: Position::from_degrees(60.0, 25.0),
            time: 612_278_456,
            new_trk: true,
        };
        let mut wire = BytesMut::new();
        pt.write(&mut wire);
        assert_eq!(wire.len(), 13);
        assert_eq!(D300::parse(&wire[..]).unwrap(), pt);
    }

    #[test]
    fn d304_round_trip() {
        let pt = D304 {
            posn: Position::from_degrees(-33.9, 18.4),
            time: 700_000_001,
            alt: 12.5,
            distance: 1040.0,
            heart_rate: 151,
            cadence: 87,
            sensor: true,
        };
        assert_eq!(TrkPoint::parse(304, TrkPoint::D304(pt.clone()).encode()).unwrap(), TrkPoint::D304(pt));
    }

    #[test]
    fn header_dispatch() {
        let hdr = TrkHdr::D310(D310 {
            dspl: true,
            color: 9,
            ident: "MORNING RUN".into(),
        });
        assert_eq!(TrkHdr::parse(310, hdr.encode()).unwrap(), hdr);
    }
}
