//! Almanac datatypes.  All four variants carry the same orbital elements;
//! D501/D551 add a health byte and D550/D551 prefix the satellite id.

use crate::error::RecordError;
use crate::records::WireFormat;
use crate::wire::ensure_remaining;
use bytes::{Buf, BufMut, Bytes};

/// The shared orbital elements.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Orbit {
    /// Week number.
    pub wn: u16,
    /// Almanac reference time, seconds.
    pub toa: f32,
    /// Clock correction coefficients.
    pub af0: f32,
    pub af1: f32,
    /// Eccentricity.
    pub e: f32,
    /// Square root of the semi-major axis.
    pub sqrta: f32,
    /// Mean anomaly at reference time, radians.
    pub m0: f32,
    /// Argument of perigee, radians.
    pub w: f32,
    /// Right ascension, radians.
    pub omg0: f32,
    /// Rate of right ascension, radians/second.
    pub odot: f32,
    /// Inclination angle, radians.
    pub i: f32,
}

impl Orbit {
    fn parse<T: Buf>(buf: &mut T) -> Result<Orbit, RecordError> {
        ensure_remaining!(buf, 42);
        Ok(Orbit {
            wn: buf.get_u16_le(),
            toa: buf.get_f32_le(),
            af0: buf.get_f32_le(),
            af1: buf.get_f32_le(),
            e: buf.get_f32_le(),
            sqrta: buf.get_f32_le(),
            m0: buf.get_f32_le(),
            w: buf.get_f32_le(),
            omg0: buf.get_f32_le(),
            odot: buf.get_f32_le(),
            i: buf.get_f32_le(),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u16_le(self.wn);
        buf.put_f32_le(self.toa);
        buf.put_f32_le(self.af0);
        buf.put_f32_le(self.af1);
        buf.put_f32_le(self.e);
        buf.put_f32_le(self.sqrta);
        buf.put_f32_le(self.m0);
        buf.put_f32_le(self.w);
        buf.put_f32_le(self.omg0);
        buf.put_f32_le(self.odot);
        buf.put_f32_le(self.i);
    }
}

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct D500 {
    pub orbit: Orbit,
}

impl WireFormat for D500 {
    fn parse<T: Buf>(mut buf: T) -> Result<D500, RecordError> {
        Ok(D500 {
            orbit: Orbit::parse(&mut buf)?,
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        self.orbit.write(buf);
    }
}

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct D501 {
    pub orbit: Orbit,
    pub hlth: u8,
}

impl WireFormat for D501 {
    fn parse<T: Buf>(mut buf: T) -> Result<D501, RecordError> {
        let orbit = Orbit::parse(&mut buf)?;
        ensure_remaining!(buf, 1);
        Ok(D501 {
            orbit,
            hlth: buf.get_u8(),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        self.orbit.write(buf);
        buf.put_u8(self.hlth);
    }
}

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct D550 {
    /// Satellite id: 0 means svid 1.
    pub svid: u8,
    pub orbit: Orbit,
}

impl WireFormat for D550 {
    fn parse<T: Buf>(mut buf: T) -> Result<D550, RecordError> {
        ensure_remaining!(buf, 1);
        let svid = buf.get_u8();
        Ok(D550 {
            svid,
            orbit: Orbit::parse(&mut buf)?,
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.svid);
        self.orbit.write(buf);
    }
}

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct D551 {
    pub svid: u8,
    pub orbit: Orbit,
    pub hlth: u8,
}

impl WireFormat for D551 {
    fn parse<T: Buf>(mut buf: T) -> Result<D551, RecordError> {
        ensure_remaining!(buf, 1);
        let svid = buf.get_u8();
        let orbit = Orbit::parse(&mut buf)?;
        ensure_remaining!(buf, 1);
        Ok(D551 {
            svid,
            orbit,
            hlth: buf.get_u8(),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.svid);
        self.orbit.write(buf);
        buf.put_u8(self.hlth);
    }
}

/// An almanac record in whichever format the device negotiated.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Almanac {
    D500(D500),
    D501(D501),
    D550(D550),
    D551(D551),
}

impl Almanac {
    pub fn parse(datatype: u16, data: Bytes) -> Result<Almanac, RecordError> {
        Ok(match datatype {
            500 => Almanac::D500(D500::parse(data)?),
            501 => Almanac::D501(D501::parse(data)?),
            550 => Almanac::D550(D550::parse(data)?),
            551 => Almanac::D551(D551::parse(data)?),
            other => return Err(RecordError::UnknownDatatype(other)),
        })
    }

    pub fn orbit(&self) -> &Orbit {
        match self {
            Almanac::D500(x) => &x.orbit,
            Almanac::D501(x) => &x.orbit,
            Almanac::D550(x) => &x.orbit,
            Almanac::D551(x) => &x.orbit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn d501_round_trip() {
        let alm = D501 {
            orbit: Orbit {
                wn: 1042,
                toa: 319_488.0,
                e: 0.0042,
                sqrta: 5153.6,
                ..Orbit::default()
            },
            hlth: 0,
        };
        let mut wire = BytesMut::new();
        alm.write(&mut wire);
        assert_eq!(wire.len(), 43);
        assert_eq!(D501::parse(&wire[..]).unwrap(), alm);
    }

    #[test]
    fn d551_puts_the_svid_first() {
        let alm = D551 {
            svid: 21,
            orbit: Orbit::default(),
            hlth: 63,
        };
        let mut wire = BytesMut::new();
        alm.write(&mut wire);
        assert_eq!(wire[0], 21);
        assert_eq!(wire.len(), 44);
        assert!(matches!(
            Almanac::parse(551, wire.freeze()).unwrap(),
            Almanac::D551(x) if x == alm
        ));
    }
}
