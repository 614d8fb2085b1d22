//! The singleton record types: date/time, flight book, position
//! initialisation, and the real-time PVT record.

use crate::error::RecordError;
use crate::records::WireFormat;
use crate::wire::*;
use bytes::{Buf, BufMut};

/// Date and time, UTC.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct D600 {
    pub month: u8,
    pub day: u8,
    pub year: u16,
    pub hour: u16,
    pub minute: u8,
    pub second: u8,
}

impl WireFormat for D600 {
    fn parse<T: Buf>(mut buf: T) -> Result<D600, RecordError> {
        ensure_remaining!(buf, 8);
        Ok(D600 {
            month: buf.get_u8(),
            day: buf.get_u8(),
            year: buf.get_u16_le(),
            hour: buf.get_u16_le(),
            minute: buf.get_u8(),
            second: buf.get_u8(),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.month);
        buf.put_u8(self.day);
        buf.put_u16_le(self.year);
        buf.put_u16_le(self.hour);
        buf.put_u8(self.minute);
        buf.put_u8(self.second);
    }
}

/// One logbook entry from an aviation unit.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct D650 {
    pub takeoff_time: u32,
    pub landing_time: u32,
    pub takeoff_posn: Position,
    pub landing_posn: Position,
    pub night_time: u32,
    pub num_landings: u32,
    pub max_speed: f32,
    pub max_alt: f32,
    pub distance: f32,
    pub cross_country_flag: u8,
    pub departure_name: String,
    pub departure_ident: String,
    pub arrival_name: String,
    pub arrival_ident: String,
    pub ac_id: String,
}

impl WireFormat for D650 {
    fn parse<T: Buf>(mut buf: T) -> Result<D650, RecordError> {
        ensure_remaining!(buf, 8);
        let takeoff_time = buf.get_u32_le();
        let landing_time = buf.get_u32_le();
        let takeoff_posn = Position::parse(&mut buf)?;
        let landing_posn = Position::parse(&mut buf)?;
        ensure_remaining!(buf, 21);
        Ok(D650 {
            takeoff_time,
            landing_time,
            takeoff_posn,
            landing_posn,
            night_time: buf.get_u32_le(),
            num_landings: buf.get_u32_le(),
            max_speed: buf.get_f32_le(),
            max_alt: buf.get_f32_le(),
            distance: buf.get_f32_le(),
            cross_country_flag: buf.get_u8(),
            departure_name: get_cstr(&mut buf),
            departure_ident: get_cstr(&mut buf),
            arrival_name: get_cstr(&mut buf),
            arrival_ident: get_cstr(&mut buf),
            ac_id: get_cstr(&mut buf),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u32_le(self.takeoff_time);
        buf.put_u32_le(self.landing_time);
        self.takeoff_posn.write(buf);
        self.landing_posn.write(buf);
        buf.put_u32_le(self.night_time);
        buf.put_u32_le(self.num_landings);
        buf.put_f32_le(self.max_speed);
        buf.put_f32_le(self.max_alt);
        buf.put_f32_le(self.distance);
        buf.put_u8(self.cross_country_flag);
        put_cstr(buf, &self.departure_name);
        put_cstr(buf, &self.departure_ident);
        put_cstr(buf, &self.arrival_name);
        put_cstr(buf, &self.arrival_ident);
        put_cstr(buf, &self.ac_id);
    }
}

/// The position-initialisation record.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct D700 {
    pub posn: RadianPosition,
}

impl WireFormat for D700 {
    fn parse<T: Buf>(mut buf: T) -> Result<D700, RecordError> {
        Ok(D700 {
            posn: RadianPosition::parse(&mut buf)?,
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        self.posn.write(buf);
    }
}

/// Fix quality reported in a PVT record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PvtFix {
    Unusable = 0,
    Invalid = 1,
    TwoD = 2,
    ThreeD = 3,
    TwoDDiff = 4,
    ThreeDDiff = 5,
}

impl TryFrom<u16> for PvtFix {
    type Error = RecordError;

    fn try_from(value: u16) -> Result<PvtFix, RecordError> {
        Ok(match value {
            0 => PvtFix::Unusable,
            1 => PvtFix::Invalid,
            2 => PvtFix::TwoD,
            3 => PvtFix::ThreeD,
            4 => PvtFix::TwoDDiff,
            5 => PvtFix::ThreeDDiff,
            v => {
                return Err(RecordError::FieldRange {
                    field: "fix",
                    value: u32::from(v),
                })
            }
        })
    }
}

/// The real-time position/velocity/time record, streamed at about 1 Hz
/// while PVT mode is on.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct D800 {
    /// Altitude above the WGS84 ellipsoid, metres.
    pub alt: f32,
    /// Estimated position error, metres (2 sigma).
    pub epe: f32,
    pub eph: f32,
    pub epv: f32,
    pub fix: PvtFix,
    /// GPS time of week, seconds.
    pub tow: f64,
    pub posn: RadianPosition,
    /// Velocity east/north/up, metres per second.
    pub east: f32,
    pub north: f32,
    pub up: f32,
    /// Height of the WGS84 ellipsoid above mean sea level, metres.
    pub msl_hght: f32,
    pub leap_scnds: i16,
    /// Days since 1989-12-31 of the week the `tow` counts into.
    pub wn_days: u32,
}

impl Default for D800 {
    fn default() -> D800 {
        D800 {
            alt: 0.0,
            epe: 0.0,
            eph: 0.0,
            epv: 0.0,
            fix: PvtFix::Unusable,
            tow: 0.0,
            posn: RadianPosition::default(),
            east: 0.0,
            north: 0.0,
            up: 0.0,
            msl_hght: 0.0,
            leap_scnds: 0,
            wn_days: 0,
        }
    }
}

impl WireFormat for D800 {
    fn parse<T: Buf>(mut buf: T) -> Result<D800, RecordError> {
        ensure_remaining!(buf, 26);
        let alt = buf.get_f32_le();
        let epe = buf.get_f32_le();
        let eph = buf.get_f32_le();
        let epv = buf.get_f32_le();
        let fix = PvtFix::try_from(buf.get_u16_le())?;
        let tow = buf.get_f64_le();
        let posn = RadianPosition::parse(&mut buf)?;
        ensure_remaining!(buf, 22);
        Ok(D800 {
            alt,
            epe,
            eph,
            epv,
            fix,
            tow,
            posn,
            east: buf.get_f32_le(),
            north: buf.get_f32_le(),
            up: buf.get_f32_le(),
            msl_hght: buf.get_f32_le(),
            leap_scnds: buf.get_i16_le(),
            wn_days: buf.get_u32_le(),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_f32_le(self.alt);
        buf.put_f32_le(self.epe);
        buf.put_f32_le(self.eph);
        buf.put_f32_le(self.epv);
        buf.put_u16_le(self.fix as u16);
        buf.put_f64_le(self.tow);
        self.posn.write(buf);
        buf.put_f32_le(self.east);
        buf.put_f32_le(self.north);
        buf.put_f32_le(self.up);
        buf.put_f32_le(self.msl_hght);
        buf.put_i16_le(self.leap_scnds);
        buf.put_u32_le(self.wn_days);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn d600_round_trip() {
        let dt = D600 {
            month: 8,
            day: 1,
            year: 2004,
            hour: 13,
            minute: 37,
            second: 5,
        };
        let mut wire = BytesMut::new();
        dt.write(&mut wire);
        assert_eq!(wire.len(), 8);
        assert_eq!(D600::parse(&wire[..]).unwrap(), dt);
    }

    #[test]
    fn d800_round_trip() {
        let pvt = D800 {
            alt: 44.2,
            fix: PvtFix::ThreeDDiff,
            tow: 248_912.5,
            posn: RadianPosition {
                lat: 0.725,
                lon: 0.045,
            },
            east: -1.25,
            north: 3.5,
            leap_scnds: 18,
            wn_days: 12_089,
            ..D800::default()
        };
        let mut wire = BytesMut::new();
        pvt.write(&mut wire);
        assert_eq!(wire.len(), 64);
        assert_eq!(D800::parse(&wire[..]).unwrap(), pvt);
    }

    #[test]
    fn bad_fix_is_a_field_range_error() {
        let mut wire = BytesMut::new();
        D800::default().write(&mut wire);
        wire[16] = 9; // fix
        assert!(matches!(
            D800::parse(&wire[..]),
            Err(RecordError::FieldRange { field: "fix", .. })
        ));
    }

    #[test]
    fn d650_round_trip() {
        let entry = D650 {
            takeoff_time: 600_000_000,
            landing_time: 600_004_500,
            num_landings: 1,
            max_speed: 61.2,
            departure_ident: "EGLL".into(),
            arrival_ident: "LFPG".into(),
            ac_id: "G-ABCD".into(),
            ..D650::default()
        };
        let mut wire = BytesMut::new();
        entry.write(&mut wire);
        assert_eq!(D650::parse(&wire[..]).unwrap(), entry);
    }
}
