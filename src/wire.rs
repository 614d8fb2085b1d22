//! Primitives shared by every record codec.
//!
//! Everything on the wire is little-endian.  Strings come in two shapes:
//! fixed-width fields padded with spaces or NULs, and NUL-terminated
//! variable-width fields.  Angles come in two shapes too: 32-bit
//! semicircles (most records) and 64-bit radians (D700/D800).

use crate::error::RecordError;
use bytes::{Buf, BufMut};

macro_rules! ensure_remaining {
    ($buf:expr, $len:expr) => {
        if $buf.remaining() < $len {
            return Err(RecordError::ShortPayload {
                wanted: $len,
                had: $buf.remaining(),
            });
        }
    };
}
pub(crate) use ensure_remaining;

/// Read a fixed-width string field.  The value ends at the first NUL;
/// trailing padding (spaces or NULs) is stripped.
pub(crate) fn get_fixed_str<T: Buf>(buf: &mut T, width: usize) -> Result<String, RecordError> {
    ensure_remaining!(buf, width);
    let raw = buf.copy_to_bytes(width);
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end])
        .trim_end_matches(' ')
        .to_string())
}

/// Write a fixed-width string field, truncating or padding with `pad` as
/// needed.
pub(crate) fn put_fixed_str<T: BufMut>(buf: &mut T, s: &str, width: usize, pad: u8) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    buf.put_slice(&bytes[..n]);
    for _ in n..width {
        buf.put_u8(pad);
    }
}

/// Read a NUL-terminated string.  A missing terminator is tolerated: the
/// rest of the payload is taken as the value.
pub(crate) fn get_cstr<T: Buf>(buf: &mut T) -> String {
    let mut out = Vec::new();
    while buf.has_remaining() {
        match buf.get_u8() {
            0 => break,
            b => out.push(b),
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

/// Write a NUL-terminated string.
pub(crate) fn put_cstr<T: BufMut>(buf: &mut T, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

/// Split a payload of consecutive NUL-terminated strings, as found in the
/// product-data reply and the extended product-data packets.
pub(crate) fn split_cstrs(mut buf: impl Buf) -> Vec<String> {
    let mut out = Vec::new();
    while buf.has_remaining() {
        out.push(get_cstr(&mut buf));
    }
    out
}

/// Convert a semicircle count to degrees.  2^31 semicircles make 180
/// degrees, so the scale factor is exact in an `f64`.
pub fn semicircle_to_degrees(v: i32) -> f64 {
    f64::from(v) * (180.0 / 2_147_483_648.0)
}

/// Convert degrees to the nearest semicircle count.
pub fn degrees_to_semicircle(d: f64) -> i32 {
    (d / 180.0 * 2_147_483_648.0).round() as i32
}

/// A latitude/longitude pair in semicircles, as most records carry it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Position {
    pub lat: i32,
    pub lon: i32,
}

impl Position {
    pub fn from_degrees(lat: f64, lon: f64) -> Position {
        Position {
            lat: degrees_to_semicircle(lat),
            lon: degrees_to_semicircle(lon),
        }
    }

    pub fn lat_degrees(&self) -> f64 {
        semicircle_to_degrees(self.lat)
    }

    pub fn lon_degrees(&self) -> f64 {
        semicircle_to_degrees(self.lon)
    }

    pub(crate) fn parse<T: Buf>(buf: &mut T) -> Result<Position, RecordError> {
        ensure_remaining!(buf, 8);
        Ok(Position {
            lat: buf.get_i32_le(),
            lon: buf.get_i32_le(),
        })
    }

    pub(crate) fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_i32_le(self.lat);
        buf.put_i32_le(self.lon);
    }
}

/// A latitude/longitude pair in radians.  Only the D700 position-init and
/// D800 PVT records use this shape.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct RadianPosition {
    pub lat: f64,
    pub lon: f64,
}

impl RadianPosition {
    pub fn lat_degrees(&self) -> f64 {
        self.lat.to_degrees()
    }

    pub fn lon_degrees(&self) -> f64 {
        self.lon.to_degrees()
    }

    pub(crate) fn parse<T: Buf>(buf: &mut T) -> Result<RadianPosition, RecordError> {
        ensure_remaining!(buf, 16);
        Ok(RadianPosition {
            lat: buf.get_f64_le(),
            lon: buf.get_f64_le(),
        })
    }

    pub(crate) fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_f64_le(self.lat);
        buf.put_f64_le(self.lon);
    }
}

/// The float value Garmin units write into unsupported optional fields.
pub const UNSUPPORTED_F32: f32 = 1.0e25;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semicircle_round_trip() {
        // The law must hold across the whole i32 range, including the
        // extremes and values with no exact degree representation.
        for &x in &[
            0,
            1,
            -1,
            493_961_671,
            25_937_164,
            i32::MAX,
            i32::MIN,
            i32::MIN + 1,
        ] {
            let deg = semicircle_to_degrees(x);
            assert_eq!(degrees_to_semicircle(deg), x, "failed for {x}");
        }
    }

    #[test]
    fn semicircle_scale() {
        assert_eq!(semicircle_to_degrees(i32::MIN), -180.0);
        assert_eq!(semicircle_to_degrees(0x4000_0000), 90.0);
    }

    #[test]
    fn fixed_str_padding() {
        let mut buf = Vec::new();
        put_fixed_str(&mut buf, "CHURCH", 6, b' ');
        assert_eq!(&buf, b"CHURCH");
        put_fixed_str(&mut buf, "LA", 6, b' ');
        assert_eq!(&buf[6..], b"LA    ");
        let mut rd = &buf[6..];
        assert_eq!(get_fixed_str(&mut rd, 6).unwrap(), "LA");
    }

    #[test]
    fn fixed_str_truncates_at_nul() {
        let raw: &[u8] = b"AB\0CD\0";
        let mut rd = raw;
        assert_eq!(get_fixed_str(&mut rd, 6).unwrap(), "AB");
        assert_eq!(rd.remaining(), 0);
    }

    #[test]
    fn cstr_round_trip() {
        let mut buf = Vec::new();
        put_cstr(&mut buf, "GPS 12XL");
        put_cstr(&mut buf, "Software Version 2.30");
        let strings = split_cstrs(&buf[..]);
        assert_eq!(strings, vec!["GPS 12XL", "Software Version 2.30"]);
    }

    #[test]
    fn cstr_tolerates_missing_terminator() {
        let mut rd: &[u8] = b"NO TERMINATOR";
        assert_eq!(get_cstr(&mut rd), "NO TERMINATOR");
    }
}
