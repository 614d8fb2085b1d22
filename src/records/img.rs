//! Image and map transfer records.
//!
//! Neither transfer appears in any published protocol table; the packet
//! ids and layouts here follow the unofficial flash extension.  Keep them
//! in one place so a corrected table is a local change.

use crate::error::RecordError;
use crate::records::WireFormat;
use crate::wire::*;
use bytes::{Buf, BufMut, Bytes};

/// The shape of an image on the unit.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ImageProps {
    /// Bits per pixel: 1, 2, 4 or 8 are indexed; 16 and 24 are direct.
    pub bpp: u8,
    pub width: u16,
    pub height: u16,
}

impl ImageProps {
    /// Bytes in one row of pixel data.
    pub fn row_bytes(&self) -> usize {
        (usize::from(self.width) * usize::from(self.bpp)).div_ceil(8)
    }
}

impl WireFormat for ImageProps {
    fn parse<T: Buf>(mut buf: T) -> Result<ImageProps, RecordError> {
        ensure_remaining!(buf, 5);
        Ok(ImageProps {
            bpp: buf.get_u8(),
            width: buf.get_u16_le(),
            height: buf.get_u16_le(),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u8(self.bpp);
        buf.put_u16_le(self.width);
        buf.put_u16_le(self.height);
    }
}

/// One row of pixel data, tagged with its row index.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ImageRow {
    pub index: u16,
    pub data: Bytes,
}

impl WireFormat for ImageRow {
    fn parse<T: Buf>(mut buf: T) -> Result<ImageRow, RecordError> {
        ensure_remaining!(buf, 2);
        let index = buf.get_u16_le();
        let data = buf.copy_to_bytes(buf.remaining());
        Ok(ImageRow { index, data })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u16_le(self.index);
        buf.put_slice(&self.data);
    }
}

/// A fully reassembled image: properties, palette, row-major pixels.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Image {
    pub props: ImageProps,
    /// RGBA quads, one per palette index; empty for direct-colour images.
    pub palette: Bytes,
    pub pixels: Vec<u8>,
}

impl Image {
    /// Apply the palette, producing row-major RGBA.  Direct-colour images
    /// are returned as stored.
    pub fn rgba(&self) -> Vec<u8> {
        if self.props.bpp != 8 || self.palette.is_empty() {
            return self.pixels.clone();
        }
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for &px in &self.pixels {
            let at = usize::from(px) * 4;
            match self.palette.get(at..at + 4) {
                Some(rgba) => out.extend_from_slice(rgba),
                None => out.extend_from_slice(&[0, 0, 0, 0xff]),
            }
        }
        out
    }
}

/// The header announcing a map blob.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MapHdr {
    /// Total blob size in bytes.
    pub size: u32,
    /// Map product identity; zero/empty on uploads from generic tools.
    pub product_id: u16,
    pub version: u16,
    pub name: String,
}

impl WireFormat for MapHdr {
    fn parse<T: Buf>(mut buf: T) -> Result<MapHdr, RecordError> {
        ensure_remaining!(buf, 4);
        let size = buf.get_u32_le();
        // Product identity is trailing-optional.
        let (product_id, version) = if buf.remaining() >= 4 {
            (buf.get_u16_le(), buf.get_u16_le())
        } else {
            (0, 0)
        };
        Ok(MapHdr {
            size,
            product_id,
            version,
            name: get_cstr(&mut buf),
        })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u32_le(self.size);
        buf.put_u16_le(self.product_id);
        buf.put_u16_le(self.version);
        put_cstr(buf, &self.name);
    }
}

/// One chunk of a map blob.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MapChunk {
    pub index: u32,
    pub data: Bytes,
}

impl WireFormat for MapChunk {
    fn parse<T: Buf>(mut buf: T) -> Result<MapChunk, RecordError> {
        ensure_remaining!(buf, 4);
        let index = buf.get_u32_le();
        let data = buf.copy_to_bytes(buf.remaining());
        Ok(MapChunk { index, data })
    }

    fn write<T: BufMut>(&self, buf: &mut T) {
        buf.put_u32_le(self.index);
        buf.put_slice(&self.data);
    }
}
