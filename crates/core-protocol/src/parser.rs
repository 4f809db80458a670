//! A narrow tag-length-value walk over one driver buffer.
//!
//! This does not attempt to reproduce the kernel driver's actual on-wire
//! struct layout (out of scope here, and not ours to define); it implements
//! a self-contained TLV framing that carries exactly the fields the core
//! needs, one frame per buffer. Truncated buffers are a frame-local error:
//! the caller logs and drops that one frame and continues the loop.

use core_math::{Image, Index2};
use thiserror::Error;

use crate::frame::{DftComponent, DftFrameKind, DftRow, Frame, Heatmap, SingletouchData, StylusData, StylusDftData};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("buffer truncated: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },
    #[error("unrecognized frame tag {0}")]
    UnknownTag(u8),
    #[error("unrecognized DFT frame kind {0}")]
    UnknownDftKind(u8),
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn need(&self, n: usize) -> Result<(), ParseError> {
        if self.pos + n > self.buf.len() {
            return Err(ParseError::Truncated {
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        self.need(2)?;
        let v = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    fn i32(&mut self) -> Result<i32, ParseError> {
        self.need(4)?;
        let v = i32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn u32(&mut self) -> Result<u32, ParseError> {
        self.need(4)?;
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        self.need(n)?;
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn dft_row(&mut self) -> Result<DftRow, ParseError> {
        let first = self.u16()?;
        let magnitude = self.u16()?;
        let mut components = [DftComponent::default(); crate::frame::DFT_NUM_COMPONENTS];
        for c in &mut components {
            c.real = self.i32()?;
            c.imag = self.i32()?;
        }
        Ok(DftRow {
            first,
            magnitude,
            components,
        })
    }
}

const TAG_SINGLETOUCH: u8 = 0;
const TAG_HEATMAP: u8 = 1;
const TAG_STYLUS: u8 = 2;
const TAG_STYLUS_DFT: u8 = 3;

/// Parse exactly one frame out of `buf`. `buf` holds a tag byte followed by
/// that frame kind's payload; there is no outer length prefix because each
/// driver buffer carries one frame.
pub fn parse_frame(buf: &[u8]) -> Result<Frame, ParseError> {
    let mut r = ByteReader::new(buf);
    let tag = r.u8()?;

    match tag {
        TAG_SINGLETOUCH => {
            let touch = r.u8()? != 0;
            let x = r.u16()?;
            let y = r.u16()?;
            Ok(Frame::Singletouch(SingletouchData { touch, x, y }))
        }
        TAG_HEATMAP => {
            let width = r.u16()?;
            let height = r.u16()?;
            let y_min = r.u8()?;
            let y_max = r.u8()?;
            let x_min = r.u8()?;
            let x_max = r.u8()?;
            let z_min = r.u8()?;
            let z_max = r.u8()?;
            let timestamp = r.u32()?;
            let pixels = r.bytes(width as usize * height as usize)?;

            let mut data: Image<u8> = Image::new(Index2::new(width as i32, height as i32));
            data.as_mut_slice().copy_from_slice(pixels);

            Ok(Frame::Heatmap(Heatmap {
                y_min,
                y_max,
                x_min,
                x_max,
                z_min,
                z_max,
                timestamp,
                data,
            }))
        }
        TAG_STYLUS => {
            let flags = r.u8()?;
            let timestamp = r.u16()?;
            let x = r.u16()?;
            let y = r.u16()?;
            let pressure = r.u16()?;
            let altitude = r.u16()?;
            let azimuth = r.u16()?;
            let serial = r.u32()?;
            Ok(Frame::Stylus(StylusData {
                proximity: flags & 0b0001 != 0,
                contact: flags & 0b0010 != 0,
                button: flags & 0b0100 != 0,
                rubber: flags & 0b1000 != 0,
                timestamp,
                x,
                y,
                pressure,
                altitude,
                azimuth,
                serial,
            }))
        }
        TAG_STYLUS_DFT => {
            let kind_byte = r.u8()?;
            let kind = match kind_byte {
                0 => DftFrameKind::Position,
                1 => DftFrameKind::Button,
                2 => DftFrameKind::Pressure,
                other => return Err(ParseError::UnknownDftKind(other)),
            };
            let timestamp = r.u16()?;
            let num_cols = r.u16()?;
            let num_rows = r.u16()?;
            let num_x_rows = r.u16()?;
            let num_y_rows = r.u16()?;

            let dft_x = (0..num_x_rows).map(|_| r.dft_row()).collect::<Result<Vec<_>, _>>()?;
            let dft_y = (0..num_y_rows).map(|_| r.dft_row()).collect::<Result<Vec<_>, _>>()?;

            Ok(Frame::StylusDft(StylusDftData {
                kind,
                timestamp,
                num_cols,
                num_rows,
                dft_x,
                dft_y,
            }))
        }
        other => Err(ParseError::UnknownTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_singletouch_frame() {
        let buf = [TAG_SINGLETOUCH, 1, 0x10, 0x00, 0x20, 0x00];
        let frame = parse_frame(&buf).unwrap();
        match frame {
            Frame::Singletouch(d) => {
                assert!(d.touch);
                assert_eq!(d.x, 0x10);
                assert_eq!(d.y, 0x20);
            }
            _ => panic!("wrong frame kind"),
        }
    }

    #[test]
    fn truncated_heatmap_is_frame_local_error() {
        let buf = [TAG_HEATMAP, 2, 0, 2, 0]; // claims 2x2 but header alone is truncated
        let err = parse_frame(&buf).unwrap_err();
        assert!(matches!(err, ParseError::Truncated { .. }));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let buf = [0xff];
        assert_eq!(parse_frame(&buf).unwrap_err(), ParseError::UnknownTag(0xff));
    }

    #[test]
    fn roundtrips_heatmap_pixel_data() {
        let mut buf = vec![TAG_HEATMAP];
        buf.extend_from_slice(&2u16.to_le_bytes()); // width
        buf.extend_from_slice(&2u16.to_le_bytes()); // height
        buf.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // min/max bounds
        buf.extend_from_slice(&42u32.to_le_bytes()); // timestamp
        buf.extend_from_slice(&[1, 2, 3, 4]); // pixels

        let frame = parse_frame(&buf).unwrap();
        match frame {
            Frame::Heatmap(h) => {
                assert_eq!(h.timestamp, 42);
                assert_eq!(h.data.as_slice(), &[1, 2, 3, 4]);
            }
            _ => panic!("wrong frame kind"),
        }
    }
}
