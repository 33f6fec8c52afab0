use byteorder::{BigEndian, ReadBytesExt};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::io::Cursor;
use tracing::warn;

use crate::error::{Error, Result};

#[allow(non_camel_case_types)]
#[derive(PartialEq, Eq, PartialOrd, FromPrimitive, Debug, Clone, Copy)]
pub enum JPEGMarker {
    TEM = 0xFF01,

    SOF0 = 0xFFC0, // Baseline DCT
    SOF1 = 0xFFC1, // Extended sequential DCT
    SOF2 = 0xFFC2,
    SOF3 = 0xFFC3,
    DHT = 0xFFC4,
    SOF5 = 0xFFC5,
    SOF6 = 0xFFC6,
    SOF7 = 0xFFC7,
    JPG = 0xFFC8,
    SOF9 = 0xFFC9,
    SOF10 = 0xFFCA,
    SOF11 = 0xFFCB,
    DAC = 0xFFCC,
    SOF13 = 0xFFCD,
    SOF14 = 0xFFCE,
    SOF15 = 0xFFCF,

    RST0 = 0xFFD0,
    RST1 = 0xFFD1,
    RST2 = 0xFFD2,
    RST3 = 0xFFD3,
    RST4 = 0xFFD4,
    RST5 = 0xFFD5,
    RST6 = 0xFFD6,
    RST7 = 0xFFD7,

    SOI = 0xFFD8,
    EOI = 0xFFD9,
    SOS = 0xFFDA,
    DQT = 0xFFDB,
    DNL = 0xFFDC,
    DRI = 0xFFDD,
    DHP = 0xFFDE,
    EXP = 0xFFDF,

    APP0 = 0xFFE0,
    APP1 = 0xFFE1,
    APP2 = 0xFFE2,
    APP3 = 0xFFE3,
    APP4 = 0xFFE4,
    APP5 = 0xFFE5,
    APP6 = 0xFFE6,
    APP7 = 0xFFE7,
    APP8 = 0xFFE8,
    APP9 = 0xFFE9,
    APP10 = 0xFFEA,
    APP11 = 0xFFEB,
    APP12 = 0xFFEC,
    APP13 = 0xFFED,
    APP14 = 0xFFEE,
    APP15 = 0xFFEF,

    JPG0 = 0xFFF0,
    JPG1 = 0xFFF1,
    JPG2 = 0xFFF2,
    JPG3 = 0xFFF3,
    JPG4 = 0xFFF4,
    JPG5 = 0xFFF5,
    JPG6 = 0xFFF6,
    JPG7 = 0xFFF7,
    JPG8 = 0xFFF8,
    JPG9 = 0xFFF9,
    JPG10 = 0xFFFA,
    JPG11 = 0xFFFB,
    JPG12 = 0xFFFC,
    JPG13 = 0xFFFD,
    COM = 0xFFFE,
}

impl JPEGMarker {
    /// Returns `n` for RSTn markers.
    pub fn restart_index(self) -> Option<u8> {
        if self >= JPEGMarker::RST0 && self <= JPEGMarker::RST7 {
            Some((self as u16 - JPEGMarker::RST0 as u16) as u8)
        } else {
            None
        }
    }

    /// Markers that carry a length and nothing the decoder needs.
    pub fn is_skippable(self) -> bool {
        (self >= JPEGMarker::APP0 && self <= JPEGMarker::COM) || self == JPEGMarker::DHP
            || self == JPEGMarker::EXP
    }
}

/// End of an entropy-coded segment.
#[derive(Debug, PartialEq, Eq)]
pub enum SegmentEnd {
    /// The segment was closed by RSTn.
    Restart(u8),
    /// Another marker follows; the parser is left in front of it.
    Marker,
    /// The input ran out.
    EndOfInput,
}

pub struct JPEGParser<'data> {
    cursor: Cursor<&'data [u8]>,
}

impl<'data> JPEGParser<'data> {
    pub fn new(data: &'data [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn to_marker(word: u16) -> Result<JPEGMarker> {
        FromPrimitive::from_u16(word).ok_or(Error::Malformed("Unknown marker"))
    }

    pub fn read_next_word(&mut self) -> Result<u16> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| Error::Malformed("Unexpected end of input"))
    }

    pub fn read_next_byte(&mut self) -> Result<u8> {
        self.cursor
            .read_u8()
            .map_err(|_| Error::Malformed("Unexpected end of input"))
    }

    /// Finds the next marker, skipping fill bytes and any garbage before it.
    pub fn read_next_marker(&mut self) -> Result<JPEGMarker> {
        let mut discarded = 0usize;
        loop {
            let mut byte = self.read_next_byte()?;
            while byte != 0xFF {
                discarded += 1;
                byte = self.read_next_byte()?;
            }
            // Any number of 0xFF fill bytes may precede the marker code
            let mut code = self.read_next_byte()?;
            while code == 0xFF {
                code = self.read_next_byte()?;
            }
            if code == 0x00 {
                // Stuffed zero outside of a scan, keep looking
                discarded += 2;
                continue;
            }

            if discarded > 0 {
                warn!("Corrupt JPEG data: {discarded} extraneous bytes before marker 0x{code:02x}");
            }
            return Self::to_marker(0xFF00 | code as u16);
        }
    }

    /// Reads the length word of a marker segment and returns the payload size.
    pub fn read_segment_length(&mut self) -> Result<usize> {
        let length = self.read_next_word()? as usize;
        let payload = length
            .checked_sub(2)
            .ok_or(Error::Malformed("Marker segment length is too small"))?;
        if payload > self.remaining() {
            return Err(Error::Malformed("JPEG marker with length contained a length longer than the remaining size of the JPEG file"));
        }
        Ok(payload)
    }

    pub fn skip_marker_with_length(&mut self) -> Result<()> {
        let payload = self.read_segment_length()?;
        self.cursor.set_position(self.position() + payload as u64);
        Ok(())
    }

    /// Reads entropy-coded bytes up to the next marker, removing byte stuffing.
    pub fn read_entropy_segment(&mut self, data: &mut Vec<u8>) -> SegmentEnd {
        data.clear();
        loop {
            let Ok(byte) = self.cursor.read_u8() else {
                return SegmentEnd::EndOfInput;
            };
            if byte != 0xFF {
                data.push(byte);
                continue;
            }

            let marker_start = self.position() - 1;
            let mut code = 0xFF;
            while code == 0xFF {
                match self.cursor.read_u8() {
                    Ok(next) => code = next,
                    Err(_) => return SegmentEnd::EndOfInput,
                }
            }
            match code {
                0x00 => data.push(0xFF),
                0xD0..=0xD7 => return SegmentEnd::Restart(code - 0xD0),
                _ => {
                    self.cursor.set_position(marker_start);
                    return SegmentEnd::Marker;
                }
            }
        }
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn remaining(&self) -> usize {
        self.cursor
            .get_ref()
            .len()
            .saturating_sub(self.position() as usize)
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }
}
