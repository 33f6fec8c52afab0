use crate::error::{Error, Result};

/// Bitstream reader over one entropy-coded segment. Byte stuffing has already been removed, so
/// bits are read MSB first straight out of the buffer.
#[derive(Debug)]
pub struct Bitstream<'data> {
    data: &'data [u8],
    byte_cursor: usize,
    bit_cursor: u8,
}

impl<'data> Bitstream<'data> {
    /// Creates a new bitstream.
    pub fn new(data: &'data [u8]) -> Self {
        Self {
            data,
            byte_cursor: 0,
            bit_cursor: 0,
        }
    }

    /// Reads a single bit.
    pub fn read_bit(&mut self) -> Result<u32> {
        let current_byte = *self
            .data
            .get(self.byte_cursor)
            .ok_or(Error::Malformed("Entropy-coded segment ended prematurely"))?;
        let bit = 1u8 & (current_byte >> (7 - self.bit_cursor));

        self.bit_cursor += 1;
        if self.bit_cursor == 8 {
            self.byte_cursor += 1;
            self.bit_cursor = 0;
        }
        Ok(bit as u32)
    }

    /// Reads up to 16 bits out of the bitstream and returns them in a u32.
    pub fn read_bits(&mut self, bits: u8) -> Result<u32> {
        if bits > 16 {
            return Err(Error::InvalidState("Can't read more than 16 bits at a time"));
        }

        let mut value = 0u32;
        for _ in 0..bits {
            value = (value << 1) | self.read_bit()?;
        }
        Ok(value)
    }

    /// RECEIVE followed by EXTEND (ITU T.81 F.2.2.1): reads a `size`-bit magnitude category value
    /// and maps it to its signed coefficient.
    pub fn receive_extend(&mut self, size: u8) -> Result<i32> {
        if size == 0 {
            return Ok(0);
        }

        let value = self.read_bits(size)? as i32;
        // If MSB is 0 then negative. 1 is positive
        if value < (1 << (size - 1)) {
            Ok(value - (1 << size) + 1)
        } else {
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_msb_first() {
        let data = [0b1010_0000, 0xFF];
        let mut bits = Bitstream::new(&data);

        assert_eq!(bits.read_bit().unwrap(), 1);
        assert_eq!(bits.read_bits(3).unwrap(), 0b010);
        assert_eq!(bits.read_bits(8).unwrap(), 0b0000_1111);
        assert_eq!(bits.read_bits(4).unwrap(), 0b1111);
        assert!(bits.read_bit().is_err());
    }

    #[test]
    fn extends_negative_values() {
        // 0111 in category 4 is -8, 10000 in category 5 is +16
        let data = [0b0111_1000, 0b0000_0000];
        let mut bits = Bitstream::new(&data);

        assert_eq!(bits.receive_extend(4).unwrap(), -8);
        assert_eq!(bits.receive_extend(5).unwrap(), 16);
        assert_eq!(bits.receive_extend(0).unwrap(), 0);
    }
}
