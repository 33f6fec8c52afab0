use std::fmt::Debug;
use std::io::Write;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pgx::SampleByteOrder;

mod private {
    pub trait Sealed {}
}

/// Storage unit of one decoded sample. `u8` holds 8-bit data and `u16` holds 12-bit data.
pub trait Sample: private::Sealed + Copy + Default + Debug + PartialEq + 'static {
    /// Number of bytes one sample occupies in a raw PGX file.
    const BYTES: usize;
    /// Largest sample precision this storage unit can hold.
    const MAX_PRECISION: u8;

    /// Converts an already range-limited sample level.
    fn from_level(level: i32) -> Self;

    /// Writes a run of samples in the given byte order.
    fn write_row<W: Write>(row: &[Self], order: SampleByteOrder, out: &mut W) -> std::io::Result<()>;
}

impl private::Sealed for u8 {}
impl Sample for u8 {
    const BYTES: usize = 1;
    const MAX_PRECISION: u8 = 8;

    fn from_level(level: i32) -> Self {
        level as u8
    }

    fn write_row<W: Write>(row: &[Self], _order: SampleByteOrder, out: &mut W) -> std::io::Result<()> {
        out.write_all(row)
    }
}

impl private::Sealed for u16 {}
impl Sample for u16 {
    const BYTES: usize = 2;
    const MAX_PRECISION: u8 = 16;

    fn from_level(level: i32) -> Self {
        level as u16
    }

    fn write_row<W: Write>(row: &[Self], order: SampleByteOrder, out: &mut W) -> std::io::Result<()> {
        let mut bytes = vec![0u8; row.len() * Self::BYTES];
        match order {
            SampleByteOrder::BigEndian => BigEndian::write_u16_into(row, &mut bytes),
            SampleByteOrder::LittleEndian => LittleEndian::write_u16_into(row, &mut bytes),
        }
        out.write_all(&bytes)
    }
}

/// One component's decoded samples on its padded block grid.
pub struct Plane<S: Sample> {
    width: usize,
    height: usize,
    data: Vec<S>,
}

impl<S: Sample> Debug for Plane<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Plane<{}B> {}x{}", S::BYTES, self.width, self.height)
    }
}

impl<S: Sample> Plane<S> {
    /// Allocates a zeroed `width` x `height` plane. Running out of memory is reported, not fatal
    /// to the process.
    pub fn allocate(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyPlane(width, height));
        }
        let total_size = width
            .checked_mul(height)
            .filter(|size| size.checked_mul(S::BYTES).is_some())
            .ok_or(Error::PlaneTooLarge(width, height))?;

        debug!(width, height, "allocating sample plane");
        let mut data = Vec::new();
        data.try_reserve_exact(total_size)?;
        data.resize(total_size, S::default());

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Padded width in samples.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Padded height in samples.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row `y` of the plane, including trailing padding.
    pub fn row(&self, y: usize) -> &[S] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// All samples, row-major.
    pub fn samples(&self) -> &[S] {
        &self.data
    }

    /// Builds the row index table handed to the decoder: one mutable view per padded row.
    pub fn row_table(&mut self) -> Result<Vec<&mut [S]>> {
        let mut rows = Vec::new();
        rows.try_reserve_exact(self.height)?;
        rows.extend(self.data.chunks_exact_mut(self.width));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_table_covers_every_padded_row() {
        let mut plane = Plane::<u8>::allocate(16, 24).unwrap();
        {
            let mut rows = plane.row_table().unwrap();
            assert_eq!(rows.len(), 24);
            assert!(rows.iter().all(|row| row.len() == 16));
            rows[3][5] = 42;
            rows[23][15] = 7;
        }
        assert_eq!(plane.row(3)[5], 42);
        assert_eq!(plane.samples()[16 * 3 + 5], 42);
        assert_eq!(plane.row(23)[15], 7);
    }

    #[test]
    fn rejects_empty_and_oversized_planes() {
        assert!(matches!(
            Plane::<u8>::allocate(0, 8),
            Err(Error::EmptyPlane(0, 8))
        ));
        assert!(matches!(
            Plane::<u16>::allocate(usize::MAX / 2, 2),
            Err(Error::PlaneTooLarge(..))
        ));
    }

    #[test]
    fn wide_samples_follow_the_requested_byte_order() {
        let row = [0x0800u16, 0x0FFF];
        let mut big = vec![];
        let mut little = vec![];
        u16::write_row(&row, SampleByteOrder::BigEndian, &mut big).unwrap();
        u16::write_row(&row, SampleByteOrder::LittleEndian, &mut little).unwrap();

        assert_eq!(big, [0x08, 0x00, 0x0F, 0xFF]);
        assert_eq!(little, [0x00, 0x08, 0xFF, 0x0F]);
    }
}
