mod header;
mod idct;
mod jpeg_core;
mod jpeg_reader;

use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    image::{RawDecoder, RawImageInfo},
    plane::Sample,
};
use header::HeaderInfo;
use jpeg_core::ComponentState;

/// Coefficients of a component no scan touched decode to mid-gray.
const EMPTY_QUANT: [u16; 64] = [0; 64];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Start,
    HeaderRead,
    Decompressing,
    Finished,
    Aborted,
}

/// Raw-data decoder for sequential Huffman-coded JPEG streams (SOF0 and SOF1, 8 or 12 bits).
///
/// The whole entropy-coded stream is decoded by `start_decompress`; `read_raw_data` then runs
/// the inverse DCT one iMCU row at a time into the caller's buffers.
pub struct JPEGDecoder<'data> {
    core: jpeg_core::JPEGDecoder<'data>,
    header: Option<HeaderInfo>,
    components: Vec<ComponentState>,
    output_scanline: usize,
    state: DecoderState,
}

impl<'data> JPEGDecoder<'data> {
    /// Initializes the JPEG decoder from a byte slice
    pub fn new(image_data: &'data [u8]) -> Self {
        Self {
            core: jpeg_core::JPEGDecoder::new(image_data),
            header: None,
            components: vec![],
            output_scanline: 0,
            state: DecoderState::Start,
        }
    }

    /// Number of output lines handed out so far.
    pub fn output_scanline(&self) -> usize {
        self.output_scanline
    }
}

impl RawDecoder for JPEGDecoder<'_> {
    fn read_header(&mut self) -> Result<RawImageInfo> {
        if self.state != DecoderState::Start {
            return Err(Error::InvalidState("read_header called twice"));
        }

        let header = self.core.parse()?;
        let info = header.raw_image_info();
        debug!(
            width = info.size.0,
            height = info.size.1,
            precision = info.precision,
            components = info.components.len(),
            "read JPEG header"
        );
        self.header = Some(header);
        self.state = DecoderState::HeaderRead;
        Ok(info)
    }

    fn start_decompress(&mut self) -> Result<()> {
        if self.state != DecoderState::HeaderRead {
            return Err(Error::InvalidState("start_decompress called before read_header"));
        }
        let header = self
            .header
            .as_mut()
            .ok_or(Error::InvalidState("Header missing"))?;

        self.components = jpeg_core::JPEGDecoder::allocate_components(header)?;
        self.core.read_scans(header, &mut self.components)?;
        self.output_scanline = 0;
        self.state = DecoderState::Decompressing;
        Ok(())
    }

    fn read_raw_data<S: Sample>(
        &mut self,
        data: &mut [&mut [&mut [S]]],
        max_lines: usize,
    ) -> Result<usize> {
        if self.state != DecoderState::Decompressing {
            return Err(Error::InvalidState("read_raw_data called outside of decompression"));
        }
        let header = self
            .header
            .as_ref()
            .ok_or(Error::InvalidState("Header missing"))?;
        let precision = header.frame_info.precision;
        let (_, height) = header.image_size();
        let lines = header.mcu_info.mcu_size.1;

        if S::MAX_PRECISION < precision {
            return Err(Error::InvalidState("Sample type is too narrow for the image precision"));
        }
        if self.output_scanline >= height {
            warn!("Application transferred too many scanlines");
            return Ok(0);
        }
        if max_lines < lines {
            return Err(Error::InvalidState("Buffer passed to read_raw_data is too small"));
        }
        if data.len() != self.components.len() {
            return Err(Error::InvalidState("One row table is needed per component"));
        }

        let imcu_row = self.output_scanline / lines;
        let mut samples = [0i32; 64];
        for (state, rows) in self.components.iter().zip(data.iter_mut()) {
            let quant = state.quant_table.as_ref().unwrap_or(&EMPTY_QUANT);
            let (blocks_wide, blocks_high) = state.size_in_blocks;
            let v = state.sampling_factor.1 as usize;
            let first_block_row = imcu_row * v;
            // The last iMCU row may cover fewer block rows than the sampling factor
            let block_rows = v.min(blocks_high.saturating_sub(first_block_row));

            for block_row in 0..block_rows {
                for block_x in 0..blocks_wide {
                    let block = state.coefficients.block(block_x, first_block_row + block_row);
                    idct::idct_islow(block, quant, precision, &mut samples);

                    for (y, levels) in samples.chunks_exact(8).enumerate() {
                        let row = rows
                            .get_mut(block_row * 8 + y)
                            .ok_or(Error::InvalidState("Too few rows for an iMCU row"))?;
                        let out = row
                            .get_mut(block_x * 8..block_x * 8 + 8)
                            .ok_or(Error::InvalidState("Row is narrower than the component"))?;
                        for (sample, &level) in out.iter_mut().zip(levels) {
                            *sample = S::from_level(level);
                        }
                    }
                }
            }
        }

        self.output_scanline += lines;
        Ok(lines)
    }

    fn finish_decompress(&mut self) -> Result<()> {
        if self.state != DecoderState::Decompressing {
            return Err(Error::InvalidState("finish_decompress called outside of decompression"));
        }
        let height = self.header.as_ref().map_or(0, |header| header.image_size().1);
        if self.output_scanline < height {
            return Err(Error::InvalidState("Application transferred too few scanlines"));
        }

        self.components = vec![];
        self.state = DecoderState::Finished;
        Ok(())
    }

    fn abort_decompress(&mut self) {
        debug!(output_scanline = self.output_scanline, "aborting decompression");
        self.components = vec![];
        self.state = DecoderState::Aborted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Baseline stream with one all-ones quantization table and single-code Huffman tables, so
    /// that every zero bit codes an all-zero block.
    fn zero_coded_jpeg(width: u16, height: u16, luma_sampling: u8, components: u8, scan_data: &[u8]) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8];
        data.extend([0xFF, 0xDB, 0, 67, 0x00]);
        data.extend([1u8; 64]);

        data.extend([0xFF, 0xC0, 0, 8 + 3 * components, 8]);
        data.extend(height.to_be_bytes());
        data.extend(width.to_be_bytes());
        data.push(components);
        for id in 1..=components {
            let sampling = if id == 1 { luma_sampling } else { 0x11 };
            data.extend([id, sampling, 0]);
        }

        for class in [0x00, 0x10] {
            data.extend([0xFF, 0xC4, 0, 20, class, 1]);
            data.extend([0u8; 15]);
            data.push(0);
        }

        data.extend([0xFF, 0xDA, 0, 6 + 2 * components, components]);
        for id in 1..=components {
            data.extend([id, 0x00]);
        }
        data.extend([0, 63, 0]);
        data.extend(scan_data);
        data.extend([0xFF, 0xD9]);
        data
    }

    /// Grayscale 16x8 stream with two blocks whose DC values are +16 and -8 relative to the
    /// previous block, optionally separated by a restart marker.
    fn two_block_gray(restart: bool) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8];
        data.extend([0xFF, 0xDB, 0, 67, 0x00]);
        data.extend([1u8; 64]);
        data.extend([0xFF, 0xC0, 0, 11, 8, 0, 8, 0, 16, 1, 1, 0x11, 0]);
        // DC: "00" -> 4, "01" -> 5
        data.extend([0xFF, 0xC4, 0, 21, 0x00, 0, 2]);
        data.extend([0u8; 14]);
        data.extend([4, 5]);
        // AC: "0" -> EOB
        data.extend([0xFF, 0xC4, 0, 20, 0x10, 1]);
        data.extend([0u8; 15]);
        data.push(0);
        if restart {
            data.extend([0xFF, 0xDD, 0, 4, 0, 1]);
        }
        data.extend([0xFF, 0xDA, 0, 8, 1, 1, 0x00, 0, 63, 0]);
        data.push(0b0110_0000);
        if restart {
            data.extend([0xFF, 0xD0]);
        }
        data.push(0b0001_1101);
        data.extend([0xFF, 0xD9]);
        data
    }

    fn decode_gray(data: &[u8]) -> Vec<u8> {
        let mut decoder = JPEGDecoder::new(data);
        let info = decoder.read_header().unwrap();
        assert_eq!(info.size, (16, 8));
        decoder.start_decompress().unwrap();

        let mut samples = vec![0u8; 16 * 8];
        let mut rows: Vec<&mut [u8]> = samples.chunks_exact_mut(16).collect();
        let mut tables: [&mut [&mut [u8]]; 1] = [&mut rows];
        assert_eq!(decoder.read_raw_data(&mut tables, 8).unwrap(), 8);
        decoder.finish_decompress().unwrap();
        samples
    }

    #[test]
    fn decodes_dc_prediction_chain() {
        let samples = decode_gray(&two_block_gray(false));
        // DC 16 and 8, divided by 8
        assert!(samples.chunks_exact(16).all(|row| row[..8] == [130; 8] && row[8..] == [129; 8]));
    }

    #[test]
    fn restart_resets_prediction() {
        let samples = decode_gray(&two_block_gray(true));
        // Second block restarts from 0: DC -8
        assert!(samples.chunks_exact(16).all(|row| row[..8] == [130; 8] && row[8..] == [127; 8]));
    }

    #[test]
    fn raw_420_rows() {
        let data = zero_coded_jpeg(17, 9, 0x22, 3, &[0, 0, 0]);
        let mut decoder = JPEGDecoder::new(&data);
        let info = decoder.read_header().unwrap();
        assert_eq!(info.max_sampling_factor, (2, 2));
        assert_eq!(info.components[0].size_in_blocks, (3, 2));
        assert_eq!(info.components[1].size_in_blocks, (2, 1));
        decoder.start_decompress().unwrap();

        let mut luma = vec![0u8; 24 * 16];
        let mut cb = vec![0u8; 16 * 8];
        let mut cr = vec![0u8; 16 * 8];
        let mut luma_rows: Vec<&mut [u8]> = luma.chunks_exact_mut(24).collect();
        let mut cb_rows: Vec<&mut [u8]> = cb.chunks_exact_mut(16).collect();
        let mut cr_rows: Vec<&mut [u8]> = cr.chunks_exact_mut(16).collect();
        let mut tables: [&mut [&mut [u8]]; 3] = [&mut luma_rows, &mut cb_rows, &mut cr_rows];

        assert_eq!(decoder.read_raw_data(&mut tables, 16).unwrap(), 16);
        assert_eq!(decoder.output_scanline(), 16);
        assert_eq!(decoder.read_raw_data(&mut tables, 16).unwrap(), 0);
        decoder.finish_decompress().unwrap();
        drop(tables);

        assert!(luma.iter().chain(&cb).chain(&cr).all(|&sample| sample == 128));
    }

    #[test]
    fn twelve_bit_samples() {
        let mut data = zero_coded_jpeg(8, 8, 0x11, 1, &[0]);
        // SOF1, 12-bit, 16-bit quantization table
        data[2..7].copy_from_slice(&[0xFF, 0xDB, 0, 131, 0x10]);
        let mut table = vec![];
        for _ in 0..64 {
            table.extend([0, 1]);
        }
        data.splice(7..71, table);
        let sof = data.iter().position(|&b| b == 0xC0).unwrap();
        data[sof] = 0xC1;
        data[sof + 3] = 12;

        let mut decoder = JPEGDecoder::new(&data);
        assert_eq!(decoder.read_header().unwrap().precision, 12);
        decoder.start_decompress().unwrap();

        let mut samples = vec![0u16; 64];
        let mut rows: Vec<&mut [u16]> = samples.chunks_exact_mut(8).collect();
        let mut tables: [&mut [&mut [u16]]; 1] = [&mut rows];
        assert!(matches!(
            decoder.read_raw_data::<u8>(&mut [], 8),
            Err(Error::InvalidState(_))
        ));
        assert_eq!(decoder.read_raw_data(&mut tables, 8).unwrap(), 8);
        decoder.finish_decompress().unwrap();
        drop(tables);

        assert!(samples.iter().all(|&sample| sample == 2048));
    }

    #[test]
    fn call_order_is_enforced() {
        let data = zero_coded_jpeg(8, 8, 0x11, 1, &[0]);
        let mut decoder = JPEGDecoder::new(&data);
        assert!(matches!(decoder.start_decompress(), Err(Error::InvalidState(_))));

        decoder.read_header().unwrap();
        decoder.start_decompress().unwrap();
        assert!(matches!(decoder.finish_decompress(), Err(Error::InvalidState(_))));

        let mut samples = vec![0u8; 64];
        let mut rows: Vec<&mut [u8]> = samples.chunks_exact_mut(8).collect();
        let mut tables: [&mut [&mut [u8]]; 1] = [&mut rows];
        assert!(matches!(
            decoder.read_raw_data(&mut tables, 4),
            Err(Error::InvalidState(_))
        ));

        decoder.abort_decompress();
        assert!(matches!(
            decoder.read_raw_data(&mut tables, 8),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn truncated_scan_is_malformed() {
        // Six blocks need twelve bits
        let mut data = zero_coded_jpeg(16, 16, 0x22, 3, &[0]);
        data.truncate(data.len() - 2);

        let mut decoder = JPEGDecoder::new(&data);
        decoder.read_header().unwrap();
        assert!(matches!(decoder.start_decompress(), Err(Error::Malformed(_))));
    }

    #[test]
    fn progressive_is_unsupported() {
        let mut data = zero_coded_jpeg(8, 8, 0x11, 1, &[0]);
        let sof = data.iter().position(|&b| b == 0xC0).unwrap();
        data[sof] = 0xC2;

        let mut decoder = JPEGDecoder::new(&data);
        assert!(matches!(decoder.read_header(), Err(Error::UnsupportedFeature(_))));
    }
}
