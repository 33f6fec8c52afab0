use tracing::{debug, warn};

use crate::{
    bitstream::Bitstream,
    error::{Error, Result},
    jpeg::header::*,
    jpeg::jpeg_reader::{JPEGMarker, JPEGParser, SegmentEnd},
};

#[rustfmt::skip]
pub const ZIGZAG_MAP: &'static [(u8, u8)] =
    &[(0, 0), (0, 1), (1, 0), (2, 0), (1, 1), (0, 2), (0, 3), (1, 2),
          (2, 1), (3, 0), (4, 0), (3, 1), (2, 2), (1, 3), (0, 4), (0, 5),
          (1, 4), (2, 3), (3, 2), (4, 1), (5, 0), (6, 0), (5, 1), (4, 2),
          (3, 3), (2, 4), (1, 5), (0, 6), (0, 7), (1, 6), (2, 5), (3, 4),
          (4, 3), (5, 2), (6, 1), (7, 0), (7, 1), (6, 2), (5, 3), (4, 4),
          (3, 5), (2, 6), (1, 7), (2, 7), (3, 6), (4, 5), (5, 4), (6, 3),
          (7, 2), (7, 3), (6, 4), (5, 5), (4, 6), (3, 7), (4, 7), (5, 6),
          (6, 5), (7, 4), (7, 5), (6, 6), (5, 7), (6, 7), (7, 6), (7, 7)];

/// Quantized DCT coefficients of one component in natural order, on a block grid padded to
/// whole MCUs.
#[derive(Debug)]
pub struct CoefficientBuffer {
    blocks_wide: usize,
    blocks: Vec<[i16; 64]>,
}

impl CoefficientBuffer {
    pub fn allocate(blocks_wide: usize, blocks_high: usize) -> Result<Self> {
        let count = blocks_wide
            .checked_mul(blocks_high)
            .ok_or(Error::PlaneTooLarge(blocks_wide * 8, blocks_high * 8))?;
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(count)?;
        blocks.resize(count, [0; 64]);
        Ok(Self {
            blocks_wide,
            blocks,
        })
    }

    pub fn block(&self, x: usize, y: usize) -> &[i16; 64] {
        &self.blocks[y * self.blocks_wide + x]
    }

    pub fn block_mut(&mut self, x: usize, y: usize) -> &mut [i16; 64] {
        &mut self.blocks[y * self.blocks_wide + x]
    }
}

/// Decoding state of one frame component.
#[derive(Debug)]
pub struct ComponentState {
    pub size_in_blocks: (usize, usize),
    pub sampling_factor: (u8, u8),
    /// Latched when the component's first scan starts
    pub quant_table: Option<[u16; 64]>,
    pub coefficients: CoefficientBuffer,
    dc_prediction: i32,
}

impl ComponentState {
    /// Decodes one block (ITU T.81 F.2.2) into the coefficient buffer.
    fn decode_block(
        &mut self,
        bitstream: &mut Bitstream,
        dc_table: &HuffmanTable,
        ac_table: &HuffmanTable,
        block_x: usize,
        block_y: usize,
    ) -> Result<()> {
        let block = self.coefficients.block_mut(block_x, block_y);
        block.fill(0);

        // Calculate DC coefficient
        // https://www.w3.org/Graphics/JPEG/itu-t81.pdf
        // F.2.2.1 Page 104
        let dc_code = decode_next_value(bitstream, dc_table)?; // DECODE
        if dc_code > 15 {
            return Err(Error::Malformed("DC difference category out of range"));
        }
        let diff = bitstream.receive_extend(dc_code)?; // RECEIVE, EXTEND
        self.dc_prediction += diff;
        block[0] = self.dc_prediction as i16;

        // Calculate AC coefficients
        // F.13 Page 106
        let mut k = 1;
        while k < 64 {
            let huffman_val = decode_next_value(bitstream, ac_table)?;
            let run_length = (huffman_val >> 4) as usize;
            let code_length = huffman_val & 0b1111;

            if code_length == 0 {
                if run_length == 15 {
                    k += 16; // ZRL
                    continue;
                }
                break; // EOB
            }

            k += run_length;
            if k > 63 {
                return Err(Error::Malformed("Run length exceeds max K of 63"));
            }
            let (row, col) = ZIGZAG_MAP[k];
            block[row as usize * 8 + col as usize] = bitstream.receive_extend(code_length)? as i16;
            k += 1;
        }
        Ok(())
    }
}

/// DECODE procedure of ITU T.81 F.2.2.3.
fn decode_next_value(bitstream: &mut Bitstream, table: &HuffmanTable) -> Result<u8> {
    let mut code = 0i32;
    for length in 1..=16 {
        code = (code << 1) | bitstream.read_bit()? as i32;
        if code <= table.max_code[length] {
            let index = (table.value_offset[length] + code) as usize;
            return table
                .symbols
                .get(index)
                .copied()
                .ok_or(Error::Malformed("Huffman code points past the symbol table"));
        }
    }

    Err(Error::Malformed("Corrupt Huffman code"))
}

/// A component taking part in the current scan.
struct ScanTarget<'tables> {
    index: usize,
    dc_table: &'tables HuffmanTable,
    ac_table: &'tables HuffmanTable,
}

pub struct JPEGDecoder<'data> {
    reader: JPEGParser<'data>,
}

impl<'data> JPEGDecoder<'data> {
    pub fn new(data: &'data [u8]) -> Self {
        Self {
            reader: JPEGParser::new(data),
        }
    }

    pub fn parse(&mut self) -> Result<HeaderInfo> {
        HeaderInfo::read_header_info(&mut self.reader)
    }

    /// Allocates the coefficient buffers of every frame component.
    pub fn allocate_components(header: &HeaderInfo) -> Result<Vec<ComponentState>> {
        let (mcus_x, mcus_y) = header.mcu_info.mcu_dimensions;
        header
            .frame_info
            .components
            .iter()
            .map(|component| {
                let (h, v) = component.xy_sampling_factor;
                Ok(ComponentState {
                    size_in_blocks: header.size_in_blocks(component),
                    sampling_factor: (h, v),
                    quant_table: None,
                    coefficients: CoefficientBuffer::allocate(
                        mcus_x * h as usize,
                        mcus_y * v as usize,
                    )?,
                    dc_prediction: 0,
                })
            })
            .collect()
    }

    /// Decodes the scan whose header `read_header_info` left off at, then every following scan
    /// until EOI.
    pub fn read_scans(
        &mut self,
        header: &mut HeaderInfo,
        components: &mut [ComponentState],
    ) -> Result<()> {
        let mut scan = header.scan_info.clone();
        let mut scan_count = 0;
        loop {
            header.validate_scan(&scan)?;
            self.read_scan(header, &scan, components)?;
            scan_count += 1;

            match self.next_scan(&mut header.tables)? {
                Some(next) => scan = next,
                None => break,
            }
        }
        debug!(scan_count, "all scans decoded");

        for (index, component) in components.iter().enumerate() {
            if component.quant_table.is_none() {
                warn!("Component {index} is not coded by any scan");
            }
        }
        Ok(())
    }

    /// Consumes the markers between scans. Returns the next scan header, or None at EOI.
    fn next_scan(&mut self, tables: &mut Tables) -> Result<Option<ScanInfo>> {
        loop {
            if self.reader.is_at_end() {
                warn!("Premature end of JPEG file");
                return Ok(None);
            }

            let marker = self.reader.read_next_marker()?;
            match marker {
                JPEGMarker::SOS => return Ok(Some(ScanInfo::read_start_of_scan(&mut self.reader)?)),
                JPEGMarker::EOI => return Ok(None),
                JPEGMarker::TEM => {}
                _ if marker.restart_index().is_some() => {
                    warn!("Corrupt JPEG data: restart marker {marker:?} outside of a scan");
                }
                JPEGMarker::SOI
                | JPEGMarker::SOF0
                | JPEGMarker::SOF1
                | JPEGMarker::SOF2
                | JPEGMarker::SOF3 => {
                    return Err(Error::Malformed("Unexpected frame marker between scans"))
                }
                _ => {
                    if !tables.read_table_marker(&mut self.reader, marker)? {
                        self.reader.skip_marker_with_length()?;
                    }
                }
            }
        }
    }

    fn read_scan(
        &mut self,
        header: &HeaderInfo,
        scan: &ScanInfo,
        components: &mut [ComponentState],
    ) -> Result<()> {
        let mut targets = Vec::with_capacity(scan.components.len());
        for scan_component in &scan.components {
            let index = header.component_index(scan_component.selector)?;
            let dc_table = header
                .tables
                .dc_huff_tables
                .get(&scan_component.dc_table)
                .ok_or(Error::Malformed("Huffman table not defined"))?;
            let ac_table = header
                .tables
                .ac_huff_tables
                .get(&scan_component.ac_table)
                .ok_or(Error::Malformed("Huffman table not defined"))?;

            let state = &mut components[index];
            if state.quant_table.is_none() {
                let qtable_id = header.frame_info.components[index].qtable_id;
                let table = header
                    .tables
                    .quant_tables
                    .get(&qtable_id)
                    .ok_or(Error::Malformed("Quantization table not defined"))?;
                state.quant_table = Some(table.table);
            }

            targets.push(ScanTarget {
                index,
                dc_table,
                ac_table,
            });
        }

        // A single-component scan is never interleaved: its MCU is one block.
        let interleaved = targets.len() > 1;
        let (mcus_x, mcus_y) = if interleaved {
            header.mcu_info.mcu_dimensions
        } else {
            components[targets[0].index].size_in_blocks
        };
        let total_mcus = mcus_x * mcus_y;
        let interval = match header.tables.restart_interval {
            0 => total_mcus,
            n => n as usize,
        };
        debug!(
            components = targets.len(),
            mcus = total_mcus,
            restart_interval = header.tables.restart_interval,
            "decoding scan"
        );

        let mut segment = Vec::new();
        let mut expected_restart = 0u8;
        let mut mcu = 0;
        while mcu < total_mcus {
            let end = self.reader.read_entropy_segment(&mut segment);
            let mut bitstream = Bitstream::new(&segment);
            for target in &targets {
                components[target.index].dc_prediction = 0;
            }

            let last = (mcu + interval).min(total_mcus);
            for mcu_index in mcu..last {
                let (mcu_x, mcu_y) = (mcu_index % mcus_x, mcu_index / mcus_x);
                for target in &targets {
                    let state = &mut components[target.index];
                    if !interleaved {
                        state.decode_block(
                            &mut bitstream,
                            target.dc_table,
                            target.ac_table,
                            mcu_x,
                            mcu_y,
                        )?;
                        continue;
                    }

                    let (h, v) = state.sampling_factor;
                    for block_row in 0..v as usize {
                        for block_col in 0..h as usize {
                            state.decode_block(
                                &mut bitstream,
                                target.dc_table,
                                target.ac_table,
                                mcu_x * h as usize + block_col,
                                mcu_y * v as usize + block_row,
                            )?;
                        }
                    }
                }
            }
            mcu = last;

            match end {
                SegmentEnd::Restart(index) if mcu < total_mcus => {
                    if index != expected_restart {
                        warn!("Corrupt JPEG data: found RST{index}, expected RST{expected_restart}");
                    }
                    expected_restart = (expected_restart + 1) % 8;
                }
                _ if mcu < total_mcus => return Err(Error::Malformed("Missing restart marker")),
                SegmentEnd::Restart(index) => {
                    warn!("Corrupt JPEG data: RST{index} after the last MCU of the scan");
                }
                SegmentEnd::Marker | SegmentEnd::EndOfInput => {}
            }
        }
        Ok(())
    }
}
