use std::collections::HashMap;

use tracing::debug;

use crate::{
    dimensions::{blocks_for, clipped_extent},
    error::{Error, Result},
    image::{ComponentInfo, RawImageInfo},
    jpeg::jpeg_reader::*,
};

use super::jpeg_core::ZIGZAG_MAP;

/// Largest number of blocks a single MCU may hold (ITU T.81 B.2.3).
const MAX_BLOCKS_IN_MCU: usize = 10;
/// Largest number of components in one scan.
const MAX_COMPONENTS_IN_SCAN: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanTableType {
    #[default]
    Ac,
    Dc,
}

/// Defines a JPEG huffman table
#[derive(Debug, Default, Clone)]
pub struct HuffmanTable {
    pub table_type: HuffmanTableType,
    pub destination_id: u8,
    pub bitcode_counts: [u8; 16],
    pub symbols: Vec<u8>,
    /// Largest code of each length, -1 if the length is unused. Indexed by length.
    pub max_code: [i32; 17],
    /// `symbols` index of the first code of each length minus that code.
    pub value_offset: [i32; 17],
}

impl HuffmanTable {
    /// Builds the decoding tables of ITU T.81 F.2.2.3 from the code length counts.
    fn generate_codes(&mut self) -> Result<()> {
        let mut code = 0i32;
        let mut symbol_index = 0i32;
        for length in 1..=16 {
            let count = self.bitcode_counts[length - 1] as i32;
            if count == 0 {
                self.max_code[length] = -1;
            } else {
                self.value_offset[length] = symbol_index - code;
                code += count;
                symbol_index += count;
                self.max_code[length] = code - 1;
            }
            if code > (1 << length) {
                return Err(Error::Malformed("Bogus Huffman table definition"));
            }
            code <<= 1;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QuantizationTable {
    /// Quantizer steps in natural (row-major) order
    pub table: [u16; 64],
}

#[derive(Debug, Default, Clone)]
pub struct FrameComponent {
    pub identifier: u8,
    pub xy_sampling_factor: (u8, u8),
    pub qtable_id: u8,
}

#[derive(Debug, Default, Clone)]
pub struct ScanComponent {
    pub selector: u8,
    pub dc_table: u8,
    pub ac_table: u8,
}

#[derive(Debug, Default, Clone)]
pub struct ScanInfo {
    pub components: Vec<ScanComponent>,
    pub spectral_selection: (u8, u8),
    pub successive_approximation: u8,
}

#[derive(Debug, Default)]
pub struct FrameInfo {
    pub precision: u8,
    pub image_size: (u16, u16),
    pub components: Vec<FrameComponent>,
}

#[derive(Debug, Default)]
pub struct MCUInfo {
    pub max_xy_sampling_factor: (u8, u8),
    pub mcu_size: (usize, usize),
    /// Number of MCUs across and down in an interleaved scan
    pub mcu_dimensions: (usize, usize),
}

/// Tables that may be redefined between scans.
#[derive(Debug, Default)]
pub struct Tables {
    pub ac_huff_tables: HashMap<u8, HuffmanTable>,
    pub dc_huff_tables: HashMap<u8, HuffmanTable>,
    pub quant_tables: HashMap<u8, QuantizationTable>,
    pub restart_interval: u16,
}

#[derive(Debug, Default)]
pub struct HeaderInfo {
    pub frame_info: FrameInfo,
    pub scan_info: ScanInfo,
    pub tables: Tables,
    pub header_length: usize,
    pub mcu_info: MCUInfo,
}

impl Tables {
    fn read_quantization_tables(&mut self, reader: &mut JPEGParser) -> Result<()> {
        let struct_size = reader.read_segment_length()?;

        let end_of_table = reader.position() + struct_size as u64;
        while reader.position() < end_of_table {
            let table_info = reader.read_next_byte()?;
            let precision = table_info >> 4;
            let destination_id = table_info & 0x0F;
            if destination_id > 3 {
                return Err(Error::Malformed("Quantization table id out of range"));
            }

            let mut zagged_table = [0u16; 64];
            for value in zagged_table.iter_mut() {
                *value = match precision {
                    0 => reader.read_next_byte()? as u16,
                    1 => reader.read_next_word()?,
                    _ => return Err(Error::Malformed("Invalid precision value")),
                }
            }

            let mut table = [0u16; 64];
            for (i, value) in zagged_table.iter().enumerate() {
                let (row, col) = ZIGZAG_MAP[i];
                table[row as usize * 8 + col as usize] = *value;
            }
            debug!(destination_id, precision, "quantization table");
            self.quant_tables
                .insert(destination_id, QuantizationTable { table });
        }

        if reader.position() != end_of_table {
            return Err(Error::Malformed("Quantization table overruns its segment"));
        }
        Ok(())
    }

    fn read_huffman_tables(&mut self, reader: &mut JPEGParser) -> Result<()> {
        let struct_size = reader.read_segment_length()?;

        let end_of_table = reader.position() + struct_size as u64;
        while reader.position() < end_of_table {
            let table_info = reader.read_next_byte()?;
            let table_type = match table_info >> 4 {
                0 => Ok(HuffmanTableType::Dc),
                1 => Ok(HuffmanTableType::Ac),
                _ => Err(Error::Malformed("Invalid table type")),
            }?;

            let destination_id = table_info & 0x0F;
            if destination_id > 3 {
                return Err(Error::Malformed("Huffman table id out of range"));
            }

            let mut bitcode_counts: [u8; 16] = [0; 16];
            for count in bitcode_counts.iter_mut() {
                *count = reader.read_next_byte()?;
            }

            let size: usize = bitcode_counts
                .iter()
                .fold(0, |total, elem| total + *elem as usize);
            if size > 256 {
                return Err(Error::Malformed("Huffman table has more than 256 symbols"));
            }

            let mut symbols = vec![0u8; size];
            for symbol in symbols.iter_mut() {
                *symbol = reader.read_next_byte()?;
            }

            let mut table = HuffmanTable {
                table_type,
                destination_id,
                bitcode_counts,
                symbols,
                ..Default::default()
            };

            table.generate_codes()?;

            match table.table_type {
                HuffmanTableType::Ac => self.ac_huff_tables.insert(table.destination_id, table),
                HuffmanTableType::Dc => self.dc_huff_tables.insert(table.destination_id, table),
            };
        }

        if reader.position() != end_of_table {
            return Err(Error::Malformed("Huffman table overruns its segment"));
        }
        Ok(())
    }

    fn read_restart_interval(&mut self, reader: &mut JPEGParser) -> Result<()> {
        if reader.read_segment_length()? != 2 {
            return Err(Error::Malformed("Bogus DRI marker length"));
        }
        self.restart_interval = reader.read_next_word()?;
        debug!(interval = self.restart_interval, "restart interval");
        Ok(())
    }

    /// Handles the markers allowed both before the first scan and between scans. Returns false
    /// if `marker` is not one of them.
    pub fn read_table_marker(&mut self, reader: &mut JPEGParser, marker: JPEGMarker) -> Result<bool> {
        match marker {
            JPEGMarker::DHT => self.read_huffman_tables(reader)?,
            JPEGMarker::DQT => self.read_quantization_tables(reader)?,
            JPEGMarker::DRI => self.read_restart_interval(reader)?,
            _ if marker.is_skippable() => reader.skip_marker_with_length()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl ScanInfo {
    /// Reads data from the scan header, leaving the cursor at the start of the scan stream.
    pub fn read_start_of_scan(reader: &mut JPEGParser) -> Result<ScanInfo> {
        let struct_size = reader.read_segment_length()?;

        let component_count = reader.read_next_byte()? as usize;
        if component_count == 0 || component_count > MAX_COMPONENTS_IN_SCAN {
            return Err(Error::Malformed("Invalid number of components in scan"));
        }
        if struct_size != 4 + 2 * component_count {
            return Err(Error::Malformed("Bogus SOS marker length"));
        }

        let mut components: Vec<ScanComponent> = Vec::with_capacity(component_count);
        for _ in 0..component_count {
            let selector = reader.read_next_byte()?;
            if components.iter().any(|c| c.selector == selector) {
                return Err(Error::Malformed("Component appears twice in scan"));
            }

            let tables = reader.read_next_byte()?;
            let dc_table = tables >> 4;
            let ac_table = tables & 0x0F;

            components.push(ScanComponent {
                selector,
                dc_table,
                ac_table,
            });
        }

        let spectral_selection_start = reader.read_next_byte()?;
        let spectral_selection_end = reader.read_next_byte()?;

        let successive_approximation = reader.read_next_byte()?;

        Ok(ScanInfo {
            components,
            spectral_selection: (spectral_selection_start, spectral_selection_end),
            successive_approximation,
        })
    }
}

impl HeaderInfo {
    fn read_start_of_frame(reader: &mut JPEGParser) -> Result<FrameInfo> {
        let struct_size = reader.read_segment_length()?;

        let precision = reader.read_next_byte()?;
        if precision != 8 && precision != 12 {
            return Err(Error::UnsupportedPrecision(precision));
        }

        let height = reader.read_next_word()?;
        let width = reader.read_next_word()?;
        if height == 0 {
            return Err(Error::UnsupportedFeature("Image height defined by DNL marker"));
        }
        if width == 0 {
            return Err(Error::Malformed("Image width is zero"));
        }

        let component_count = reader.read_next_byte()? as usize;
        if component_count == 0 {
            return Err(Error::Malformed("Frame has no components"));
        }
        if struct_size != 6 + 3 * component_count {
            return Err(Error::Malformed("Bogus SOF marker length"));
        }

        let mut components: Vec<FrameComponent> = Vec::with_capacity(component_count);

        for _ in 0..component_count {
            let identifier = reader.read_next_byte()?;
            if components.iter().any(|c| c.identifier == identifier) {
                return Err(Error::Malformed("Duplicate component identifier"));
            }

            let sample_factors = reader.read_next_byte()?;
            let xy_sampling_factor = (sample_factors >> 4, sample_factors & 0x0F);
            if !(1..=4).contains(&xy_sampling_factor.0) || !(1..=4).contains(&xy_sampling_factor.1)
            {
                return Err(Error::Malformed("Invalid sampling factor"));
            }

            let qtable_id = reader.read_next_byte()?;
            if qtable_id > 3 {
                return Err(Error::Malformed("Quantization table id out of range"));
            }

            components.push(FrameComponent {
                identifier,
                xy_sampling_factor,
                qtable_id,
            })
        }

        Ok(FrameInfo {
            precision,
            image_size: (width, height),
            components,
        })
    }

    fn unsupported_process(marker: JPEGMarker) -> Error {
        match marker {
            JPEGMarker::SOF2 | JPEGMarker::SOF6 => {
                Error::UnsupportedFeature("Progressive JPEG is not supported")
            }
            JPEGMarker::SOF3 | JPEGMarker::SOF7 => {
                Error::UnsupportedFeature("Lossless JPEG is not supported")
            }
            JPEGMarker::DAC
            | JPEGMarker::SOF9
            | JPEGMarker::SOF10
            | JPEGMarker::SOF11
            | JPEGMarker::SOF13
            | JPEGMarker::SOF14
            | JPEGMarker::SOF15 => Error::UnsupportedFeature("Arithmetic coding is not supported"),
            JPEGMarker::DNL => Error::UnsupportedFeature("DNL marker is not supported"),
            _ => Error::UnsupportedFeature("Hierarchical JPEG is not supported"),
        }
    }

    /// Reads header info from a given JPEGParser. The JPEGParser is expected to be at position 0
    /// in a JPEG data stream. It returns when it find the start of scan marker, reads its header,
    /// and leaves the cursor at the scan stream.
    pub fn read_header_info(reader: &mut JPEGParser) -> Result<Self> {
        {
            let marker = JPEGParser::to_marker(reader.read_next_word()?);

            if !matches!(marker, Ok(JPEGMarker::SOI)) {
                return Err(Error::Malformed(
                    "This JPEG image does not have an SOI marker",
                ));
            }
        }

        let mut result: Self = Default::default();
        let mut frame_seen = false;

        loop {
            let marker = reader.read_next_marker()?;

            match marker {
                JPEGMarker::EOI => {
                    return Err(Error::Malformed("Unexpected EOI marker encountered."));
                }
                JPEGMarker::SOF0 | JPEGMarker::SOF1 => {
                    if frame_seen {
                        return Err(Error::Malformed("Duplicate SOF marker"));
                    }
                    result.frame_info = Self::read_start_of_frame(reader)?;
                    frame_seen = true;
                }
                JPEGMarker::SOS => {
                    if !frame_seen {
                        return Err(Error::Malformed("SOS marker before SOF"));
                    }
                    result.scan_info = ScanInfo::read_start_of_scan(reader)?;
                    result.header_length = reader.position() as usize;
                    result.compute_mcu_info();
                    return Ok(result);
                }
                JPEGMarker::SOI => return Err(Error::Malformed("Duplicate SOI marker")),
                JPEGMarker::SOF2
                | JPEGMarker::SOF3
                | JPEGMarker::SOF5
                | JPEGMarker::SOF6
                | JPEGMarker::SOF7
                | JPEGMarker::JPG
                | JPEGMarker::SOF9
                | JPEGMarker::SOF10
                | JPEGMarker::SOF11
                | JPEGMarker::DAC
                | JPEGMarker::SOF13
                | JPEGMarker::SOF14
                | JPEGMarker::SOF15
                | JPEGMarker::DNL => return Err(Self::unsupported_process(marker)),
                // Standalone markers carry no length
                JPEGMarker::TEM => {}
                _ if marker.restart_index().is_some() => {}
                _ => {
                    if !result.tables.read_table_marker(reader, marker)? {
                        reader.skip_marker_with_length()?; // Skip unkown markers
                    }
                }
            }
        }
    }

    fn compute_mcu_info(&mut self) {
        let max_xy_sampling_factor = self.frame_info.components.iter().fold(
            (1, 1),
            |(max_h_fac, max_v_fac), component| {
                (
                    max_h_fac.max(component.xy_sampling_factor.0),
                    max_v_fac.max(component.xy_sampling_factor.1),
                )
            },
        );
        let mcu_size = (
            8 * max_xy_sampling_factor.0 as usize,
            8 * max_xy_sampling_factor.1 as usize,
        );
        let (width, height) = self.image_size();

        self.mcu_info = MCUInfo {
            max_xy_sampling_factor,
            mcu_size,
            mcu_dimensions: (width.div_ceil(mcu_size.0), height.div_ceil(mcu_size.1)),
        };
    }

    pub fn image_size(&self) -> (usize, usize) {
        (
            self.frame_info.image_size.0 as usize,
            self.frame_info.image_size.1 as usize,
        )
    }

    /// Frame component index of a scan component selector.
    pub fn component_index(&self, selector: u8) -> Result<usize> {
        self.frame_info
            .components
            .iter()
            .position(|component| component.identifier == selector)
            .ok_or(Error::Malformed("Scan references an unknown component"))
    }

    /// Size of a component's block grid, covering its clipped extent.
    pub fn size_in_blocks(&self, component: &FrameComponent) -> (usize, usize) {
        blocks_for(clipped_extent(
            self.image_size(),
            component.xy_sampling_factor,
            self.mcu_info.max_xy_sampling_factor,
        ))
    }

    /// Checks the limits an interleaved scan must respect.
    pub fn validate_scan(&self, scan: &ScanInfo) -> Result<()> {
        if scan.components.len() > 1 {
            let mut blocks_in_mcu = 0;
            for scan_component in &scan.components {
                let index = self.component_index(scan_component.selector)?;
                let (h, v) = self.frame_info.components[index].xy_sampling_factor;
                blocks_in_mcu += h as usize * v as usize;
            }
            if blocks_in_mcu > MAX_BLOCKS_IN_MCU {
                return Err(Error::Malformed("Too many blocks in MCU"));
            }
        }
        if scan.spectral_selection != (0, 63) || scan.successive_approximation != 0 {
            return Err(Error::UnsupportedFeature(
                "Spectral selection or successive approximation in a sequential scan",
            ));
        }
        Ok(())
    }

    pub fn raw_image_info(&self) -> RawImageInfo {
        RawImageInfo {
            size: self.image_size(),
            precision: self.frame_info.precision,
            max_sampling_factor: self.mcu_info.max_xy_sampling_factor,
            components: self
                .frame_info
                .components
                .iter()
                .enumerate()
                .map(|(index, component)| ComponentInfo {
                    index,
                    identifier: component.identifier,
                    sampling_factor: component.xy_sampling_factor,
                    size_in_blocks: self.size_in_blocks(component),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn header_bytes(sof: u8, precision: u8) -> Vec<u8> {
        let mut data = vec![
            0xFF, 0xD8,
            0xFF, 0xE0, 0, 4, b'J', b'F', // APP0, skipped
            0xFF, 0xDB, 0, 67, 0x01,       // DQT, table 1
        ];
        data.extend((1..=64u8).collect::<Vec<_>>());
        data.extend([
            0xFF, sof, 0, 17, precision, 0, 9, 0, 17, 3,
            1, 0x22, 0,
            2, 0x11, 1,
            3, 0x11, 1,
            0xFF, 0xDD, 0, 4, 0, 2,        // DRI
            0xFF, 0xC4, 0, 21, 0x00,       // DHT, DC table 0
            0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            4, 5,
            0xFF, 0xDA, 0, 12, 3, 1, 0x00, 2, 0x00, 3, 0x00, 0, 63, 0,
        ]);
        data
    }

    #[test]
    fn reads_frame_tables_and_first_scan() {
        let data = header_bytes(0xC0, 8);
        let mut reader = JPEGParser::new(&data);
        let header = HeaderInfo::read_header_info(&mut reader).unwrap();

        assert_eq!(header.header_length, data.len());
        assert_eq!(header.image_size(), (17, 9));
        assert_eq!(header.tables.restart_interval, 2);
        assert_eq!(header.mcu_info.max_xy_sampling_factor, (2, 2));
        assert_eq!(header.mcu_info.mcu_dimensions, (2, 1));
        assert_eq!(header.scan_info.components.len(), 3);

        // Natural order: zigzag position 2 is row 1, column 0
        let qtable = &header.tables.quant_tables[&1].table;
        assert_eq!(qtable[0], 1);
        assert_eq!(qtable[1], 2);
        assert_eq!(qtable[8], 3);

        let dc = &header.tables.dc_huff_tables[&0];
        assert_eq!(dc.max_code[1], -1);
        assert_eq!(dc.max_code[2], 1);
        assert_eq!(dc.value_offset[2], 0);

        let info = header.raw_image_info();
        assert_eq!(info.precision, 8);
        assert_eq!(info.components[0].size_in_blocks, (3, 2));
        assert_eq!(info.components[1].size_in_blocks, (2, 1));
        assert_eq!(info.components[2].identifier, 3);
    }

    #[test]
    fn extended_sequential_12_bit() {
        let data = header_bytes(0xC1, 12);
        let mut reader = JPEGParser::new(&data);
        let header = HeaderInfo::read_header_info(&mut reader).unwrap();
        assert_eq!(header.frame_info.precision, 12);
    }

    #[test]
    fn rejects_unsupported_processes_and_precisions() {
        let data = header_bytes(0xC2, 8);
        let mut reader = JPEGParser::new(&data);
        assert!(matches!(
            HeaderInfo::read_header_info(&mut reader),
            Err(Error::UnsupportedFeature("Progressive JPEG is not supported"))
        ));

        let data = header_bytes(0xC0, 16);
        let mut reader = JPEGParser::new(&data);
        assert!(matches!(
            HeaderInfo::read_header_info(&mut reader),
            Err(Error::UnsupportedPrecision(16))
        ));
    }

    #[test]
    fn rejects_oversubscribed_huffman_table() {
        let mut table = HuffmanTable {
            bitcode_counts: [3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            symbols: vec![0, 1, 2],
            ..Default::default()
        };
        assert!(table.generate_codes().is_err());
    }
}
