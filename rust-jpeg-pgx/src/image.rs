use crate::error::Result;
use crate::plane::Sample;

/// Frame-level metadata a raw decoder reports once its header has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImageInfo {
    /// Output size in samples of the full-resolution component, (width, height)
    pub size: (usize, usize),
    /// Bits per sample
    pub precision: u8,
    /// Largest (horizontal, vertical) sampling factor over all components
    pub max_sampling_factor: (u8, u8),
    /// Components in frame order
    pub components: Vec<ComponentInfo>,
}

/// Describes one component's sampling and block grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Position of the component in the frame header
    pub index: usize,
    /// Component identifier from the frame header
    pub identifier: u8,
    /// (horizontal, vertical) sampling factor
    pub sampling_factor: (u8, u8),
    /// Size of the component's block grid in 8x8 blocks, (wide, high)
    pub size_in_blocks: (usize, usize),
}

impl RawImageInfo {
    /// Number of luma lines one raw-data call produces.
    pub fn lines_per_imcu_row(&self) -> usize {
        self.max_sampling_factor.1 as usize * 8
    }
}

/// A decoder that hands out component samples at native resolution, without upsampling or color
/// conversion. Mirrors the raw-data interface of classic JPEG libraries.
pub trait RawDecoder {
    /// Parses the stream up to the first scan and reports the frame metadata.
    fn read_header(&mut self) -> Result<RawImageInfo>;

    /// Prepares sample output. Must follow `read_header`.
    fn start_decompress(&mut self) -> Result<()>;

    /// Writes the next row of MCUs. `data[c]` holds the row views of component `c`, starting at
    /// the first row this call fills. Returns the number of output lines the call covers, or 0
    /// once every line has been produced.
    fn read_raw_data<S: Sample>(
        &mut self,
        data: &mut [&mut [&mut [S]]],
        max_lines: usize,
    ) -> Result<usize>;

    /// Completes decoding. Fails if lines are still pending.
    fn finish_decompress(&mut self) -> Result<()>;

    /// Abandons an in-progress decode and releases its buffers.
    fn abort_decompress(&mut self);
}
