use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::dimensions::{component_extents, ComponentExtent};
use crate::error::{Error, Result};
use crate::image::{RawDecoder, RawImageInfo};
use crate::jpeg::JPEGDecoder;
use crate::pgx::{ComponentOutput, PgxFileSet, SampleByteOrder};
use crate::plane::{Plane, Sample};

/// Progress of one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing has happened yet
    Init,
    /// The decoder reported the image metadata
    HeaderRead,
    /// Every component plane is allocated
    PlanesAllocated,
    /// The decoder is producing samples
    Decoding,
    /// Output files are being written
    Finalizing,
    /// All files are written and closed
    Done,
    /// The run failed and was cleaned up
    Failed,
}

/// Options of an extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Byte order of samples wider than 8 bits
    pub byte_order: SampleByteOrder,
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Path of the manifest
    pub manifest: PathBuf,
    /// Files written per component, in index order
    pub components: Vec<ComponentOutput>,
}

/// Reads a whole JPEG file. An empty file is rejected.
pub fn read_jpeg_file(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path).map_err(|e| Error::file(path, e))?;
    if data.is_empty() {
        return Err(Error::EmptyInput);
    }
    debug!(path = %path.display(), bytes = data.len(), "read input");
    Ok(data)
}

/// Decodes the JPEG file at `input` and writes its components as a PGX file set whose manifest
/// is `output`.
pub fn extract_to_pgx(input: &Path, output: &Path, options: ExtractOptions) -> Result<ExtractionSummary> {
    let data = read_jpeg_file(input)?;
    let mut decoder = JPEGDecoder::new(&data);
    Extraction::new(&mut decoder, options).run(output)
}

/// Drives a raw decoder through one run: header, plane allocation, decoding, serialization.
/// On failure every output file the run created is removed.
pub struct Extraction<'d, D: RawDecoder> {
    decoder: &'d mut D,
    options: ExtractOptions,
    state: RunState,
}

impl<'d, D: RawDecoder> Extraction<'d, D> {
    /// Prepares a run over `decoder`.
    pub fn new(decoder: &'d mut D, options: ExtractOptions) -> Self {
        Self {
            decoder,
            options,
            state: RunState::Init,
        }
    }

    /// Current state of the run.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Runs the extraction, writing the manifest to `output`.
    pub fn run(&mut self, output: &Path) -> Result<ExtractionSummary> {
        let mut files = None;
        match self.extract(output, &mut files) {
            Ok(summary) => {
                self.state = RunState::Done;
                Ok(summary)
            }
            Err(e) => {
                self.cleanup(files);
                Err(e)
            }
        }
    }

    fn extract(&mut self, output: &Path, files: &mut Option<PgxFileSet>) -> Result<ExtractionSummary> {
        self.state = RunState::Init;
        let info = self.decoder.read_header()?;
        self.state = RunState::HeaderRead;

        info!("Image dimensions: {}x{} pixels", info.size.0, info.size.1);
        info!(
            "Maximum sampling factors: {}x{}",
            info.max_sampling_factor.0, info.max_sampling_factor.1
        );

        match info.precision {
            8 => self.extract_planes::<u8>(&info, output, files),
            12 => self.extract_planes::<u16>(&info, output, files),
            precision => Err(Error::UnsupportedPrecision(precision)),
        }
    }

    fn extract_planes<S: Sample>(
        &mut self,
        info: &RawImageInfo,
        output: &Path,
        files: &mut Option<PgxFileSet>,
    ) -> Result<ExtractionSummary> {
        let extents = component_extents(info);
        if let Some((index, extent)) = extents.iter().enumerate().find(|(_, extent)| !extent.fits()) {
            return Err(Error::ExtentMismatch {
                index,
                clipped: extent.clipped,
                padded: extent.padded,
            });
        }

        let mut planes = Vec::with_capacity(extents.len());
        for (component, extent) in info.components.iter().zip(&extents) {
            info!(
                "  Component {}: {}x{} samples, {}x{} pixels (sampling factor: {}x{})",
                component.index,
                extent.padded.0,
                extent.padded.1,
                extent.clipped.0,
                extent.clipped.1,
                component.sampling_factor.0,
                component.sampling_factor.1
            );
            planes.push(Plane::<S>::allocate(extent.padded.0, extent.padded.1)?);
        }
        self.state = RunState::PlanesAllocated;
        debug!(planes = planes.len(), "allocated component planes");

        self.state = RunState::Decoding;
        self.decoder.start_decompress()?;
        self.decode(info, &mut planes)?;
        self.decoder.finish_decompress()?;

        self.state = RunState::Finalizing;
        self.write_files(info, &planes, &extents, output, files)
    }

    /// Hands the decoder fresh row-table suffixes, one iMCU row per call.
    fn decode<S: Sample>(&mut self, info: &RawImageInfo, planes: &mut [Plane<S>]) -> Result<()> {
        let stride = info.lines_per_imcu_row();
        let max_v = info.max_sampling_factor.1 as usize;
        let mut tables = planes
            .iter_mut()
            .map(Plane::row_table)
            .collect::<Result<Vec<_>>>()?;

        let mut row = 0;
        while row < info.size.1 {
            let mut views = tables
                .iter_mut()
                .zip(&info.components)
                .map(|(table, component)| {
                    let start = row * component.sampling_factor.1 as usize / max_v;
                    table
                        .get_mut(start..)
                        .ok_or(Error::InvalidState("Row offset past the end of a plane"))
                })
                .collect::<Result<Vec<_>>>()?;

            if self.decoder.read_raw_data(&mut views, stride)? == 0 {
                return Err(Error::InvalidState("Decoder stopped before the last line"));
            }
            row += stride;
        }
        debug!(lines = info.size.1, "decoded all lines");
        Ok(())
    }

    fn write_files<S: Sample>(
        &self,
        info: &RawImageInfo,
        planes: &[Plane<S>],
        extents: &[ComponentExtent],
        output: &Path,
        files: &mut Option<PgxFileSet>,
    ) -> Result<ExtractionSummary> {
        let set = files.insert(PgxFileSet::create(output, self.options.byte_order)?);
        for (index, (plane, extent)) in planes.iter().zip(extents).enumerate() {
            set.write_component(index, plane, extent, info.precision)?;
        }
        set.finish()?;

        let manifest = set.manifest_path().to_path_buf();
        let components = files.take().map(PgxFileSet::into_outputs).unwrap_or_default();
        Ok(ExtractionSummary {
            manifest,
            components,
        })
    }

    /// Unwinds a failed run according to how far it got.
    fn cleanup(&mut self, files: Option<PgxFileSet>) {
        debug!(state = ?self.state, "cleaning up failed run");
        if self.state == RunState::Decoding {
            self.decoder.abort_decompress();
        }
        if let Some(files) = files {
            files.discard();
        }
        self.state = RunState::Failed;
    }
}
