use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::dimensions::ComponentExtent;
use crate::error::{Error, Result};
use crate::plane::{Plane, Sample};

/// Byte order of samples wider than 8 bits in raw PGX files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleByteOrder {
    /// Most significant byte first, tagged `ML`
    #[default]
    BigEndian,
    /// Least significant byte first, tagged `LM`
    LittleEndian,
}

impl SampleByteOrder {
    /// Endianness tag of the PGX descriptor.
    pub fn tag(self) -> &'static str {
        match self {
            SampleByteOrder::BigEndian => "ML",
            SampleByteOrder::LittleEndian => "LM",
        }
    }
}

/// The one-line PGX descriptor of a component: `PG ML +8 640 480`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgxHeader {
    /// Byte order of the raw samples
    pub byte_order: SampleByteOrder,
    /// Bits per sample
    pub precision: u8,
    /// Width in samples
    pub width: usize,
    /// Height in samples
    pub height: usize,
}

impl Display for PgxHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Samples are always unsigned
        write!(
            f,
            "PG {} +{} {} {}",
            self.byte_order.tag(),
            self.precision,
            self.width,
            self.height
        )
    }
}

impl PgxHeader {
    /// Writes the descriptor line, newline included.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{self}")
    }
}

/// Writes the clipped region of a plane: the first `clipped.0` samples of each of the first
/// `clipped.1` padded rows, top to bottom. Fails with `InvalidInput` if that region does not
/// lie within the plane.
pub fn write_plane<S: Sample, W: Write>(
    plane: &Plane<S>,
    extent: &ComponentExtent,
    byte_order: SampleByteOrder,
    out: &mut W,
) -> io::Result<()> {
    let (width, height) = extent.clipped;
    if width > plane.width() || height > plane.height() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "{width}x{height} samples do not fit in a {}x{} plane",
                plane.width(),
                plane.height()
            ),
        ));
    }

    for y in 0..height {
        S::write_row(&plane.row(y)[..width], byte_order, out)?;
    }
    Ok(())
}

/// Files written for one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentOutput {
    /// Component index
    pub index: usize,
    /// Path of the descriptor file
    pub header_path: PathBuf,
    /// Path of the raw sample file
    pub raw_path: PathBuf,
    /// Sizes of the written plane
    pub extent: ComponentExtent,
}

/// A PGX file set under construction: the manifest at `prefix` and, per component,
/// `<prefix>_<i>.h` and `<prefix>_<i>.raw`.
#[derive(Debug)]
pub struct PgxFileSet {
    prefix: PathBuf,
    byte_order: SampleByteOrder,
    manifest: Option<BufWriter<File>>,
    created: Vec<PathBuf>,
    outputs: Vec<ComponentOutput>,
}

impl PgxFileSet {
    /// Creates the manifest file.
    pub fn create(prefix: impl Into<PathBuf>, byte_order: SampleByteOrder) -> Result<Self> {
        let prefix = prefix.into();
        let manifest = File::create(&prefix).map_err(|e| Error::file(&prefix, e))?;

        Ok(Self {
            created: vec![prefix.clone()],
            prefix,
            byte_order,
            manifest: Some(BufWriter::new(manifest)),
            outputs: vec![],
        })
    }

    /// Path of the manifest.
    pub fn manifest_path(&self) -> &Path {
        &self.prefix
    }

    fn component_path(&self, index: usize, extension: &str) -> PathBuf {
        let mut path = OsString::from(self.prefix.as_os_str());
        path.push(format!("_{index}.{extension}"));
        PathBuf::from(path)
    }

    fn create_file(&mut self, path: &Path) -> Result<File> {
        let file = File::create(path).map_err(|e| Error::file(path, e))?;
        self.created.push(path.to_path_buf());
        Ok(file)
    }

    /// Writes one component's descriptor and raw samples, then lists the raw file in the
    /// manifest. Components must be written in index order.
    pub fn write_component<S: Sample>(
        &mut self,
        index: usize,
        plane: &Plane<S>,
        extent: &ComponentExtent,
        precision: u8,
    ) -> Result<&ComponentOutput> {
        if index != self.outputs.len() {
            return Err(Error::InvalidState("Components must be written in index order"));
        }

        if extent.clipped.0 > plane.width() || extent.clipped.1 > plane.height() {
            return Err(Error::ExtentMismatch {
                index,
                clipped: extent.clipped,
                padded: (plane.width(), plane.height()),
            });
        }

        let header_path = self.component_path(index, "h");
        let header = PgxHeader {
            byte_order: self.byte_order,
            precision,
            width: extent.clipped.0,
            height: extent.clipped.1,
        };
        let mut header_file = self.create_file(&header_path)?;
        header
            .write_to(&mut header_file)
            .map_err(|e| Error::file(&header_path, e))?;

        let raw_path = self.component_path(index, "raw");
        let mut raw = BufWriter::new(self.create_file(&raw_path)?);
        write_plane(plane, extent, self.byte_order, &mut raw)
            .and_then(|_| raw.flush())
            .map_err(|e| Error::file(&raw_path, e))?;
        drop(raw);
        debug!(index, path = %raw_path.display(), "wrote component samples");

        let raw_name = raw_path
            .file_name()
            .ok_or(Error::InvalidState("Output path has no file name"))?
            .to_string_lossy()
            .into_owned();
        let manifest = self
            .manifest
            .as_mut()
            .ok_or(Error::InvalidState("PGX file set already closed"))?;
        writeln!(manifest, "{raw_name}").map_err(|e| Error::file(&self.prefix, e))?;

        self.outputs.push(ComponentOutput {
            index,
            header_path,
            raw_path,
            extent: *extent,
        });
        Ok(&self.outputs[index])
    }

    /// Flushes and closes the manifest. The set can still be discarded if this fails.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(mut manifest) = self.manifest.take() {
            manifest
                .flush()
                .map_err(|e| Error::file(&self.prefix, e))?;
        }
        Ok(())
    }

    /// Consumes the set, keeping its files.
    pub fn into_outputs(self) -> Vec<ComponentOutput> {
        self.outputs
    }

    /// Closes every handle and removes every file this set created.
    pub fn discard(mut self) {
        // Unflushed manifest lines are dropped with the handle
        if let Some(manifest) = self.manifest.take() {
            let _ = manifest.into_parts();
        }
        for path in self.created.drain(..).rev() {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed incomplete output"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {e}", path.display()),
            }
        }
    }
}
