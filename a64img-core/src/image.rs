use crate::header::arm64::{ImageHeader, DEFAULT_LOAD_OFFSET, HEADER_SIZE};
use crate::header::Header;
use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Summary of a written image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub output: PathBuf,
    pub header_size: usize,
    pub kernel_size: usize,
    /// Size of the output file as reported by the filesystem after writing.
    pub total_size: u64,
    pub load_offset: u64,
}

/// Wraps the flat binary at `input` in an ARM64 Image header and writes the
/// result to `output`, replacing whatever was there.
///
/// The input is read in full before `output` is opened, so a missing input
/// leaves `output` untouched. A failed write may leave a truncated file behind.
pub fn build_image<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    load_offset: u64,
) -> Result<BuildReport> {
    let input = input.as_ref();
    let output = output.as_ref();

    let payload = fs::read(input)
        .with_context(|| format!("failed to read kernel binary '{}'", input.display()))?;
    log::debug!(
        "Read {} bytes of kernel payload from {}",
        payload.len(),
        input.display()
    );

    let header = ImageHeader::for_payload(payload.len(), load_offset);
    log::debug!(
        "Header: text_offset={:#x} image_size={:#x}",
        header.text_offset,
        header.image_size
    );
    let header_bytes = header.to_bytes()?;

    let file = File::create(output)
        .with_context(|| format!("failed to create image '{}'", output.display()))?;
    let mut writer = BufWriter::new(file);
    write_image(&mut writer, &header_bytes, &payload)
        .with_context(|| format!("failed to write image '{}'", output.display()))?;
    drop(writer);

    let total_size = fs::metadata(output)
        .with_context(|| format!("failed to stat image '{}'", output.display()))?
        .len();
    log::info!("Wrote {} ({} bytes)", output.display(), total_size);

    Ok(BuildReport {
        output: output.to_path_buf(),
        header_size: header_bytes.len(),
        kernel_size: payload.len(),
        total_size,
        load_offset,
    })
}

/// [`build_image`] with the load offset left at [`DEFAULT_LOAD_OFFSET`].
pub fn build_image_default<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
) -> Result<BuildReport> {
    build_image(input, output, DEFAULT_LOAD_OFFSET)
}

fn write_image<W: Write>(out: &mut W, header: &[u8], payload: &[u8]) -> io::Result<()> {
    out.write_all(header)?;
    out.write_all(payload)?;
    out.flush()
}

/// Decoded header of an existing image file.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub path: PathBuf,
    pub header: ImageHeader,
    pub file_size: u64,
}

impl Inspection {
    /// True when the recorded `image_size` equals the file length.
    ///
    /// Kernels linked with a large `.bss` legitimately record more than they
    /// carry on disk, so a mismatch is only worth a warning.
    pub fn size_matches(&self) -> bool {
        self.header.image_size() == self.file_size
    }
}

/// Reads and decodes the first [`HEADER_SIZE`] bytes of `path`.
pub fn inspect_image<P: AsRef<Path>>(path: P) -> Result<Inspection> {
    let path = path.as_ref();
    let mut file =
        File::open(path).with_context(|| format!("failed to open image '{}'", path.display()))?;
    let file_size = file
        .metadata()
        .with_context(|| format!("failed to stat image '{}'", path.display()))?
        .len();

    if file_size < HEADER_SIZE as u64 {
        bail!(
            "'{}' is too short to hold an ARM64 Image header ({} bytes, need {})",
            path.display(),
            file_size,
            HEADER_SIZE
        );
    }

    let header = ImageHeader::from_reader(&mut file)
        .with_context(|| format!("failed to read header of '{}'", path.display()))?;

    let inspection = Inspection {
        path: path.to_path_buf(),
        header,
        file_size,
    };

    if !header.has_valid_magic() {
        log::warn!(
            "{}: magic {:#010x} is not an ARM64 Image magic",
            path.display(),
            header.magic
        );
    }
    if !inspection.size_matches() {
        log::warn!(
            "{}: header records image_size {} but file is {} bytes",
            path.display(),
            header.image_size,
            file_size
        );
    }

    Ok(inspection)
}
