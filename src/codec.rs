//! Program Codec
//!
//! zlib (flate2) packing of program text, so programs can be stored as
//! opaque binary files and unpacked right before they are handed to the
//! bridge. The bridge itself never sees packed bytes.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

/// Suffix given to packed programs when no output path is provided
pub const PACKED_EXTENSION: &str = "gif";

/// Suffix given to unpacked programs when no output path is provided
pub const SOURCE_EXTENSION: &str = "bf";

/// Errors from packing and unpacking programs
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Refusing to overwrite {0}")]
    Exists(PathBuf),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Compress program bytes with zlib at maximum level
pub fn compress(program: &[u8]) -> CodecResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(program)
        .map_err(|e| CodecError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CodecError::Compression(e.to_string()))
}

/// Decompress zlib-compressed program bytes
pub fn decompress(packed: &[u8]) -> CodecResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(packed);
    let mut program = Vec::new();
    decoder
        .read_to_end(&mut program)
        .map_err(|e| CodecError::Compression(e.to_string()))?;
    Ok(program)
}

/// Compress `program` and write it to `path`.
///
/// With `overwrite == false` an existing file is an error.
pub fn save_program(path: &Path, program: &[u8], overwrite: bool) -> CodecResult<()> {
    let packed = compress(program)?;
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options.open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => CodecError::Exists(path.to_path_buf()),
        _ => CodecError::Io(e),
    })?;
    file.write_all(&packed)?;
    Ok(())
}

/// Read a packed program from `path` and decompress it
pub fn load_program(path: &Path) -> CodecResult<Vec<u8>> {
    let packed = std::fs::read(path)?;
    decompress(&packed)
}

/// Pack a plain program file. Writes next to `source` with the packed
/// suffix unless `target` is given; returns the path written.
pub fn compress_file(source: &Path, target: Option<&Path>) -> CodecResult<PathBuf> {
    let program = std::fs::read(source)?;
    let target = target
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source.with_extension(PACKED_EXTENSION));
    save_program(&target, &program, true)?;
    Ok(target)
}

/// Unpack a packed program file. Writes next to `source` with the source
/// suffix unless `target` is given; returns the path written.
pub fn decompress_file(source: &Path, target: Option<&Path>) -> CodecResult<PathBuf> {
    let program = load_program(source)?;
    let target = target
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source.with_extension(SOURCE_EXTENSION));
    std::fs::write(&target, program)?;
    Ok(target)
}
