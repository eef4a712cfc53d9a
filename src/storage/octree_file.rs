//! Octree file format
//!
//! Little-endian on disk regardless of host:
//!
//! ```text
//! u32       version (1)
//! u32 x 3   volume size (x, y, z)
//! u32       octree resolution
//! u32       octree byte size
//! [u32]     node words
//! ```
//!
//! The header's byte size must equal `octree_bytesize(resolution)`; files that
//! disagree or end early are rejected before any node is returned.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use glam::UVec3;

use crate::core::{Error, Result};
use crate::svo::node::MAX_RESOLUTION;
use crate::svo::octree::octree_bytesize;

pub const OCTREE_FILE_VERSION: u32 = 1;

/// Deepest tree whose byte size fits the header's 32-bit size field
pub const MAX_FILE_RESOLUTION: u32 = 9;

/// Header plus node words of an octree file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OctreeFile {
    /// Voxel grid the tree was built from
    pub volume_size: UVec3,
    pub resolution: u32,
    pub nodes: Vec<u32>,
}

impl OctreeFile {
    pub fn bytesize(&self) -> u64 {
        self.nodes.len() as u64 * 4
    }
}

/// Serialize `file`. The node count must match its resolution.
pub fn write_octree<W: Write>(writer: &mut W, file: &OctreeFile) -> Result<()> {
    check_resolution(file.resolution)?;
    let expected = octree_bytesize(file.resolution);
    let header_size = u32::try_from(expected).map_err(|_| Error::FileTooLarge {
        resolution: file.resolution,
        bytesize: expected,
    })?;
    if file.bytesize() != expected {
        return Err(Error::SizeMismatch {
            resolution: file.resolution,
            expected,
            found: file.bytesize(),
        });
    }

    let header = [
        OCTREE_FILE_VERSION,
        file.volume_size.x,
        file.volume_size.y,
        file.volume_size.z,
        file.resolution,
        header_size,
    ];
    for word in header.iter().chain(&file.nodes) {
        writer.write_all(&word.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse and validate an octree file
pub fn read_octree<R: Read>(reader: &mut R) -> Result<OctreeFile> {
    let version = read_u32(reader, "version")?;
    if version != OCTREE_FILE_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let volume_size = UVec3::new(
        read_u32(reader, "volume size")?,
        read_u32(reader, "volume size")?,
        read_u32(reader, "volume size")?,
    );
    let resolution = read_u32(reader, "resolution")?;
    let bytesize = read_u32(reader, "byte size")? as u64;

    check_resolution(resolution)?;
    let expected = octree_bytesize(resolution);
    if bytesize != expected {
        return Err(Error::SizeMismatch { resolution, expected, found: bytesize });
    }

    let mut payload = vec![0u8; bytesize as usize];
    reader.read_exact(&mut payload).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Truncated(format!("node payload shorter than {} bytes", bytesize)),
        _ => Error::Io(e),
    })?;
    let nodes = payload
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(OctreeFile { volume_size, resolution, nodes })
}

/// Write an octree file to `path`
pub fn save_octree(path: &Path, file: &OctreeFile) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_octree(&mut writer, file)?;
    log::info!(
        "Saved octree to {} (resolution {}, {} bytes)",
        path.display(),
        file.resolution,
        file.bytesize()
    );
    Ok(())
}

/// Read an octree file from `path`
pub fn load_octree(path: &Path) -> Result<OctreeFile> {
    let mut reader = BufReader::new(File::open(path)?);
    let file = read_octree(&mut reader)?;
    log::debug!("Loaded octree from {} (resolution {})", path.display(), file.resolution);
    Ok(file)
}

fn check_resolution(resolution: u32) -> Result<()> {
    if resolution == 0 || resolution > MAX_RESOLUTION {
        return Err(Error::InvalidResolution(resolution));
    }
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R, field: &str) -> Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Truncated(format!("header ends before {}", field)),
        _ => Error::Io(e),
    })?;
    Ok(u32::from_le_bytes(bytes))
}
