use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flate2::bufread::GzDecoder;
use tracing::debug;

use crate::entry::MemberLocation;
use crate::error::{ArchiveError, ArchiveResult};
use crate::index::ArchiveIndex;

/// Random-access reader over one archive file.
///
/// The index is built when the archive is opened; each read then seeks
/// straight to the gzip member holding the requested entry.
#[derive(Debug)]
pub struct ArchiveReader {
    path: PathBuf,
    file: Mutex<File>,
    index: ArchiveIndex,
}

impl ArchiveReader {
    /// Open and index an archive.
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        let mut file = File::open(path)?;
        let index = ArchiveIndex::scan(&mut file)?;
        debug!(path = %path.display(), members = index.member_count(), "archive opened");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            index,
        })
    }

    /// Read a member's full contents.
    pub fn read_member(&self, name: &str) -> ArchiveResult<Vec<u8>> {
        let location = self
            .index
            .lookup(name)
            .ok_or_else(|| ArchiveError::MemberNotFound(name.to_string()))?;

        let mut file = self.file.lock().expect("archive file lock poisoned");
        file.seek(SeekFrom::Start(location.block_offset))?;
        read_located(&mut *file, location).map_err(|e| ArchiveError::CorruptMember {
            offset: location.block_offset,
            reason: format!("{name}: {e}"),
        })
    }

    /// Check if a member exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Number of regular-file members.
    pub fn member_count(&self) -> usize {
        self.index.member_count()
    }

    /// Member names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.names()
    }

    /// Path of the archive on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Access the index.
    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }
}

fn read_located<R: Read>(source: &mut R, location: MemberLocation) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(BufReader::new(source));

    let skipped = io::copy(&mut (&mut decoder).take(location.data_offset), &mut io::sink())?;
    if skipped < location.data_offset {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "member ended before entry data",
        ));
    }

    let mut data = Vec::with_capacity(location.size as usize);
    (&mut decoder).take(location.size).read_to_end(&mut data)?;
    if (data.len() as u64) < location.size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("entry truncated at {} of {} bytes", data.len(), location.size),
        ));
    }

    // Inflating to the end of a single-entry member checks its CRC.
    if location.sized_block {
        io::copy(&mut decoder, &mut io::sink())?;
    }
    Ok(data)
}
