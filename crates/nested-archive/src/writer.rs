use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use flate2::{Compression, GzBuilder};
use tracing::debug;

use crate::entry::{block_size_extra, BLOCK_SIZE_OFFSET};
use crate::error::{ArchiveError, ArchiveResult};

/// Result of writing an archive.
#[derive(Clone, Debug)]
pub struct ArchiveFile {
    pub path: PathBuf,
    pub member_count: usize,
    /// Total compressed size in bytes.
    pub bytes: u64,
}

/// Builds a `.tgz` archive one member at a time.
///
/// Each tar entry is compressed into its own gzip member whose header
/// carries the member's compressed length, followed by a final member
/// holding the end-of-archive marker. The concatenation is an ordinary
/// gzip stream, so stock `tar xzf` extracts it.
pub struct ArchiveWriter {
    path: PathBuf,
    out: BufWriter<File>,
    /// Serializes tar entries into a staging buffer that is drained into a
    /// gzip member after every append.
    tar: tar::Builder<Vec<u8>>,
    offset: u64,
    member_count: usize,
    level: Compression,
}

impl ArchiveWriter {
    /// Create a new archive file. Fails if the file already exists.
    pub fn create(path: &Path) -> ArchiveResult<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            tar: tar::Builder::new(Vec::new()),
            offset: 0,
            member_count: 0,
            level: Compression::default(),
        })
    }

    /// Override the gzip compression level.
    pub fn with_level(mut self, level: Compression) -> Self {
        self.level = level;
        self
    }

    /// Add a file from disk as a member, keeping its modification time.
    pub fn append_file(&mut self, name: &str, source: &Path) -> ArchiveResult<()> {
        let data = std::fs::read(source)?;
        let mtime = std::fs::metadata(source)?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.append_entry(name, &data, mtime)
    }

    /// Add in-memory bytes as a member.
    pub fn append_bytes(&mut self, name: &str, data: &[u8]) -> ArchiveResult<()> {
        self.append_entry(name, data, 0)
    }

    fn append_entry(&mut self, name: &str, data: &[u8], mtime: u64) -> ArchiveResult<()> {
        validate_name(name)?;

        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_entry_type(tar::EntryType::Regular);
        // The builder writes into memory, so only the name can fail here.
        self.tar
            .append_data(&mut header, name, data)
            .map_err(|_| ArchiveError::InvalidMemberName(name.to_string()))?;

        let entry = std::mem::take(self.tar.get_mut());
        self.offset += write_block(&mut self.out, self.level, &entry)?;
        self.member_count += 1;
        debug!(name, size = data.len(), "archive member written");
        Ok(())
    }

    /// Number of members written so far.
    pub fn len(&self) -> usize {
        self.member_count
    }

    /// Returns true if no member has been written.
    pub fn is_empty(&self) -> bool {
        self.member_count == 0
    }

    /// Write the end-of-archive marker and sync the file to disk.
    pub fn finish(mut self) -> ArchiveResult<ArchiveFile> {
        let marker = self.tar.into_inner()?;
        self.offset += write_block(&mut self.out, self.level, &marker)?;
        self.out.flush()?;
        self.out.get_ref().sync_all()?;

        debug!(path = %self.path.display(), members = self.member_count, bytes = self.offset, "archive finished");
        Ok(ArchiveFile {
            path: self.path,
            member_count: self.member_count,
            bytes: self.offset,
        })
    }
}

/// Compress `tar_bytes` into one gzip member announcing its own length.
/// Returns the member's size.
fn write_block(out: &mut impl Write, level: Compression, tar_bytes: &[u8]) -> ArchiveResult<u64> {
    let mut encoder = GzBuilder::new()
        .extra(block_size_extra(0))
        .write(Vec::new(), level);
    encoder.write_all(tar_bytes)?;
    let mut block = encoder.finish()?;

    let size = block.len() as u64;
    block[BLOCK_SIZE_OFFSET..BLOCK_SIZE_OFFSET + 8].copy_from_slice(&size.to_le_bytes());
    out.write_all(&block)?;
    Ok(size)
}

fn validate_name(name: &str) -> ArchiveResult<()> {
    let path = Path::new(name);
    let relative = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if relative {
        Ok(())
    } else {
        Err(ArchiveError::InvalidMemberName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use flate2::read::MultiGzDecoder;

    #[test]
    fn output_is_a_standard_tgz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.tgz");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.append_bytes("0/0/1.bin", b"hi").unwrap();
        writer.append_bytes("0/0/2.bin", b"bye").unwrap();
        let archive = writer.finish().unwrap();
        assert_eq!(archive.member_count, 2);
        assert_eq!(archive.bytes, std::fs::metadata(&path).unwrap().len());

        let file = File::open(&path).unwrap();
        let mut tar = tar::Archive::new(MultiGzDecoder::new(file));
        let mut seen = Vec::new();
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            seen.push((name, data));
        }
        assert_eq!(
            seen,
            vec![
                ("0/0/1.bin".to_string(), b"hi".to_vec()),
                ("0/0/2.bin".to_string(), b"bye".to_vec()),
            ]
        );
    }

    #[test]
    fn append_file_reads_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("5.bin");
        std::fs::write(&source, b"payload").unwrap();

        let mut writer = ArchiveWriter::create(&dir.path().join("a.tgz")).unwrap();
        assert!(writer.is_empty());
        writer.append_file("0/0/5.bin", &source).unwrap();
        assert_eq!(writer.len(), 1);
        writer.finish().unwrap();
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.tgz");
        std::fs::write(&path, b"stale").unwrap();
        let err = ArchiveWriter::create(&path).err().unwrap();
        assert!(matches!(err, ArchiveError::Io(_)));
    }

    #[test]
    fn rejects_non_relative_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArchiveWriter::create(&dir.path().join("a.tgz")).unwrap();
        for name in ["", "/abs.bin", "../up.bin", "0/../1.bin"] {
            let err = writer.append_bytes(name, b"x").unwrap_err();
            assert!(matches!(err, ArchiveError::InvalidMemberName(_)), "{name}");
        }
        assert!(writer.is_empty());
    }

    #[test]
    fn long_names_survive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.tgz");
        let long = format!("0/0/{}.bin", "9".repeat(150));

        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.append_bytes(&long, b"deep").unwrap();
        writer.append_bytes("0/0/1.bin", b"short").unwrap();
        writer.finish().unwrap();

        let reader = crate::ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.member_count(), 2);
        assert_eq!(reader.read_member(&long).unwrap(), b"deep");
        assert_eq!(reader.read_member("0/0/1.bin").unwrap(), b"short");
    }

    #[test]
    fn every_block_is_padded_to_whole_tar_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pad.tgz");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        for size in [0usize, 1, 511, 512, 513, 3000] {
            writer
                .append_bytes(&format!("0/0/{size}.bin"), &vec![7u8; size])
                .unwrap();
        }
        writer.finish().unwrap();

        let mut inflated = Vec::new();
        MultiGzDecoder::new(File::open(&path).unwrap())
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated.len() % 512, 0);

        let reader = crate::ArchiveReader::open(&path).unwrap();
        for size in [0usize, 1, 511, 512, 513, 3000] {
            assert_eq!(reader.read_member(&format!("0/0/{size}.bin")).unwrap(), vec![7u8; size]);
        }
    }
}
