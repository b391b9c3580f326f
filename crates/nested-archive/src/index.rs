use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};

use flate2::bufread::GzDecoder;
use tracing::debug;

use crate::entry::{block_size_from_extra, normalize_name, MemberLocation};
use crate::error::{ArchiveError, ArchiveResult};

/// Member catalog of one archive, mapping member name to its location.
///
/// Built once by scanning the archive. Members written by
/// [`ArchiveWriter`](crate::ArchiveWriter) announce their compressed length
/// in the gzip header, so the scan only inflates each entry's tar headers
/// before hopping to the next gzip member. Members without that
/// announcement (plain `tar czf` output) are inflated in full to walk their
/// entries.
#[derive(Clone, Debug, Default)]
pub struct ArchiveIndex {
    members: BTreeMap<String, MemberLocation>,
}

impl ArchiveIndex {
    /// Scan an archive from its first byte.
    pub fn scan<R: Read + Seek>(source: &mut R) -> ArchiveResult<Self> {
        let len = source.seek(SeekFrom::End(0))?;
        let mut index = Self::default();
        let mut offset = 0u64;
        let mut blocks = 0usize;

        while offset < len {
            source.seek(SeekFrom::Start(offset))?;
            let next = index.scan_block(&mut *source, offset, len)?;
            if next <= offset {
                return Err(ArchiveError::CorruptMember {
                    offset,
                    reason: "gzip member did not advance".into(),
                });
            }
            offset = next;
            blocks += 1;
        }

        debug!(blocks, members = index.members.len(), "archive index built");
        Ok(index)
    }

    /// Index the gzip member at `offset`; returns the offset of the next one.
    fn scan_block<R: Read + Seek>(&mut self, source: &mut R, offset: u64, len: u64) -> ArchiveResult<u64> {
        let mut decoder = GzDecoder::new(BufReader::new(source));
        if decoder.header().is_none() {
            return Err(invalid_header(&mut decoder, offset));
        }
        let block_size = decoder
            .header()
            .and_then(|header| header.extra())
            .and_then(block_size_from_extra);
        let mut archive = tar::Archive::new(decoder);

        match block_size {
            Some(size) => {
                if size == 0 || offset + size > len {
                    return Err(ArchiveError::CorruptMember {
                        offset,
                        reason: format!("announced block size {size} does not fit archive of {len} bytes"),
                    });
                }
                // A sized block holds a single entry (or the end marker), so
                // reading its headers is enough.
                let mut entries = archive.entries().map_err(|e| corrupt(offset, e))?;
                if let Some(entry) = entries.next() {
                    let entry = entry.map_err(|e| corrupt(offset, e))?;
                    self.insert_entry(&entry, offset, true)?;
                }
                Ok(offset + size)
            }
            None => {
                for entry in archive.entries().map_err(|e| corrupt(offset, e))? {
                    let entry = entry.map_err(|e| corrupt(offset, e))?;
                    self.insert_entry(&entry, offset, false)?;
                }
                // Inflate the padding after the end marker so the position
                // lands past the member's gzip trailer.
                let mut decoder = archive.into_inner();
                io::copy(&mut decoder, &mut io::sink()).map_err(|e| corrupt(offset, e))?;
                let mut reader = decoder.into_inner();
                Ok(reader.stream_position()?)
            }
        }
    }

    fn insert_entry<R: Read>(&mut self, entry: &tar::Entry<'_, R>, offset: u64, sized_block: bool) -> ArchiveResult<()> {
        if !entry.header().entry_type().is_file() {
            return Ok(());
        }
        let name = entry
            .path()
            .map_err(|e| corrupt(offset, e))?
            .to_string_lossy()
            .into_owned();
        self.insert(
            &name,
            MemberLocation {
                block_offset: offset,
                data_offset: entry.raw_file_position(),
                size: entry.size(),
                sized_block,
            },
        );
        Ok(())
    }

    fn insert(&mut self, name: &str, location: MemberLocation) {
        self.members.insert(normalize_name(name).to_string(), location);
    }

    /// Look up a member by name.
    pub fn lookup(&self, name: &str) -> Option<MemberLocation> {
        self.members.get(normalize_name(name)).copied()
    }

    /// Check if a member exists.
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Number of regular-file members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Member names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}

fn corrupt(offset: u64, e: io::Error) -> ArchiveError {
    ArchiveError::CorruptMember {
        offset,
        reason: e.to_string(),
    }
}

// The decoder failed to parse the gzip header; a read surfaces why.
fn invalid_header<R: BufRead>(decoder: &mut GzDecoder<R>, offset: u64) -> ArchiveError {
    let reason = match decoder.read(&mut [0u8; 1]) {
        Err(e) => e.to_string(),
        Ok(_) => "incomplete gzip header".to_string(),
    };
    ArchiveError::InvalidHeader { offset, reason }
}
