/// gzip extra subfield id carrying a member's compressed length.
pub const BLOCK_SIZE_SUBFIELD: [u8; 2] = *b"NS";

/// Byte offset of the block size inside a member written by this crate:
/// 10 fixed header bytes, 2 bytes XLEN, 4 bytes subfield id and length.
pub(crate) const BLOCK_SIZE_OFFSET: usize = 16;

/// Where a member's bytes live inside the compressed archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberLocation {
    /// File offset of the gzip member holding the entry.
    pub block_offset: u64,
    /// Offset of the entry data inside the decompressed gzip member.
    pub data_offset: u64,
    /// Entry size in bytes.
    pub size: u64,
    /// Whether the gzip member holds only this entry, so reading it to the
    /// end checks the whole member's CRC.
    pub sized_block: bool,
}

/// Encode the gzip extra field announcing a member's total length.
pub(crate) fn block_size_extra(size: u64) -> Vec<u8> {
    let mut extra = Vec::with_capacity(12);
    extra.extend_from_slice(&BLOCK_SIZE_SUBFIELD);
    extra.extend_from_slice(&8u16.to_le_bytes());
    extra.extend_from_slice(&size.to_le_bytes());
    extra
}

/// Find the announced member length among the subfields of a gzip
/// `FEXTRA` field. Each subfield is an id (2), a length (2 LE) and data.
pub(crate) fn block_size_from_extra(extra: &[u8]) -> Option<u64> {
    let mut rest = extra;
    while rest.len() >= 4 {
        let id = [rest[0], rest[1]];
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        let data = rest.get(4..4 + len)?;
        if id == BLOCK_SIZE_SUBFIELD && len == 8 {
            let mut size = [0u8; 8];
            size.copy_from_slice(data);
            return Some(u64::from_le_bytes(size));
        }
        rest = &rest[4 + len..];
    }
    None
}

/// Strip `./` and `/` prefixes so names match however the archive was built.
pub(crate) fn normalize_name(name: &str) -> &str {
    let mut name = name;
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            return name;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_extra_layout() {
        let extra = block_size_extra(0x0102);
        assert_eq!(&extra[0..2], b"NS");
        assert_eq!(&extra[2..4], &8u16.to_le_bytes());
        assert_eq!(&extra[4..12], &0x0102u64.to_le_bytes());
    }

    #[test]
    fn block_size_found_among_foreign_subfields() {
        let mut extra = Vec::new();
        extra.extend_from_slice(b"XY");
        extra.extend_from_slice(&2u16.to_le_bytes());
        extra.extend_from_slice(&[9, 9]);
        extra.extend_from_slice(&block_size_extra(777));
        assert_eq!(block_size_from_extra(&extra), Some(777));
    }

    #[test]
    fn block_size_absent_or_malformed() {
        assert_eq!(block_size_from_extra(&[]), None);

        let mut foreign = Vec::new();
        foreign.extend_from_slice(b"XY");
        foreign.extend_from_slice(&2u16.to_le_bytes());
        foreign.extend_from_slice(&[9, 9]);
        assert_eq!(block_size_from_extra(&foreign), None);

        // Subfield length runs past the end of the field.
        let mut truncated = block_size_extra(5);
        truncated.truncate(9);
        assert_eq!(block_size_from_extra(&truncated), None);
    }

    #[test]
    fn normalize_strips_prefixes() {
        assert_eq!(normalize_name("./0/1/11.bin"), "0/1/11.bin");
        assert_eq!(normalize_name("/0/1/11.bin"), "0/1/11.bin");
        assert_eq!(normalize_name("0/1/11.bin"), "0/1/11.bin");
    }
}
