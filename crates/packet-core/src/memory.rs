//! In-memory collaborators: a sparse VM image and a register name table.

use std::collections::HashMap;

use crate::api::{RegisterNames, VmReadError, VmReader};

/// Size in bytes of one packet word.
pub const WORD_BYTES: usize = 4;

/// Converts little-endian bytes into words, dropping a trailing partial word.
#[must_use]
pub fn words_from_le_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(WORD_BYTES)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Converts words into little-endian bytes.
#[must_use]
pub fn words_to_le_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    vmid: Option<u32>,
    address: u64,
    bytes: Vec<u8>,
}

impl Segment {
    fn contains(&self, address: u64) -> bool {
        address
            .checked_sub(self.address)
            .is_some_and(|offset| offset < self.bytes.len() as u64)
    }

    fn matches(&self, vmid: u32) -> bool {
        self.vmid.is_none_or(|v| v == vmid)
    }
}

/// Sparse GPU virtual memory image backed by byte segments.
///
/// Reads may span adjacent segments of the same VMID; any gap fails the
/// whole read, the way an unmapped page would.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseMemory {
    segments: Vec<Segment>,
    reads: usize,
}

impl SparseMemory {
    /// Creates an empty image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `bytes` at `address` for a single VMID.
    pub fn map(&mut self, vmid: u32, address: u64, bytes: Vec<u8>) {
        self.segments.push(Segment {
            vmid: Some(vmid),
            address,
            bytes,
        });
    }

    /// Maps `bytes` at `address` for every VMID.
    pub fn map_any(&mut self, address: u64, bytes: Vec<u8>) {
        self.segments.push(Segment {
            vmid: None,
            address,
            bytes,
        });
    }

    /// Maps little-endian `words` at `address` for a single VMID.
    pub fn map_words(&mut self, vmid: u32, address: u64, words: &[u32]) {
        self.map(vmid, address, words_to_le_bytes(words));
    }

    /// Number of read calls served so far, successful or not.
    #[must_use]
    pub const fn reads(&self) -> usize {
        self.reads
    }

    fn segment_at(&self, vmid: u32, address: u64) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| s.matches(vmid) && s.contains(address))
    }
}

impl VmReader for SparseMemory {
    fn read(
        &mut self,
        _partition: u32,
        vmid: u32,
        address: u64,
        buf: &mut [u8],
    ) -> Result<(), VmReadError> {
        self.reads += 1;
        let mut filled = 0usize;
        while filled < buf.len() {
            let cursor = address
                .checked_add(filled as u64)
                .ok_or(VmReadError::Unmapped { vmid, address })?;
            let segment = self
                .segment_at(vmid, cursor)
                .ok_or(VmReadError::Unmapped {
                    vmid,
                    address: cursor,
                })?;
            let start = usize::try_from(cursor - segment.address)
                .map_err(|_| VmReadError::Device("segment offset overflow".to_string()))?;
            let take = (segment.bytes.len() - start).min(buf.len() - filled);
            buf[filled..filled + take].copy_from_slice(&segment.bytes[start..start + take]);
            filled += take;
        }
        Ok(())
    }
}

/// Register name table keyed by dword register address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterTable {
    names: HashMap<u32, String>,
}

impl RegisterTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces one entry.
    pub fn insert(&mut self, register: u32, name: impl Into<String>) {
        self.names.insert(register, name.into());
    }

    /// Parses `name address` lines; `#` starts a comment.
    ///
    /// Addresses accept a `0x` prefix. Malformed lines are skipped and
    /// counted in the second tuple element.
    #[must_use]
    pub fn parse(text: &str) -> (Self, usize) {
        let mut table = Self::new();
        let mut skipped = 0;
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let parsed = match (parts.next(), parts.next()) {
                (Some(name), Some(addr)) => parse_u64(addr)
                    .and_then(|a| u32::try_from(a).ok())
                    .map(|a| (name, a)),
                _ => None,
            };
            match parsed {
                Some((name, addr)) => table.insert(addr, name),
                None => skipped += 1,
            }
        }
        (table, skipped)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true when no entries exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl RegisterNames for RegisterTable {
    fn register_name(&self, register: u32) -> Option<String> {
        self.names.get(&register).cloned()
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
#[must_use]
pub fn parse_u64(text: &str) -> Option<u64> {
    let text = text.trim();
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .map_or_else(|| text.parse().ok(), |hex| u64::from_str_radix(hex, 16).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_roundtrip_little_endian() {
        let bytes = [0x78, 0x56, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE, 0x01];
        let words = words_from_le_bytes(&bytes);
        assert_eq!(words, vec![0x1234_5678, 0xDEAD_BEEF]);
        assert_eq!(words_to_le_bytes(&words), bytes[..8].to_vec());
    }

    #[test]
    fn sparse_memory_reads_within_segment() {
        let mut vm = SparseMemory::new();
        vm.map_words(2, 0x1000, &[1, 2, 3]);
        let mut buf = [0u8; 8];
        vm.read(0, 2, 0x1004, &mut buf).expect("mapped");
        assert_eq!(words_from_le_bytes(&buf), vec![2, 3]);
        assert_eq!(vm.reads(), 1);
    }

    #[test]
    fn reads_past_the_top_of_the_address_space_fail() {
        let mut vm = SparseMemory::new();
        vm.map_words(0, u64::MAX - 3, &[9]);
        let mut word = [0u8; 4];
        vm.read(0, 0, u64::MAX - 3, &mut word).expect("last word");
        assert_eq!(u32::from_le_bytes(word), 9);
        let mut buf = [0u8; 8];
        assert!(matches!(
            vm.read(0, 0, u64::MAX - 3, &mut buf),
            Err(VmReadError::Unmapped { .. })
        ));
    }

    #[test]
    fn sparse_memory_spans_adjacent_segments() {
        let mut vm = SparseMemory::new();
        vm.map_words(0, 0x0, &[1]);
        vm.map_words(0, 0x4, &[2]);
        let mut buf = [0u8; 8];
        vm.read(0, 0, 0, &mut buf).expect("contiguous");
        assert_eq!(words_from_le_bytes(&buf), vec![1, 2]);
    }

    #[test]
    fn sparse_memory_rejects_gaps_and_other_vmids() {
        let mut vm = SparseMemory::new();
        vm.map_words(1, 0x1000, &[1]);
        let mut buf = [0u8; 8];
        assert_eq!(
            vm.read(0, 1, 0x1000, &mut buf),
            Err(VmReadError::Unmapped {
                vmid: 1,
                address: 0x1004
            })
        );
        assert!(vm.read(0, 2, 0x1000, &mut buf[..4]).is_err());
    }

    #[test]
    fn any_vmid_segments_match_every_vmid() {
        let mut vm = SparseMemory::new();
        vm.map_any(0x2000, vec![0xAA; 4]);
        let mut buf = [0u8; 4];
        vm.read(0, 9, 0x2000, &mut buf).expect("any vmid");
        assert_eq!(buf, [0xAA; 4]);
    }

    #[test]
    fn register_table_parses_lines() {
        let (table, skipped) = RegisterTable::parse(
            "mmSPI_SHADER_PGM_LO_PS 0x2c08 # comment\n\n bogus\nmmCP_DMA 12\n",
        );
        assert_eq!(skipped, 1);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.register_name(0x2c08).as_deref(),
            Some("mmSPI_SHADER_PGM_LO_PS")
        );
        assert_eq!(table.register_name(12).as_deref(), Some("mmCP_DMA"));
    }

    #[test]
    fn parse_u64_accepts_both_radixes() {
        assert_eq!(parse_u64("0x10"), Some(16));
        assert_eq!(parse_u64("10"), Some(10));
        assert_eq!(parse_u64("zz"), None);
    }
}
