//! RVT-H bank directory ("NHCD" table) parsing.
//!
//! The directory occupies one 512-byte header block followed by one
//! 512-byte entry per bank. On a real device it lives at LBA 0x300000; the
//! parser itself only sees the directory bytes, already read by the caller.

use std::{fmt, str::from_utf8};

use tracing::debug;
use zerocopy::{big_endian::*, FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{common::MagicBytes, util::static_assert, Error, Result};

/// Magic bytes for the bank table header.
pub const NHCD_MAGIC: MagicBytes = *b"NHCD";

/// Bank table version supported by this parser.
pub const NHCD_VERSION: u32 = 1;

/// LBA of the bank table on a real RVT-H device.
pub const NHCD_TABLE_LBA: u64 = 0x30_0000;

/// Size in bytes of one device block (LBA).
pub const NHCD_BLOCK_SIZE: usize = 512;

/// Maximum number of banks in a directory.
pub const NHCD_MAX_BANKS: usize = 8;

/// Bank type magic for GameCube images.
pub const NHCD_BANK_GCN: MagicBytes = *b"GC1L";
/// Bank type magic for single-layer Wii images.
pub const NHCD_BANK_WII_SL: MagicBytes = *b"NN1L";
/// Bank type magic for dual-layer Wii images.
pub const NHCD_BANK_WII_DL: MagicBytes = *b"NN2L";

#[derive(Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub(crate) struct RawTableHeader {
    pub(crate) magic: MagicBytes,
    pub(crate) version: U32,
    pub(crate) bank_count: U32,
    _x00c: U32,
    _x010: U32,
    _unused: [u8; 0x1EC],
}

static_assert!(size_of::<RawTableHeader>() == NHCD_BLOCK_SIZE);

#[derive(Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub(crate) struct RawBankEntry {
    pub(crate) kind: MagicBytes,
    _all_zero: [u8; 4],
    pub(crate) timestamp: [u8; 14],
    _unk: [u8; 2],
    pub(crate) lba_start: U32,
    pub(crate) lba_len: U32,
    _reserved: [u8; 0x1E0],
}

static_assert!(size_of::<RawBankEntry>() == NHCD_BLOCK_SIZE);

/// What a bank slot holds, as recorded in the bank directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankKind {
    /// Empty slot.
    Empty,
    /// GameCube disc image.
    GameCube,
    /// Single-layer Wii disc image.
    WiiSingleLayer,
    /// Dual-layer Wii disc image (spans two bank slots).
    WiiDualLayer,
    /// Unrecognized type magic or invalid extents.
    Invalid,
}

impl fmt::Display for BankKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::GameCube => write!(f, "GameCube"),
            Self::WiiSingleLayer => write!(f, "Wii (SL)"),
            Self::WiiDualLayer => write!(f, "Wii (DL)"),
            Self::Invalid => write!(f, "Invalid"),
        }
    }
}

/// One bank descriptor. Constructed once when the directory is parsed and
/// immutable thereafter.
#[derive(Debug, Clone)]
pub struct BankEntry {
    /// Bank index (0-7).
    pub index: usize,
    /// Starting block of the bank's disc image.
    pub lba_start: u32,
    /// Length of the bank's disc image in blocks.
    pub lba_len: u32,
    /// What the slot holds per the directory.
    pub kind: BankKind,
    /// False when this entry failed validation (bad type magic, zero
    /// length, out of capacity, or overlapping another bank).
    pub usable: bool,
    /// Image timestamp, ASCII `YYYYMMDDHHMMSS`. Empty for empty banks.
    pub timestamp: String,
}

impl BankEntry {
    /// Byte offset of the bank's disc image on the device.
    #[inline]
    pub fn byte_offset(&self) -> u64 { self.lba_start as u64 * NHCD_BLOCK_SIZE as u64 }

    /// Byte length of the bank's disc image.
    #[inline]
    pub fn byte_len(&self) -> u64 { self.lba_len as u64 * NHCD_BLOCK_SIZE as u64 }
}

/// A parsed bank directory.
#[derive(Debug, Clone)]
pub struct BankTable {
    banks: Vec<BankEntry>,
}

impl BankTable {
    /// Parses a bank directory.
    ///
    /// `capacity_lba` is the device capacity in blocks; entries extending
    /// past it are marked unusable. A malformed header fails with
    /// [`Error::InvalidDirectory`] (fatal); an individually corrupt entry
    /// only marks that bank unusable and parsing continues.
    pub fn parse(directory: &[u8], capacity_lba: u64) -> Result<BankTable> {
        let (header, rest) = RawTableHeader::read_from_prefix(directory)
            .map_err(|_| Error::InvalidDirectory("truncated bank table header".to_string()))?;
        if header.magic != NHCD_MAGIC {
            return Err(Error::InvalidDirectory(format!(
                "bad magic {:02X?} (expected \"NHCD\")",
                header.magic
            )));
        }
        if header.version.get() != NHCD_VERSION {
            return Err(Error::InvalidDirectory(format!(
                "unsupported version {}",
                header.version.get()
            )));
        }
        let bank_count = header.bank_count.get() as usize;
        if bank_count == 0 || bank_count > NHCD_MAX_BANKS {
            return Err(Error::InvalidDirectory(format!("bad bank count {}", bank_count)));
        }
        if rest.len() < bank_count * NHCD_BLOCK_SIZE {
            return Err(Error::InvalidDirectory(format!(
                "directory too short for {} banks",
                bank_count
            )));
        }

        let mut banks = Vec::with_capacity(bank_count);
        for index in 0..bank_count {
            let (raw, _) = RawBankEntry::read_from_prefix(&rest[index * NHCD_BLOCK_SIZE..])
                .map_err(|_| Error::InvalidDirectory("truncated bank entry".to_string()))?;
            let entry = validate_entry(index, &raw, capacity_lba, &banks);
            banks.push(entry);
        }
        Ok(BankTable { banks })
    }

    /// All bank entries, in directory order.
    #[inline]
    pub fn banks(&self) -> &[BankEntry] { &self.banks }

    /// Looks up a bank by index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&BankEntry> { self.banks.get(index) }
}

fn validate_entry(
    index: usize,
    raw: &RawBankEntry,
    capacity_lba: u64,
    accepted: &[BankEntry],
) -> BankEntry {
    let kind = match raw.kind {
        k if k == NHCD_BANK_GCN => BankKind::GameCube,
        k if k == NHCD_BANK_WII_SL => BankKind::WiiSingleLayer,
        k if k == NHCD_BANK_WII_DL => BankKind::WiiDualLayer,
        [0, 0, 0, 0] => BankKind::Empty,
        k => {
            debug!(index, kind = ?k, "unknown bank type magic");
            BankKind::Invalid
        }
    };
    let start = raw.lba_start.get();
    let len = raw.lba_len.get();
    let timestamp = if kind == BankKind::Empty {
        String::new()
    } else {
        from_utf8(&raw.timestamp).unwrap_or("").trim_end_matches('\0').to_string()
    };

    let mut entry =
        BankEntry { index, lba_start: start, lba_len: len, kind, usable: false, timestamp };
    if kind == BankKind::Empty || kind == BankKind::Invalid {
        return entry;
    }
    if len == 0 || start as u64 + len as u64 > capacity_lba {
        debug!(index, start, len, capacity_lba, "bank extents out of range");
        entry.kind = BankKind::Invalid;
        return entry;
    }
    let overlaps = accepted.iter().any(|other| {
        other.usable
            && (start as u64) < other.lba_start as u64 + other.lba_len as u64
            && (other.lba_start as u64) < start as u64 + len as u64
    });
    if overlaps {
        debug!(index, start, len, "bank overlaps a previous entry");
        entry.kind = BankKind::Invalid;
        return entry;
    }
    entry.usable = true;
    entry
}

#[cfg(test)]
mod tests {
    use zerocopy::{FromZeros, IntoBytes};

    use super::*;

    fn raw_entry(kind: MagicBytes, lba_start: u32, lba_len: u32) -> RawBankEntry {
        let mut entry = RawBankEntry::new_zeroed();
        entry.kind = kind;
        entry.timestamp.copy_from_slice(b"20180101120000");
        entry.lba_start = lba_start.into();
        entry.lba_len = lba_len.into();
        entry
    }

    fn directory(entries: &[RawBankEntry]) -> Vec<u8> {
        let mut header = RawTableHeader::new_zeroed();
        header.magic = NHCD_MAGIC;
        header.version = NHCD_VERSION.into();
        header.bank_count = (entries.len() as u32).into();
        let mut bytes = header.as_bytes().to_vec();
        for entry in entries {
            bytes.extend_from_slice(entry.as_bytes());
        }
        bytes
    }

    #[test]
    fn test_parse_valid_directory() {
        let dir = directory(&[
            raw_entry(NHCD_BANK_WII_SL, 0x1000, 0x800),
            raw_entry(NHCD_BANK_GCN, 0x1800, 0x400),
            RawBankEntry::new_zeroed(),
        ]);
        let table = BankTable::parse(&dir, 0x10000).unwrap();
        assert_eq!(table.banks().len(), 3);
        assert!(table.banks()[0].usable);
        assert_eq!(table.banks()[0].kind, BankKind::WiiSingleLayer);
        assert_eq!(table.banks()[0].byte_offset(), 0x1000 * 512);
        assert_eq!(table.banks()[0].timestamp, "20180101120000");
        assert!(table.banks()[1].usable);
        assert_eq!(table.banks()[1].kind, BankKind::GameCube);
        assert!(!table.banks()[2].usable);
        assert_eq!(table.banks()[2].kind, BankKind::Empty);
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut dir = directory(&[raw_entry(NHCD_BANK_GCN, 0x1000, 0x400)]);
        dir[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(BankTable::parse(&dir, 0x10000), Err(Error::InvalidDirectory(_))));
    }

    #[test]
    fn test_overlap_marks_later_bank_invalid() {
        let dir = directory(&[
            raw_entry(NHCD_BANK_WII_SL, 0x1000, 0x800),
            raw_entry(NHCD_BANK_WII_SL, 0x1400, 0x800),
        ]);
        let table = BankTable::parse(&dir, 0x10000).unwrap();
        assert!(table.banks()[0].usable);
        assert!(!table.banks()[1].usable);
        assert_eq!(table.banks()[1].kind, BankKind::Invalid);
    }

    #[test]
    fn test_out_of_capacity_continues_parsing() {
        let dir = directory(&[
            raw_entry(NHCD_BANK_GCN, 0xF000, 0x2000),
            raw_entry(NHCD_BANK_GCN, 0x1000, 0x400),
        ]);
        let table = BankTable::parse(&dir, 0x10000).unwrap();
        assert!(!table.banks()[0].usable);
        assert!(table.banks()[1].usable);
    }

    #[test]
    fn test_unknown_type_magic() {
        let dir = directory(&[raw_entry(*b"ZZ9Z", 0x1000, 0x400)]);
        let table = BankTable::parse(&dir, 0x10000).unwrap();
        assert_eq!(table.banks()[0].kind, BankKind::Invalid);
        assert!(!table.banks()[0].usable);
    }
}
