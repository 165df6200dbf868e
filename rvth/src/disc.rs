//! GameCube/Wii disc format types.
//!
//! All multi-byte fields are big-endian on disc regardless of host byte
//! order. Fixed-width strings are space/NUL padded and not guaranteed to be
//! NUL-terminated; treat them as byte slices, not C strings.

use std::{ffi::CStr, str::from_utf8};

use zerocopy::{big_endian::*, FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{common::MagicBytes, util::static_assert, Error, Result};

/// Size in bytes of a Wii partition cluster. (32 KiB)
pub const CLUSTER_SIZE: usize = 0x8000;

/// Magic bytes for Wii discs. Located at offset 0x18.
pub const WII_MAGIC: MagicBytes = [0x5D, 0x1C, 0x9E, 0xA3];

/// Magic bytes for GameCube discs. Located at offset 0x1C.
pub const GCN_MAGIC: MagicBytes = [0xC2, 0x33, 0x9F, 0x3D];

/// Offset of the boot block within a disc or partition.
pub const BOOT_BLOCK_OFFSET: usize = 0x420;

/// Offset of the boot info (bi2.bin) within a disc or partition.
pub const BOOT_INFO_OFFSET: usize = 0x440;

/// Offset of the apploader header within a disc or partition.
pub const APPLOADER_OFFSET: usize = 0x2440;

fn read_at<T: FromBytes>(bytes: &[u8], offset: usize, what: &str) -> Result<T> {
    let slice = bytes
        .get(offset..)
        .ok_or_else(|| Error::Format(format!("truncated {} at offset {:#x}", what, offset)))?;
    T::read_from_prefix(slice)
        .map(|(v, _)| v)
        .map_err(|_| Error::Format(format!("truncated {} at offset {:#x}", what, offset)))
}

/// Shared GameCube & Wii disc header.
///
/// This header is always at the start of the disc image and within each Wii
/// partition's data area.
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct DiscHeader {
    /// Game ID (ID4 plus two-byte publisher code)
    pub game_id: [u8; 6],
    /// Used in multi-disc games
    pub disc_num: u8,
    /// Disc revision
    pub disc_version: u8,
    /// Audio streaming enabled
    pub audio_streaming: u8,
    /// Audio streaming buffer size
    pub audio_stream_buf_size: u8,
    _pad1: [u8; 14],
    /// If this is a Wii disc, this will be 0x5D1C9EA3
    pub wii_magic: MagicBytes,
    /// If this is a GameCube disc, this will be 0xC2339F3D
    pub gcn_magic: MagicBytes,
    /// Game title (not NUL-terminated)
    pub game_title: [u8; 64],
    /// Wii: if non-zero, partition hash verification is disabled
    pub no_partition_hashes: u8,
    /// Wii: if non-zero, partition encryption is disabled
    pub no_partition_encryption: u8,
    _pad2: [u8; 926],
}

static_assert!(size_of::<DiscHeader>() == 0x400);

impl DiscHeader {
    /// Parses a disc header from the start of a bank or partition.
    ///
    /// Fails with [`Error::UnrecognizedDisc`] when neither magic word
    /// matches. A Wii disc may also carry the GameCube magic; the Wii magic
    /// takes precedence.
    pub fn parse(bytes: &[u8]) -> Result<DiscHeader> {
        let header: DiscHeader = read_at(bytes, 0, "disc header")?;
        if !header.is_wii() && !header.is_gamecube() {
            return Err(Error::UnrecognizedDisc);
        }
        Ok(header)
    }

    /// Game ID as a string.
    #[inline]
    pub fn game_id_str(&self) -> &str { from_utf8(&self.game_id).unwrap_or("[invalid]") }

    /// Game title as a string.
    #[inline]
    pub fn game_title_str(&self) -> &str {
        CStr::from_bytes_until_nul(&self.game_title)
            .ok()
            .and_then(|c| c.to_str().ok())
            .map(str::trim_end)
            .unwrap_or("[invalid]")
    }

    /// Whether this is a GameCube disc.
    #[inline]
    pub fn is_gamecube(&self) -> bool { self.gcn_magic == GCN_MAGIC && !self.is_wii() }

    /// Whether this is a Wii disc.
    #[inline]
    pub fn is_wii(&self) -> bool { self.wii_magic == WII_MAGIC }

    /// Whether the disc has partition data hashes.
    #[inline]
    pub fn has_partition_hashes(&self) -> bool { self.no_partition_hashes == 0 }

    /// Whether the disc has partition data encryption.
    #[inline]
    pub fn has_partition_encryption(&self) -> bool { self.no_partition_encryption == 0 }
}

/// DVD boot block.
///
/// Located at offset 0x420. On Wii, the offset and size fields are 34-bit
/// quantities stored right-shifted by 2.
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct BootBlock {
    /// Offset to the main DOL (Wii: >> 2)
    pub dol_offset: U32,
    /// Offset to the file system table (Wii: >> 2)
    pub fst_offset: U32,
    /// File system table size (Wii: >> 2)
    pub fst_size: U32,
    /// Size of the largest additional FST for multi-disc games (Wii: >> 2)
    pub fst_max_size: U32,
    /// FST load address in RAM
    pub fst_memory_address: U32,
    /// User data area start (unreliable; use the FST)
    pub user_offset: U32,
    /// User data area length (unreliable; use the FST)
    pub user_size: U32,
    _reserved: [u8; 4],
}

static_assert!(size_of::<BootBlock>() == 32);

impl BootBlock {
    /// Parses the boot block at its fixed offset within a disc or partition.
    pub fn parse(bytes: &[u8]) -> Result<BootBlock> {
        read_at(bytes, BOOT_BLOCK_OFFSET, "boot block")
    }

    /// Offset within the partition to the main DOL.
    #[inline]
    pub fn dol_offset(&self, is_wii: bool) -> u64 {
        if is_wii {
            (self.dol_offset.get() as u64) << 2
        } else {
            self.dol_offset.get() as u64
        }
    }

    /// Offset within the partition to the file system table.
    #[inline]
    pub fn fst_offset(&self, is_wii: bool) -> u64 {
        if is_wii {
            (self.fst_offset.get() as u64) << 2
        } else {
            self.fst_offset.get() as u64
        }
    }

    /// Size of the file system table.
    #[inline]
    pub fn fst_size(&self, is_wii: bool) -> u64 {
        if is_wii {
            (self.fst_size.get() as u64) << 2
        } else {
            self.fst_size.get() as u64
        }
    }

    /// Maximum FST size across multi-disc games.
    #[inline]
    pub fn fst_max_size(&self, is_wii: bool) -> u64 {
        if is_wii {
            (self.fst_max_size.get() as u64) << 2
        } else {
            self.fst_max_size.get() as u64
        }
    }
}

/// DVD boot info. (bi2.bin)
///
/// Located at offset 0x440. All size fields are treated as unsigned.
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct BootInfo {
    /// Debug monitor size (must be a multiple of 32)
    pub debug_mon_size: U32,
    /// Simulated memory size in bytes (must be a multiple of 32)
    pub sim_mem_size: U32,
    /// Command line arguments offset
    pub arg_offset: U32,
    /// Debug flag (3 when using CodeWarrior on GDEV)
    pub debug_flag: U32,
    /// Target resident kernel location
    pub trk_location: U32,
    /// Target resident kernel size
    pub trk_size: U32,
    /// Region code
    pub region_code: U32,
    _reserved1: [U32; 3],
    /// Maximum total size of DOL text/data sections (0 = unlimited)
    pub dol_limit: U32,
    _reserved2: [u8; 4],
}

static_assert!(size_of::<BootInfo>() == 48);

impl BootInfo {
    /// Parses the boot info at its fixed offset within a disc or partition.
    pub fn parse(bytes: &[u8]) -> Result<BootInfo> {
        read_at(bytes, BOOT_INFO_OFFSET, "boot info")
    }
}

/// Apploader header.
#[derive(Debug, PartialEq, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct ApploaderHeader {
    /// Apploader build date
    pub date: [u8; 16],
    /// Entry point
    pub entry_point: U32,
    /// Apploader size
    pub size: U32,
    /// Apploader trailer size
    pub trailer_size: U32,
    _pad: [u8; 4],
}

impl ApploaderHeader {
    /// Parses the apploader header at its fixed offset within a disc or
    /// partition.
    pub fn parse(bytes: &[u8]) -> Result<ApploaderHeader> {
        read_at(bytes, APPLOADER_OFFSET, "apploader header")
    }

    /// Apploader build date as a string.
    #[inline]
    pub fn date_str(&self) -> Option<&str> {
        CStr::from_bytes_until_nul(&self.date).ok().and_then(|c| c.to_str().ok())
    }
}

/// Maximum number of text sections in a DOL.
pub const DOL_MAX_TEXT_SECTIONS: usize = 7;
/// Maximum number of data sections in a DOL.
pub const DOL_MAX_DATA_SECTIONS: usize = 11;

/// Dolphin executable (DOL) header.
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct DolHeader {
    /// Text section file offsets
    pub text_offs: [U32; DOL_MAX_TEXT_SECTIONS],
    /// Data section file offsets
    pub data_offs: [U32; DOL_MAX_DATA_SECTIONS],
    /// Text section load addresses
    pub text_addrs: [U32; DOL_MAX_TEXT_SECTIONS],
    /// Data section load addresses
    pub data_addrs: [U32; DOL_MAX_DATA_SECTIONS],
    /// Text section sizes
    pub text_sizes: [U32; DOL_MAX_TEXT_SECTIONS],
    /// Data section sizes
    pub data_sizes: [U32; DOL_MAX_DATA_SECTIONS],
    /// BSS address
    pub bss_addr: U32,
    /// BSS size
    pub bss_size: U32,
    /// Entry point
    pub entry_point: U32,
    _pad: [u8; 0x1C],
}

static_assert!(size_of::<DolHeader>() == 0x100);

/// One (offset, load address, size) triple from a DOL header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DolSection {
    /// File offset of the section
    pub offset: u32,
    /// Load address of the section
    pub address: u32,
    /// Size of the section in bytes (0 = inactive)
    pub size: u32,
}

impl DolSection {
    /// Whether the section is present. Zero-length sections are inactive
    /// and excluded from all address-range checks.
    #[inline]
    pub fn is_active(&self) -> bool { self.size != 0 }
}

impl DolHeader {
    /// Parses a DOL header from the start of a DOL file.
    pub fn parse(bytes: &[u8]) -> Result<DolHeader> { read_at(bytes, 0, "DOL header") }

    /// Iterates the text section triples.
    pub fn text_sections(&self) -> impl Iterator<Item = DolSection> + '_ {
        self.text_offs.iter().zip(&self.text_addrs).zip(&self.text_sizes).map(
            |((offs, addr), size)| DolSection {
                offset: offs.get(),
                address: addr.get(),
                size: size.get(),
            },
        )
    }

    /// Iterates the data section triples.
    pub fn data_sections(&self) -> impl Iterator<Item = DolSection> + '_ {
        self.data_offs.iter().zip(&self.data_addrs).zip(&self.data_sizes).map(
            |((offs, addr), size)| DolSection {
                offset: offs.get(),
                address: addr.get(),
                size: size.get(),
            },
        )
    }

    /// Total size of all active text and data sections.
    pub fn total_section_size(&self) -> u64 {
        self.text_sections()
            .chain(self.data_sections())
            .filter(DolSection::is_active)
            .map(|s| s.size as u64)
            .sum()
    }

    /// Checks that every active section's (offset, size) pair lies within
    /// the containing file.
    pub fn validate(&self, file_size: u64) -> Result<()> {
        for (i, section) in
            self.text_sections().chain(self.data_sections()).enumerate().filter(|(_, s)| s.is_active())
        {
            let end = section.offset as u64 + section.size as u64;
            if end > file_size {
                return Err(Error::Format(format!(
                    "DOL section {} extends past end of file ({:#x} > {:#x})",
                    i, end, file_size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use zerocopy::IntoBytes;

    use super::*;

    fn header_bytes(wii: bool, gcn: bool) -> Vec<u8> {
        let mut bytes = vec![0u8; size_of::<DiscHeader>()];
        bytes[..6].copy_from_slice(b"RVTE01");
        if wii {
            bytes[0x18..0x1C].copy_from_slice(&WII_MAGIC);
        }
        if gcn {
            bytes[0x1C..0x20].copy_from_slice(&GCN_MAGIC);
        }
        bytes[0x20..0x24].copy_from_slice(b"Test");
        bytes
    }

    #[test]
    fn test_classify_gamecube() {
        let header = DiscHeader::parse(&header_bytes(false, true)).unwrap();
        assert!(header.is_gamecube());
        assert!(!header.is_wii());
        assert_eq!(header.game_id_str(), "RVTE01");
        assert_eq!(header.game_title_str(), "Test");
    }

    #[test]
    fn test_classify_wii() {
        let header = DiscHeader::parse(&header_bytes(true, false)).unwrap();
        assert!(header.is_wii());
        assert!(!header.is_gamecube());
    }

    #[test]
    fn test_wii_magic_wins_when_both_present() {
        let header = DiscHeader::parse(&header_bytes(true, true)).unwrap();
        assert!(header.is_wii());
        assert!(!header.is_gamecube());
    }

    #[test]
    fn test_neither_magic_fails() {
        assert!(matches!(
            DiscHeader::parse(&header_bytes(false, false)),
            Err(Error::UnrecognizedDisc)
        ));
    }

    #[test]
    fn test_truncated_header_fails() {
        assert!(matches!(DiscHeader::parse(&[0u8; 0x67]), Err(Error::Format(_))));
    }

    #[test]
    fn test_boot_block_shift() {
        let mut disc = vec![0u8; 0x470];
        let block = BootBlock {
            dol_offset: 0x910.into(),
            fst_offset: 0xA00.into(),
            fst_size: 0x40.into(),
            fst_max_size: 0x40.into(),
            fst_memory_address: 0x8130_0000.into(),
            user_offset: 0.into(),
            user_size: 0.into(),
            _reserved: [0; 4],
        };
        disc[BOOT_BLOCK_OFFSET..BOOT_BLOCK_OFFSET + 32].copy_from_slice(block.as_bytes());
        let parsed = BootBlock::parse(&disc).unwrap();
        assert_eq!(parsed.dol_offset(false), 0x910);
        assert_eq!(parsed.dol_offset(true), 0x2440);
        assert_eq!(parsed.fst_size(true), 0x100);
    }

    #[test]
    fn test_dol_validate_bounds() {
        let mut dol = DolHeader::parse(&[0u8; 0x100]).unwrap();
        dol.text_offs[0] = 0x100.into();
        dol.text_sizes[0] = 0x200.into();
        assert!(dol.validate(0x300).is_ok());
        assert!(dol.validate(0x2FF).is_err());
        // Inactive sections are ignored even with garbage offsets.
        dol.data_offs[3] = 0xFFFF_0000.into();
        assert!(dol.validate(0x300).is_ok());
        assert_eq!(dol.total_section_size(), 0x200);
    }
}
