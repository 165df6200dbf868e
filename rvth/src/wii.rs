//! Wii disc types: tickets, TMD, partition headers, and the volume-group
//! partition table.

use zerocopy::{big_endian::*, FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    common::{HashBytes, KeyBytes, PartitionKind},
    disc::CLUSTER_SIZE,
    util::static_assert,
    Error, Result,
};

/// Size in bytes of the hash region at the head of each cluster
pub const HASHES_SIZE: usize = 0x400;

/// Size in bytes of the data region of each cluster
pub const CLUSTER_DATA_SIZE: usize = CLUSTER_SIZE - HASHES_SIZE; // 0x7C00

/// Size in bytes of the H3 table (h3.bin)
pub const H3_TABLE_SIZE: usize = 0x18000;

/// Offset of the volume-group partition table within a Wii disc
pub const PART_GROUP_OFFSET: usize = 0x40000;

/// Number of volume groups in the partition table
pub const PART_GROUP_COUNT: usize = 4;

// Sanity bound; real discs have a handful of partitions per group.
const MAX_PARTS_PER_GROUP: u32 = 0x40;

#[derive(Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub(crate) struct WiiPartEntry {
    pub(crate) offset: U32,
    pub(crate) kind: U32,
}

static_assert!(size_of::<WiiPartEntry>() == 8);

impl WiiPartEntry {
    pub(crate) fn offset(&self) -> u64 { (self.offset.get() as u64) << 2 }
}

#[derive(Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub(crate) struct WiiPartGroup {
    pub(crate) part_count: U32,
    pub(crate) part_entry_off: U32,
}

static_assert!(size_of::<WiiPartGroup>() == 8);

impl WiiPartGroup {
    pub(crate) fn part_entry_off(&self) -> u64 { (self.part_entry_off.get() as u64) << 2 }
}

/// Signed blob header
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct SignedHeader {
    /// Signature type, always 0x00010001 (RSA-2048)
    pub sig_type: U32,
    /// RSA-2048 signature
    pub sig: [u8; 256],
    _pad: [u8; 60],
}

static_assert!(size_of::<SignedHeader>() == 0x140);

/// Ticket limit
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct TicketLimit {
    /// Limit type
    pub limit_type: U32,
    /// Maximum value for the limit
    pub max_value: U32,
}

static_assert!(size_of::<TicketLimit>() == 8);

/// Wii ticket. Carries the encrypted title key and the common key index
/// needed to decrypt it.
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct Ticket {
    /// Signed blob header
    pub header: SignedHeader,
    /// Signature issuer
    pub sig_issuer: [u8; 64],
    /// ECDH data
    pub ecdh: [u8; 60],
    /// Ticket format version
    pub version: u8,
    _pad1: U16,
    /// Title key (encrypted)
    pub title_key: KeyBytes,
    _pad2: u8,
    /// Ticket ID
    pub ticket_id: [u8; 8],
    /// Console ID
    pub console_id: [u8; 4],
    /// Title ID (high 8 bytes seed the title-key IV)
    pub title_id: [u8; 8],
    _pad3: U16,
    /// Ticket title version
    pub ticket_title_version: U16,
    /// Permitted titles mask
    pub permitted_titles_mask: U32,
    /// Permit mask
    pub permit_mask: U32,
    /// Title export allowed
    pub title_export_allowed: u8,
    /// Common key index
    pub common_key_idx: u8,
    _pad4: [u8; 48],
    /// Content access permissions
    pub content_access_permissions: [u8; 64],
    _pad5: [u8; 2],
    /// Ticket limits
    pub limits: [TicketLimit; 8],
}

static_assert!(size_of::<Ticket>() == 0x2A4);

/// Title metadata header
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct TmdHeader {
    /// Signed blob header
    pub header: SignedHeader,
    /// Signature issuer
    pub sig_issuer: [u8; 64],
    /// Version
    pub version: u8,
    /// CA CRL version
    pub ca_crl_version: u8,
    /// Signer CRL version
    pub signer_crl_version: u8,
    /// Is vWii title
    pub is_vwii: u8,
    /// IOS ID
    pub ios_id: [u8; 8],
    /// Title ID
    pub title_id: [u8; 8],
    /// Title type
    pub title_type: U32,
    /// Group ID
    pub group_id: U16,
    _pad1: [u8; 2],
    /// Region
    pub region: U16,
    /// Ratings
    pub ratings: KeyBytes,
    _pad2: [u8; 12],
    /// IPC mask
    pub ipc_mask: [u8; 12],
    _pad3: [u8; 18],
    /// Access flags
    pub access_flags: U32,
    /// Title version
    pub title_version: U16,
    /// Number of contents
    pub num_contents: U16,
    /// Boot index
    pub boot_idx: U16,
    /// Minor version (unused)
    pub minor_version: U16,
}

static_assert!(size_of::<TmdHeader>() == 0x1E4);

/// TMD content metadata. The first record's hash binds the partition's H3
/// table (the hash-tree root, "H4").
#[derive(Clone, Debug, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct ContentMetadata {
    /// Content ID
    pub content_id: U32,
    /// Content index
    pub content_index: U16,
    /// Content type
    pub content_type: U16,
    /// Content size
    pub size: U64,
    /// Content hash
    pub hash: HashBytes,
}

static_assert!(size_of::<ContentMetadata>() == 0x24);

/// Extracts the expected H3-table hash ("H4") from a raw TMD.
pub fn tmd_h3_hash(tmd: &[u8]) -> Result<HashBytes> {
    let (header, contents) = TmdHeader::read_from_prefix(tmd)
        .map_err(|_| Error::Format("truncated TMD header".to_string()))?;
    if header.num_contents.get() == 0 {
        return Err(Error::Format("TMD has no content records".to_string()));
    }
    let (content, _) = ContentMetadata::read_from_prefix(contents)
        .map_err(|_| Error::Format("truncated TMD content record".to_string()))?;
    Ok(content.hash)
}

/// Wii partition header. Located at the start of each partition.
#[derive(Debug, Clone, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, align(4))]
pub struct WiiPartitionHeader {
    /// Ticket
    pub ticket: Ticket,
    tmd_size: U32,
    tmd_off: U32,
    cert_chain_size: U32,
    cert_chain_off: U32,
    h3_table_off: U32,
    data_off: U32,
    data_size: U32,
}

static_assert!(size_of::<WiiPartitionHeader>() == 0x2C0);

impl WiiPartitionHeader {
    /// Parses a partition header at a byte offset within the disc.
    pub fn parse(disc: &[u8], offset: u64) -> Result<WiiPartitionHeader> {
        let slice = disc.get(offset as usize..).ok_or_else(|| {
            Error::Format(format!("partition header offset {:#x} out of range", offset))
        })?;
        WiiPartitionHeader::read_from_prefix(slice)
            .map(|(v, _)| v)
            .map_err(|_| Error::Format(format!("truncated partition header at {:#x}", offset)))
    }

    /// TMD size in bytes
    pub fn tmd_size(&self) -> u64 { self.tmd_size.get() as u64 }

    /// TMD offset in bytes (relative to the partition start)
    pub fn tmd_off(&self) -> u64 { (self.tmd_off.get() as u64) << 2 }

    /// Certificate chain size in bytes
    pub fn cert_chain_size(&self) -> u64 { self.cert_chain_size.get() as u64 }

    /// Certificate chain offset in bytes (relative to the partition start)
    pub fn cert_chain_off(&self) -> u64 { (self.cert_chain_off.get() as u64) << 2 }

    /// H3 table offset in bytes (relative to the partition start)
    pub fn h3_table_off(&self) -> u64 { (self.h3_table_off.get() as u64) << 2 }

    /// H3 table size in bytes (always [`H3_TABLE_SIZE`])
    pub fn h3_table_size(&self) -> u64 { H3_TABLE_SIZE as u64 }

    /// Data offset in bytes (relative to the partition start)
    pub fn data_off(&self) -> u64 { (self.data_off.get() as u64) << 2 }

    /// Data size in bytes
    pub fn data_size(&self) -> u64 { (self.data_size.get() as u64) << 2 }
}

/// One entry of the volume-group partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionTableEntry {
    /// Partition index across all groups, in table order.
    pub index: usize,
    /// The kind of disc partition.
    pub kind: PartitionKind,
    /// Byte offset of the partition from the disc start.
    pub offset: u64,
}

/// Reads the volume-group partition table at its fixed disc offset.
///
/// Returns entries across all four groups in table order. Many
/// `PartitionTableEntry` per disc; none outlives the parse that produced it.
pub fn read_partition_table(disc: &[u8]) -> Result<Vec<PartitionTableEntry>> {
    let mut entries = Vec::new();
    let mut index = 0usize;
    for group_idx in 0..PART_GROUP_COUNT {
        let group: WiiPartGroup =
            read_struct(disc, PART_GROUP_OFFSET + group_idx * size_of::<WiiPartGroup>())
                .map_err(|_| Error::Format(format!("truncated partition group {}", group_idx)))?;
        let count = group.part_count.get();
        if count == 0 {
            continue;
        }
        if count > MAX_PARTS_PER_GROUP {
            return Err(Error::Format(format!(
                "partition group {} claims {} partitions",
                group_idx, count
            )));
        }
        let base = group.part_entry_off();
        for i in 0..count as usize {
            let entry: WiiPartEntry =
                read_struct(disc, base as usize + i * size_of::<WiiPartEntry>()).map_err(|_| {
                    Error::Format(format!("truncated partition entry {} in group {}", i, group_idx))
                })?;
            entries.push(PartitionTableEntry {
                index,
                kind: PartitionKind::from(entry.kind.get()),
                offset: entry.offset(),
            });
            index += 1;
        }
    }
    Ok(entries)
}

fn read_struct<T: FromBytes>(bytes: &[u8], offset: usize) -> Result<T, ()> {
    let slice = bytes.get(offset..).ok_or(())?;
    T::read_from_prefix(slice).map(|(v, _)| v).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use zerocopy::FromZeros;

    use super::*;

    #[test]
    fn test_read_partition_table() {
        let mut disc = vec![0u8; 0x50000];
        // Group 0: two partitions, entries at 0x40020.
        disc[PART_GROUP_OFFSET..PART_GROUP_OFFSET + 4].copy_from_slice(&2u32.to_be_bytes());
        disc[PART_GROUP_OFFSET + 4..PART_GROUP_OFFSET + 8]
            .copy_from_slice(&(0x40020u32 >> 2).to_be_bytes());
        // Entry 0: data partition at 0x48000.
        disc[0x40020..0x40024].copy_from_slice(&(0x48000u32 >> 2).to_be_bytes());
        disc[0x40024..0x40028].copy_from_slice(&0u32.to_be_bytes());
        // Entry 1: update partition at 0x4C000.
        disc[0x40028..0x4002C].copy_from_slice(&(0x4C000u32 >> 2).to_be_bytes());
        disc[0x4002C..0x40030].copy_from_slice(&1u32.to_be_bytes());

        let entries = read_partition_table(&disc).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, PartitionKind::Data);
        assert_eq!(entries[0].offset, 0x48000);
        assert_eq!(entries[1].kind, PartitionKind::Update);
        assert_eq!(entries[1].offset, 0x4C000);
    }

    #[test]
    fn test_empty_partition_table() {
        let disc = vec![0u8; 0x50000];
        let entries = read_partition_table(&disc).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_tmd_h3_hash() {
        let mut tmd = TmdHeader::new_zeroed();
        tmd.num_contents = 1.into();
        let mut content = ContentMetadata::new_zeroed();
        content.hash = [0xAB; 20];
        let mut raw = zerocopy::IntoBytes::as_bytes(&tmd).to_vec();
        raw.extend_from_slice(zerocopy::IntoBytes::as_bytes(&content));
        assert_eq!(tmd_h3_hash(&raw).unwrap(), [0xAB; 20]);
        assert!(tmd_h3_hash(&raw[..0x100]).is_err());
    }
}
