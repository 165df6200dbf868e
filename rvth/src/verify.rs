//! Top-level verification entry points.
//!
//! [`verify_image`] resolves a bank within a full device image (or treats a
//! standalone disc image as bank 0); [`verify_bank`] verifies one disc
//! image. Verification is best-effort: one broken partition is reported and
//! the remaining partitions are still checked. Only errors that make the
//! whole run meaningless (an unreadable bank directory, an unrecognized
//! disc, a malformed partition table) are fatal.

use std::fmt;

use tracing::{debug, instrument};

use crate::{
    apploader::{validate_boot_chain, AppLoaderError, Build},
    common::{DiscKind, KeyBytes, PartitionKind},
    disc::{BootBlock, BootInfo, DiscHeader, DolHeader, BOOT_INFO_OFFSET, CLUSTER_SIZE},
    hashes::HashOutcome,
    keys::KeySet,
    nhcd::{BankTable, NHCD_BLOCK_SIZE, NHCD_MAGIC, NHCD_MAX_BANKS, NHCD_TABLE_LBA},
    util::{
        aes::{decrypt_cluster_data, decrypt_cluster_hashes},
        array_ref, div_rem,
    },
    wii::{
        read_partition_table, tmd_h3_hash, PartitionTableEntry, WiiPartitionHeader,
        CLUSTER_DATA_SIZE, HASHES_SIZE, H3_TABLE_SIZE,
    },
    Error, Result,
};

/// Options for a verify run.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Number of hash-verification threads. 0 or 1 verifies on the calling
    /// thread.
    pub threads: usize,
}

/// How far one partition's verification got.
#[derive(Debug, Clone)]
pub enum PartitionOutcome {
    /// The hash tree was walked; the outcome carries any mismatches.
    Verified(HashOutcome),
    /// The title key could not be resolved, so the partition's contents
    /// could not be checked.
    CryptoFailure(String),
    /// A structure needed for verification was missing or out of range.
    ParseFailure(String),
}

impl PartitionOutcome {
    /// Whether the partition verified with no mismatches.
    #[inline]
    pub fn is_clean(&self) -> bool {
        matches!(self, PartitionOutcome::Verified(o) if o.is_clean())
    }
}

impl fmt::Display for PartitionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified(o) if o.is_clean() => write!(f, "OK ({} clusters)", o.clusters),
            Self::Verified(o) => write!(
                f,
                "{} of {} clusters bad, H3 table {}",
                o.cluster_mismatches.len(),
                o.clusters,
                if o.h4_ok { "OK" } else { "MISMATCH" }
            ),
            Self::CryptoFailure(e) => write!(f, "crypto failure: {}", e),
            Self::ParseFailure(e) => write!(f, "parse failure: {}", e),
        }
    }
}

/// Verification report for one partition.
#[derive(Debug, Clone)]
pub struct PartitionReport {
    /// Partition index in table order.
    pub index: usize,
    /// Partition kind from the table entry.
    pub kind: PartitionKind,
    /// Byte offset of the partition from the disc start.
    pub offset: u64,
    /// Hash-tree outcome.
    pub outcome: PartitionOutcome,
    /// Apploader boot-chain result. [`AppLoaderError::Unknown`] when the
    /// boot chain could not be read at all.
    pub boot: AppLoaderError,
}

/// Verification report for one bank.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// Game ID from the disc header.
    pub game_id: String,
    /// Game title from the disc header.
    pub game_title: String,
    /// Disc classification.
    pub kind: DiscKind,
    /// Per-partition results. Empty for GameCube discs.
    pub partitions: Vec<PartitionReport>,
    /// Disc-level boot-chain result. GameCube only; Wii boot chains are
    /// per partition.
    pub boot: Option<AppLoaderError>,
}

impl VerifyReport {
    /// Whether every check in the report passed.
    pub fn is_clean(&self) -> bool {
        self.boot.map_or(true, |b| b.is_ok())
            && self.partitions.iter().all(|p| p.outcome.is_clean() && p.boot.is_ok())
    }
}

/// Verifies one bank of a device image.
///
/// When the image carries the bank directory magic at its fixed device
/// offset, the directory is parsed and `bank` selects the disc image.
/// Otherwise the image is a standalone disc image (a plain GCM/ISO may
/// well be larger than the directory offset) and must be addressed as
/// bank 0.
#[instrument(skip_all, fields(bank))]
pub fn verify_image(image: &[u8], bank: usize, options: &VerifyOptions) -> Result<VerifyReport> {
    let dir_offset = NHCD_TABLE_LBA as usize * NHCD_BLOCK_SIZE;
    let dir_len = (1 + NHCD_MAX_BANKS) * NHCD_BLOCK_SIZE;
    let directory = image
        .get(dir_offset..dir_offset + dir_len)
        .filter(|directory| directory[..4] == NHCD_MAGIC[..]);
    if let Some(directory) = directory {
        let capacity_lba = (image.len() / NHCD_BLOCK_SIZE) as u64;
        let table = BankTable::parse(directory, capacity_lba)?;
        let entry = table
            .get(bank)
            .ok_or_else(|| Error::Format(format!("no such bank {}", bank)))?;
        if !entry.usable {
            return Err(Error::Format(format!("bank {} is {}", bank, entry.kind)));
        }
        let start = entry.byte_offset() as usize;
        let end = start + entry.byte_len() as usize;
        let disc = image.get(start..end).ok_or_else(|| {
            Error::Format(format!("bank {} extends past end of image", bank))
        })?;
        verify_bank(disc, options)
    } else {
        // Standalone GCM/ISO: the whole image is the disc.
        if bank != 0 {
            return Err(Error::Other(format!(
                "image has no bank directory; only bank 0 is addressable (got {})",
                bank
            )));
        }
        verify_bank(image, options)
    }
}

/// Verifies one disc image.
#[instrument(skip_all, fields(len = disc.len()))]
pub fn verify_bank(disc: &[u8], options: &VerifyOptions) -> Result<VerifyReport> {
    let header = DiscHeader::parse(disc)?;
    let mut report = VerifyReport {
        game_id: header.game_id_str().to_string(),
        game_title: header.game_title_str().to_string(),
        kind: DiscKind::GameCube,
        partitions: Vec::new(),
        boot: None,
    };
    if header.is_gamecube() {
        report.boot = Some(gamecube_boot(disc));
        return Ok(report);
    }

    report.kind = if header.has_partition_encryption() {
        DiscKind::WiiRetail
    } else {
        DiscKind::WiiUnencrypted
    };
    let entries = read_partition_table(disc)?;
    if entries.is_empty() {
        return Err(Error::Format("disc has no partitions".to_string()));
    }
    let mut kind_resolved = false;
    for entry in &entries {
        let (partition, key_set) = verify_wii_partition(disc, &header, entry, options);
        if !kind_resolved && header.has_partition_encryption() {
            if let Some(key_set) = key_set {
                report.kind = match key_set {
                    KeySet::Retail => DiscKind::WiiRetail,
                    KeySet::Debug => DiscKind::WiiDebug,
                };
                kind_resolved = true;
            }
        }
        report.partitions.push(partition);
    }
    Ok(report)
}

fn verify_wii_partition(
    disc: &[u8],
    header: &DiscHeader,
    entry: &PartitionTableEntry,
    options: &VerifyOptions,
) -> (PartitionReport, Option<KeySet>) {
    let mut report = PartitionReport {
        index: entry.index,
        kind: entry.kind,
        offset: entry.offset,
        outcome: PartitionOutcome::ParseFailure(String::new()),
        boot: AppLoaderError::Unknown,
    };
    let part_header = match WiiPartitionHeader::parse(disc, entry.offset) {
        Ok(h) => h,
        Err(e) => {
            report.outcome = PartitionOutcome::ParseFailure(e.to_string());
            return (report, None);
        }
    };
    let key_set = part_header.ticket.key_set().ok();
    let build = match key_set {
        Some(KeySet::Retail) => Build::Retail,
        // Unsigned or dpki-signed media is devkit.
        Some(KeySet::Debug) | None => Build::Debug,
    };

    let key = if header.has_partition_encryption() {
        match part_header.ticket.decrypt_title_key() {
            Ok(key) => Some(key),
            Err(e) => {
                report.outcome = PartitionOutcome::CryptoFailure(e.to_string());
                return (report, key_set);
            }
        }
    } else {
        None
    };

    let slices = (|| -> Result<_> {
        let tmd = slice_at(disc, entry.offset + part_header.tmd_off(), part_header.tmd_size(), "TMD")?;
        let expected_h4 = tmd_h3_hash(tmd)?;
        let h3_table = slice_at(
            disc,
            entry.offset + part_header.h3_table_off(),
            H3_TABLE_SIZE as u64,
            "H3 table",
        )?;
        let data = slice_at(
            disc,
            entry.offset + part_header.data_off(),
            part_header.data_size(),
            "partition data",
        )?;
        Ok((expected_h4, h3_table, data))
    })();
    let (expected_h4, h3_table, data) = match slices {
        Ok(v) => v,
        Err(e) => {
            report.outcome = PartitionOutcome::ParseFailure(e.to_string());
            return (report, key_set);
        }
    };

    if header.has_partition_hashes() {
        match crate::hashes::verify_partition(
            key.as_ref(),
            data,
            h3_table,
            &expected_h4,
            options.threads.max(1),
        ) {
            Ok(outcome) => report.outcome = PartitionOutcome::Verified(outcome),
            Err(e) => {
                report.outcome = PartitionOutcome::ParseFailure(e.to_string());
                return (report, key_set);
            }
        }
    } else {
        // The image was stored without hash tables; there is nothing to
        // check below the boot chain.
        debug!(index = entry.index, "partition has no hash tables");
        report.outcome = PartitionOutcome::Verified(HashOutcome {
            cluster_mismatches: Vec::new(),
            h4_ok: true,
            clusters: 0,
        });
    }

    report.boot = partition_boot(key.as_ref(), data, header.has_partition_hashes(), build);
    (report, key_set)
}

fn gamecube_boot(disc: &[u8]) -> AppLoaderError {
    match gamecube_boot_inner(disc) {
        Ok(code) => code,
        Err(e) => {
            debug!("boot chain unreadable: {}", e);
            AppLoaderError::Unknown
        }
    }
}

fn gamecube_boot_inner(disc: &[u8]) -> Result<AppLoaderError> {
    let boot_block = BootBlock::parse(disc)?;
    let boot_info = BootInfo::parse(disc)?;
    let dol_offset = boot_block.dol_offset(false);
    let dol_bytes = disc.get(dol_offset as usize..).ok_or_else(|| {
        Error::Format(format!("DOL offset {:#x} out of range", dol_offset))
    })?;
    let dol = DolHeader::parse(dol_bytes)?;
    dol.validate(dol_bytes.len() as u64)?;
    Ok(validate_boot_chain(&boot_block, &boot_info, &dol, false, Build::Retail))
}

/// Validates a Wii partition's boot chain, reading through the decryptor.
fn partition_boot(
    key: Option<&KeyBytes>,
    data: &[u8],
    has_hashes: bool,
    build: Build,
) -> AppLoaderError {
    match partition_boot_inner(key, data, has_hashes, build) {
        Ok(code) => code,
        Err(e) => {
            debug!("boot chain unreadable: {}", e);
            AppLoaderError::Unknown
        }
    }
}

fn partition_boot_inner(
    key: Option<&KeyBytes>,
    data: &[u8],
    has_hashes: bool,
    build: Build,
) -> Result<AppLoaderError> {
    let head = read_plain(key, data, has_hashes, 0, BOOT_INFO_OFFSET + size_of::<BootInfo>())?;
    // The partition data area begins with its own disc header.
    DiscHeader::parse(&head)?;
    let boot_block = BootBlock::parse(&head)?;
    let boot_info = BootInfo::parse(&head)?;
    let dol_offset = boot_block.dol_offset(true) as usize;
    let dol_bytes = read_plain(key, data, has_hashes, dol_offset, size_of::<DolHeader>())?;
    let dol = DolHeader::parse(&dol_bytes)?;
    let plain_len =
        if has_hashes { data.len() / CLUSTER_SIZE * CLUSTER_DATA_SIZE } else { data.len() };
    dol.validate((plain_len - dol_offset) as u64)?;
    Ok(validate_boot_chain(&boot_block, &boot_info, &dol, true, build))
}

/// Reads a plaintext byte range out of a partition's data area. With
/// hashes the area is 0x8000-byte clusters (hash region decrypted for its
/// IV, data region decrypted and skipped past); hashless images store raw
/// full-sector content and are read directly.
fn read_plain(
    key: Option<&KeyBytes>,
    data: &[u8],
    has_hashes: bool,
    offset: usize,
    len: usize,
) -> Result<Vec<u8>> {
    let plain_len =
        if has_hashes { data.len() / CLUSTER_SIZE * CLUSTER_DATA_SIZE } else { data.len() };
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= plain_len)
        .ok_or_else(|| {
            Error::Format(format!("read of {:#x}+{:#x} past end of partition data", offset, len))
        })?;
    if !has_hashes {
        return Ok(data[offset..end].to_vec());
    }
    let mut out = Vec::with_capacity(len);
    let mut pos = offset;
    while pos < end {
        let (cluster_idx, within) = div_rem(pos, CLUSTER_DATA_SIZE);
        let cluster = array_ref![data, cluster_idx * CLUSTER_SIZE, CLUSTER_SIZE];
        let take = (CLUSTER_DATA_SIZE - within).min(end - pos);
        match key {
            Some(key) => {
                let (_, iv) = decrypt_cluster_hashes(key, cluster);
                let mut decrypted = [0u8; CLUSTER_DATA_SIZE];
                decrypt_cluster_data(key, &iv, cluster, &mut decrypted);
                out.extend_from_slice(&decrypted[within..within + take]);
            }
            None => out
                .extend_from_slice(&cluster[HASHES_SIZE + within..HASHES_SIZE + within + take]),
        }
        pos += take;
    }
    Ok(out)
}

fn slice_at<'a>(disc: &'a [u8], offset: u64, len: u64, what: &str) -> Result<&'a [u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| Error::Format(format!("{} extent overflows", what)))?;
    disc.get(start..end).ok_or_else(|| {
        Error::Format(format!("{} at {:#x}+{:#x} is out of range", what, offset, len))
    })
}
