//! Apploader boot-chain validation.
//!
//! Replays the structural checks the GameCube/Wii apploader performs before
//! loading the main DOL. The checks run in a fixed order and the first
//! failure wins; that ordering is part of the contract and is covered by
//! tests.

use std::fmt;

use crate::disc::{BootBlock, BootInfo, DolHeader, DolSection};

/// Physical memory size for both platforms. (24 MiB)
pub const PHYS_MEM_SIZE: u32 = 0x0180_0000;

/// FST RAM addresses at or above this value are illegal.
pub const FST_ADDRESS_LIMIT: u32 = 0x8170_0000;

/// DOL section address ceiling on retail units.
pub const DOL_ADDR_LIMIT_RETAIL: u32 = 0x8070_0000;

/// DOL section address ceiling on debug units.
pub const DOL_ADDR_LIMIT_DEBUG: u32 = 0x8120_0000;

/// Whether the boot chain targets retail or debug hardware limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Build {
    /// Retail address limits.
    #[default]
    Retail,
    /// Debug (devkit) address limits.
    Debug,
}

impl Build {
    #[inline]
    fn dol_addr_limit(self) -> u32 {
        match self {
            Build::Retail => DOL_ADDR_LIMIT_RETAIL,
            Build::Debug => DOL_ADDR_LIMIT_DEBUG,
        }
    }
}

/// Apploader validation result codes.
///
/// A closed set with fixed discriminants; the order of the failure codes
/// matches the order the checks run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AppLoaderError {
    /// The boot chain could not be evaluated.
    Unknown = 0,
    /// No errors.
    Ok = 1,
    /// FST length exceeds the maximum FST length.
    FstLength = 2,
    /// Debug monitor size is not a multiple of 32.
    DebugMonSizeUnaligned = 3,
    /// Simulated memory size is not a multiple of 32.
    SimMemSizeUnaligned = 4,
    /// (Physical memory size - simulated memory size) must be greater than
    /// the debug monitor size.
    PhysMemSizeMinusSimMemSizeNotGtDebugMonSize = 5,
    /// Simulated memory size must not exceed physical memory size.
    SimMemSizeNotLePhysMemSize = 6,
    /// FST RAM address is at or above the FST address limit.
    IllegalFstAddress = 7,
    /// Total DOL section size exceeds the boot info's DOL limit.
    DolExceedsSizeLimit = 8,
    /// A DOL section's load address exceeds the retail address limit.
    DolAddrLimitRetailExceeded = 9,
    /// A DOL section's load address exceeds the debug address limit.
    DolAddrLimitDebugExceeded = 10,
    /// A DOL text segment crosses the address limit.
    DolTextSegTooBig = 11,
    /// A DOL data segment crosses the address limit.
    DolDataSegTooBig = 12,
}

impl AppLoaderError {
    /// Whether validation passed.
    #[inline]
    pub fn is_ok(self) -> bool { self == AppLoaderError::Ok }
}

impl fmt::Display for AppLoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Ok => "OK",
            Self::FstLength => "FST length exceeds maximum FST length",
            Self::DebugMonSizeUnaligned => "debug monitor size is not a multiple of 32",
            Self::SimMemSizeUnaligned => "simulated memory size is not a multiple of 32",
            Self::PhysMemSizeMinusSimMemSizeNotGtDebugMonSize => {
                "(physical - simulated) memory size not greater than debug monitor size"
            }
            Self::SimMemSizeNotLePhysMemSize => {
                "simulated memory size exceeds physical memory size"
            }
            Self::IllegalFstAddress => "illegal FST address (must be below 0x81700000)",
            Self::DolExceedsSizeLimit => "DOL exceeds size limit",
            Self::DolAddrLimitRetailExceeded => "DOL exceeds retail address limit",
            Self::DolAddrLimitDebugExceeded => "DOL exceeds debug address limit",
            Self::DolTextSegTooBig => "DOL text segment is too big",
            Self::DolDataSegTooBig => "DOL data segment is too big",
        };
        f.write_str(s)
    }
}

/// Runs the apploader's structural checks against a boot chain.
///
/// Returns the first failing check's code, [`AppLoaderError::Ok`] otherwise.
pub fn validate_boot_chain(
    boot_block: &BootBlock,
    boot_info: &BootInfo,
    dol: &DolHeader,
    is_wii: bool,
    build: Build,
) -> AppLoaderError {
    let debug_mon_size = boot_info.debug_mon_size.get();
    let sim_mem_size = boot_info.sim_mem_size.get();

    // 1
    if boot_block.fst_size(is_wii) > boot_block.fst_max_size(is_wii) {
        return AppLoaderError::FstLength;
    }
    // 2
    if debug_mon_size % 32 != 0 {
        return AppLoaderError::DebugMonSizeUnaligned;
    }
    // 3
    if sim_mem_size % 32 != 0 {
        return AppLoaderError::SimMemSizeUnaligned;
    }
    // 4: wrapping subtraction matches the original 32-bit unsigned
    // arithmetic when sim_mem_size > PHYS_MEM_SIZE (check 5 reports that).
    if PHYS_MEM_SIZE.wrapping_sub(sim_mem_size) <= debug_mon_size {
        return AppLoaderError::PhysMemSizeMinusSimMemSizeNotGtDebugMonSize;
    }
    // 5
    if sim_mem_size > PHYS_MEM_SIZE {
        return AppLoaderError::SimMemSizeNotLePhysMemSize;
    }
    // 6
    if boot_block.fst_memory_address.get() >= FST_ADDRESS_LIMIT {
        return AppLoaderError::IllegalFstAddress;
    }
    // 7
    let dol_limit = boot_info.dol_limit.get();
    if dol_limit != 0 && dol.total_section_size() > dol_limit as u64 {
        return AppLoaderError::DolExceedsSizeLimit;
    }
    // 8
    let addr_limit = build.dol_addr_limit();
    let addr_exceeded = |s: &DolSection| s.is_active() && s.address > addr_limit;
    if dol.text_sections().chain(dol.data_sections()).any(|s| addr_exceeded(&s)) {
        return match build {
            Build::Retail => AppLoaderError::DolAddrLimitRetailExceeded,
            Build::Debug => AppLoaderError::DolAddrLimitDebugExceeded,
        };
    }
    // 9
    let seg_too_big =
        |s: &DolSection| s.is_active() && s.address as u64 + s.size as u64 > addr_limit as u64;
    if dol.text_sections().any(|s| seg_too_big(&s)) {
        return AppLoaderError::DolTextSegTooBig;
    }
    if dol.data_sections().any(|s| seg_too_big(&s)) {
        return AppLoaderError::DolDataSegTooBig;
    }
    AppLoaderError::Ok
}

#[cfg(test)]
mod tests {
    use zerocopy::FromZeros;

    use super::*;

    fn valid_chain() -> (BootBlock, BootInfo, DolHeader) {
        let mut boot_block = BootBlock::new_zeroed();
        boot_block.fst_size = 0x1000.into();
        boot_block.fst_max_size = 0x1000.into();
        boot_block.fst_memory_address = 0x8130_0000.into();
        let mut boot_info = BootInfo::new_zeroed();
        boot_info.sim_mem_size = 0x0100_0000.into();
        let mut dol = DolHeader::new_zeroed();
        dol.text_addrs[0] = 0x8000_3100.into();
        dol.text_sizes[0] = 0x2000.into();
        dol.data_addrs[0] = 0x8010_0000.into();
        dol.data_sizes[0] = 0x8000.into();
        (boot_block, boot_info, dol)
    }

    #[test]
    fn test_valid_chain_is_ok() {
        let (bb, bi, dol) = valid_chain();
        assert_eq!(validate_boot_chain(&bb, &bi, &dol, false, Build::Retail), AppLoaderError::Ok);
        assert_eq!(validate_boot_chain(&bb, &bi, &dol, true, Build::Debug), AppLoaderError::Ok);
    }

    #[test]
    fn test_check_order_fst_before_alignment() {
        // Violates both check 1 (FST length) and check 3 (sim mem
        // alignment); the earlier check must win.
        let (mut bb, mut bi, dol) = valid_chain();
        bb.fst_size = 0x2000.into();
        bb.fst_max_size = 0x1000.into();
        bi.sim_mem_size = (PHYS_MEM_SIZE - 31).into();
        assert_eq!(
            validate_boot_chain(&bb, &bi, &dol, false, Build::Retail),
            AppLoaderError::FstLength
        );
    }

    #[test]
    fn test_debug_mon_alignment() {
        let (bb, mut bi, dol) = valid_chain();
        bi.debug_mon_size = 33.into();
        bi.sim_mem_size = 0.into();
        assert_eq!(
            validate_boot_chain(&bb, &bi, &dol, false, Build::Retail),
            AppLoaderError::DebugMonSizeUnaligned
        );
    }

    #[test]
    fn test_phys_minus_sim_vs_debug_mon() {
        let (bb, mut bi, dol) = valid_chain();
        bi.sim_mem_size = (PHYS_MEM_SIZE - 32).into();
        bi.debug_mon_size = 32.into();
        assert_eq!(
            validate_boot_chain(&bb, &bi, &dol, false, Build::Retail),
            AppLoaderError::PhysMemSizeMinusSimMemSizeNotGtDebugMonSize
        );
    }

    #[test]
    fn test_sim_mem_exceeds_phys_mem() {
        // Oversized sim mem wraps past check 4 and is reported by check 5,
        // as in the original unsigned arithmetic.
        let (bb, mut bi, dol) = valid_chain();
        bi.sim_mem_size = (PHYS_MEM_SIZE + 32).into();
        assert_eq!(
            validate_boot_chain(&bb, &bi, &dol, false, Build::Retail),
            AppLoaderError::SimMemSizeNotLePhysMemSize
        );
    }

    #[test]
    fn test_illegal_fst_address() {
        let (mut bb, bi, dol) = valid_chain();
        bb.fst_memory_address = FST_ADDRESS_LIMIT.into();
        assert_eq!(
            validate_boot_chain(&bb, &bi, &dol, false, Build::Retail),
            AppLoaderError::IllegalFstAddress
        );
    }

    #[test]
    fn test_dol_size_limit() {
        let (bb, mut bi, dol) = valid_chain();
        bi.dol_limit = 0x1000.into();
        assert_eq!(
            validate_boot_chain(&bb, &bi, &dol, false, Build::Retail),
            AppLoaderError::DolExceedsSizeLimit
        );
        // Zero means unlimited.
        bi.dol_limit = 0.into();
        assert_eq!(validate_boot_chain(&bb, &bi, &dol, false, Build::Retail), AppLoaderError::Ok);
    }

    #[test]
    fn test_addr_limit_depends_on_build() {
        let (bb, bi, mut dol) = valid_chain();
        dol.data_addrs[0] = (DOL_ADDR_LIMIT_RETAIL + 0x100).into();
        assert_eq!(
            validate_boot_chain(&bb, &bi, &dol, false, Build::Retail),
            AppLoaderError::DolAddrLimitRetailExceeded
        );
        // The same address is fine on debug hardware.
        assert_eq!(validate_boot_chain(&bb, &bi, &dol, false, Build::Debug), AppLoaderError::Ok);
        dol.data_addrs[0] = (DOL_ADDR_LIMIT_DEBUG + 0x100).into();
        assert_eq!(
            validate_boot_chain(&bb, &bi, &dol, false, Build::Debug),
            AppLoaderError::DolAddrLimitDebugExceeded
        );
    }

    #[test]
    fn test_segment_crossing_limit() {
        let (bb, bi, mut dol) = valid_chain();
        dol.text_addrs[0] = (DOL_ADDR_LIMIT_RETAIL - 0x10).into();
        dol.text_sizes[0] = 0x20.into();
        assert_eq!(
            validate_boot_chain(&bb, &bi, &dol, false, Build::Retail),
            AppLoaderError::DolTextSegTooBig
        );
        dol.text_sizes[0] = 0.into();
        dol.data_addrs[1] = (DOL_ADDR_LIMIT_RETAIL - 0x10).into();
        dol.data_sizes[1] = 0x20.into();
        assert_eq!(
            validate_boot_chain(&bb, &bi, &dol, false, Build::Retail),
            AppLoaderError::DolDataSegTooBig
        );
    }

    #[test]
    fn test_inactive_sections_ignored() {
        let (bb, bi, mut dol) = valid_chain();
        dol.text_addrs[5] = 0xFFFF_0000.into();
        dol.text_sizes[5] = 0.into();
        assert_eq!(validate_boot_chain(&bb, &bi, &dol, false, Build::Retail), AppLoaderError::Ok);
    }
}
