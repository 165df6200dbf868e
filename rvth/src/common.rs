//! Common types.

use std::fmt;

/// SHA-1 hash bytes
pub type HashBytes = [u8; 20];

/// AES key bytes
pub type KeyBytes = [u8; 16];

/// Magic bytes
pub type MagicBytes = [u8; 4];

/// The kind of disc partition.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PartitionKind {
    /// Data partition.
    Data,
    /// Update partition.
    Update,
    /// Channel partition.
    Channel,
    /// Other partition kind.
    Other(u32),
}

impl fmt::Display for PartitionKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "Data"),
            Self::Update => write!(f, "Update"),
            Self::Channel => write!(f, "Channel"),
            Self::Other(v) => {
                let bytes = v.to_be_bytes();
                write!(f, "Other ({:08X}, {})", v, String::from_utf8_lossy(&bytes))
            }
        }
    }
}

impl From<u32> for PartitionKind {
    #[inline]
    fn from(v: u32) -> Self {
        match v {
            0 => Self::Data,
            1 => Self::Update,
            2 => Self::Channel,
            v => Self::Other(v),
        }
    }
}

/// Disc classification as reported by the verifier.
///
/// The encryption variants require disc bytes (header crypto flags and the
/// ticket's signing chain), so this is produced per verify run rather than
/// from the bank directory alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscKind {
    /// GameCube disc. Never encrypted.
    GameCube,
    /// Wii disc with retail-signed, encrypted partitions.
    WiiRetail,
    /// Wii disc with debug-signed (RVT-R) encrypted partitions.
    WiiDebug,
    /// Wii disc stored without partition encryption (common on RVT-H banks).
    WiiUnencrypted,
}

impl fmt::Display for DiscKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GameCube => write!(f, "GameCube"),
            Self::WiiRetail => write!(f, "Wii (retail, encrypted)"),
            Self::WiiDebug => write!(f, "Wii (debug, encrypted)"),
            Self::WiiUnencrypted => write!(f, "Wii (unencrypted)"),
        }
    }
}
