#![warn(missing_docs)]
//! Verification engine for RVT-H Reader bank images.
//!
//! The RVT-H Reader is a Nintendo devkit hard drive exposing up to eight
//! "banks", each holding one full GameCube or Wii disc image. This crate
//! implements the integrity-verification core: bank directory parsing, disc
//! header/boot block/DOL parsing, Wii title-key resolution, partition
//! decryption, hash-tree (H0..H4) verification, and the apploader
//! boot-chain validation sequence.
//!
//! The engine consumes byte buffers supplied by the caller and returns
//! structured reports and typed errors. It performs no device or file I/O
//! of its own.
//!
//! # Examples
//!
//! Verifying a standalone disc image:
//!
//! ```no_run
//! use rvth::verify::{verify_image, VerifyOptions};
//!
//! let image = std::fs::read("path/to/bank.gcm").expect("Failed to read image");
//! let report = verify_image(&image, 0, &VerifyOptions::default())
//!     .expect("Failed to verify bank");
//! for part in &report.partitions {
//!     println!("partition {}: clean={}", part.index, part.outcome.is_clean());
//! }
//! ```

pub mod apploader;
pub mod common;
pub mod disc;
pub mod hashes;
pub mod keys;
pub mod nhcd;
#[cfg(test)]
mod testutil;
pub mod util;
pub mod verify;
pub mod wii;

/// Error types for rvth.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The bank directory is malformed. Fatal for the whole verify run,
    /// since no bank offsets can be trusted.
    #[error("invalid bank directory: {0}")]
    InvalidDirectory(String),
    /// Neither the GameCube nor the Wii magic word is present.
    #[error("unrecognized disc image (no GameCube or Wii magic)")]
    UnrecognizedDisc,
    /// The ticket references a common key index outside the known set.
    #[error("unknown common key index {0}")]
    UnknownKeyIndex(u8),
    /// A malformed or truncated disc structure.
    #[error("disc format error: {0}")]
    Format(String),
    /// A key-resolution or cipher-input failure.
    #[error("crypto error: {0}")]
    Crypto(String),
    /// A general I/O error.
    #[error("{0}")]
    Io(String, #[source] std::io::Error),
    /// An unknown error.
    #[error("error: {0}")]
    Other(String),
}

impl From<&str> for Error {
    #[inline]
    fn from(s: &str) -> Error { Error::Other(s.to_string()) }
}

impl From<String> for Error {
    #[inline]
    fn from(s: String) -> Error { Error::Other(s) }
}

/// Helper result type for [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Helper trait for adding context to errors.
pub trait ErrorContext {
    /// Adds context to an error.
    fn context(self, context: impl Into<String>) -> Error;
}

impl ErrorContext for std::io::Error {
    #[inline]
    fn context(self, context: impl Into<String>) -> Error { Error::Io(context.into(), self) }
}

/// Helper trait for adding context to result errors.
pub trait ResultContext<T> {
    /// Adds context to a result error.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Adds context to a result error using a closure.
    fn with_context<F>(self, f: F) -> Result<T>
    where F: FnOnce() -> String;
}

impl<T, E> ResultContext<T> for Result<T, E>
where E: ErrorContext
{
    #[inline]
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    #[inline]
    fn with_context<F>(self, f: F) -> Result<T>
    where F: FnOnce() -> String {
        self.map_err(|e| e.context(f()))
    }
}
