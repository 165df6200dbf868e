//! Common encryption keys and per-partition title-key resolution.

use std::ffi::CStr;

use crate::{common::KeyBytes, util::aes::aes_cbc_decrypt, wii::Ticket, Error, Result};

/// Ticket issuer for retail-signed (ppki) discs.
pub const CERT_ISSUER_PPKI_TICKET: &str = "Root-CA00000001-XS00000003";

/// Ticket issuer for debug-signed (dpki) discs.
pub const CERT_ISSUER_DPKI_TICKET: &str = "Root-CA00000002-XS00000006";

// ppki (Retail)
#[rustfmt::skip]
static RETAIL_COMMON_KEYS: [KeyBytes; 3] = [
    /* RVL_KEY_RETAIL */
    [0xeb, 0xe4, 0x2a, 0x22, 0x5e, 0x85, 0x93, 0xe4, 0x48, 0xd9, 0xc5, 0x45, 0x73, 0x81, 0xaa, 0xf7],
    /* RVL_KEY_KOREAN */
    [0x63, 0xb8, 0x2b, 0xb4, 0xf4, 0x61, 0x4e, 0x2e, 0x13, 0xf2, 0xfe, 0xfb, 0xba, 0x4c, 0x9b, 0x7e],
    /* vWii_KEY_RETAIL */
    [0x30, 0xbf, 0xc7, 0x6e, 0x7c, 0x19, 0xaf, 0xbb, 0x23, 0x16, 0x33, 0x30, 0xce, 0xd7, 0xc2, 0x8d],
];

// dpki (Debug)
#[rustfmt::skip]
static DEBUG_COMMON_KEYS: [KeyBytes; 3] = [
    /* RVL_KEY_DEBUG */
    [0xa1, 0x60, 0x4a, 0x6a, 0x71, 0x23, 0xb5, 0x29, 0xae, 0x8b, 0xec, 0x32, 0xc8, 0x16, 0xfc, 0xaa],
    /* RVL_KEY_KOREAN_DEBUG */
    [0x67, 0x45, 0x8b, 0x6b, 0xc6, 0x23, 0x7b, 0x32, 0x69, 0x98, 0x3c, 0x64, 0x73, 0x48, 0x33, 0x66],
    /* vWii_KEY_DEBUG */
    [0x2f, 0x5c, 0x1b, 0x29, 0x44, 0xe7, 0xfd, 0x6f, 0xc3, 0x97, 0x96, 0x4b, 0x05, 0x76, 0x91, 0xfa],
];

/// Which common-key table a disc's tickets are signed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySet {
    /// Retail (ppki) keys.
    Retail,
    /// Debug (dpki) keys, used by RVT-R and RVT-H media.
    Debug,
}

impl KeySet {
    /// Resolves a common key by the ticket's key index
    /// (0 = standard, 1 = Korean, 2 = vWii).
    pub fn common_key(self, index: u8) -> Result<&'static KeyBytes> {
        let table = match self {
            KeySet::Retail => &RETAIL_COMMON_KEYS,
            KeySet::Debug => &DEBUG_COMMON_KEYS,
        };
        table.get(index as usize).ok_or(Error::UnknownKeyIndex(index))
    }
}

impl Ticket {
    /// Determines the key set from the ticket's signature issuer.
    pub fn key_set(&self) -> Result<KeySet> {
        let issuer =
            CStr::from_bytes_until_nul(&self.sig_issuer).ok().and_then(|c| c.to_str().ok());
        match issuer {
            Some(CERT_ISSUER_PPKI_TICKET) => Ok(KeySet::Retail),
            Some(CERT_ISSUER_DPKI_TICKET) => Ok(KeySet::Debug),
            Some(v) => Err(Error::Crypto(format!("unknown certificate issuer {:?}", v))),
            None => Err(Error::Crypto("failed to parse certificate issuer".to_string())),
        }
    }

    /// Decrypts the ticket's title key using the appropriate common key.
    ///
    /// The IV is the high 8 bytes of the title ID followed by 8 zero bytes.
    /// An unknown key index fails with [`Error::UnknownKeyIndex`]; this is
    /// fatal for the affected partition only.
    pub fn decrypt_title_key(&self) -> Result<KeyBytes> {
        let mut iv: KeyBytes = [0; 16];
        iv[..8].copy_from_slice(&self.title_id);
        let common_key = self.key_set()?.common_key(self.common_key_idx)?;
        let mut title_key = self.title_key;
        aes_cbc_decrypt(common_key, &iv, &mut title_key);
        Ok(title_key)
    }
}
