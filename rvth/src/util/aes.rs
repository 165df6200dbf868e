//! AES-128-CBC helpers for Wii partition data.
//!
//! Cluster decryption is a two-phase operation: the 0x400-byte hash region
//! is decrypted with a zero IV, while the data region's IV is the 16 bytes
//! at offset 0x3D0 of the *stored* (still encrypted) hash region. Phase one
//! captures that IV so phase two can be run, and tested, independently.

use tracing::instrument;

use crate::{
    common::KeyBytes,
    disc::CLUSTER_SIZE,
    util::array_ref,
    wii::{CLUSTER_DATA_SIZE, HASHES_SIZE},
};

/// Offset within the encrypted hash region of the data-region IV.
pub const DATA_IV_OFFSET: usize = 0x3D0;

/// Encrypts data in-place using AES-128-CBC with the given key and IV.
pub fn aes_cbc_encrypt(key: &KeyBytes, iv: &KeyBytes, data: &mut [u8]) {
    use aes::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
    assert_eq!(data.len() % 16, 0);
    let len = data.len();
    <cbc::Encryptor<aes::Aes128>>::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(data, len)
        .unwrap();
}

/// Decrypts data in-place using AES-128-CBC with the given key and IV.
pub fn aes_cbc_decrypt(key: &KeyBytes, iv: &KeyBytes, data: &mut [u8]) {
    use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
    assert_eq!(data.len() % 16, 0);
    <cbc::Decryptor<aes::Aes128>>::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(data)
        .unwrap();
}

/// Decrypts data buffer-to-buffer using AES-128-CBC with the given key and IV.
pub fn aes_cbc_decrypt_b2b(key: &KeyBytes, iv: &KeyBytes, data: &[u8], out: &mut [u8]) {
    use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
    assert_eq!(data.len() % 16, 0);
    assert_eq!(data.len(), out.len());
    <cbc::Decryptor<aes::Aes128>>::new(key.into(), iv.into())
        .decrypt_padded_b2b_mut::<NoPadding>(data, out)
        .unwrap();
}

/// Phase one: decrypts a cluster's hash region and captures the IV for the
/// data region.
#[instrument(skip_all)]
pub fn decrypt_cluster_hashes(
    key: &KeyBytes,
    cluster: &[u8; CLUSTER_SIZE],
) -> ([u8; HASHES_SIZE], KeyBytes) {
    let data_iv = *array_ref![cluster, DATA_IV_OFFSET, 16];
    let mut hashes = [0u8; HASHES_SIZE];
    aes_cbc_decrypt_b2b(key, &[0u8; 16], &cluster[..HASHES_SIZE], &mut hashes);
    (hashes, data_iv)
}

/// Phase two: decrypts a cluster's data region using the IV captured from
/// the stored hash region.
#[instrument(skip_all)]
pub fn decrypt_cluster_data(
    key: &KeyBytes,
    iv: &KeyBytes,
    cluster: &[u8; CLUSTER_SIZE],
    out: &mut [u8; CLUSTER_DATA_SIZE],
) {
    aes_cbc_decrypt_b2b(key, iv, &cluster[HASHES_SIZE..], out);
}

/// Decrypts a full Wii partition cluster buffer-to-buffer.
#[instrument(skip_all)]
pub fn decrypt_cluster_b2b(
    data: &[u8; CLUSTER_SIZE],
    out: &mut [u8; CLUSTER_SIZE],
    key: &KeyBytes,
) {
    let iv = *array_ref![data, DATA_IV_OFFSET, 16];
    aes_cbc_decrypt_b2b(key, &[0u8; 16], &data[..HASHES_SIZE], &mut out[..HASHES_SIZE]);
    aes_cbc_decrypt_b2b(key, &iv, &data[HASHES_SIZE..], &mut out[HASHES_SIZE..]);
}

/// Encrypts a Wii partition cluster in-place.
///
/// The inverse of [`decrypt_cluster_b2b`]; the hash region is encrypted
/// first so the data IV can be taken from its ciphertext.
#[instrument(skip_all)]
pub fn encrypt_cluster(out: &mut [u8; CLUSTER_SIZE], key: &KeyBytes) {
    aes_cbc_encrypt(key, &[0u8; 16], &mut out[..HASHES_SIZE]);
    let iv = *array_ref![out, DATA_IV_OFFSET, 16];
    aes_cbc_encrypt(key, &iv, &mut out[HASHES_SIZE..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_round_trip() {
        let key: KeyBytes = [0x42; 16];
        let mut cluster = [0u8; CLUSTER_SIZE];
        for (i, b) in cluster.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let original = cluster;
        encrypt_cluster(&mut cluster, &key);
        assert_ne!(cluster, original);

        let mut decrypted = [0u8; CLUSTER_SIZE];
        decrypt_cluster_b2b(&cluster, &mut decrypted, &key);
        assert_eq!(decrypted[..], original[..]);
    }

    #[test]
    fn test_two_phase_matches_full_decrypt() {
        let key: KeyBytes = [0x07; 16];
        let mut cluster = [0u8; CLUSTER_SIZE];
        for (i, b) in cluster.iter_mut().enumerate() {
            *b = (i % 239) as u8;
        }
        encrypt_cluster(&mut cluster, &key);

        let mut full = [0u8; CLUSTER_SIZE];
        decrypt_cluster_b2b(&cluster, &mut full, &key);

        let (hashes, iv) = decrypt_cluster_hashes(&key, &cluster);
        let mut data = [0u8; CLUSTER_DATA_SIZE];
        decrypt_cluster_data(&key, &iv, &cluster, &mut data);
        assert_eq!(hashes[..], full[..HASHES_SIZE]);
        assert_eq!(data[..], full[HASHES_SIZE..]);
    }
}
