//! Builders for synthetic disc structures, shared across test modules.

use zerocopy::FromZeros;

use crate::{
    common::{HashBytes, KeyBytes},
    disc::CLUSTER_SIZE,
    keys::{KeySet, CERT_ISSUER_DPKI_TICKET, CERT_ISSUER_PPKI_TICKET},
    util::{
        aes::{aes_cbc_encrypt, encrypt_cluster},
        array_ref_mut,
        digest::sha1_hash,
    },
    wii::{Ticket, CLUSTER_DATA_SIZE, H3_TABLE_SIZE, HASHES_SIZE},
};

/// Builds a ticket whose encrypted title key decrypts to `title_key` under
/// common key 0 of the given key set.
pub(crate) fn make_ticket(key_set: KeySet, title_key: &KeyBytes) -> Ticket {
    let mut ticket = Ticket::new_zeroed();
    let issuer = match key_set {
        KeySet::Retail => CERT_ISSUER_PPKI_TICKET,
        KeySet::Debug => CERT_ISSUER_DPKI_TICKET,
    };
    ticket.sig_issuer[..issuer.len()].copy_from_slice(issuer.as_bytes());
    ticket.title_id = *b"\x00\x01\x00\x00RVTE";
    ticket.common_key_idx = 0;
    let mut iv: KeyBytes = [0; 16];
    iv[..8].copy_from_slice(&ticket.title_id);
    let mut encrypted = *title_key;
    let common_key = key_set.common_key(0).unwrap();
    aes_cbc_encrypt(common_key, &iv, &mut encrypted);
    ticket.title_key = encrypted;
    ticket
}

/// Builds `count` (1..=8) clusters with consistent H0..H2 tables, plus a
/// matching H3 table and its hash ("H4"). `fill` populates each cluster's
/// 0x7C00-byte data region; `key` encrypts the result when present.
///
/// All clusters land in subgroup 0 of group 0, so the shared H1 and H2
/// tables only have their first slots populated.
pub(crate) fn build_hashed_clusters(
    count: usize,
    key: Option<&KeyBytes>,
    mut fill: impl FnMut(usize, &mut [u8]),
) -> (Vec<u8>, Vec<u8>, HashBytes) {
    assert!((1..=8).contains(&count), "builder supports a single subgroup");
    let mut datas = vec![vec![0u8; CLUSTER_DATA_SIZE]; count];
    let mut hash_regions = vec![vec![0u8; HASHES_SIZE]; count];
    for i in 0..count {
        fill(i, &mut datas[i]);
        for j in 0..31 {
            let h0 = sha1_hash(&datas[i][j * 0x400..(j + 1) * 0x400]);
            hash_regions[i][j * 20..(j + 1) * 20].copy_from_slice(&h0);
        }
    }
    let mut h1_table = [0u8; 0xA0];
    for i in 0..count {
        let h1 = sha1_hash(&hash_regions[i][..0x26C]);
        h1_table[i * 20..(i + 1) * 20].copy_from_slice(&h1);
    }
    let mut h2_table = [0u8; 0xA0];
    let h2 = sha1_hash(&h1_table);
    h2_table[..20].copy_from_slice(&h2);
    for region in &mut hash_regions {
        region[0x280..0x320].copy_from_slice(&h1_table);
        region[0x340..0x3E0].copy_from_slice(&h2_table);
    }
    let mut h3_table = vec![0u8; H3_TABLE_SIZE];
    let h3 = sha1_hash(&h2_table);
    h3_table[..20].copy_from_slice(&h3);
    let h4 = sha1_hash(&h3_table);

    let mut clusters = Vec::with_capacity(count * CLUSTER_SIZE);
    for i in 0..count {
        let start = clusters.len();
        clusters.extend_from_slice(&hash_regions[i]);
        clusters.extend_from_slice(&datas[i]);
        if let Some(key) = key {
            encrypt_cluster(array_ref_mut![clusters, start, CLUSTER_SIZE], key);
        }
    }
    (clusters, h3_table, h4)
}
