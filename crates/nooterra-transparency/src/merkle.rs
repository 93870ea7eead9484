//! RFC-6962-flavored Merkle tree over identity log entry hashes.
//!
//! The leaf value *is* the entry hash (no extra domain-separation tag is
//! prefixed); the internal-node construction reuses
//! [`nooterra_crypto::hash_pair_hex`] directly. An odd node at any level
//! is promoted to the next level unchanged rather than paired with
//! itself.

use nooterra_crypto::hash_pair_hex;

fn fold_level(level: &[String]) -> Vec<String> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    let mut i = 0;
    while i < level.len() {
        if i + 1 < level.len() {
            next.push(hash_pair_hex(&level[i], &level[i + 1]));
        } else {
            next.push(level[i].clone());
        }
        i += 2;
    }
    next
}

/// Compute the Merkle root over `leaves` (hex-encoded entry hashes, in
/// `logIndex` order). Returns the single leaf unchanged for a tree of
/// size 1; panics if `leaves` is empty since a checkpoint is never built
/// over zero entries.
#[must_use]
pub fn build_merkle_root(leaves: &[String]) -> String {
    assert!(!leaves.is_empty(), "cannot build a Merkle root over zero leaves");
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = fold_level(&level);
    }
    level.into_iter().next().expect("non-empty level")
}

/// Compute the inclusion proof (ordered sibling hashes, root-ward) for
/// `leaf_index` within `leaves`.
#[must_use]
pub fn build_inclusion_proof(leaves: &[String], leaf_index: usize) -> Vec<String> {
    let mut level = leaves.to_vec();
    let mut idx = leaf_index;
    let mut siblings = Vec::new();
    while level.len() > 1 {
        let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
        if sibling_idx < level.len() {
            siblings.push(level[sibling_idx].clone());
        }
        level = fold_level(&level);
        idx /= 2;
    }
    siblings
}

/// Verify that `leaf_hash` at `leaf_index`, combined with `siblings` in
/// order, recomputes `root` for a tree of `tree_size` leaves.
#[must_use]
pub fn verify_inclusion_proof(
    leaf_hash: &str,
    leaf_index: usize,
    tree_size: usize,
    siblings: &[String],
    root: &str,
) -> bool {
    if leaf_index >= tree_size {
        return false;
    }
    let mut current = leaf_hash.to_string();
    let mut idx = leaf_index;
    let mut size = tree_size;
    let mut sib_iter = siblings.iter();

    while size > 1 {
        if idx % 2 == 0 {
            if idx + 1 < size {
                let Some(sibling) = sib_iter.next() else {
                    return false;
                };
                current = hash_pair_hex(&current, sibling);
            }
        } else {
            let Some(sibling) = sib_iter.next() else {
                return false;
            };
            current = hash_pair_hex(sibling, &current);
        }
        idx /= 2;
        size = size.div_ceil(2);
    }

    sib_iter.next().is_none() && current == root
}
