//! Property-based coverage for the transparency log's Merkle machinery:
//! every leaf's inclusion proof verifies against the tree's own root,
//! and a forged leaf or tampered sibling never verifies.

use nooterra_crypto::sha256_hex;
use nooterra_transparency::{build_inclusion_proof, build_merkle_root, verify_inclusion_proof};
use proptest::prelude::*;

fn arb_leaves(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9]{4,16}", 1..=max)
        .prop_map(|seeds| seeds.iter().map(|s| sha256_hex(s.as_bytes())).collect())
}

proptest! {
    /// Every leaf's own inclusion proof verifies against the tree's root.
    #[test]
    fn every_leaf_inclusion_proof_verifies(leaves in arb_leaves(40)) {
        let root = build_merkle_root(&leaves);
        for (i, leaf) in leaves.iter().enumerate() {
            let proof = build_inclusion_proof(&leaves, i);
            prop_assert!(verify_inclusion_proof(leaf, i, leaves.len(), &proof, &root));
        }
    }

    /// A leaf hash that was never in the tree never verifies against
    /// its root, even presented with a real sibling-proof for some
    /// other index.
    #[test]
    fn a_forged_leaf_never_verifies(leaves in arb_leaves(40), forged in "[a-z0-9]{4,16}") {
        let root = build_merkle_root(&leaves);
        let forged_hash = sha256_hex(forged.as_bytes());
        prop_assume!(!leaves.contains(&forged_hash));

        let proof = build_inclusion_proof(&leaves, 0);
        prop_assert!(!verify_inclusion_proof(&forged_hash, 0, leaves.len(), &proof, &root));
    }

    /// Tampering with any single sibling in a valid proof breaks
    /// verification.
    #[test]
    fn a_tampered_sibling_never_verifies(leaves in arb_leaves(40), tamper in "[a-z0-9]{4,16}") {
        prop_assume!(leaves.len() >= 2);
        let root = build_merkle_root(&leaves);
        let mut proof = build_inclusion_proof(&leaves, 0);
        prop_assume!(!proof.is_empty());

        let tampered_hash = sha256_hex(tamper.as_bytes());
        prop_assume!(proof[0] != tampered_hash);
        proof[0] = tampered_hash;

        prop_assert!(!verify_inclusion_proof(&leaves[0], 0, leaves.len(), &proof, &root));
    }
}
