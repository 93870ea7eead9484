//! The identity transparency log: append-only `IdentityLogEntry.v1`
//! records, `IdentityLogCheckpoint.v1` Merkle-root summaries, and
//! `IdentityLogProof.v1` inclusion proofs.
//!
//! The Merkle construction is RFC-6962-flavored: leaves are entry hashes
//! themselves (no extra domain tag), internal nodes reuse
//! [`nooterra_crypto::hash_pair_hex`], and an odd node at any level is
//! promoted unchanged. [`merkle::build_merkle_root`],
//! [`merkle::build_inclusion_proof`], and [`merkle::verify_inclusion_proof`]
//! operate on plain hex-hash slices; hex decoding happens only inside
//! `hash_pair_hex` itself.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checkpoint;
pub mod entry;
pub mod merkle;
pub mod proof;

pub use checkpoint::{check_for_equivocation, IdentityLogCheckpoint};
pub use entry::{validate_log, AgentStatus, EntryEventType, IdentityLogEntry};
pub use merkle::{build_inclusion_proof, build_merkle_root, verify_inclusion_proof};
pub use proof::IdentityLogProof;
