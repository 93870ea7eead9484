//! Proof bundle assembly: `ProofBundleManifest.v1` over a flat
//! path-to-bytes file map, and the `BundleHeadAttestation.v1` that
//! signs its manifest hash together with each embedded stream's head
//! position.
//!
//! A bundle on disk follows a fixed layout; [`layout`] names the paths
//! a writer places files at and the reader looks them up by.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod attestation;
pub mod manifest;

pub use attestation::{BundleHeadAttestation, StreamHead};
pub use manifest::{HashingMeta, ManifestFileEntry, ProofBundleManifest, EXCLUDED_FROM_MANIFEST};

/// The fixed file layout a proof bundle is assembled under.
pub mod layout {
    /// The bundle's manifest.
    pub const MANIFEST: &str = "manifest.json";
    /// Top-level bundle metadata.
    pub const NOOTERRA_ROOT: &str = "nooterra.json";
    /// Newline-delimited event records.
    pub const EVENTS_JSONL: &str = "events/events.jsonl";
    /// Newline-delimited raw payload material backing the events.
    pub const PAYLOAD_MATERIAL_JSONL: &str = "events/payload_material.jsonl";
    /// Tenant-scoped governance artifacts live under this prefix.
    pub const GOVERNANCE_TENANT_PREFIX: &str = "governance/tenant/";
    /// Global governance artifacts live under this prefix.
    pub const GOVERNANCE_GLOBAL_PREFIX: &str = "governance/global/";
    /// Content-addressed contract documents live under this prefix, named `{sha256}.json`.
    pub const CONTRACTS_PREFIX: &str = "contracts/";
    /// Content-addressed policy documents live under this prefix, named `{sha256}.json`.
    pub const POLICIES_PREFIX: &str = "policies/";
    /// Content-addressed artifacts live under this prefix, named `{type}/{sha256}.json`.
    pub const ARTIFACTS_PREFIX: &str = "artifacts/";
    /// The bundle's embedded public keys.
    pub const PUBLIC_KEYS: &str = "keys/public_keys.json";
    /// The signed head attestation.
    pub const BUNDLE_HEAD_ATTESTATION: &str = "attestation/bundle_head_attestation.json";
    /// A verification report, excluded from the manifest hash.
    pub const VERIFICATION_REPORT: &str = "verify/verification_report.json";
    /// An alternate, shorter verification report path, also excluded.
    pub const VERIFY_REPORT: &str = "verify/report.json";

    /// `{sha256}.json` under [`CONTRACTS_PREFIX`].
    #[must_use]
    pub fn contract_path(sha256: &str) -> String {
        format!("{CONTRACTS_PREFIX}{sha256}.json")
    }

    /// `{sha256}.json` under [`POLICIES_PREFIX`].
    #[must_use]
    pub fn policy_path(sha256: &str) -> String {
        format!("{POLICIES_PREFIX}{sha256}.json")
    }

    /// `{type}/{sha256}.json` under [`ARTIFACTS_PREFIX`].
    #[must_use]
    pub fn artifact_path(artifact_type: &str, sha256: &str) -> String {
        format!("{ARTIFACTS_PREFIX}{artifact_type}/{sha256}.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_excluded_consistently() {
        assert!(layout::VERIFICATION_REPORT.starts_with("verify/"));
        assert!(layout::VERIFY_REPORT.starts_with("verify/"));
        assert_eq!(EXCLUDED_FROM_MANIFEST, &["verify/**"]);
    }

    #[test]
    fn content_addressed_path_helpers() {
        assert_eq!(layout::contract_path("abc"), "contracts/abc.json");
        assert_eq!(layout::policy_path("abc"), "policies/abc.json");
        assert_eq!(layout::artifact_path("diff", "abc"), "artifacts/diff/abc.json");
    }
}
