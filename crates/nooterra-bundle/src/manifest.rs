//! `ProofBundleManifest.v1` — a content-addressed manifest over a
//! bundle's files, with `verify/**` carved out of the hash domain so a
//! verification report can be dropped into the bundle after the fact
//! without perturbing the manifest it describes.

use std::collections::BTreeMap;

use abp_glob::{IncludeExcludeGlobs, MatchDecision};
use chrono::{DateTime, Utc};
use nooterra_crypto::{canonical::ToCanonical, hash_canonical, sha256_hex, CanonicalValue};
use nooterra_error::{ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, canonical_timestamp};
use serde::{Deserialize, Serialize};

const MAX_ID_LEN: usize = 128;

/// Patterns carved out of a manifest's hash domain. `verify/**` lets a
/// verification report be written after the manifest without changing
/// `manifestHash`.
pub const EXCLUDED_FROM_MANIFEST: &[&str] = &["verify/**"];

/// One file's entry in a [`ProofBundleManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFileEntry {
    /// The file's path within the bundle.
    pub name: String,
    /// Hex-SHA-256 of the file's bytes.
    pub sha256: String,
    /// The file's length in bytes.
    pub bytes: u64,
}

impl ToCanonical for ManifestFileEntry {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("name", self.name.to_canonical()),
            ("sha256", self.sha256.to_canonical()),
            ("bytes", (self.bytes as i64).to_canonical()),
        ])
    }
}

/// How file order and exclusions were determined when building the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingMeta {
    /// Always `"path_asc"`: files are hashed in ascending path order.
    pub file_order: String,
    /// Glob patterns excluded from `files` and thus from `manifestHash`.
    pub excludes: Vec<String>,
}

impl ToCanonical for HashingMeta {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("fileOrder", self.file_order.to_canonical()),
            (
                "excludes",
                CanonicalValue::array(self.excludes.iter().map(ToCanonical::to_canonical)),
            ),
        ])
    }
}

/// A content-addressed manifest over a proof bundle's files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundleManifest {
    /// A free-form tag for the kind of bundle (e.g. `"session"`, `"audit"`).
    pub kind: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Free-form scope descriptor (e.g. a session id or date range).
    pub scope: String,
    /// When this manifest was generated.
    pub generated_at: DateTime<Utc>,
    /// File ordering and exclusion rules used to build `files`.
    pub hashing: HashingMeta,
    /// The bundle's files, in ascending path order, `verify/**` excluded.
    pub files: Vec<ManifestFileEntry>,
    /// Content hash (identity).
    pub manifest_hash: String,
}

impl ProofBundleManifest {
    /// Schema version tag.
    pub const SCHEMA_VERSION: &'static str = "ProofBundleManifest.v1";

    fn canonical_body(&self, hash_override: Option<&str>) -> CanonicalValue {
        CanonicalValue::object([
            ("schema", Self::SCHEMA_VERSION.to_canonical()),
            ("kind", self.kind.to_canonical()),
            ("tenantId", self.tenant_id.to_canonical()),
            ("scope", self.scope.to_canonical()),
            ("generatedAt", canonical_timestamp(self.generated_at).to_canonical()),
            ("hashing", self.hashing.to_canonical()),
            (
                "files",
                CanonicalValue::array(self.files.iter().map(ToCanonical::to_canonical)),
            ),
            (
                "manifestHash",
                hash_override.map_or(CanonicalValue::Null, |h| h.to_canonical()),
            ),
        ])
    }

    /// Recompute `manifestHash` from the manifest's current fields.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        hash_canonical(&self.canonical_body(None))
    }

    /// Verify the declared `manifestHash` matches the current fields.
    pub fn verify_hash(&self) -> Result<(), NooterraError> {
        let computed = self.compute_hash();
        if computed != self.manifest_hash {
            return Err(NooterraError::new(
                ErrorCode::BundleManifestHashMismatch,
                "recomputed manifestHash does not match the declared value",
            )
            .with_context("expected", self.manifest_hash.clone())
            .with_context("computed", computed));
        }
        Ok(())
    }

    /// Build a manifest over `files` (path to bytes), sorted path-ASC by
    /// virtue of the `BTreeMap`'s iteration order, with `verify/**`
    /// carved out of both `files` and the hash domain.
    #[tracing::instrument(skip(files), fields(file_count = files.len()))]
    pub fn build(
        kind: impl Into<String>,
        tenant_id: impl Into<String>,
        scope: impl Into<String>,
        files: &BTreeMap<String, Vec<u8>>,
        generated_at: DateTime<Utc>,
    ) -> Result<Self, NooterraError> {
        let kind = bounded_identifier("kind", &kind.into(), MAX_ID_LEN)?;
        let tenant_id = bounded_identifier("tenantId", &tenant_id.into(), MAX_ID_LEN)?;
        let scope = bounded_identifier("scope", &scope.into(), MAX_ID_LEN)?;

        let excludes: Vec<String> = EXCLUDED_FROM_MANIFEST.iter().map(|s| s.to_string()).collect();
        let globs = IncludeExcludeGlobs::new(&[], &excludes).map_err(|e| {
            NooterraError::new(ErrorCode::PayloadInvalid, "failed to compile manifest exclude globs")
                .with_source(e)
        })?;

        let entries: Vec<ManifestFileEntry> = files
            .iter()
            .filter(|(path, _)| globs.decide_str(path) != MatchDecision::DeniedByExclude)
            .map(|(path, bytes)| ManifestFileEntry {
                name: path.clone(),
                sha256: sha256_hex(bytes),
                bytes: bytes.len() as u64,
            })
            .collect();

        let mut manifest = Self {
            kind,
            tenant_id,
            scope,
            generated_at,
            hashing: HashingMeta { file_order: "path_asc".to_string(), excludes },
            files: entries,
            manifest_hash: String::new(),
        };
        manifest.manifest_hash = manifest.compute_hash();
        tracing::debug!(target: "nooterra_bundle", entries = manifest.files.len(), "proof bundle manifest built");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn files(entries: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect()
    }

    /// Literal scenario: a bundle of `nooterra.json`, `events/events.jsonl`,
    /// and `verify/verification_report.json`. Mutating the verify file
    /// must not change `manifestHash`; mutating `events/events.jsonl` must.
    #[test]
    fn manifest_hash_stability_across_verify_mutation() {
        let base = files(&[
            ("nooterra.json", b"{}"),
            ("events/events.jsonl", b"{\"n\":1}\n"),
            ("verify/verification_report.json", b"{\"ok\":true}"),
        ]);
        let m1 = ProofBundleManifest::build("session", "tenant-1", "scope-1", &base, dt("2025-01-01T00:00:00Z")).unwrap();

        let mut mutated_verify = base.clone();
        mutated_verify.insert("verify/verification_report.json".to_string(), b"{\"ok\":false}".to_vec());
        let m2 = ProofBundleManifest::build("session", "tenant-1", "scope-1", &mutated_verify, dt("2025-01-01T00:00:00Z")).unwrap();
        assert_eq!(m1.manifest_hash, m2.manifest_hash);

        let mut mutated_events = base;
        mutated_events.insert("events/events.jsonl".to_string(), b"{\"n\":2}\n".to_vec());
        let m3 = ProofBundleManifest::build("session", "tenant-1", "scope-1", &mutated_events, dt("2025-01-01T00:00:00Z")).unwrap();
        assert_ne!(m1.manifest_hash, m3.manifest_hash);
    }

    #[test]
    fn verify_files_are_excluded_from_the_file_list() {
        let files = files(&[("a.json", b"{}"), ("verify/report.json", b"{}")]);
        let manifest = ProofBundleManifest::build("session", "tenant-1", "scope-1", &files, dt("2025-01-01T00:00:00Z")).unwrap();
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].name, "a.json");
    }

    #[test]
    fn files_are_in_path_ascending_order() {
        let files = files(&[("z.json", b"1"), ("a.json", b"2"), ("m.json", b"3")]);
        let manifest = ProofBundleManifest::build("session", "tenant-1", "scope-1", &files, dt("2025-01-01T00:00:00Z")).unwrap();
        let names: Vec<&str> = manifest.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "m.json", "z.json"]);
    }

    #[test]
    fn tampered_manifest_fails_verification() {
        let files = files(&[("a.json", b"{}")]);
        let mut manifest = ProofBundleManifest::build("session", "tenant-1", "scope-1", &files, dt("2025-01-01T00:00:00Z")).unwrap();
        manifest.scope = "different-scope".to_string();
        assert!(manifest.verify_hash().is_err());
    }
}
