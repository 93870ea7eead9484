//! `PaidToolManifest.v1` / `.v2`: the provider-declared catalog of
//! per-tool pricing and signature requirements paid-tool calls bind to.

use nooterra_crypto::{canonical::ToCanonical, hash_canonical, CanonicalValue};
use nooterra_error::{ErrorAccumulator, ErrorCode, NooterraError};
use nooterra_normalize::{bounded_identifier, currency, dedup_sorted, positive_integer};
use serde::{Deserialize, Serialize};

const MAX_ID_LEN: usize = 128;

/// Whether a tool call may be retried safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Idempotency {
    /// Retrying with the same idempotency key is always safe.
    Idempotent,
    /// Retrying may duplicate effects.
    NonIdempotent,
    /// The call has external side effects beyond billing.
    SideEffecting,
}

impl Idempotency {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Idempotent => "idempotent",
            Self::NonIdempotent => "non_idempotent",
            Self::SideEffecting => "side_effecting",
        }
    }
}

impl ToCanonical for Idempotency {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// Whether a request signature is required or merely accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMode {
    /// A signature must be present for the call to be accepted.
    Required,
    /// A signature may be present but is not enforced.
    Optional,
}

impl SignatureMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
        }
    }
}

impl ToCanonical for SignatureMode {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Per-call pricing for a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPricing {
    /// Amount billed per call, in cents.
    pub amount_cents: i64,
    /// Currency the amount is denominated in.
    pub currency: String,
}

impl ToCanonical for ToolPricing {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("amountCents", self.amount_cents.to_canonical()),
            ("currency", self.currency.to_canonical()),
        ])
    }
}

/// V2-only risk classification for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolClass {
    /// Read-only tool.
    Read,
    /// Compute-only tool with no external side effects.
    Compute,
    /// A tool with external side effects.
    Action,
}

impl ToolClass {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Compute => "compute",
            Self::Action => "action",
        }
    }
}

impl ToCanonical for ToolClass {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// V2-only coarse risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
}

impl RiskLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl ToCanonical for RiskLevel {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// V2-only request-binding strictness: how tightly a request must match
/// its declared shape before a signature is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestBinding {
    /// Request must match exactly.
    Strict,
    /// A loose match is tolerated but logged.
    Recommended,
    /// No binding is enforced.
    None,
}

impl RequestBinding {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Recommended => "recommended",
            Self::None => "none",
        }
    }
}

impl ToCanonical for RequestBinding {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::String(self.as_str().to_string())
    }
}

/// V2-only security requirements for a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSecurity {
    /// Which signature kinds a caller must present, deduped and sorted.
    pub required_signatures: Vec<String>,
    /// How strictly the request body must bind to the signature.
    pub request_binding: RequestBinding,
}

impl ToCanonical for ToolSecurity {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("requiredSignatures", self.required_signatures.to_canonical()),
            ("requestBinding", self.request_binding.to_canonical()),
        ])
    }
}

const REQUIRED_SIGNATURE_KINDS: &[&str] = &["quote", "output", "refund_decision"];

/// Extra fields only present in a `PaidToolManifest.v2` tool entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ToolV2Extras {
    /// Coarse risk classification.
    pub tool_class: Option<ToolClass>,
    /// Coarse risk level.
    pub risk_level: Option<RiskLevel>,
    /// Deduped, sorted capability tags this tool exercises.
    pub capability_tags: Vec<String>,
    /// Security posture for this tool.
    pub security: Option<ToolSecurity>,
}

impl ToCanonical for ToolV2Extras {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("toolClass", self.tool_class.map(|c| c.to_canonical()).unwrap_or(CanonicalValue::Null)),
            ("riskLevel", self.risk_level.map(|r| r.to_canonical()).unwrap_or(CanonicalValue::Null)),
            ("capabilityTags", self.capability_tags.to_canonical()),
            (
                "security",
                self.security.as_ref().map(ToCanonical::to_canonical).unwrap_or(CanonicalValue::Null),
            ),
        ])
    }
}

/// A single priced tool within a provider's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEntry {
    /// Unique identifier for this tool within its manifest.
    pub tool_id: String,
    /// Path the tool is invoked at; always starts with `/`.
    pub paid_path: String,
    /// HTTP method the tool is invoked with.
    pub method: String,
    /// Per-call pricing.
    pub pricing: ToolPricing,
    /// Retry safety.
    pub idempotency: Idempotency,
    /// Signature enforcement.
    pub signature_mode: SignatureMode,
    /// v2-only extra fields; empty/default on a v1 manifest.
    pub v2: ToolV2Extras,
}

impl ToCanonical for ToolEntry {
    fn to_canonical(&self) -> CanonicalValue {
        let mut fields = vec![
            ("toolId", self.tool_id.to_canonical()),
            ("paidPath", self.paid_path.to_canonical()),
            ("method", self.method.to_canonical()),
            ("pricing", self.pricing.to_canonical()),
            ("idempotency", self.idempotency.to_canonical()),
            ("signatureMode", self.signature_mode.to_canonical()),
        ];
        if self.v2 != ToolV2Extras::default() {
            fields.push(("toolClass", self.v2.tool_class.map(|c| c.to_canonical()).unwrap_or(CanonicalValue::Null)));
            fields.push(("riskLevel", self.v2.risk_level.map(|r| r.to_canonical()).unwrap_or(CanonicalValue::Null)));
            fields.push(("capabilityTags", self.v2.capability_tags.to_canonical()));
            fields.push((
                "security",
                self.v2.security.as_ref().map(ToCanonical::to_canonical).unwrap_or(CanonicalValue::Null),
            ));
        }
        CanonicalValue::object(fields)
    }
}

/// Manifest-wide pricing/policy defaults applied unless a tool overrides them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDefaults {
    /// Default per-call amount, in cents.
    pub amount_cents: i64,
    /// Default currency.
    pub currency: String,
    /// Default retry safety.
    pub idempotency: Idempotency,
    /// Default signature enforcement.
    pub signature_mode: SignatureMode,
}

impl ToCanonical for ManifestDefaults {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("amountCents", self.amount_cents.to_canonical()),
            ("currency", self.currency.to_canonical()),
            ("idempotency", self.idempotency.to_canonical()),
            ("signatureMode", self.signature_mode.to_canonical()),
        ])
    }
}

/// `PaidToolManifest.v1` / `.v2` — the schema version is inferred from
/// whether `publishProofJwksUrl` or any v2-only tool field is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidToolManifest {
    /// The provider publishing this manifest.
    pub provider_id: String,
    /// Base URL the provider's tools are hosted under, if any.
    pub upstream_base_url: Option<String>,
    /// HTTPS JWKS endpoint for verifying this provider's publish proofs
    /// (v2 only).
    pub publish_proof_jwks_url: Option<String>,
    /// Manifest-wide defaults.
    pub defaults: ManifestDefaults,
    /// The priced tools this manifest declares.
    pub tools: Vec<ToolEntry>,
}

impl PaidToolManifest {
    /// Schema version tag this manifest currently satisfies.
    #[must_use]
    pub fn schema_version(&self) -> &'static str {
        if self.is_v2() {
            "PaidToolManifest.v2"
        } else {
            "PaidToolManifest.v1"
        }
    }

    fn is_v2(&self) -> bool {
        self.publish_proof_jwks_url.is_some() || self.tools.iter().any(|t| t.v2 != ToolV2Extras::default())
    }

    fn canonical_body(&self) -> CanonicalValue {
        CanonicalValue::object([
            ("schemaVersion", self.schema_version().to_canonical()),
            ("providerId", self.provider_id.to_canonical()),
            ("upstreamBaseUrl", self.upstream_base_url.to_canonical()),
            ("publishProofJwksUrl", self.publish_proof_jwks_url.to_canonical()),
            ("defaults", self.defaults.to_canonical()),
            ("tools", CanonicalValue::array(self.tools.iter().map(ToCanonical::to_canonical))),
        ])
    }

    /// Deterministic content hash over the manifest.
    #[must_use]
    pub fn manifest_hash(&self) -> String {
        hash_canonical(&self.canonical_body())
    }

    /// Validate the manifest: `toolId` and `paidPath` are each unique,
    /// every `method` is in the closed HTTP method set, every
    /// `security.requiredSignatures` entry is in the closed signature-kind
    /// set, and a v2 JWKS url (if present) must be `https`.
    pub fn validate(&self) -> Result<(), NooterraError> {
        let mut acc = ErrorAccumulator::new();

        if let Some(url) = &self.publish_proof_jwks_url {
            if !url.starts_with("https://") {
                acc.push(
                    NooterraError::new(ErrorCode::PayloadInvalid, "publishProofJwksUrl must be https")
                        .with_context("field", "publishProofJwksUrl"),
                );
            }
        }

        let mut seen_tool_ids = std::collections::BTreeSet::new();
        let mut seen_paths = std::collections::BTreeSet::new();
        for tool in &self.tools {
            if !seen_tool_ids.insert(tool.tool_id.clone()) {
                acc.push(
                    NooterraError::new(ErrorCode::PayloadInvalid, "duplicate toolId in manifest")
                        .with_context("toolId", tool.tool_id.clone()),
                );
            }
            if !seen_paths.insert(tool.paid_path.clone()) {
                acc.push(
                    NooterraError::new(ErrorCode::PayloadInvalid, "duplicate paidPath in manifest")
                        .with_context("paidPath", tool.paid_path.clone()),
                );
            }
            if !tool.paid_path.starts_with('/') {
                acc.push(
                    NooterraError::new(ErrorCode::PayloadInvalid, "paidPath must start with '/'")
                        .with_context("toolId", tool.tool_id.clone()),
                );
            }
            if !HTTP_METHODS.contains(&tool.method.as_str()) {
                acc.push(
                    NooterraError::new(ErrorCode::PayloadInvalid, "method is not in the allowed HTTP method set")
                        .with_context("toolId", tool.tool_id.clone())
                        .with_context("method", tool.method.clone()),
                );
            }
            if let Some(security) = &tool.v2.security {
                for sig in &security.required_signatures {
                    if !REQUIRED_SIGNATURE_KINDS.contains(&sig.as_str()) {
                        acc.push(
                            NooterraError::new(
                                ErrorCode::PayloadInvalid,
                                "requiredSignatures entry is not in the allowed signature-kind set",
                            )
                            .with_context("toolId", tool.tool_id.clone())
                            .with_context("signature", sig.clone()),
                        );
                    }
                }
            }
        }

        acc.finish()
    }
}

/// Accumulating builder for a [`ToolEntry`].
#[derive(Debug, Default)]
pub struct ToolEntryBuilder {
    tool_id: Option<String>,
    paid_path: Option<String>,
    method: Option<String>,
    amount_cents: i64,
    currency: String,
    idempotency: Option<Idempotency>,
    signature_mode: Option<SignatureMode>,
    v2: ToolV2Extras,
}

impl ToolEntryBuilder {
    /// Start a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tool id.
    #[must_use]
    pub fn tool_id(mut self, v: impl Into<String>) -> Self {
        self.tool_id = Some(v.into());
        self
    }

    /// Set the invocation path.
    #[must_use]
    pub fn paid_path(mut self, v: impl Into<String>) -> Self {
        self.paid_path = Some(v.into());
        self
    }

    /// Set the HTTP method.
    #[must_use]
    pub fn method(mut self, v: impl Into<String>) -> Self {
        self.method = Some(v.into());
        self
    }

    /// Set per-call pricing.
    #[must_use]
    pub fn pricing(mut self, amount_cents: i64, currency: impl Into<String>) -> Self {
        self.amount_cents = amount_cents;
        self.currency = currency.into();
        self
    }

    /// Set retry safety.
    #[must_use]
    pub fn idempotency(mut self, v: Idempotency) -> Self {
        self.idempotency = Some(v);
        self
    }

    /// Set signature enforcement.
    #[must_use]
    pub fn signature_mode(mut self, v: SignatureMode) -> Self {
        self.signature_mode = Some(v);
        self
    }

    /// Attach v2-only fields.
    #[must_use]
    pub fn v2_extras(mut self, v: ToolV2Extras) -> Self {
        self.v2 = v;
        self
    }

    /// Normalize and build a [`ToolEntry`].
    pub fn build(self) -> Result<ToolEntry, NooterraError> {
        let mut acc = ErrorAccumulator::new();
        let tool_id = acc
            .absorb(self.tool_id.ok_or_else(|| missing("toolId")))
            .and_then(|v| acc.absorb(bounded_identifier("toolId", &v, MAX_ID_LEN)));
        let paid_path = acc.absorb(self.paid_path.ok_or_else(|| missing("paidPath")));
        let method = acc.absorb(self.method.ok_or_else(|| missing("method")));
        let amount = acc.absorb(positive_integer("pricing.amountCents", self.amount_cents));
        let currency_v = acc.absorb(currency("pricing.currency", &self.currency));
        let idempotency = acc.absorb(self.idempotency.ok_or_else(|| missing("idempotency")));
        let signature_mode = acc.absorb(self.signature_mode.ok_or_else(|| missing("signatureMode")));
        acc.finish()?;

        Ok(ToolEntry {
            tool_id: tool_id.unwrap(),
            paid_path: paid_path.unwrap(),
            method: method.unwrap(),
            pricing: ToolPricing { amount_cents: amount.unwrap(), currency: currency_v.unwrap() },
            idempotency: idempotency.unwrap(),
            signature_mode: signature_mode.unwrap(),
            v2: self.v2,
        })
    }
}

/// Accumulating builder for a [`PaidToolManifest`].
#[derive(Debug, Default)]
pub struct PaidToolManifestBuilder {
    provider_id: Option<String>,
    upstream_base_url: Option<String>,
    publish_proof_jwks_url: Option<String>,
    amount_cents: i64,
    currency: String,
    idempotency: Option<Idempotency>,
    signature_mode: Option<SignatureMode>,
    tools: Vec<ToolEntry>,
}

impl PaidToolManifestBuilder {
    /// Start a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider id.
    #[must_use]
    pub fn provider_id(mut self, v: impl Into<String>) -> Self {
        self.provider_id = Some(v.into());
        self
    }

    /// Set the upstream base url.
    #[must_use]
    pub fn upstream_base_url(mut self, v: impl Into<String>) -> Self {
        self.upstream_base_url = Some(v.into());
        self
    }

    /// Set the v2 JWKS url for publish-proof verification.
    #[must_use]
    pub fn publish_proof_jwks_url(mut self, v: impl Into<String>) -> Self {
        self.publish_proof_jwks_url = Some(v.into());
        self
    }

    /// Set manifest-wide default pricing.
    #[must_use]
    pub fn defaults(mut self, amount_cents: i64, currency: impl Into<String>, idempotency: Idempotency, signature_mode: SignatureMode) -> Self {
        self.amount_cents = amount_cents;
        self.currency = currency.into();
        self.idempotency = Some(idempotency);
        self.signature_mode = Some(signature_mode);
        self
    }

    /// Add a tool to the manifest.
    #[must_use]
    pub fn tool(mut self, v: ToolEntry) -> Self {
        self.tools.push(v);
        self
    }

    /// Normalize, validate, and build the manifest.
    pub fn build(self) -> Result<PaidToolManifest, NooterraError> {
        let mut acc = ErrorAccumulator::new();
        let provider_id = acc
            .absorb(self.provider_id.ok_or_else(|| missing("providerId")))
            .and_then(|v| acc.absorb(bounded_identifier("providerId", &v, MAX_ID_LEN)));
        let amount = acc.absorb(positive_integer("defaults.amountCents", self.amount_cents));
        let currency_v = acc.absorb(currency("defaults.currency", &self.currency));
        let idempotency = acc.absorb(self.idempotency.ok_or_else(|| missing("defaults.idempotency")));
        let signature_mode = acc.absorb(self.signature_mode.ok_or_else(|| missing("defaults.signatureMode")));
        acc.finish()?;

        let manifest = PaidToolManifest {
            provider_id: provider_id.unwrap(),
            upstream_base_url: self.upstream_base_url,
            publish_proof_jwks_url: self.publish_proof_jwks_url,
            defaults: ManifestDefaults {
                amount_cents: amount.unwrap(),
                currency: currency_v.unwrap(),
                idempotency: idempotency.unwrap(),
                signature_mode: signature_mode.unwrap(),
            },
            tools: self.tools,
        };
        manifest.validate()?;
        Ok(manifest)
    }
}

/// Deduplicate and sort a manifest's `capabilityTags` list, the ordering
/// rule every such sequence in this substrate must follow.
#[must_use]
pub fn normalize_capability_tags(tags: &[String]) -> Vec<String> {
    dedup_sorted(tags)
}

fn missing(field: &str) -> NooterraError {
    NooterraError::new(ErrorCode::PayloadInvalid, "is required").with_context("field", field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tool() -> ToolEntry {
        ToolEntryBuilder::new()
            .tool_id("tool-1")
            .paid_path("/tools/search")
            .method("POST")
            .pricing(50, "USD")
            .idempotency(Idempotency::Idempotent)
            .signature_mode(SignatureMode::Optional)
            .build()
            .unwrap()
    }

    #[test]
    fn v1_manifest_builds_and_hashes() {
        let manifest = PaidToolManifestBuilder::new()
            .provider_id("provider-1")
            .defaults(10, "USD", Idempotency::Idempotent, SignatureMode::Optional)
            .tool(sample_tool())
            .build()
            .unwrap();
        assert_eq!(manifest.schema_version(), "PaidToolManifest.v1");
        assert_eq!(manifest.manifest_hash().len(), 64);
    }

    #[test]
    fn v2_manifest_detected_via_jwks_url() {
        let manifest = PaidToolManifestBuilder::new()
            .provider_id("provider-1")
            .publish_proof_jwks_url("https://provider.example/.well-known/jwks.json")
            .defaults(10, "USD", Idempotency::Idempotent, SignatureMode::Required)
            .tool(sample_tool())
            .build()
            .unwrap();
        assert_eq!(manifest.schema_version(), "PaidToolManifest.v2");
    }

    #[test]
    fn duplicate_tool_id_is_rejected() {
        let err = PaidToolManifestBuilder::new()
            .provider_id("provider-1")
            .defaults(10, "USD", Idempotency::Idempotent, SignatureMode::Optional)
            .tool(sample_tool())
            .tool(sample_tool())
            .build()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PayloadInvalid);
    }

    #[test]
    fn insecure_jwks_url_is_rejected() {
        let err = PaidToolManifestBuilder::new()
            .provider_id("provider-1")
            .publish_proof_jwks_url("http://insecure.example/jwks.json")
            .defaults(10, "USD", Idempotency::Idempotent, SignatureMode::Required)
            .tool(sample_tool())
            .build()
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PayloadInvalid);
    }
}
