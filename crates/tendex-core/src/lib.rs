//! Core domain model for the Tendex tender aggregation pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const CRATE_NAME: &str = "tendex-core";

/// Registered extraction sources. Provenance is immutable once set on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Tianguis Digital open-data REST API (Mexico City).
    TianguisCdmx,
    /// LicitaYa commercial keyword-search API, quota constrained.
    LicitaYa,
    /// ComprasMX public portal, browser-driven scraping.
    ComprasMx,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::TianguisCdmx => "tianguis_cdmx",
            Source::LicitaYa => "licita_ya",
            Source::ComprasMx => "comprasmx",
        }
    }

    pub const ALL: [Source; 3] = [Source::TianguisCdmx, Source::LicitaYa, Source::ComprasMx];
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untyped record as returned by a source adapter, before normalization.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Quality scores attached by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    /// Fraction of core fields present, in [0, 1].
    pub completeness: f64,
    /// Source trustworthiness, in [0, 1].
    pub reliability: f64,
}

/// Provenance block carried on every canonical tender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderMeta {
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub search_params: BTreeMap<String, String>,
    /// Source-specific sub-fields preserved verbatim.
    #[serde(default)]
    pub source_detail: serde_json::Value,
    pub quality: QualityScores,
}

impl TenderMeta {
    pub fn new(extracted_at: DateTime<Utc>, quality: QualityScores) -> Self {
        Self {
            extracted_at,
            search_params: BTreeMap::new(),
            source_detail: serde_json::Value::Null,
            quality,
        }
    }
}

/// Canonical procurement-opportunity record flowing through the pipeline.
///
/// Created by the normalizer, possibly repaired by the recovery engine,
/// then frozen and fingerprinted before deduplication. Never mutated after
/// successful persistence; corrections arrive via a later extraction cycle
/// and the store's upsert-by-`tender_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tender {
    /// Globally unique within a source; synthesized deterministically when
    /// the source provides none.
    pub tender_id: String,
    pub source: Source,
    pub title: String,
    pub description: String,
    pub entity: String,
    pub region: String,
    pub city: String,
    pub procurement_type: String,
    pub catalog_date: Option<NaiveDate>,
    pub opening_date: Option<NaiveDate>,
    pub estimated_amount: Option<f64>,
    pub source_url: Option<String>,
    /// Concatenated human-readable text used for downstream embedding.
    pub semantic_text: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: TenderMeta,
    /// Hash over (title, entity, catalog_date, estimated_amount). Two tenders
    /// with equal fingerprints are duplicates regardless of `tender_id`.
    pub content_fingerprint: String,
}

impl Tender {
    /// Recomputes and stores the content fingerprint from current field values.
    pub fn refresh_fingerprint(&mut self) {
        self.content_fingerprint = content_fingerprint(
            &self.title,
            &self.entity,
            self.catalog_date,
            self.estimated_amount,
        );
    }
}

/// Fingerprint over the stable identity subset of a tender's fields.
///
/// Lowercased components joined by `|`, sha256, truncated to 32 hex chars.
pub fn content_fingerprint(
    title: &str,
    entity: &str,
    catalog_date: Option<NaiveDate>,
    estimated_amount: Option<f64>,
) -> String {
    let date_part = catalog_date.map(|d| d.to_string()).unwrap_or_default();
    let amount_part = estimated_amount.map(|a| format!("{a}")).unwrap_or_default();
    let content = format!(
        "{}|{}|{}|{}",
        title.to_lowercase().trim(),
        entity.to_lowercase().trim(),
        date_part,
        amount_part
    );
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())[..32].to_string()
}

/// Deterministic tender id for records whose source provides none.
pub fn synthesize_tender_id(
    source: Source,
    title: &str,
    entity: &str,
    catalog_date: Option<NaiveDate>,
) -> String {
    let date_part = catalog_date.map(|d| d.to_string()).unwrap_or_default();
    let content = format!("{}|{}|{}", title.trim(), entity.trim(), date_part);
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{}_{}", source.as_str(), &hex::encode(hasher.finalize())[..12])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Standardized validation issue codes. The recovery engine dispatches on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingRequiredField,
    InvalidDateFormat,
    InvalidAmountFormat,
    TitleLength,
    AmountOutOfRange,
    SemanticTextTooShort,
}

/// One finding from the validator, attached to a specific field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub field: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ValidationIssue {
    pub fn new(code: IssueCode, field: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            field: field.to_string(),
            severity,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl ToString) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

/// Outcome of one adapter within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterOutcome {
    pub source: Source,
    pub success: bool,
    pub records_found: usize,
    pub records_persisted: usize,
    pub attempts: u32,
    pub quota_exhausted: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

/// Aggregate report for one orchestrator run. Immutable after completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub total_found: usize,
    pub total_normalized: usize,
    pub total_recovered: usize,
    pub total_rejected: usize,
    pub total_persisted: usize,
    pub duplicates_removed: usize,
    pub adapters: Vec<AdapterOutcome>,
    pub errors: Vec<RunError>,
    pub execution_secs: f64,
    pub dry_run: bool,
}

impl RunReport {
    /// Run success per the pipeline contract: at least one adapter succeeded
    /// and fewer than half of the discovered records failed post-validation.
    pub fn derive_status(adapters: &[AdapterOutcome], found: usize, failed: usize) -> RunStatus {
        let any_success = adapters.iter().any(|a| a.success);
        let all_success = !adapters.is_empty() && adapters.iter().all(|a| a.success);
        let record_ok = found == 0 || (failed as f64) < (found as f64) * 0.5;
        match (any_success, record_ok) {
            (true, true) if all_success => RunStatus::Success,
            (true, true) => RunStatus::Partial,
            (true, false) => RunStatus::Partial,
            (false, _) => RunStatus::Failed,
        }
    }
}

/// Actionable error entry captured into the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub source: Option<Source>,
    pub record_id: Option<String>,
    pub code: String,
    pub message: String,
}

impl RunError {
    pub fn for_source(source: Source, code: &str, message: impl Into<String>) -> Self {
        Self {
            source: Some(source),
            record_id: None,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn for_record(source: Source, record_id: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            source: Some(source),
            record_id: Some(record_id.to_string()),
            code: code.to_string(),
            message: message.into(),
        }
    }
}
