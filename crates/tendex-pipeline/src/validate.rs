//! Record validation and error recovery.
//!
//! The validator inspects a normalized tender (plus any raw text the
//! normalizer could not parse) and emits typed issues. The recovery engine
//! dispatches on the issue code and repairs what it can; records keep only
//! the repairs that succeed, and a field that resists re-parsing is cleared
//! rather than dropped with its record.

use tendex_core::{IssueCode, Severity, Tender, ValidationIssue};
use tracing::debug;

use crate::normalize::{digit_groups, parse_amount, Normalized};

const TITLE_MIN_CHARS: usize = 10;
const TITLE_MAX_REASONABLE_CHARS: usize = 500;
const SEMANTIC_TEXT_MIN_CHARS: usize = 20;
const AMOUNT_MAX_REASONABLE: f64 = 1e12;

#[derive(Debug, Clone, Copy, Default)]
pub struct Validator {
    /// When set, every issue blocks; otherwise only critical ones do.
    pub strict: bool,
}

impl Validator {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn validate(&self, normalized: &Normalized) -> Vec<ValidationIssue> {
        let tender = &normalized.tender;
        let mut issues = Vec::new();

        for (field, value) in [
            ("tender_id", &tender.tender_id),
            ("title", &tender.title),
            ("semantic_text", &tender.semantic_text),
        ] {
            if value.trim().is_empty() {
                issues.push(ValidationIssue::new(
                    IssueCode::MissingRequiredField,
                    field,
                    Severity::Critical,
                    format!("required field '{field}' is missing or empty"),
                ));
            }
        }

        for (field, leftover) in [
            ("catalog_date", &normalized.unparsed_catalog_date),
            ("opening_date", &normalized.unparsed_opening_date),
        ] {
            if let Some(raw) = leftover {
                issues.push(
                    ValidationIssue::new(
                        IssueCode::InvalidDateFormat,
                        field,
                        Severity::Medium,
                        format!("unparseable date in '{field}'"),
                    )
                    .with_context("raw", raw),
                );
            }
        }

        if let Some(raw) = &normalized.unparsed_amount {
            issues.push(
                ValidationIssue::new(
                    IssueCode::InvalidAmountFormat,
                    "estimated_amount",
                    Severity::Medium,
                    "unparseable estimated amount",
                )
                .with_context("raw", raw),
            );
        }

        let title_chars = tender.title.chars().count();
        if !tender.title.trim().is_empty() && title_chars < TITLE_MIN_CHARS {
            issues.push(
                ValidationIssue::new(
                    IssueCode::TitleLength,
                    "title",
                    Severity::Low,
                    "title is very short",
                )
                .with_context("chars", title_chars),
            );
        } else if title_chars > TITLE_MAX_REASONABLE_CHARS {
            issues.push(
                ValidationIssue::new(
                    IssueCode::TitleLength,
                    "title",
                    Severity::Low,
                    "title is unusually long",
                )
                .with_context("chars", title_chars),
            );
        }

        let semantic_chars = tender.semantic_text.trim().chars().count();
        if semantic_chars > 0 && semantic_chars < SEMANTIC_TEXT_MIN_CHARS {
            issues.push(
                ValidationIssue::new(
                    IssueCode::SemanticTextTooShort,
                    "semantic_text",
                    Severity::Medium,
                    "semantic text too short for a meaningful embedding",
                )
                .with_context("chars", semantic_chars),
            );
        }

        if let Some(amount) = tender.estimated_amount {
            if amount <= 0.0 {
                issues.push(
                    ValidationIssue::new(
                        IssueCode::AmountOutOfRange,
                        "estimated_amount",
                        Severity::Low,
                        "estimated amount is not positive",
                    )
                    .with_context("value", amount),
                );
            } else if amount > AMOUNT_MAX_REASONABLE {
                issues.push(
                    ValidationIssue::new(
                        IssueCode::AmountOutOfRange,
                        "estimated_amount",
                        Severity::Medium,
                        "estimated amount is implausibly large",
                    )
                    .with_context("value", amount),
                );
            }
        }

        issues
    }

    /// Whether this issue set stops the record from proceeding.
    pub fn is_blocking(&self, issues: &[ValidationIssue]) -> bool {
        if self.strict {
            !issues.is_empty()
        } else {
            issues.iter().any(ValidationIssue::is_critical)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// Attempts to repair a record in place, one issue at a time.
    ///
    /// Returns `None` when an unrecoverable field (title) is missing. All
    /// unparsed leftovers are consumed: either re-parsed into their field or
    /// abandoned, so a second validation pass sees a settled record.
    pub fn recover(
        &self,
        mut normalized: Normalized,
        issues: &[ValidationIssue],
    ) -> Option<Normalized> {
        for issue in issues {
            match issue.code {
                IssueCode::MissingRequiredField => {
                    if !self.recover_missing_field(&mut normalized.tender, &issue.field) {
                        debug!(field = %issue.field, "unrecoverable missing field");
                        return None;
                    }
                }
                IssueCode::InvalidDateFormat => {
                    self.reparse_date(&mut normalized, &issue.field);
                }
                IssueCode::InvalidAmountFormat => {
                    self.reparse_amount(&mut normalized);
                }
                // Advisory only.
                IssueCode::TitleLength
                | IssueCode::AmountOutOfRange
                | IssueCode::SemanticTextTooShort => {}
            }
        }

        normalized.unparsed_catalog_date = None;
        normalized.unparsed_opening_date = None;
        normalized.unparsed_amount = None;
        normalized.tender.refresh_fingerprint();
        Some(normalized)
    }

    fn recover_missing_field(&self, tender: &mut Tender, field: &str) -> bool {
        match field {
            "tender_id" => {
                tender.refresh_fingerprint();
                tender.tender_id = format!(
                    "{}_{}",
                    tender.source.as_str(),
                    &tender.content_fingerprint[..12]
                );
                true
            }
            "semantic_text" => {
                let parts: Vec<&str> = [
                    tender.title.as_str(),
                    tender.description.as_str(),
                    tender.entity.as_str(),
                ]
                .into_iter()
                .filter(|part| !part.trim().is_empty())
                .collect();
                tender.semantic_text = if parts.is_empty() {
                    "Sin información disponible".to_string()
                } else {
                    parts.join(" | ")
                };
                true
            }
            // A record with no title at all carries no signal worth keeping.
            _ => false,
        }
    }

    fn reparse_date(&self, normalized: &mut Normalized, field: &str) {
        let leftover = match field {
            "catalog_date" => normalized.unparsed_catalog_date.take(),
            _ => normalized.unparsed_opening_date.take(),
        };
        let Some(raw) = leftover else { return };

        let reparsed = date_from_digits(&raw);
        match field {
            "catalog_date" => normalized.tender.catalog_date = reparsed,
            _ => normalized.tender.opening_date = reparsed,
        }
    }

    fn reparse_amount(&self, normalized: &mut Normalized) {
        if let Some(raw) = normalized.unparsed_amount.take() {
            normalized.tender.estimated_amount = parse_amount(&raw);
        }
    }
}

/// Last-resort date repair: pull digit groups out of arbitrary text and try
/// them as year-first, then day-first.
fn date_from_digits(raw: &str) -> Option<chrono::NaiveDate> {
    let groups = digit_groups(raw);
    if groups.len() < 3 {
        return None;
    }
    let nums: Vec<i64> = groups
        .iter()
        .take(3)
        .filter_map(|g| g.parse().ok())
        .collect();
    if nums.len() < 3 {
        return None;
    }
    if groups[0].len() == 4 {
        chrono::NaiveDate::from_ymd_opt(nums[0] as i32, nums[1] as u32, nums[2] as u32)
    } else {
        chrono::NaiveDate::from_ymd_opt(nums[2] as i32, nums[1] as u32, nums[0] as u32)
    }
}
