//! Source adapters for the three tender feeds, plus the rate-limit window and
//! keyword strategy selector the quota-bound LicitaYa API requires.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use sha2::{Digest, Sha256};
use tendex_core::{RawRecord, Source};
use tendex_storage::{FetchError, HttpFetcher};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "tendex-adapters";

pub const TIANGUIS_BASE_URL: &str = "https://datosabiertostianguisdigital.cdmx.gob.mx/api/v1";
pub const LICITA_YA_BASE_URL: &str = "https://www.licitaya.com.mx/api/v1";
pub const COMPRAS_MX_BASE_URL: &str = "https://comprasmx.buengobierno.gob.mx/sitiopublico/#/";

/// Smallest remaining daily quota worth starting a keyword run for.
const MIN_QUOTA_FOR_RUN: u32 = 5;

const EMA_ALPHA: f64 = 0.3;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("transient extraction failure: {0}")]
    Transient(String),
    #[error("permanent extraction failure: {0}")]
    Permanent(String),
    #[error("daily API quota exhausted")]
    QuotaExhausted,
}

impl ExtractError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractError::Transient(_))
    }
}

impl From<FetchError> for ExtractError {
    fn from(err: FetchError) -> Self {
        if err.is_permanent() {
            ExtractError::Permanent(err.to_string())
        } else {
            ExtractError::Transient(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub run_id: Uuid,
    /// Caps how many keyword searches a quota-managed adapter may spend.
    pub max_searches: Option<usize>,
}

impl ExtractOptions {
    pub fn for_run(run_id: Uuid) -> Self {
        Self {
            run_id,
            max_searches: None,
        }
    }
}

/// One extraction source. Implementations own whatever quota or session state
/// their upstream needs; callers only see raw records or a typed failure.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    async fn extract(
        &self,
        target_date: NaiveDate,
        options: &ExtractOptions,
    ) -> Result<Vec<RawRecord>, ExtractError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Ready,
    WaitFor(Duration),
    DailyExhausted,
}

/// Sliding-minute plus daily request accounting. All methods take an explicit
/// `now` so quota behavior is testable with a simulated clock.
#[derive(Debug, Clone)]
pub struct RateLimitWindow {
    max_per_minute: u32,
    max_daily: u32,
    requests_this_minute: u32,
    minute_start: DateTime<Utc>,
    daily_requests: u32,
    day_start: NaiveDate,
    last_request: Option<DateTime<Utc>>,
}

impl RateLimitWindow {
    pub fn new(max_per_minute: u32, max_daily: u32, now: DateTime<Utc>) -> Self {
        Self {
            max_per_minute: max_per_minute.max(1),
            max_daily,
            requests_this_minute: 0,
            minute_start: now,
            daily_requests: 0,
            day_start: now.date_naive(),
            last_request: None,
        }
    }

    /// Admits one request, tells the caller how long to wait for the minute
    /// window to roll over, or reports the daily budget as spent. `Ready`
    /// already counts the request.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> Admission {
        if now.date_naive() > self.day_start {
            self.daily_requests = 0;
            self.day_start = now.date_naive();
        }

        let elapsed = (now - self.minute_start).num_milliseconds().max(0) as f64 / 1000.0;
        if elapsed >= 60.0 {
            self.requests_this_minute = 0;
            self.minute_start = now;
        }

        if self.daily_requests >= self.max_daily {
            return Admission::DailyExhausted;
        }

        if self.requests_this_minute >= self.max_per_minute {
            let wait = (60.0 - elapsed).max(0.0) + minute_jitter(now);
            return Admission::WaitFor(Duration::from_secs_f64(wait.max(1.0)));
        }

        self.requests_this_minute += 1;
        self.daily_requests += 1;
        self.last_request = Some(now);
        Admission::Ready
    }

    pub fn remaining_quota(&self, now: DateTime<Utc>) -> u32 {
        if now.date_naive() > self.day_start {
            return self.max_daily;
        }
        self.max_daily.saturating_sub(self.daily_requests)
    }

    pub fn requests_today(&self) -> u32 {
        self.daily_requests
    }

    pub fn last_request(&self) -> Option<DateTime<Utc>> {
        self.last_request
    }
}

/// Small deterministic jitter in 0.1..0.5s derived from the clock, so workers
/// waiting on the same window do not wake in lockstep.
fn minute_jitter(now: DateTime<Utc>) -> f64 {
    0.1 + 0.4 * (now.nanosecond() % 1_000_000_000) as f64 / 1e9
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn weight(self) -> f64 {
        match self {
            Priority::High => 1.0,
            Priority::Medium => 0.7,
            Priority::Low => 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordStrategy {
    pub keyword: String,
    pub priority: Priority,
    pub expected_results: u32,
    pub last_run: Option<DateTime<Utc>>,
    pub success_rate: f64,
    pub avg_results: f64,
}

impl KeywordStrategy {
    pub fn seed(keyword: impl Into<String>, priority: Priority) -> Self {
        let (expected_results, avg_results) = match priority {
            Priority::High => (50, 25.0),
            Priority::Medium => (30, 15.0),
            Priority::Low => (20, 10.0),
        };
        Self {
            keyword: keyword.into(),
            priority,
            expected_results,
            last_run: None,
            success_rate: 1.0,
            avg_results,
        }
    }
}

/// Picks which keyword searches to spend the remaining daily quota on, and
/// learns from each outcome via an exponential moving average.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    strategies: Vec<KeywordStrategy>,
}

impl StrategySelector {
    pub fn new(strategies: Vec<KeywordStrategy>) -> Self {
        Self { strategies }
    }

    /// Keyword seeds drawn from what Mexican procurement listings actually
    /// title themselves with, tiered by historical yield.
    pub fn spanish_procurement_defaults() -> Self {
        let high = [
            "software",
            "tecnología",
            "sistema",
            "desarrollo",
            "consultoría",
            "servicios",
            "mantenimiento",
        ];
        let medium = [
            "adquisición",
            "suministro",
            "obra",
            "construcción",
            "equipos",
            "mobiliario",
            "vehículos",
        ];
        let low = [
            "limpieza",
            "seguridad",
            "alimentación",
            "papelería",
            "combustible",
            "material",
        ];

        let mut strategies = Vec::new();
        strategies.extend(high.iter().map(|k| KeywordStrategy::seed(*k, Priority::High)));
        strategies.extend(
            medium
                .iter()
                .map(|k| KeywordStrategy::seed(*k, Priority::Medium)),
        );
        strategies.extend(low.iter().map(|k| KeywordStrategy::seed(*k, Priority::Low)));
        Self { strategies }
    }

    pub fn strategies(&self) -> &[KeywordStrategy] {
        &self.strategies
    }

    /// Weighted effectiveness score: 40% success rate, 30% priority, 20% time
    /// since last run (saturating at 24h), 10% average yield normalized to 50.
    pub fn score(&self, strategy: &KeywordStrategy, now: DateTime<Utc>) -> f64 {
        let recency = match strategy.last_run {
            Some(last_run) => {
                let hours = (now - last_run).num_seconds().max(0) as f64 / 3600.0;
                (hours / 24.0).min(1.0)
            }
            None => 1.0,
        };
        let efficiency = (strategy.avg_results / 50.0).min(1.0);
        strategy.success_rate * 0.4
            + strategy.priority.weight() * 0.3
            + recency * 0.2
            + efficiency * 0.1
    }

    /// Greedy admission by score, capped at 80% of the remaining quota so a
    /// buffer survives the run. High-priority keywords reserve a second
    /// request for pagination while estimated usage stays under 60%.
    pub fn select(&self, remaining_quota: u32, now: DateTime<Utc>) -> Vec<String> {
        let mut scored: Vec<(f64, &KeywordStrategy)> = self
            .strategies
            .iter()
            .map(|s| (self.score(s, now), s))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let budget = (remaining_quota as f64 * 0.8) as u32;
        let pagination_floor = (remaining_quota as f64 * 0.6) as u32;

        let mut selected = Vec::new();
        let mut quota_used = 0u32;
        for (_, strategy) in scored {
            if quota_used >= budget {
                break;
            }
            selected.push(strategy.keyword.clone());
            quota_used += 1;
            if strategy.priority == Priority::High && quota_used < pagination_floor {
                quota_used += 1;
            }
        }
        debug!(
            selected = selected.len(),
            estimated_quota = quota_used,
            "keyword strategies selected"
        );
        selected
    }

    pub fn record_outcome(
        &mut self,
        keyword: &str,
        results: usize,
        success: bool,
        now: DateTime<Utc>,
    ) {
        let Some(strategy) = self.strategies.iter_mut().find(|s| s.keyword == keyword) else {
            return;
        };
        strategy.last_run = Some(now);
        let outcome = if success { 1.0 } else { 0.0 };
        strategy.success_rate = EMA_ALPHA * outcome + (1.0 - EMA_ALPHA) * strategy.success_rate;
        if success {
            strategy.avg_results =
                EMA_ALPHA * results as f64 + (1.0 - EMA_ALPHA) * strategy.avg_results;
        }
    }
}

/// Stops a keyword run once more than 80% of at least three attempts failed.
pub fn should_abort(successes: u32, failures: u32) -> bool {
    let total = successes + failures;
    if total < 3 {
        return false;
    }
    failures as f64 / total as f64 > 0.8
}

/// Inter-request pacing: the per-minute floor plus half the recent average
/// response time, capped at 10s.
pub fn smart_delay(max_per_minute: u32, recent_latencies: &[Duration]) -> Duration {
    let base = 60.0 / max_per_minute.max(1) as f64 + 0.1;
    let adaptive = if recent_latencies.is_empty() {
        0.5
    } else {
        let tail = &recent_latencies[recent_latencies.len().saturating_sub(5)..];
        let avg = tail.iter().map(Duration::as_secs_f64).sum::<f64>() / tail.len() as f64;
        avg * 0.5
    };
    Duration::from_secs_f64((base + adaptive).min(10.0))
}

/// Pulls the record list out of an upstream payload, tolerating both bare
/// arrays and the envelope key variants the feeds alternate between.
fn record_array(value: JsonValue) -> Vec<RawRecord> {
    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => {
            let mut found = Vec::new();
            for key in ["data", "results", "plannings", "tenders"] {
                if let Some(JsonValue::Array(items)) = map.remove(key) {
                    found = items;
                    break;
                }
            }
            found
        }
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            JsonValue::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

fn scalar_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn first_field(record: &RawRecord, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| record.get(*k))
        .map(scalar_string)
        .unwrap_or_default()
}

/// Session-level dedup hash over the raw identity fields, before
/// normalization gets a chance to compute a proper fingerprint.
pub fn raw_content_hash(record: &RawRecord) -> String {
    let parts = [
        first_field(record, &["title", "name", "titulo"]),
        first_field(record, &["entity", "institution", "dependencia", "entidad"]),
        first_field(record, &["amount", "value", "monto"]),
        first_field(record, &["date", "publication_date", "fecha"]),
    ];
    let joined = parts.join("|").to_lowercase();
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(&digest[..16])
}

// ---------------------------------------------------------------------------
// Tianguis Digital CDMX (public REST API)
// ---------------------------------------------------------------------------

pub struct TianguisCdmxAdapter {
    http: Arc<HttpFetcher>,
    base_url: String,
}

impl TianguisCdmxAdapter {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self {
            http,
            base_url: TIANGUIS_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn is_relevant_planning(record: &RawRecord) -> bool {
    let has_text = ["name", "title", "description"].iter().any(|key| {
        record
            .get(*key)
            .and_then(JsonValue::as_str)
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    });
    if !has_text {
        return false;
    }
    if let Some(status) = record.get("status").and_then(JsonValue::as_str) {
        let status = status.to_lowercase();
        if matches!(
            status.as_str(),
            "cancelado" | "cancelled" | "invalid" | "desierto"
        ) {
            return false;
        }
    }
    true
}

#[async_trait]
impl SourceAdapter for TianguisCdmxAdapter {
    fn source(&self) -> Source {
        Source::TianguisCdmx
    }

    async fn extract(
        &self,
        target_date: NaiveDate,
        options: &ExtractOptions,
    ) -> Result<Vec<RawRecord>, ExtractError> {
        // The plannings endpoint wants dd/MM/yyyy.
        let date_str = target_date.format("%d/%m/%Y").to_string();
        let url = format!("{}/plannings", self.base_url);
        let query = [
            ("hiring_method", "1,2,3".to_string()),
            ("consolidated", "FALSE".to_string()),
            ("start_date", date_str.clone()),
            ("end_date", date_str),
        ];

        let value = self
            .http
            .get_json(
                options.run_id,
                Source::TianguisCdmx.as_str(),
                &url,
                &query,
                &[],
            )
            .await?;

        let found = record_array(value);
        let found_count = found.len();
        let records: Vec<RawRecord> = found.into_iter().filter(is_relevant_planning).collect();
        info!(
            found = found_count,
            kept = records.len(),
            "tianguis extraction finished"
        );
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// LicitaYa (quota-managed keyword search API)
// ---------------------------------------------------------------------------

pub struct LicitaYaAdapter {
    http: Arc<HttpFetcher>,
    base_url: String,
    api_key: String,
    max_per_minute: u32,
    state: Mutex<LicitaYaState>,
}

struct LicitaYaState {
    window: RateLimitWindow,
    selector: StrategySelector,
    seen: HashSet<String>,
    recent_latencies: Vec<Duration>,
}

impl LicitaYaAdapter {
    pub fn new(
        http: Arc<HttpFetcher>,
        api_key: String,
        requests_per_minute: u32,
        daily_quota: u32,
    ) -> Self {
        Self {
            http,
            base_url: LICITA_YA_BASE_URL.to_string(),
            api_key,
            max_per_minute: requests_per_minute,
            state: Mutex::new(LicitaYaState {
                window: RateLimitWindow::new(requests_per_minute, daily_quota, Utc::now()),
                selector: StrategySelector::spanish_procurement_defaults(),
                seen: HashSet::new(),
                recent_latencies: Vec::new(),
            }),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search_keyword(
        &self,
        run_id: Uuid,
        keyword: &str,
        date_param: &str,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let url = format!("{}/tender/search", self.base_url);
        let query = [
            ("q", keyword.to_string()),
            ("date", date_param.to_string()),
        ];
        let headers = [("Authorization", format!("Bearer {}", self.api_key))];
        let value = self
            .http
            .get_json(run_id, Source::LicitaYa.as_str(), &url, &query, &headers)
            .await?;
        Ok(record_array(value))
    }
}

fn dedupe_into(
    seen: &mut HashSet<String>,
    found: Vec<RawRecord>,
    keyword: &str,
    date_param: &str,
) -> Vec<RawRecord> {
    let stamp = Utc::now().to_rfc3339();
    let mut fresh = Vec::new();
    for mut record in found {
        let hash = raw_content_hash(&record);
        if !seen.insert(hash.clone()) {
            continue;
        }
        record.insert("search_keyword".to_string(), json!(keyword));
        record.insert("search_date".to_string(), json!(date_param));
        record.insert("extraction_timestamp".to_string(), json!(stamp));
        record.insert("content_hash".to_string(), json!(hash));
        fresh.push(record);
    }
    fresh
}

#[async_trait]
impl SourceAdapter for LicitaYaAdapter {
    fn source(&self) -> Source {
        Source::LicitaYa
    }

    async fn extract(
        &self,
        target_date: NaiveDate,
        options: &ExtractOptions,
    ) -> Result<Vec<RawRecord>, ExtractError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let remaining = state.window.remaining_quota(now);
        if remaining < MIN_QUOTA_FOR_RUN {
            return Err(ExtractError::QuotaExhausted);
        }

        let mut keywords = state.selector.select(remaining, now);
        if let Some(cap) = options.max_searches {
            keywords.truncate(cap);
        }
        info!(
            keywords = keywords.len(),
            remaining_quota = remaining,
            "starting keyword extraction"
        );

        let date_param = target_date.format("%Y%m%d").to_string();
        let mut records = Vec::new();
        let mut successes = 0u32;
        let mut failures = 0u32;

        'keywords: for keyword in &keywords {
            loop {
                match state.window.try_acquire(Utc::now()) {
                    Admission::Ready => break,
                    Admission::WaitFor(wait) => {
                        debug!(wait_secs = wait.as_secs_f64(), "minute window saturated");
                        sleep(wait).await;
                    }
                    Admission::DailyExhausted => {
                        warn!("daily quota exhausted mid-run, keeping partial results");
                        break 'keywords;
                    }
                }
            }

            let started = Instant::now();
            match self
                .search_keyword(options.run_id, keyword, &date_param)
                .await
            {
                Ok(found) => {
                    state.recent_latencies.push(started.elapsed());
                    let found_count = found.len();
                    let fresh = dedupe_into(&mut state.seen, found, keyword, &date_param);
                    debug!(
                        keyword = keyword.as_str(),
                        found = found_count,
                        fresh = fresh.len(),
                        "keyword search succeeded"
                    );
                    state
                        .selector
                        .record_outcome(keyword, fresh.len(), true, Utc::now());
                    records.extend(fresh);
                    successes += 1;
                }
                Err(err) => {
                    warn!(keyword = keyword.as_str(), %err, "keyword search failed");
                    state.selector.record_outcome(keyword, 0, false, Utc::now());
                    failures += 1;
                    // A rejected API key will not improve with further keywords.
                    if err.is_permanent() {
                        return Err(ExtractError::from(err));
                    }
                }
            }

            if should_abort(successes, failures) {
                warn!(
                    successes,
                    failures, "stopping extraction, failure ratio too high"
                );
                break;
            }

            sleep(smart_delay(self.max_per_minute, &state.recent_latencies)).await;
        }

        if records.is_empty() && successes == 0 && failures > 0 {
            return Err(ExtractError::Transient(format!(
                "all {failures} keyword searches failed"
            )));
        }

        info!(
            records = records.len(),
            requests_today = state.window.requests_today(),
            "keyword extraction finished"
        );
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// ComprasMX (public listing page scraper)
// ---------------------------------------------------------------------------

pub struct ComprasMxAdapter {
    http: Arc<HttpFetcher>,
    base_url: String,
}

impl ComprasMxAdapter {
    pub fn new(http: Arc<HttpFetcher>) -> Self {
        Self {
            http,
            base_url: COMPRAS_MX_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

const ROW_SELECTORS: [&str; 3] = ["table tbody tr", ".table tbody tr", "table tr"];

/// Parses the daily listing table out of the rendered page, trying selector
/// variants the platform has shipped at different times.
pub fn parse_listing_rows(html: &str) -> Vec<RawRecord> {
    let document = Html::parse_document(html);
    for selector in ROW_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        let records: Vec<RawRecord> = document
            .select(&sel)
            .enumerate()
            .filter_map(|(index, row)| row_record(&row, index))
            .collect();
        if !records.is_empty() {
            return records;
        }
    }
    Vec::new()
}

fn row_record(row: &ElementRef<'_>, index: usize) -> Option<RawRecord> {
    let cell_sel = Selector::parse("td, th").ok()?;
    let cells: Vec<String> = row
        .select(&cell_sel)
        .filter_map(|cell| {
            let text = cell.text().collect::<String>().trim().to_string();
            (text.chars().count() > 2).then_some(text)
        })
        .collect();
    if cells.len() < 2 {
        return None;
    }

    let mut record = RawRecord::new();
    record.insert("row_index".to_string(), json!(index));
    record.insert("all_text".to_string(), json!(cells.join(" | ")));
    record.insert(
        "cells".to_string(),
        json!(cells.iter().take(15).collect::<Vec<_>>()),
    );
    identify_fields(&mut record, &cells);
    Some(record)
}

/// The table carries no stable column order, so fields are recognized by
/// shape and vocabulary instead of position.
fn identify_fields(record: &mut RawRecord, cells: &[String]) {
    const PROCESS_KINDS: [&str; 4] = ["licitación", "concurso", "adjudicación", "invitación"];
    const SUBJECT_WORDS: [&str; 5] = [
        "adquisición",
        "servicio",
        "obra",
        "suministro",
        "mantenimiento",
    ];
    const ENTITY_WORDS: [&str; 4] = ["secretaría", "instituto", "comisión", "gobierno"];

    for cell in cells.iter().take(10) {
        let lower = cell.to_lowercase();
        if PROCESS_KINDS.iter().any(|k| lower.contains(k)) {
            insert_once(record, "tipo_proceso", cell);
        } else if looks_like_amount(cell) {
            insert_once(record, "valor_estimado", cell);
        } else if cell.chars().count() > 20 && SUBJECT_WORDS.iter().any(|k| lower.contains(k)) {
            let clipped: String = cell.chars().take(200).collect();
            insert_once(record, "descripcion", &clipped);
        } else if ENTITY_WORDS.iter().any(|k| lower.contains(k)) {
            insert_once(record, "entidad", cell);
        } else if looks_like_date(cell) {
            insert_once(record, "fecha_apertura", cell);
        } else if looks_like_reference(cell) {
            insert_once(record, "numero_referencia", cell);
        }
    }
}

fn insert_once(record: &mut RawRecord, key: &str, value: &str) {
    if !record.contains_key(key) {
        record.insert(key.to_string(), json!(value));
    }
}

fn looks_like_amount(text: &str) -> bool {
    let lower = text.to_lowercase();
    if text.contains('$')
        || lower.contains("mxn")
        || lower.contains("peso")
        || lower.contains("precio")
    {
        return true;
    }
    let stripped: String = text.chars().filter(|c| !matches!(c, ',' | '.')).collect();
    stripped.len() > 4 && stripped.chars().all(|c| c.is_ascii_digit())
}

fn looks_like_date(text: &str) -> bool {
    for sep in ['/', '-'] {
        let parts: Vec<&str> = text.split(sep).collect();
        if parts.len() == 3
            && parts
                .iter()
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        {
            return true;
        }
    }
    const MONTHS: [&str; 12] = [
        "enero",
        "febrero",
        "marzo",
        "abril",
        "mayo",
        "junio",
        "julio",
        "agosto",
        "septiembre",
        "octubre",
        "noviembre",
        "diciembre",
    ];
    let lower = text.to_lowercase();
    MONTHS.iter().any(|m| lower.contains(m))
        && text.chars().filter(|c| c.is_ascii_digit()).count() >= 4
}

fn looks_like_reference(text: &str) -> bool {
    let len = text.chars().count();
    (6..=40).contains(&len)
        && text.chars().any(|c| c.is_ascii_digit())
        && text.chars().any(|c| c.is_alphabetic())
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '/' | '.' | '_'))
}

#[async_trait]
impl SourceAdapter for ComprasMxAdapter {
    fn source(&self) -> Source {
        Source::ComprasMx
    }

    async fn extract(
        &self,
        _target_date: NaiveDate,
        options: &ExtractOptions,
    ) -> Result<Vec<RawRecord>, ExtractError> {
        let response = self
            .http
            .get_bytes(
                options.run_id,
                Source::ComprasMx.as_str(),
                &self.base_url,
                &[],
                &[],
            )
            .await?;
        let html = String::from_utf8_lossy(&response.body);

        let mut records = parse_listing_rows(&html);
        if records.is_empty() {
            warn!("no listing rows found in page");
        }
        let stamp = Utc::now().to_rfc3339();
        for record in &mut records {
            record.insert("extraction_timestamp".to_string(), json!(stamp));
        }
        info!(records = records.len(), "comprasmx scrape finished");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap()
    }

    #[test]
    fn minute_window_admits_then_waits() {
        let mut window = RateLimitWindow::new(10, 1000, t0());
        let mut now = t0();
        let mut admitted = 0u32;
        let mut waits = 0u32;

        // 25 requests against a 10/min limit should wait exactly twice.
        while admitted < 25 {
            match window.try_acquire(now) {
                Admission::Ready => {
                    admitted += 1;
                    now += chrono::Duration::seconds(1);
                }
                Admission::WaitFor(wait) => {
                    waits += 1;
                    assert!(wait >= Duration::from_secs(1));
                    assert!(wait <= Duration::from_secs(61));
                    now += chrono::Duration::milliseconds(wait.as_millis() as i64);
                }
                Admission::DailyExhausted => panic!("daily quota should not be hit"),
            }
        }

        assert_eq!(waits, 2);
        assert_eq!(window.requests_today(), 25);
    }

    #[test]
    fn daily_quota_exhausts_and_resets_next_day() {
        let mut window = RateLimitWindow::new(100, 3, t0());
        let mut now = t0();
        for _ in 0..3 {
            assert_eq!(window.try_acquire(now), Admission::Ready);
            now += chrono::Duration::seconds(1);
        }
        assert_eq!(window.try_acquire(now), Admission::DailyExhausted);
        assert_eq!(window.remaining_quota(now), 0);

        let tomorrow = now + chrono::Duration::days(1);
        assert_eq!(window.remaining_quota(tomorrow), 3);
        assert_eq!(window.try_acquire(tomorrow), Admission::Ready);
    }

    #[test]
    fn fresh_high_priority_outranks_stale_low_priority() {
        let selector = StrategySelector::new(vec![
            KeywordStrategy::seed("software", Priority::High),
            KeywordStrategy {
                last_run: Some(t0()),
                ..KeywordStrategy::seed("limpieza", Priority::Low)
            },
        ]);
        let now = t0() + chrono::Duration::hours(1);
        let high = selector.score(&selector.strategies()[0], now);
        let low = selector.score(&selector.strategies()[1], now);
        assert!(high > low);
    }

    #[test]
    fn outcome_updates_use_exponential_moving_average() {
        let mut selector =
            StrategySelector::new(vec![KeywordStrategy::seed("software", Priority::High)]);

        selector.record_outcome("software", 0, false, t0());
        let s = &selector.strategies()[0];
        assert!((s.success_rate - 0.7).abs() < 1e-9);
        assert!((s.avg_results - 25.0).abs() < 1e-9);

        selector.record_outcome("software", 10, true, t0());
        let s = &selector.strategies()[0];
        assert!((s.success_rate - (0.3 + 0.7 * 0.7)).abs() < 1e-9);
        assert!((s.avg_results - (0.3 * 10.0 + 0.7 * 25.0)).abs() < 1e-9);
    }

    #[test]
    fn selection_leaves_a_quota_buffer() {
        let strategies = (0..10)
            .map(|i| KeywordStrategy::seed(format!("kw{i}"), Priority::High))
            .collect();
        let selector = StrategySelector::new(strategies);

        // budget 8, pagination floor 6: three double-charged picks, two singles
        let selected = selector.select(10, t0());
        assert_eq!(selected.len(), 5);
    }

    #[test]
    fn abort_requires_three_attempts_and_heavy_failure() {
        assert!(!should_abort(0, 2));
        assert!(should_abort(0, 3));
        assert!(!should_abort(1, 3));
    }

    #[test]
    fn smart_delay_is_paced_and_capped() {
        let idle = smart_delay(10, &[]);
        assert!((idle.as_secs_f64() - 6.6).abs() < 1e-6);

        let slow = smart_delay(10, &[Duration::from_secs(20)]);
        assert_eq!(slow, Duration::from_secs(10));
    }

    #[test]
    fn record_array_handles_envelope_variants() {
        let bare = json!([{"title": "a"}, {"title": "b"}]);
        assert_eq!(record_array(bare).len(), 2);

        let envelope = json!({"data": [{"title": "a"}], "total": 1});
        assert_eq!(record_array(envelope).len(), 1);

        let nothing = json!({"message": "no results"});
        assert!(record_array(nothing).is_empty());
    }

    #[test]
    fn raw_hash_dedupes_on_identity_fields_only() {
        let mut a = RawRecord::new();
        a.insert("title".to_string(), json!("Adquisición de equipo"));
        a.insert("entity".to_string(), json!("Secretaría de Salud"));
        a.insert("amount".to_string(), json!(120000.5));

        let mut b = a.clone();
        b.insert("irrelevant".to_string(), json!("noise"));
        assert_eq!(raw_content_hash(&a), raw_content_hash(&b));

        let mut c = a.clone();
        c.insert("title".to_string(), json!("Otro título"));
        assert_ne!(raw_content_hash(&a), raw_content_hash(&c));
    }

    #[test]
    fn cancelled_plannings_are_filtered() {
        let mut live = RawRecord::new();
        live.insert("name".to_string(), json!("Equipamiento escolar"));
        live.insert("status".to_string(), json!("activo"));
        assert!(is_relevant_planning(&live));

        let mut dead = live.clone();
        dead.insert("status".to_string(), json!("Cancelado"));
        assert!(!is_relevant_planning(&dead));

        let empty = RawRecord::new();
        assert!(!is_relevant_planning(&empty));
    }

    #[test]
    fn listing_rows_identify_fields_by_shape() {
        let html = r#"
            <table><tbody>
              <tr>
                <td>LA-012345-E67-2024</td>
                <td>Licitación Pública Nacional</td>
                <td>Adquisición de equipo de cómputo para aulas digitales</td>
                <td>Secretaría de Educación Pública</td>
                <td>15/04/2024</td>
                <td>$1,250,000.00</td>
              </tr>
            </tbody></table>
        "#;
        let records = parse_listing_rows(html);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(
            record.get("numero_referencia").and_then(JsonValue::as_str),
            Some("LA-012345-E67-2024")
        );
        assert_eq!(
            record.get("tipo_proceso").and_then(JsonValue::as_str),
            Some("Licitación Pública Nacional")
        );
        assert!(record
            .get("descripcion")
            .and_then(JsonValue::as_str)
            .unwrap()
            .starts_with("Adquisición de equipo"));
        assert_eq!(
            record.get("entidad").and_then(JsonValue::as_str),
            Some("Secretaría de Educación Pública")
        );
        assert_eq!(
            record.get("fecha_apertura").and_then(JsonValue::as_str),
            Some("15/04/2024")
        );
        assert_eq!(
            record.get("valor_estimado").and_then(JsonValue::as_str),
            Some("$1,250,000.00")
        );
        assert!(record.get("all_text").is_some());
    }

    #[test]
    fn empty_page_yields_no_rows() {
        assert!(parse_listing_rows("<html><body><p>solo texto</p></body></html>").is_empty());
    }
}
