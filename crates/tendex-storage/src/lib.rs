//! Storage collaborators and HTTP fetch utilities for Tendex.
//!
//! The relational store holds canonical tenders keyed by `tender_id`;
//! embeddings are attached in a separate idempotent write. The HTTP layer
//! provides retry classification and exponential backoff shared by the
//! REST adapters and the embedding client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tendex_core::Tender;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, info_span, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "tendex-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("tender {0} not found")]
    NotFound(String),
}

/// Outcome of a bulk upsert; failures are per-record, not transactional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Relational + vector persistence contract.
///
/// Upsert is keyed on `tender_id`; on conflict mutable fields are
/// overwritten but the original creation timestamp is preserved.
#[async_trait]
pub trait TenderStore: Send + Sync {
    async fn upsert(&self, tender: &Tender) -> Result<String, StoreError>;

    async fn bulk_upsert(&self, tenders: &[Tender]) -> Result<BulkOutcome, StoreError>;

    /// Idempotent follow-up write; safe to repeat for the same tender.
    async fn attach_embedding(&self, tender_id: &str, embedding: &[f32]) -> Result<(), StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;
}

pub struct PgTenderStore {
    pool: PgPool,
}

impl PgTenderStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .with_context(|| "connecting to tender database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the tenders table when absent. Embeddings are stored inline
    /// as `real[]`; dimension is fixed per deployment, not enforced here.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenders (
                tender_id            TEXT PRIMARY KEY,
                source               TEXT NOT NULL,
                title                TEXT NOT NULL,
                description          TEXT NOT NULL DEFAULT '',
                entity               TEXT NOT NULL DEFAULT '',
                region               TEXT NOT NULL DEFAULT '',
                city                 TEXT NOT NULL DEFAULT '',
                procurement_type     TEXT NOT NULL DEFAULT '',
                catalog_date         DATE,
                opening_date         DATE,
                estimated_amount     DOUBLE PRECISION,
                source_url           TEXT,
                semantic_text        TEXT NOT NULL,
                metadata             JSONB NOT NULL DEFAULT '{}'::jsonb,
                content_fingerprint  TEXT NOT NULL,
                embedding            REAL[],
                created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tenders_fingerprint ON tenders (content_fingerprint)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_one(&self, tender: &Tender) -> Result<String, StoreError> {
        let metadata = serde_json::to_value(&tender.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO tenders (
                tender_id, source, title, description, entity, region, city,
                procurement_type, catalog_date, opening_date, estimated_amount,
                source_url, semantic_text, metadata, content_fingerprint, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW())
            ON CONFLICT (tender_id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                entity = EXCLUDED.entity,
                region = EXCLUDED.region,
                city = EXCLUDED.city,
                procurement_type = EXCLUDED.procurement_type,
                catalog_date = EXCLUDED.catalog_date,
                opening_date = EXCLUDED.opening_date,
                estimated_amount = EXCLUDED.estimated_amount,
                source_url = EXCLUDED.source_url,
                semantic_text = EXCLUDED.semantic_text,
                metadata = EXCLUDED.metadata,
                content_fingerprint = EXCLUDED.content_fingerprint,
                updated_at = NOW()
            "#,
        )
        .bind(&tender.tender_id)
        .bind(tender.source.as_str())
        .bind(&tender.title)
        .bind(&tender.description)
        .bind(&tender.entity)
        .bind(&tender.region)
        .bind(&tender.city)
        .bind(&tender.procurement_type)
        .bind(tender.catalog_date)
        .bind(tender.opening_date)
        .bind(tender.estimated_amount)
        .bind(&tender.source_url)
        .bind(&tender.semantic_text)
        .bind(metadata)
        .bind(&tender.content_fingerprint)
        .execute(&self.pool)
        .await?;
        Ok(tender.tender_id.clone())
    }
}

#[async_trait]
impl TenderStore for PgTenderStore {
    async fn upsert(&self, tender: &Tender) -> Result<String, StoreError> {
        self.upsert_one(tender).await
    }

    async fn bulk_upsert(&self, tenders: &[Tender]) -> Result<BulkOutcome, StoreError> {
        let mut outcome = BulkOutcome::default();
        for tender in tenders {
            match self.upsert_one(tender).await {
                Ok(_) => outcome.succeeded += 1,
                Err(err) => {
                    outcome.failed += 1;
                    outcome
                        .errors
                        .push(format!("{}: {}", tender.tender_id, err));
                }
            }
        }
        info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "bulk upsert finished"
        );
        Ok(outcome)
    }

    async fn attach_embedding(&self, tender_id: &str, embedding: &[f32]) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE tenders SET embedding = $2, updated_at = NOW() WHERE tender_id = $1",
        )
        .bind(tender_id)
        .bind(embedding)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(tender_id.to_string()));
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tenders")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }
}

#[derive(Debug, Clone)]
struct StoredTender {
    tender: Tender,
    created_at: DateTime<Utc>,
}

/// In-memory store used by tests and dry runs; mirrors the upsert
/// semantics of the Postgres store, including creation-timestamp
/// preservation.
#[derive(Default)]
pub struct MemoryTenderStore {
    inner: Mutex<HashMap<String, StoredTender>>,
}

impl MemoryTenderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, tender_id: &str) -> Option<Tender> {
        self.inner
            .lock()
            .await
            .get(tender_id)
            .map(|s| s.tender.clone())
    }

    pub async fn created_at(&self, tender_id: &str) -> Option<DateTime<Utc>> {
        self.inner.lock().await.get(tender_id).map(|s| s.created_at)
    }
}

#[async_trait]
impl TenderStore for MemoryTenderStore {
    async fn upsert(&self, tender: &Tender) -> Result<String, StoreError> {
        let mut map = self.inner.lock().await;
        match map.get_mut(&tender.tender_id) {
            Some(existing) => {
                existing.tender = tender.clone();
            }
            None => {
                map.insert(
                    tender.tender_id.clone(),
                    StoredTender {
                        tender: tender.clone(),
                        created_at: Utc::now(),
                    },
                );
            }
        }
        Ok(tender.tender_id.clone())
    }

    async fn bulk_upsert(&self, tenders: &[Tender]) -> Result<BulkOutcome, StoreError> {
        let mut outcome = BulkOutcome::default();
        for tender in tenders {
            self.upsert(tender).await?;
            outcome.succeeded += 1;
        }
        Ok(outcome)
    }

    async fn attach_embedding(&self, tender_id: &str, embedding: &[f32]) -> Result<(), StoreError> {
        let mut map = self.inner.lock().await;
        match map.get_mut(tender_id) {
            Some(stored) => {
                stored.tender.embedding = Some(embedding.to_vec());
                Ok(())
            }
            None => Err(StoreError::NotFound(tender_id.to_string())),
        }
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().await.len() as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            global_concurrency: 16,
            per_source_concurrency: 4,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl FetchError {
    /// Auth and client errors are permanent; timeouts and 5xx/429 are not.
    pub fn is_permanent(&self) -> bool {
        match self {
            FetchError::Request(err) => {
                classify_reqwest_error(err) == RetryDisposition::NonRetryable
            }
            FetchError::HttpStatus { status, .. } => {
                let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY);
                classify_status(status) == RetryDisposition::NonRetryable
            }
        }
    }
}

/// Shared HTTP client with per-source concurrency limits and retry-with-backoff
/// on transient failures. Adapter-level quota shaping lives with the adapters;
/// this layer only smooths bursts and absorbs flaky responses.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            backoff: config.backoff,
        })
    }

    async fn per_source_semaphore(&self, source_id: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    pub async fn get_json(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let response = self.get_bytes(run_id, source_id, url, query, headers).await?;
        serde_json::from_slice(&response.body).map_err(|err| {
            warn!(source_id, url, %err, "response body was not valid JSON");
            FetchError::HttpStatus {
                status: response.status.as_u16(),
                url: response.final_url,
            }
        })
    }

    pub async fn get_bytes(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<FetchedResponse, FetchError> {
        let _global = self.global_limit.acquire().await.expect("semaphore not closed");
        let per_source = self.per_source_semaphore(source_id).await;
        let _source = per_source.acquire().await.expect("semaphore not closed");

        let span = info_span!("http_fetch", %run_id, source_id, url);
        let _guard = span.enter();

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            let mut request = self.client.get(url).query(query);
            for (name, value) in headers {
                request = request.header(*name, value);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                        });
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Inputs longer than this are truncated, at a word boundary when one
    /// exists near the cut.
    pub max_input_chars: usize,
    pub max_retries: usize,
    pub backoff: BackoffPolicy,
}

impl EmbeddingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        Ok(Self {
            api_key,
            base_url: std::env::var("TENDEX_EMBED_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: std::env::var("TENDEX_EMBED_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            max_input_chars: 8000,
            max_retries: 3,
            backoff: BackoffPolicy {
                base_delay: Duration::from_millis(500),
                ..Default::default()
            },
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Client for OpenAI-compatible embedding endpoints, retrying on 429 and
/// server errors with exponential backoff.
pub struct EmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    config: EmbeddingConfig,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!config.api_key.trim().is_empty(), "missing embedding API key");
        anyhow::ensure!(!config.model.trim().is_empty(), "missing embedding model name");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("building embedding HTTP client")?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedding endpoint returned no vectors"))
    }

    pub async fn embed_batch(&self, inputs: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let truncated: Vec<String> = inputs
            .iter()
            .map(|t| truncate_at_word_boundary(t, self.config.max_input_chars))
            .collect();
        let input_refs: Vec<&str> = truncated.iter().map(String::as_str).collect();

        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.config.model,
                input: input_refs.clone(),
            };
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp
                            .json()
                            .await
                            .context("parsing embedding response")?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        anyhow::ensure!(
                            parsed.data.len() == inputs.len(),
                            "endpoint returned {} embeddings for {} inputs",
                            parsed.data.len(),
                            inputs.len()
                        );
                        return Ok(parsed.data.into_iter().map(|e| e.embedding).collect());
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.config.max_retries
                    {
                        let delay = self.config.backoff.delay_for_attempt(attempt);
                        warn!(%status, ?delay, "embedding request throttled; backing off");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    let body = resp.text().await.unwrap_or_else(|_| "<unavailable>".into());
                    anyhow::bail!("embedding request failed ({status}): {body}");
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.config.max_retries
                    {
                        tokio::time::sleep(self.config.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err).context("embedding request error");
                }
            }
        }
    }
}

/// Hard-truncates at `max_chars`, backing up to the last whitespace when one
/// falls within the final fifth of the cut so words are not split mid-token.
pub fn truncate_at_word_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let floor = cut.len().saturating_sub(cut.len() / 5);
    match cut.rfind(char::is_whitespace) {
        Some(pos) if pos >= floor => cut[..pos].trim_end().to_string(),
        _ => cut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tendex_core::{content_fingerprint, QualityScores, Source, TenderMeta};

    fn mk_tender(id: &str, title: &str) -> Tender {
        let catalog_date = NaiveDate::from_ymd_opt(2026, 3, 1);
        Tender {
            tender_id: id.to_string(),
            source: Source::TianguisCdmx,
            title: title.to_string(),
            description: "Descripción de prueba".into(),
            entity: "SEDENA".into(),
            region: "Ciudad de México".into(),
            city: "Ciudad de México".into(),
            procurement_type: "Licitación pública".into(),
            catalog_date,
            opening_date: None,
            estimated_amount: Some(1000.0),
            source_url: None,
            semantic_text: format!("{title} | SEDENA"),
            embedding: None,
            metadata: TenderMeta::new(
                Utc::now(),
                QualityScores {
                    completeness: 0.8,
                    reliability: 0.95,
                },
            ),
            content_fingerprint: content_fingerprint(title, "SEDENA", catalog_date, Some(1000.0)),
        }
    }

    #[tokio::test]
    async fn memory_store_upsert_preserves_created_at() {
        let store = MemoryTenderStore::new();
        store.upsert(&mk_tender("t-1", "Original")).await.unwrap();
        let created = store.created_at("t-1").await.unwrap();

        store.upsert(&mk_tender("t-1", "Corrected")).await.unwrap();
        assert_eq!(store.created_at("t-1").await.unwrap(), created);
        assert_eq!(store.get("t-1").await.unwrap().title, "Corrected");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn attach_embedding_requires_persisted_tender() {
        let store = MemoryTenderStore::new();
        let err = store.attach_embedding("ghost", &[0.1, 0.2]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        store.upsert(&mk_tender("t-2", "Con embedding")).await.unwrap();
        store.attach_embedding("t-2", &[0.1, 0.2]).await.unwrap();
        assert_eq!(store.get("t-2").await.unwrap().embedding.unwrap().len(), 2);
    }

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn status_classification_retries_throttles_and_server_errors() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            RetryDisposition::NonRetryable
        );
    }

    #[test]
    fn truncation_prefers_word_boundaries() {
        let text = "adquisición de equipo médico especializado";
        let truncated = truncate_at_word_boundary(text, 25);
        assert!(truncated.chars().count() <= 25);
        assert!(!truncated.ends_with(' '));
        assert!(text.starts_with(&truncated));
        // cut lands inside "médico"; the split word is dropped
        assert_eq!(truncated, "adquisición de equipo");

        assert_eq!(truncate_at_word_boundary("corto", 100), "corto");
    }
}
