//! Chunked persistence with memory-aware sizing and fingerprint dedup.
//!
//! The processor owns a process-wide seen-set of content fingerprints; a
//! tender whose fingerprint was already committed in this process is dropped
//! as a duplicate, whatever its `tender_id` says. Chunks commit in order and
//! a chunk failure never stops the ones behind it.

use std::collections::HashSet;

use tendex_core::Tender;
use tendex_storage::TenderStore;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Smallest chunk worth the round trip.
const MIN_CHUNK_SIZE: usize = 10;

/// Working-copy multiplier applied to a record's serialized size when
/// estimating per-chunk memory.
const MEMORY_OVERHEAD_FACTOR: usize = 3;

const FALLBACK_RECORD_BYTES: usize = 4096;

/// Pre-commit acceptance check applied per record inside a chunk.
pub type FinalCheck = Box<dyn Fn(&Tender) -> bool + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct ChunkResult {
    pub index: usize,
    pub processed: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub errors: Vec<String>,
}

#[derive(Default)]
pub struct BatchSetResult {
    pub success: bool,
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub duplicates_removed: usize,
    pub chunks: Vec<ChunkResult>,
    pub errors: Vec<String>,
    /// Records handed to the store, in commit order. Feeds the embedding pass.
    pub committed: Vec<Tender>,
}

pub struct BatchProcessor {
    chunk_size: usize,
    memory_limit_bytes: usize,
    enable_dedup: bool,
    final_check: Option<FinalCheck>,
    seen: Mutex<HashSet<String>>,
}

impl BatchProcessor {
    pub fn new(chunk_size: usize, memory_limit_mb: usize, enable_dedup: bool) -> Self {
        Self {
            chunk_size,
            memory_limit_bytes: memory_limit_mb * 1024 * 1024,
            enable_dedup,
            final_check: None,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_final_check(mut self, check: FinalCheck) -> Self {
        self.final_check = Some(check);
        self
    }

    /// Forgets every fingerprint seen so far. Call between unrelated runs
    /// when re-observing yesterday's tenders is expected.
    pub async fn clear_cache(&self) {
        self.seen.lock().await.clear();
    }

    /// Chunk size bounded by the configured value and by how many records of
    /// this shape fit in the memory budget, never below [`MIN_CHUNK_SIZE`].
    fn effective_chunk_size(&self, sample: &Tender) -> usize {
        let record_bytes = serde_json::to_vec(sample)
            .map(|b| b.len())
            .unwrap_or(FALLBACK_RECORD_BYTES)
            .max(1)
            * MEMORY_OVERHEAD_FACTOR;
        let memory_cap = self.memory_limit_bytes / record_bytes;
        self.chunk_size.min(memory_cap).max(MIN_CHUNK_SIZE)
    }

    pub async fn process(&self, tenders: Vec<Tender>, store: &dyn TenderStore) -> BatchSetResult {
        self.process_with_progress(tenders, store, |_| {}).await
    }

    /// Same as [`Self::process`], invoking `on_chunk` after each chunk
    /// settles, so callers see counts for committed chunks while later
    /// chunks are still running.
    pub async fn process_with_progress<F>(
        &self,
        tenders: Vec<Tender>,
        store: &dyn TenderStore,
        mut on_chunk: F,
    ) -> BatchSetResult
    where
        F: FnMut(&ChunkResult),
    {
        let total = tenders.len();
        let mut result = BatchSetResult {
            total,
            ..Default::default()
        };
        if total == 0 {
            result.success = true;
            return result;
        }

        let chunk_size = self.effective_chunk_size(&tenders[0]);
        info!(total, chunk_size, "starting batch persistence");

        for (index, chunk) in tenders.chunks(chunk_size).enumerate() {
            let mut chunk_result = ChunkResult {
                index,
                ..Default::default()
            };

            let mut unique = self.dedupe(chunk).await;
            chunk_result.duplicates = chunk.len() - unique.len();

            if let Some(check) = &self.final_check {
                let before = unique.len();
                unique.retain(|tender| {
                    let keep = check(tender);
                    if !keep {
                        chunk_result
                            .errors
                            .push(format!("final check rejected {}", tender.tender_id));
                    }
                    keep
                });
                chunk_result.failed += before - unique.len();
            }

            if !unique.is_empty() {
                match store.bulk_upsert(&unique).await {
                    Ok(outcome) => {
                        chunk_result.processed = outcome.succeeded;
                        chunk_result.failed += outcome.failed;
                        chunk_result.errors.extend(outcome.errors);
                        result.committed.extend(unique);
                    }
                    Err(err) => {
                        chunk_result.failed += unique.len();
                        chunk_result
                            .errors
                            .push(format!("chunk {index} persistence failed: {err}"));
                        warn!(chunk = index, error = %err, "chunk persistence failed");
                    }
                }
            }

            on_chunk(&chunk_result);
            result.processed += chunk_result.processed;
            result.failed += chunk_result.failed;
            result.duplicates_removed += chunk_result.duplicates;
            result.errors.extend(chunk_result.errors.clone());
            result.chunks.push(chunk_result);
        }

        result.success = (result.failed as f64) < (total as f64) * 0.5;
        info!(
            processed = result.processed,
            failed = result.failed,
            duplicates = result.duplicates_removed,
            chunks = result.chunks.len(),
            "batch persistence finished"
        );
        result
    }

    async fn dedupe(&self, chunk: &[Tender]) -> Vec<Tender> {
        if !self.enable_dedup {
            return chunk.to_vec();
        }
        let mut seen = self.seen.lock().await;
        chunk
            .iter()
            .filter(|tender| seen.insert(tender.content_fingerprint.clone()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tendex_core::{QualityScores, Source, TenderMeta};
    use tendex_storage::{BulkOutcome, MemoryTenderStore, StoreError};

    fn tender(id: usize) -> Tender {
        let mut tender = Tender {
            tender_id: format!("T-{id:04}"),
            source: Source::LicitaYa,
            title: format!("Adquisición número {id} de insumos"),
            description: "Insumos generales.".to_string(),
            entity: format!("Entidad {id}"),
            region: "México".to_string(),
            city: String::new(),
            procurement_type: "Licitación".to_string(),
            catalog_date: None,
            opening_date: None,
            estimated_amount: Some(1000.0 + id as f64),
            source_url: None,
            semantic_text: format!("Adquisición número {id} de insumos | Entidad {id}"),
            embedding: None,
            metadata: TenderMeta::new(
                Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap(),
                QualityScores {
                    completeness: 0.6,
                    reliability: 0.9,
                },
            ),
            content_fingerprint: String::new(),
        };
        tender.refresh_fingerprint();
        tender
    }

    /// Store whose bulk upsert fails whenever the chunk contains a marker id.
    struct PoisonStore {
        inner: MemoryTenderStore,
        marker: String,
    }

    #[async_trait]
    impl TenderStore for PoisonStore {
        async fn upsert(&self, tender: &Tender) -> Result<String, StoreError> {
            self.inner.upsert(tender).await
        }

        async fn bulk_upsert(&self, tenders: &[Tender]) -> Result<BulkOutcome, StoreError> {
            if tenders.iter().any(|t| t.tender_id == self.marker) {
                return Err(StoreError::NotFound("connection reset".to_string()));
            }
            self.inner.bulk_upsert(tenders).await
        }

        async fn attach_embedding(
            &self,
            tender_id: &str,
            embedding: &[f32],
        ) -> Result<(), StoreError> {
            self.inner.attach_embedding(tender_id, embedding).await
        }

        async fn count(&self) -> Result<u64, StoreError> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn thousand_duplicates_collapse_to_unique_set() {
        // 50 distinct tenders repeated 21 times each.
        let mut records = Vec::with_capacity(1050);
        for _ in 0..21 {
            for id in 0..50 {
                records.push(tender(id));
            }
        }
        assert_eq!(records.len(), 1050);

        let store = MemoryTenderStore::new();
        let processor = BatchProcessor::new(200, 512, true);
        let result = processor.process(records, &store).await;

        assert!(result.success);
        assert_eq!(result.total, 1050);
        assert_eq!(result.processed, 50);
        assert_eq!(result.duplicates_removed, 1000);
        assert_eq!(result.chunks.len(), 6);
        assert_eq!(store.count().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn seen_set_persists_until_cleared() {
        let store = MemoryTenderStore::new();
        let processor = BatchProcessor::new(100, 512, true);
        let batch: Vec<Tender> = (0..20).map(tender).collect();

        let first = processor.process(batch.clone(), &store).await;
        assert_eq!(first.processed, 20);

        let second = processor.process(batch.clone(), &store).await;
        assert_eq!(second.processed, 0);
        assert_eq!(second.duplicates_removed, 20);

        processor.clear_cache().await;
        let third = processor.process(batch, &store).await;
        assert_eq!(third.processed, 20);
    }

    #[tokio::test]
    async fn failed_chunk_does_not_stop_later_chunks() {
        let records: Vec<Tender> = (0..30).map(tender).collect();
        let store = PoisonStore {
            inner: MemoryTenderStore::new(),
            marker: "T-0015".to_string(),
        };
        let processor = BatchProcessor::new(10, 512, true);
        let result = processor.process(records, &store).await;

        assert!(result.success);
        assert_eq!(result.processed, 20);
        assert_eq!(result.failed, 10);
        assert_eq!(store.count().await.unwrap(), 20);
        assert_eq!(result.chunks[1].failed, 10);
        assert_eq!(result.chunks[2].processed, 10);
    }

    #[tokio::test]
    async fn chunk_size_never_drops_below_floor() {
        let store = MemoryTenderStore::new();
        // Zero memory budget would otherwise force single-record chunks.
        let processor = BatchProcessor::new(200, 0, true);
        let records: Vec<Tender> = (0..25).map(tender).collect();
        let result = processor.process(records, &store).await;

        assert_eq!(result.chunks.len(), 3);
        assert_eq!(result.processed, 25);
    }

    #[tokio::test]
    async fn chunk_observer_sees_each_chunk_as_it_settles() {
        let store = MemoryTenderStore::new();
        let processor = BatchProcessor::new(10, 512, true);
        let records: Vec<Tender> = (0..25).map(tender).collect();

        let mut observed = Vec::new();
        let result = processor
            .process_with_progress(records, &store, |chunk| observed.push(chunk.processed))
            .await;

        assert_eq!(observed, vec![10, 10, 5]);
        assert_eq!(result.processed, 25);
    }

    #[tokio::test]
    async fn dedup_can_be_disabled() {
        let store = MemoryTenderStore::new();
        let processor = BatchProcessor::new(100, 512, false);
        let records = vec![tender(1), tender(1), tender(1)];
        let result = processor.process(records, &store).await;

        assert_eq!(result.duplicates_removed, 0);
        assert_eq!(result.processed, 3);
        // Upserts share a tender_id, so the store still holds one row.
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn final_check_rejections_count_as_failures() {
        let store = MemoryTenderStore::new();
        let processor = BatchProcessor::new(100, 512, true)
            .with_final_check(Box::new(|t: &Tender| t.estimated_amount.is_some()));

        let mut bad = tender(7);
        bad.estimated_amount = None;
        bad.refresh_fingerprint();
        let result = processor.process(vec![tender(1), bad, tender(2)], &store).await;

        assert_eq!(result.processed, 2);
        assert_eq!(result.failed, 1);
        assert!(result.success);
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
