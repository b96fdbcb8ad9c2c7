//! The question-answering engine: ingest → ask → evict.
//!
//! [`QaEngine`] wires the pipeline together and is the only surface callers
//! touch. Per-request flow:
//!
//! - **Ingest** — normalize and chunk the text on the blocking pool (CPU
//!   work never stalls the async loop), embed the chunks in batches with
//!   per-batch fallback, build the vector index, and publish the finished
//!   document to the session store. The document is visible as "processing"
//!   for the duration; a question racing the ingestion gets
//!   [`QaError::StillProcessing`], never a partial index.
//! - **Ask** — embed the question (the one network await), resolve grounding
//!   on the blocking pool, compose the answer (second network await, under a
//!   hard timeout), and append the turn to the document's bounded history.
//! - **Evict** — explicit removal; TTL eviction also runs lazily on access
//!   and via the optional background sweeper.
//!
//! Provider failures never escape these methods — they are converted to the
//! degraded paths described in [`crate::answer`]. Only invalid input,
//! unknown ids, in-flight ingestions, and cancelled ingestions surface as
//! errors.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::answer::AnswerComposer;
use crate::chunk::{self, PageSpan};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::QaError;
use crate::generation::{self, GenerationProvider};
use crate::index::VectorIndex;
use crate::models::{ConversationTurn, Document, GroundingMode, PageInput};
use crate::retrieve;
use crate::store::{self, SessionStore, StoreStats};

pub struct QaEngine {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    composer: AnswerComposer,
    store: Arc<SessionStore>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl QaEngine {
    /// Build an engine with explicit providers (tests inject doubles here).
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        let store = Arc::new(SessionStore::new(
            Duration::from_secs(config.session.ttl_secs),
            config.session.max_documents,
            config.qa.max_history_turns,
        ));
        let composer =
            AnswerComposer::new(generator, config.generation.clone(), config.qa.clone());
        Self {
            config,
            embedder,
            composer,
            store,
            sweeper: Mutex::new(None),
        }
    }

    /// Build an engine with providers selected from the configuration.
    pub fn from_config(config: Config) -> Self {
        let embedder = embedding::create_provider(&config.embedding);
        let generator = generation::create_provider(&config.generation);
        Self::new(config, embedder, generator)
    }

    /// Start the background expiry sweeper. Idempotent; the previous task is
    /// replaced. The task is aborted when the engine drops.
    pub fn start_sweeper(&self) {
        let handle = store::spawn_sweeper(
            Arc::clone(&self.store),
            Duration::from_secs(self.config.session.sweep_interval_secs.max(1)),
        );
        let mut slot = self.sweeper.lock().expect("sweeper lock poisoned");
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    /// Ingest paged text (page numbers become chunk provenance).
    pub async fn ingest(&self, pages: Vec<PageInput>) -> Result<String, QaError> {
        self.ingest_source(IngestSource::Pages(pages)).await
    }

    /// Ingest a bare string with no structural markers.
    pub async fn ingest_text(&self, text: &str) -> Result<String, QaError> {
        self.ingest_source(IngestSource::Text(text.to_string()))
            .await
    }

    async fn ingest_source(&self, source: IngestSource) -> Result<String, QaError> {
        let doc_id = Uuid::new_v4().to_string();
        self.store.begin(&doc_id);

        // Normalization and chunking are CPU-bound; keep them off the async
        // loop so a large ingestion doesn't stall concurrent questions.
        let chunk_cfg = self.config.chunking.clone();
        let assembled = tokio::task::spawn_blocking(move || {
            let (raw_text, spans, page_count) = assemble(source);
            let chunks = chunk::chunk_document(&raw_text, &chunk_cfg, &spans);
            (raw_text, chunks, page_count)
        })
        .await;

        let (raw_text, mut chunks, page_count) = match assembled {
            Ok(v) => v,
            Err(e) => {
                self.store.abandon(&doc_id);
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
                return Err(QaError::Cancelled(doc_id));
            }
        };

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let outcomes =
            embedding::embed_with_fallback(self.embedder.as_ref(), &self.config.embedding, &texts)
                .await;

        let mut index = VectorIndex::new(self.embedder.dims());
        let mut degraded = 0usize;
        for (chunk, outcome) in chunks.iter_mut().zip(outcomes) {
            chunk.degraded_embedding = outcome.degraded;
            if outcome.degraded {
                degraded += 1;
            }
            index.add(chunk.chunk_index, outcome.vector.clone());
            chunk.vector = Some(outcome.vector);
        }

        tracing::info!(
            document = %doc_id,
            chunks = chunks.len(),
            degraded_embeddings = degraded,
            pages = page_count,
            "document ingested"
        );

        let now = Utc::now();
        let document = Document {
            id: doc_id.clone(),
            raw_text,
            chunks,
            page_count,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(self.config.session.ttl_secs as i64),
        };

        match self.store.finish(&doc_id, document, index) {
            Some(_) => Ok(doc_id),
            None => {
                tracing::info!(document = %doc_id, "ingestion cancelled before completion");
                Err(QaError::Cancelled(doc_id))
            }
        }
    }

    /// Answer a question against an ingested document.
    pub async fn ask(&self, doc_id: &str, question: &str) -> Result<ConversationTurn, QaError> {
        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(QaError::InvalidInput("question cannot be empty".to_string()));
        }

        let entry = self.store.get(doc_id)?;

        // Embed the question unless there is nothing to rank against; a
        // degraded query comes back as None and retrieval goes lexical.
        let query = if entry.index.is_empty() {
            None
        } else {
            embedding::embed_query(self.embedder.as_ref(), &self.config.embedding, &question).await
        };

        // Ranking is CPU-bound; run it off the async loop.
        let k = self.config.qa.max_context_chunks;
        let min_score = self.config.qa.min_lexical_score;
        let (hits, grounding) = {
            let entry = Arc::clone(&entry);
            let question = question.clone();
            let ranked = tokio::task::spawn_blocking(move || {
                retrieve::resolve_grounding(
                    &entry.document.chunks,
                    &entry.index,
                    query.as_deref(),
                    &question,
                    k,
                    min_score,
                )
            })
            .await;
            match ranked {
                Ok(v) => v,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => (Vec::new(), GroundingMode::None),
            }
        };

        let history = entry.history();
        let turn = self
            .composer
            .compose(&entry.document, &hits, grounding, &history, &question)
            .await;
        entry.push_turn(turn.clone());
        Ok(turn)
    }

    /// Remove a document explicitly. Returns whether it existed.
    pub fn evict(&self, doc_id: &str) -> bool {
        self.store.remove(doc_id)
    }

    /// Remove every expired document now. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        self.store.sweep_expired()
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}

impl Drop for QaEngine {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.sweeper.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

enum IngestSource {
    Pages(Vec<PageInput>),
    Text(String),
}

/// Normalize ingestion input into one text plus page-boundary markers.
fn assemble(source: IngestSource) -> (String, Vec<PageSpan>, u32) {
    match source {
        IngestSource::Text(text) => {
            let normalized = crate::text::normalize(&text);
            let page_count = u32::from(!normalized.is_empty());
            (normalized, Vec::new(), page_count)
        }
        IngestSource::Pages(pages) => chunk::assemble_pages(&pages),
    }
}
