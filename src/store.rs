//! Session document store with active TTL eviction.
//!
//! Owns every ingested document for the life of the session. In-memory only
//! (session data is privacy-sensitive), bounded two ways:
//!
//! - **TTL** — each document's expiry is fixed at ingestion; expired entries
//!   are evicted lazily on every `get` and proactively by the background
//!   sweeper ([`spawn_sweeper`]). A TTL that is configured but never enforced
//!   would silently grow memory, so both paths are mandatory behavior, not
//!   an optimization.
//! - **Capacity** — at most `max_documents` per session; the oldest is
//!   evicted first on overflow.
//!
//! Concurrency model: the map-level `RwLock` is held only for lookup, insert,
//! and remove. Per-document mutable state (the conversation window) sits
//! behind that entry's own lock, so operations on unrelated documents never
//! contend. Readers receive `Arc`s — an entry being evicted stays fully
//! intact for any reader already holding it, and a reader can never observe
//! a document with partially-removed chunks.
//!
//! A document becomes visible at `begin` (status: processing) and queryable
//! at `finish`; a question arriving between the two is rejected with
//! [`QaError::StillProcessing`] rather than served from a partial index.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::QaError;
use crate::index::VectorIndex;
use crate::models::{ConversationTurn, Document};

/// A fully-ingested document with its index and conversation window.
pub struct SessionEntry {
    pub document: Document,
    pub index: VectorIndex,
    turns: Mutex<Vec<ConversationTurn>>,
    max_turns: usize,
    deadline: Instant,
}

impl SessionEntry {
    /// Append a turn, evicting the oldest when the window is full.
    pub fn push_turn(&self, turn: ConversationTurn) {
        let mut turns = self.turns.lock().expect("turn lock poisoned");
        turns.push(turn);
        let excess = turns.len().saturating_sub(self.max_turns);
        if excess > 0 {
            turns.drain(..excess);
        }
    }

    /// Snapshot of the bounded conversation window, oldest first.
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.turns.lock().expect("turn lock poisoned").clone()
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline
    }
}

enum DocSlot {
    /// Ingestion in flight; visible but not queryable.
    Processing { created: Instant, deadline: Instant },
    Ready { created: Instant, entry: Arc<SessionEntry> },
}

impl DocSlot {
    fn created(&self) -> Instant {
        match self {
            DocSlot::Processing { created, .. } => *created,
            DocSlot::Ready { created, .. } => *created,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        match self {
            DocSlot::Processing { deadline, .. } => now > *deadline,
            DocSlot::Ready { entry, .. } => entry.is_expired(now),
        }
    }
}

/// Store-level statistics, surfaced by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub documents: usize,
    pub max_documents: usize,
    pub ttl_secs: u64,
}

/// The session-scoped document store.
pub struct SessionStore {
    ttl: Duration,
    max_documents: usize,
    max_turns: usize,
    inner: RwLock<HashMap<String, DocSlot>>,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_documents: usize, max_turns: usize) -> Self {
        Self {
            ttl,
            max_documents: max_documents.max(1),
            max_turns: max_turns.max(1),
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a document id as processing. Evicts the oldest entry first
    /// if the session is at capacity.
    pub fn begin(&self, id: &str) {
        let now = Instant::now();
        let mut map = self.inner.write().expect("store lock poisoned");

        while map.len() >= self.max_documents {
            // Prefer evicting completed documents over in-flight ingestions.
            let victim = map
                .iter()
                .filter(|(_, slot)| matches!(slot, DocSlot::Ready { .. }))
                .min_by_key(|(_, slot)| slot.created())
                .or_else(|| map.iter().min_by_key(|(_, slot)| slot.created()))
                .map(|(id, _)| id.clone());
            match victim {
                Some(victim_id) => {
                    map.remove(&victim_id);
                    tracing::info!(document = %victim_id, "evicted document at capacity");
                }
                None => break,
            }
        }

        map.insert(
            id.to_string(),
            DocSlot::Processing {
                created: now,
                deadline: now + self.ttl,
            },
        );
    }

    /// Promote a processing document to queryable. Returns the stored entry,
    /// or `None` when the slot was evicted while ingestion ran (session
    /// teardown or capacity pressure) — the caller should treat the
    /// ingestion as cancelled.
    pub fn finish(
        &self,
        id: &str,
        document: Document,
        index: VectorIndex,
    ) -> Option<Arc<SessionEntry>> {
        let mut map = self.inner.write().expect("store lock poisoned");
        let slot = map.get(id)?;
        let created = slot.created();
        let entry = Arc::new(SessionEntry {
            document,
            index,
            turns: Mutex::new(Vec::new()),
            max_turns: self.max_turns,
            deadline: created + self.ttl,
        });
        map.insert(
            id.to_string(),
            DocSlot::Ready {
                created,
                entry: Arc::clone(&entry),
            },
        );
        Some(entry)
    }

    /// Drop a processing slot after a failed ingestion.
    pub fn abandon(&self, id: &str) {
        let mut map = self.inner.write().expect("store lock poisoned");
        if matches!(map.get(id), Some(DocSlot::Processing { .. })) {
            map.remove(id);
        }
    }

    /// Look up a queryable document, lazily evicting it when expired.
    pub fn get(&self, id: &str) -> Result<Arc<SessionEntry>, QaError> {
        let now = Instant::now();
        {
            let map = self.inner.read().expect("store lock poisoned");
            match map.get(id) {
                None => return Err(QaError::NotFound(id.to_string())),
                Some(slot) if slot.is_expired(now) => {} // fall through to evict
                Some(DocSlot::Processing { .. }) => {
                    return Err(QaError::StillProcessing(id.to_string()));
                }
                Some(DocSlot::Ready { entry, .. }) => return Ok(Arc::clone(entry)),
            }
        }

        // Expired: upgrade to a write lock and re-check before removing.
        let mut map = self.inner.write().expect("store lock poisoned");
        if map.get(id).is_some_and(|slot| slot.is_expired(now)) {
            map.remove(id);
            tracing::info!(document = %id, "evicted expired document on access");
        }
        Err(QaError::NotFound(id.to_string()))
    }

    /// Remove a document explicitly. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.inner
            .write()
            .expect("store lock poisoned")
            .remove(id)
            .is_some()
    }

    /// Remove every expired document. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.inner.write().expect("store lock poisoned");
        let before = map.len();
        map.retain(|_, slot| !slot.is_expired(now));
        let removed = before - map.len();
        if removed > 0 {
            tracing::info!(removed, "sweep evicted expired documents");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            documents: self.len(),
            max_documents: self.max_documents,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

/// Run [`SessionStore::sweep_expired`] on a fixed interval until aborted.
///
/// The returned handle is held by the engine and aborted on teardown.
pub fn spawn_sweeper(store: Arc<SessionStore>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired();
            tracing::debug!(removed, "background sweep completed");
        }
    })
}
