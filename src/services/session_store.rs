//! In-memory registry of ingested documents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::IndexError;
use crate::models::{Chunk, DocumentMetadata, SessionConfig};
use crate::services::VectorIndex;

/// One ingested document: its chunks and the index over their embeddings.
///
/// Immutable once built; the store hands out shared references.
#[derive(Debug)]
pub struct Session {
    id: String,
    chunks: Vec<Chunk>,
    index: VectorIndex,
    metadata: DocumentMetadata,
    created_at: DateTime<Utc>,
    created: Instant,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn age(&self) -> Duration {
        self.created.elapsed()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub sessions: usize,
    pub chunks: usize,
}

/// Maps session identifiers to sessions.
///
/// A session is inserted in one write-locked step after it is fully built,
/// so readers never see a partial one. With no capacity or TTL configured,
/// sessions are kept until the process exits and memory grows with every
/// ingest.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: Option<usize>,
    ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        if config.is_unbounded() {
            warn!("session store has no capacity or ttl; sessions accumulate until restart");
        }
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: config.max_sessions,
            ttl: config.ttl_secs.map(Duration::from_secs),
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Register a fully built session and return its new identifier.
    pub async fn create(
        &self,
        chunks: Vec<Chunk>,
        index: VectorIndex,
        metadata: DocumentMetadata,
    ) -> Result<String, IndexError> {
        if chunks.len() != index.size() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: index.size(),
            });
        }

        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session {
            id: id.clone(),
            chunks,
            index,
            metadata,
            created_at: Utc::now(),
            created: Instant::now(),
        });

        let mut sessions = self.sessions.write().await;
        self.purge_expired(&mut sessions);
        if let Some(max) = self.max_sessions {
            while sessions.len() >= max {
                let Some(oldest) = sessions
                    .values()
                    .max_by_key(|s| s.age())
                    .map(|s| s.id.clone())
                else {
                    break;
                };
                sessions.remove(&oldest);
                info!(session_id = %oldest, "evicted oldest session at capacity");
            }
        }
        sessions.insert(id.clone(), session);

        debug!(session_id = %id, total = sessions.len(), "session registered");
        Ok(id)
    }

    /// Exact-match lookup. Expired sessions are reported as absent.
    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|s| !self.is_expired(s))
            .cloned()
    }

    /// Drop expired sessions; returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let mut sessions = self.sessions.write().await;
        let removed = self.purge_expired(&mut sessions);
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "expired sessions removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn stats(&self) -> StoreStats {
        let sessions = self.sessions.read().await;
        StoreStats {
            sessions: sessions.len(),
            chunks: sessions.values().map(|s| s.len()).sum(),
        }
    }

    fn is_expired(&self, session: &Session) -> bool {
        self.ttl.is_some_and(|ttl| session.age() >= ttl)
    }

    fn purge_expired(&self, sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s));
        before - sessions.len()
    }
}
