//! In-memory upload session tracking.
//!
//! Sessions live behind one mutex that is never held across I/O. The `Open` to
//! `Assembling` transition happens inside [`UploadSessionStore::mark_received`] under
//! the same lock as the insert that completed the set, so exactly one caller ever
//! receives the [`AssemblyPlan`] for a session.

use clipstash_core::constants::MAX_SESSION_ID_LEN;
use clipstash_core::models::{MediaKind, SessionState, UploadStatus};
use clipstash_core::AppError;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::descriptor::MediaDescriptor;

/// What a chunk declares about its session.
#[derive(Debug, Clone)]
pub struct SessionRegistration {
    pub session_id: String,
    pub index: u32,
    pub total_chunks: Option<u32>,
    pub original_filename: String,
    pub content_type: Option<String>,
    /// Normalised lowercase hex.
    pub expected_digest: Option<String>,
    pub owner_id: Uuid,
}

/// Everything assembly needs, captured at the moment the session became complete.
#[derive(Debug, Clone)]
pub struct AssemblyPlan {
    pub session_id: String,
    /// Ascending.
    pub indices: Vec<u32>,
    pub total_bytes: u64,
    pub original_filename: String,
    pub kind: MediaKind,
    pub extension: &'static str,
    pub expected_digest: Option<String>,
    pub owner_id: Uuid,
}

/// Result of recording a chunk.
#[derive(Debug)]
pub struct MarkOutcome {
    pub received: u32,
    /// Zero while unknown.
    pub total: u32,
    /// Set for the one caller that moved the session to `Assembling`.
    pub assemble: Option<AssemblyPlan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Removed,
    /// Assembly already started; cancellation does nothing.
    AssemblyInProgress,
    Unknown,
}

#[derive(Debug)]
struct Session {
    state: SessionState,
    /// index -> chunk size in bytes
    received: BTreeMap<u32, u64>,
    total: Option<u32>,
    original_filename: String,
    kind: MediaKind,
    extension: &'static str,
    expected_digest: Option<String>,
    owner_id: Uuid,
    last_activity: Instant,
}

impl Session {
    fn status(&self, session_id: &str) -> UploadStatus {
        let received = self.received.len() as u32;
        let total = self.total.unwrap_or(0);
        UploadStatus {
            session_id: session_id.to_string(),
            chunks_received: received,
            total_chunks: total,
            complete: self.total.is_some_and(|t| received == t),
            state: self.state,
        }
    }
}

/// Tracks received chunk indices per session.
#[derive(Debug, Default)]
pub struct UploadSessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

/// Session ids name working directories, so only a conservative character set is accepted.
pub fn validate_session_id(session_id: &str) -> Result<(), AppError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(AppError::Validation(format!(
            "Invalid session id: must be 1-{} characters of letters, digits, '-' or '_'",
            MAX_SESSION_ID_LEN
        )));
    }
    Ok(())
}

impl UploadSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Session>>, AppError> {
        self.sessions
            .lock()
            .map_err(|_| AppError::Internal("Upload session lock poisoned".to_string()))
    }

    /// Create the session on its first chunk, or check a later chunk against it.
    ///
    /// Inconsistent totals, digests or owners, and chunks for a session that is already
    /// assembling, are validation errors and leave the session untouched.
    pub fn register(&self, reg: &SessionRegistration) -> Result<(), AppError> {
        let mut sessions = self.lock()?;

        if let Some(session) = sessions.get_mut(&reg.session_id) {
            if session.state != SessionState::Open {
                return Err(AppError::Validation(format!(
                    "Upload session {} is not accepting chunks: assembly in progress",
                    reg.session_id
                )));
            }
            if session.owner_id != reg.owner_id {
                return Err(AppError::Validation(format!(
                    "Upload session {} belongs to another owner",
                    reg.session_id
                )));
            }

            let total = match (session.total, reg.total_chunks) {
                (Some(known), Some(declared)) if known != declared => {
                    return Err(AppError::Validation(format!(
                        "Inconsistent total chunk count for session {}: {} declared earlier, {} now",
                        reg.session_id, known, declared
                    )));
                }
                (known, declared) => known.or(declared),
            };
            if let Some(total) = total {
                if reg.index >= total {
                    return Err(index_out_of_range(reg.index, total));
                }
                if let Some((&highest, _)) = session.received.last_key_value() {
                    if highest >= total {
                        return Err(index_out_of_range(highest, total));
                    }
                }
            }

            let digest = match (&session.expected_digest, &reg.expected_digest) {
                (Some(known), Some(declared)) if known != declared => {
                    return Err(AppError::Validation(format!(
                        "Inconsistent content digest for session {}",
                        reg.session_id
                    )));
                }
                (known, declared) => known.clone().or_else(|| declared.clone()),
            };

            if let Some(content_type) = &reg.content_type {
                let (kind, _) = MediaDescriptor::classify(content_type)?;
                if kind != session.kind {
                    return Err(AppError::Validation(format!(
                        "Content type {} contradicts the {} declared for session {}",
                        content_type, session.kind, reg.session_id
                    )));
                }
            }

            session.total = total;
            session.expected_digest = digest;
            session.last_activity = Instant::now();
            return Ok(());
        }

        if let Some(total) = reg.total_chunks {
            if reg.index >= total {
                return Err(index_out_of_range(reg.index, total));
            }
        }

        let content_type = reg
            .content_type
            .as_deref()
            .or_else(|| MediaDescriptor::content_type_from_filename(&reg.original_filename))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Cannot determine content type of '{}'; declare it explicitly",
                    reg.original_filename
                ))
            })?;
        let (kind, extension) = MediaDescriptor::classify(content_type)?;

        sessions.insert(
            reg.session_id.clone(),
            Session {
                state: SessionState::Open,
                received: BTreeMap::new(),
                total: reg.total_chunks,
                original_filename: reg.original_filename.clone(),
                kind,
                extension,
                expected_digest: reg.expected_digest.clone(),
                owner_id: reg.owner_id,
                last_activity: Instant::now(),
            },
        );

        tracing::debug!(
            session_id = %reg.session_id,
            kind = %kind,
            total_chunks = ?reg.total_chunks,
            "Upload session created"
        );

        Ok(())
    }

    /// Record a stored chunk. A repeated index replaces the earlier size and is not
    /// counted twice.
    pub fn mark_received(
        &self,
        session_id: &str,
        index: u32,
        size: u64,
    ) -> Result<MarkOutcome, AppError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

        if session.state != SessionState::Open {
            return Err(AppError::Validation(format!(
                "Upload session {} is not accepting chunks: assembly in progress",
                session_id
            )));
        }

        // A chunk registered before the total was known is checked here, after its write.
        if let Some(total) = session.total {
            if index >= total {
                return Err(index_out_of_range(index, total));
            }
        }

        session.received.insert(index, size);
        session.last_activity = Instant::now();

        let received = session.received.len() as u32;
        let total = session.total.unwrap_or(0);

        let contiguous = session
            .received
            .last_key_value()
            .is_some_and(|(&highest, _)| highest + 1 == received);
        let assemble = if session.total == Some(received) && contiguous {
            session.state = SessionState::Assembling;
            Some(AssemblyPlan {
                session_id: session_id.to_string(),
                indices: session.received.keys().copied().collect(),
                total_bytes: session.received.values().sum(),
                original_filename: session.original_filename.clone(),
                kind: session.kind,
                extension: session.extension,
                expected_digest: session.expected_digest.clone(),
                owner_id: session.owner_id,
            })
        } else {
            None
        };

        Ok(MarkOutcome {
            received,
            total,
            assemble,
        })
    }

    /// The declared total, once known. It never changes afterwards.
    pub fn declared_total(&self, session_id: &str) -> Result<Option<u32>, AppError> {
        Ok(self.lock()?.get(session_id).and_then(|session| session.total))
    }

    pub fn status(&self, session_id: &str) -> Result<Option<UploadStatus>, AppError> {
        Ok(self
            .lock()?
            .get(session_id)
            .map(|session| session.status(session_id)))
    }

    /// Remove an `Open` session. Assembling sessions are left alone.
    pub fn cancel(&self, session_id: &str) -> Result<CancelOutcome, AppError> {
        let mut sessions = self.lock()?;
        match sessions.get(session_id).map(|s| s.state) {
            None => Ok(CancelOutcome::Unknown),
            Some(SessionState::Open) => {
                sessions.remove(session_id);
                Ok(CancelOutcome::Removed)
            }
            Some(_) => Ok(CancelOutcome::AssemblyInProgress),
        }
    }

    /// Drop a session after assembly finished, successfully or not.
    pub fn finish(&self, session_id: &str) -> Result<(), AppError> {
        self.lock()?.remove(session_id);
        Ok(())
    }

    /// Remove and return `Open` sessions idle for at least `max_idle`.
    pub fn take_idle(&self, max_idle: Duration) -> Result<Vec<String>, AppError> {
        let mut sessions = self.lock()?;
        let idle: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.state == SessionState::Open && s.last_activity.elapsed() >= max_idle)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &idle {
            sessions.remove(id);
        }
        Ok(idle)
    }

    pub fn contains(&self, session_id: &str) -> Result<bool, AppError> {
        Ok(self.lock()?.contains_key(session_id))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn index_out_of_range(index: u32, total: u32) -> AppError {
    AppError::Validation(format!(
        "Chunk index {} is out of range for {} total chunks",
        index, total
    ))
}
