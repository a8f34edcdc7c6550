//! Session store.
//!
//! One entry per issued authorization request, keyed by an unguessable session
//! ID. Entries expire a fixed time after their last write. The store is shared
//! by every handler through [`AppState`](crate::AppState); each operation takes
//! the lock once and never holds it across an await point.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
    time::Duration,
};

use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use thiserror::Error;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use didauth_protocol::AuthorizationRequestMessage;
use didauth_verifier::VerifiedHolder;

pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;
/// Longest TTL the store will apply, pending or resolved.
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;
/// 128 bits.
pub const MIN_SESSION_ID_BYTES: usize = 16;
const MAX_SESSION_ID_LEN: usize = 128;

/// Opaque correlation token between an issued request and its callback.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Draw a fresh ID from the OS random source, hex encoded.
    pub fn generate(len_bytes: usize) -> Self {
        let mut bytes = vec![0u8; len_bytes.max(MIN_SESSION_ID_BYTES)];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accept an ID supplied by a caller. Empty, oversized, or non URL-safe
    /// values are refused.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > MAX_SESSION_ID_LEN {
            return None;
        }
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The verifier rejected the response.
    Rejected,
    /// The verifier did not answer within the configured timeout.
    TimedOut,
}

#[derive(Clone, Debug)]
pub enum SessionState {
    Pending {
        request: Box<AuthorizationRequestMessage>,
        /// Set while a callback is being verified.
        in_flight: bool,
    },
    Verified {
        holder: VerifiedHolder,
    },
    Failed {
        reason: FailureReason,
    },
}

/// Status as reported to pollers. `Unknown` covers expired and never-issued
/// sessions alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Verified,
    Failed,
    Unknown,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub state: SessionState,
    pub created_at: Instant,
    pub updated_at: Instant,
    pub expires_at: Instant,
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        match self.state {
            SessionState::Pending { .. } => SessionStatus::Pending,
            SessionState::Verified { .. } => SessionStatus::Verified,
            SessionState::Failed { .. } => SessionStatus::Failed,
        }
    }

    pub fn holder(&self) -> Option<&VerifiedHolder> {
        match &self.state {
            SessionState::Verified { holder } => Some(holder),
            _ => None,
        }
    }

    /// A session being verified does not expire; the verification task
    /// always resolves or releases it.
    fn is_expired(&self, now: Instant) -> bool {
        match self.state {
            SessionState::Pending { in_flight: true, .. } => false,
            _ => now >= self.expires_at,
        }
    }
}

/// Terminal outcome committed by the callback processor.
#[derive(Clone, Debug)]
pub enum Resolution {
    Verified(VerifiedHolder),
    Failed(FailureReason),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session already resolved")]
    AlreadyResolved,
    #[error("session verification already in progress")]
    Busy,
    #[error("session has no verification in progress")]
    NotClaimed,
    #[error("session store unavailable")]
    Unavailable,
}

#[derive(Clone)]
pub struct SessionStore {
    pending_ttl: Duration,
    resolved_ttl: Duration,
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        let ttl = Duration::from_secs(DEFAULT_SESSION_TTL_SECS);
        Self::new(ttl, ttl)
    }
}

impl SessionStore {
    /// TTLs above [`MAX_SESSION_TTL_SECS`] are clamped.
    pub fn new(pending_ttl: Duration, resolved_ttl: Duration) -> Self {
        let max = Duration::from_secs(MAX_SESSION_TTL_SECS);
        Self {
            pending_ttl: pending_ttl.min(max),
            resolved_ttl: resolved_ttl.min(max),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn ttl_for(&self, state: &SessionState) -> Duration {
        match state {
            SessionState::Pending { .. } => self.pending_ttl,
            _ => self.resolved_ttl,
        }
    }

    /// Store `state` under `id`, replacing any previous entry and restarting
    /// its expiry clock.
    pub fn put(&self, id: SessionId, state: SessionState) -> Result<(), SessionError> {
        let mut guard = self.sessions.write().map_err(|_| SessionError::Unavailable)?;
        let now = Instant::now();
        purge_locked(&mut guard, now);
        let expires_at = now + self.ttl_for(&state);
        guard.insert(
            id,
            Session {
                state,
                created_at: now,
                updated_at: now,
                expires_at,
            },
        );
        Ok(())
    }

    pub fn insert_pending(
        &self,
        id: SessionId,
        request: AuthorizationRequestMessage,
    ) -> Result<(), SessionError> {
        self.put(
            id,
            SessionState::Pending {
                request: Box::new(request),
                in_flight: false,
            },
        )
    }

    /// Snapshot of a live session. Expired entries read as absent; nothing is
    /// modified.
    pub fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        let guard = self.sessions.read().map_err(|_| SessionError::Unavailable)?;
        let now = Instant::now();
        Ok(guard
            .get(id)
            .filter(|session| !session.is_expired(now))
            .cloned())
    }

    /// Reserve a pending session for verification and hand back the request it
    /// was issued with.
    pub fn claim(&self, id: &SessionId) -> Result<AuthorizationRequestMessage, SessionError> {
        let mut guard = self.sessions.write().map_err(|_| SessionError::Unavailable)?;
        let now = Instant::now();
        purge_locked(&mut guard, now);
        let session = guard.get_mut(id).ok_or(SessionError::NotFound)?;
        match &mut session.state {
            SessionState::Pending { in_flight: true, .. } => Err(SessionError::Busy),
            SessionState::Pending { request, in_flight } => {
                *in_flight = true;
                session.updated_at = now;
                session.expires_at = now + self.pending_ttl;
                Ok(request.as_ref().clone())
            }
            SessionState::Verified { .. } | SessionState::Failed { .. } => {
                Err(SessionError::AlreadyResolved)
            }
        }
    }

    /// Commit the outcome of a claimed session. The session is replaced in one
    /// step, so readers see either the pending or the resolved value.
    pub fn resolve(&self, id: &SessionId, resolution: Resolution) -> Result<Session, SessionError> {
        let mut guard = self.sessions.write().map_err(|_| SessionError::Unavailable)?;
        let now = Instant::now();
        purge_locked(&mut guard, now);
        let session = guard.get_mut(id).ok_or(SessionError::NotFound)?;
        match session.state {
            SessionState::Pending { in_flight: true, .. } => {}
            SessionState::Pending { in_flight: false, .. } => return Err(SessionError::NotClaimed),
            _ => return Err(SessionError::AlreadyResolved),
        }

        session.state = match resolution {
            Resolution::Verified(holder) => SessionState::Verified { holder },
            Resolution::Failed(reason) => SessionState::Failed { reason },
        };
        session.updated_at = now;
        session.expires_at = now + self.resolved_ttl;
        Ok(session.clone())
    }

    /// Drop a claim without resolving, leaving the session pending.
    pub fn release(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut guard = self.sessions.write().map_err(|_| SessionError::Unavailable)?;
        let now = Instant::now();
        purge_locked(&mut guard, now);
        let session = guard.get_mut(id).ok_or(SessionError::NotFound)?;
        if let SessionState::Pending { in_flight, .. } = &mut session.state {
            if *in_flight {
                *in_flight = false;
                session.updated_at = now;
                session.expires_at = now + self.pending_ttl;
            }
        }
        Ok(())
    }

    pub fn remove(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        let mut guard = self.sessions.write().map_err(|_| SessionError::Unavailable)?;
        Ok(guard.remove(id))
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize, SessionError> {
        let mut guard = self.sessions.write().map_err(|_| SessionError::Unavailable)?;
        Ok(purge_locked(&mut guard, Instant::now()))
    }

    /// Number of live sessions.
    pub fn len(&self) -> Result<usize, SessionError> {
        let guard = self.sessions.read().map_err(|_| SessionError::Unavailable)?;
        let now = Instant::now();
        Ok(guard.values().filter(|s| !s.is_expired(now)).count())
    }

    pub fn is_empty(&self) -> Result<bool, SessionError> {
        self.len().map(|n| n == 0)
    }
}

fn purge_locked(sessions: &mut HashMap<SessionId, Session>, now: Instant) -> usize {
    let before = sessions.len();
    sessions.retain(|_, session| !session.is_expired(now));
    before - sessions.len()
}

/// Periodically evict expired sessions so abandoned requests do not pile up
/// between writes.
pub fn spawn_janitor(store: SessionStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired() {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "purged expired sessions"),
                Err(err) => warn!(error = %err, "session purge failed"),
            }
        }
    })
}
