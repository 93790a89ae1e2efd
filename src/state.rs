//! Shared client state: configuration, backend handle, local store and the
//! active bale session behind an async lock.

use std::sync::Arc;

use time::{Date, OffsetDateTime};
use tokio::sync::RwLock;

use crate::api::ScoringBackend;
use crate::config::SyncConfig;
use crate::scoring::RoundKind;
use crate::session::{BaleSession, LocalStore, SessionStore};

/// Shared handle to the client state.
pub type SharedState = Arc<ClientState>;

/// Everything the resolution and sync layers operate on.
pub struct ClientState {
    /// Sync configuration loaded at startup.
    pub config: SyncConfig,
    /// Remote scoring service.
    pub backend: Arc<dyn ScoringBackend>,
    /// Device-local blob store.
    pub store: Arc<dyn LocalStore>,
    /// Day-keyed session persistence over `store`.
    pub sessions: SessionStore,
    /// The active bale session.
    pub session: RwLock<BaleSession>,
    /// Calendar day this process is scoring for.
    pub today: Date,
}

impl ClientState {
    /// Wire up the client state for `today`, restoring any session already
    /// saved for that day.
    pub fn new(
        config: SyncConfig,
        backend: Arc<dyn ScoringBackend>,
        store: Arc<dyn LocalStore>,
        round_kind: RoundKind,
        today: Date,
    ) -> SharedState {
        let sessions = SessionStore::new(store.clone());
        let session = sessions
            .load(round_kind, today)
            .unwrap_or_else(|| BaleSession::new(round_kind));
        Arc::new(Self {
            config,
            backend,
            store,
            sessions,
            session: RwLock::new(session),
            today,
        })
    }

    /// As [`ClientState::new`], keyed to the current UTC date.
    pub fn for_today(
        config: SyncConfig,
        backend: Arc<dyn ScoringBackend>,
        store: Arc<dyn LocalStore>,
        round_kind: RoundKind,
    ) -> SharedState {
        Self::new(
            config,
            backend,
            store,
            round_kind,
            OffsetDateTime::now_utc().date(),
        )
    }

    /// Persist the current session. Returns whether the one-time write
    /// warning should be shown.
    pub async fn persist(&self) -> bool {
        let session = self.session.read().await;
        self.sessions.save(&session, self.today)
    }

    /// Swap in a new session and persist it.
    pub async fn replace_session(&self, session: BaleSession) -> bool {
        {
            let mut current = self.session.write().await;
            *current = session;
        }
        self.persist().await
    }
}
