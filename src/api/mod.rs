//! Scoring-backend abstraction and its HTTP implementation.

pub mod http;
pub mod models;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::roster::CardStatus;

use self::models::{
    ArcherHistory, BaleArcher, EndPost, EventSnapshot, EventSummary, NewRound, RegisterArcher,
    RegisteredArcher, RoundSnapshot, VerifyOutcome,
};

pub use self::http::HttpBackend;

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by the scoring backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The HTTP client could not be constructed.
    #[error("failed to build http client")]
    ClientBuilder(#[source] reqwest::Error),
    /// The request never produced a response.
    #[error("request to `{path}` failed")]
    RequestSend {
        /// Request path.
        path: String,
        /// Underlying transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// The response body did not decode.
    #[error("response from `{path}` could not be decoded")]
    DecodeResponse {
        /// Request path.
        path: String,
        /// Underlying decode failure.
        #[source]
        source: reqwest::Error,
    },
    /// The server rejected the credentials for this request.
    #[error("unauthorized for `{path}`")]
    Unauthorized {
        /// Request path.
        path: String,
    },
    /// The addressed resource does not exist.
    #[error("`{path}` not found")]
    NotFound {
        /// Request path.
        path: String,
    },
    /// Any other non-success status.
    #[error("`{path}` returned {status}")]
    Status {
        /// Request path.
        path: String,
        /// HTTP status received.
        status: StatusCode,
    },
}

impl BackendError {
    /// Whether retrying the same request later could succeed without any
    /// credential or data change. Drives the failed-vs-dead distinction in
    /// the sync layer.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::RequestSend { .. } => true,
            BackendError::Status { status, .. } => status.is_server_error(),
            BackendError::ClientBuilder(_)
            | BackendError::DecodeResponse { .. }
            | BackendError::Unauthorized { .. }
            | BackendError::NotFound { .. } => false,
        }
    }
}

/// Abstraction over the remote scoring service.
///
/// Mirrors the server's resource model one method per endpoint; everything
/// above this trait is network-agnostic and testable against an in-memory
/// double.
pub trait ScoringBackend: Send + Sync {
    /// List recent events, newest first.
    fn recent_events(&self) -> BoxFuture<'static, BackendResult<Vec<EventSummary>>>;
    /// Fetch the full division-keyed snapshot of an event.
    fn event_snapshot(&self, event_id: Uuid) -> BoxFuture<'static, BackendResult<EventSnapshot>>;
    /// Verify an entry code against an event.
    fn verify_event(
        &self,
        event_id: Uuid,
        entry_code: &str,
    ) -> BoxFuture<'static, BackendResult<VerifyOutcome>>;
    /// Fetch a round snapshot, authenticating with the round's entry code.
    fn round_snapshot(
        &self,
        round_id: Uuid,
        entry_code: &str,
    ) -> BoxFuture<'static, BackendResult<RoundSnapshot>>;
    /// List the full archer details for one bale of a round.
    fn bale_archers(
        &self,
        round_id: Uuid,
        bale_number: u32,
    ) -> BoxFuture<'static, BackendResult<Vec<BaleArcher>>>;
    /// Find or create the round matching the request. Idempotent server-side.
    fn create_round(&self, request: NewRound) -> BoxFuture<'static, BackendResult<Uuid>>;
    /// Register an archer onto a round, returning the join-row id. Upserts:
    /// re-registering the same archer returns the existing id.
    fn register_archer(
        &self,
        round_id: Uuid,
        request: RegisterArcher,
    ) -> BoxFuture<'static, BackendResult<RegisteredArcher>>;
    /// Upsert one end of scores for a registered archer.
    fn post_end(
        &self,
        round_id: Uuid,
        round_archer_id: Uuid,
        end: EndPost,
    ) -> BoxFuture<'static, BackendResult<()>>;
    /// Update the scorecard lifecycle status of a registered archer.
    fn set_card_status(
        &self,
        round_id: Uuid,
        round_archer_id: Uuid,
        status: CardStatus,
    ) -> BoxFuture<'static, BackendResult<()>>;
    /// Cross-event round history for a master archer.
    fn archer_rounds(&self, archer_id: &str) -> BoxFuture<'static, BackendResult<ArcherHistory>>;
}
