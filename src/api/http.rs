//! reqwest implementation of [`ScoringBackend`] against the v1 HTTP API.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::roster::CardStatus;

use super::models::{
    ArcherHistory, BaleArcher, CreatedRound, EndPost, EventList, EventSnapshot, EventSummary,
    NewRound, RegisterArcher, RegisteredArcher, RoundSnapshot, VerifyOutcome, VerifyRequest,
};
use super::{BackendError, BackendResult, ScoringBackend};

/// Header carrying the coach API key.
const API_KEY_HEADER: &str = "X-API-Key";
/// Header carrying the per-round entry code on snapshot reads.
const PASSCODE_HEADER: &str = "X-Passcode";

#[derive(Debug, Deserialize)]
struct BaleList {
    #[serde(default)]
    archers: Vec<BaleArcher>,
}

#[derive(Debug, Serialize)]
struct StatusPatch {
    status: CardStatus,
}

/// HTTP client for the remote scoring service.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Arc<str>,
    api_key: Option<Arc<str>>,
}

impl HttpBackend {
    /// Build a backend client rooted at `base_url` (up to and including the
    /// `/v1` segment). The API key, when present, is sent on every request.
    pub fn new(base_url: &str, api_key: Option<&str>) -> BackendResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(BackendError::ClientBuilder)?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            api_key: api_key
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(Arc::from),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key.as_ref()),
            None => builder,
        }
    }

    async fn execute<T>(builder: RequestBuilder, path: String) -> BackendResult<T>
    where
        T: DeserializeOwned,
    {
        let response = builder
            .send()
            .await
            .map_err(|source| BackendError::RequestSend {
                path: path.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(BackendError::Unauthorized { path })
            }
            StatusCode::NOT_FOUND => Err(BackendError::NotFound { path }),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|source| BackendError::DecodeResponse { path, source }),
            status => Err(BackendError::Status { path, status }),
        }
    }

    async fn get_json<T>(self, path: String) -> BackendResult<T>
    where
        T: DeserializeOwned,
    {
        let builder = self.request(Method::GET, &path);
        Self::execute(builder, path).await
    }

    async fn send_json<B, T>(self, method: Method, path: String, body: B) -> BackendResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let builder = self.request(method, &path).json(&body);
        Self::execute(builder, path).await
    }
}

// Responses the caller only cares about succeeding decode into this.
#[derive(Debug, Deserialize)]
struct Ignored {}

impl ScoringBackend for HttpBackend {
    fn recent_events(&self) -> BoxFuture<'static, BackendResult<Vec<EventSummary>>> {
        let backend = self.clone();
        async move {
            let list: EventList = backend.get_json("/events/recent".to_string()).await?;
            Ok(list.events)
        }
        .boxed()
    }

    fn event_snapshot(&self, event_id: Uuid) -> BoxFuture<'static, BackendResult<EventSnapshot>> {
        let backend = self.clone();
        backend
            .get_json(format!("/events/{event_id}/snapshot"))
            .boxed()
    }

    fn verify_event(
        &self,
        event_id: Uuid,
        entry_code: &str,
    ) -> BoxFuture<'static, BackendResult<VerifyOutcome>> {
        let backend = self.clone();
        let body = VerifyRequest {
            event_id,
            entry_code: entry_code.to_string(),
        };
        async move {
            let result: BackendResult<VerifyOutcome> = backend
                .send_json(Method::POST, "/events/verify".to_string(), body)
                .await;
            match result {
                // The server answers a wrong code with 403 and an unknown
                // event with 404; both are a negative verification, not a
                // transport failure.
                Err(BackendError::Unauthorized { .. } | BackendError::NotFound { .. }) => {
                    Ok(VerifyOutcome {
                        verified: false,
                        event: None,
                    })
                }
                other => other,
            }
        }
        .boxed()
    }

    fn round_snapshot(
        &self,
        round_id: Uuid,
        entry_code: &str,
    ) -> BoxFuture<'static, BackendResult<RoundSnapshot>> {
        let backend = self.clone();
        let passcode = entry_code.to_string();
        async move {
            let path = format!("/rounds/{round_id}/snapshot");
            let builder = backend
                .request(Method::GET, &path)
                .header(PASSCODE_HEADER, passcode);
            Self::execute(builder, path).await
        }
        .boxed()
    }

    fn bale_archers(
        &self,
        round_id: Uuid,
        bale_number: u32,
    ) -> BoxFuture<'static, BackendResult<Vec<BaleArcher>>> {
        let backend = self.clone();
        async move {
            let list: BaleList = backend
                .get_json(format!("/rounds/{round_id}/bales/{bale_number}/archers"))
                .await?;
            Ok(list.archers)
        }
        .boxed()
    }

    fn create_round(&self, request: NewRound) -> BoxFuture<'static, BackendResult<Uuid>> {
        let backend = self.clone();
        async move {
            let created: CreatedRound = backend
                .send_json(Method::POST, "/rounds".to_string(), request)
                .await?;
            Ok(created.round_id)
        }
        .boxed()
    }

    fn register_archer(
        &self,
        round_id: Uuid,
        request: RegisterArcher,
    ) -> BoxFuture<'static, BackendResult<RegisteredArcher>> {
        let backend = self.clone();
        backend
            .send_json(Method::POST, format!("/rounds/{round_id}/archers"), request)
            .boxed()
    }

    fn post_end(
        &self,
        round_id: Uuid,
        round_archer_id: Uuid,
        end: EndPost,
    ) -> BoxFuture<'static, BackendResult<()>> {
        let backend = self.clone();
        async move {
            let _: Ignored = backend
                .send_json(
                    Method::POST,
                    format!("/rounds/{round_id}/archers/{round_archer_id}/ends"),
                    end,
                )
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn set_card_status(
        &self,
        round_id: Uuid,
        round_archer_id: Uuid,
        status: CardStatus,
    ) -> BoxFuture<'static, BackendResult<()>> {
        let backend = self.clone();
        async move {
            let _: Ignored = backend
                .send_json(
                    Method::PATCH,
                    format!("/rounds/{round_id}/archers/{round_archer_id}/status"),
                    StatusPatch { status },
                )
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn archer_rounds(&self, archer_id: &str) -> BoxFuture<'static, BackendResult<ArcherHistory>> {
        let backend = self.clone();
        backend
            .get_json(format!("/archers/{archer_id}/rounds"))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("https://scores.example/v1/", None).expect("build");
        assert_eq!(backend.base_url.as_ref(), "https://scores.example/v1");
    }

    #[test]
    fn blank_api_key_counts_as_absent() {
        let backend = HttpBackend::new("https://scores.example/v1", Some("  ")).expect("build");
        assert!(backend.api_key.is_none());
        let backend =
            HttpBackend::new("https://scores.example/v1", Some("coach-key")).expect("build");
        assert_eq!(backend.api_key.as_deref(), Some("coach-key"));
    }

    #[test]
    fn status_patch_serializes_wire_codes() {
        let json = serde_json::to_string(&StatusPatch {
            status: CardStatus::Complete,
        })
        .expect("serialize");
        assert_eq!(json, r#"{"status":"COMP"}"#);
    }
}
