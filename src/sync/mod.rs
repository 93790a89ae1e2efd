//! Per-(archer, end) incremental sync against the scoring backend, plus the
//! manual master-sync reconciliation sweep.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::models::{EndPost, NewRound, RegisterArcher};
use crate::error::{ClientError, ClientResult};
use crate::roster::{Archer, CardStatus, Gender, OPEN_DIVISION};
use crate::scoring::Arrow;
use crate::session::{EndSyncStatus, LocalStore};
use crate::state::SharedState;

/// Blob key of the per-round sync session (identity to participant-id map).
pub fn sync_session_key(round_id: Uuid) -> String {
    format!("sync_session:{round_id}")
}

/// Blob key of the per-round offline replay queue.
pub fn offline_queue_key(round_id: Uuid) -> String {
    format!("luq:{round_id}")
}

/// Drop every cached blob tied to a round. Called when the user declines a
/// resume or switches to a different event, so a stale participant mapping
/// can never address the wrong round.
pub fn clear_round_cache(store: &dyn LocalStore, round_id: Uuid) {
    store.remove(&sync_session_key(round_id));
    store.remove(&offline_queue_key(round_id));
    store.remove(&format!("round_entry_code:{round_id}"));
}

/// Drop the cached entry code of an event. Called when the user switches
/// events so the old code is never replayed against the new one.
pub fn clear_event_cache(store: &dyn LocalStore, event_id: Uuid) {
    store.remove(&format!("event_entry_code:{event_id}"));
}

/// Cached identity-to-participant mapping for one round, surviving reloads so
/// registration stays idempotent across sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SyncSessionBlob {
    participants: IndexMap<String, Uuid>,
}

impl SyncSessionBlob {
    fn load(store: &dyn LocalStore, round_id: Uuid) -> Self {
        store
            .get(&sync_session_key(round_id))
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save(&self, store: &dyn LocalStore, round_id: Uuid) {
        if let Ok(raw) = serde_json::to_string(self) {
            if let Err(err) = store.set(&sync_session_key(round_id), &raw) {
                warn!(error = %err, "failed to cache sync session");
            }
        }
    }
}

/// One end awaiting replay after a failed post. Carries the payload captured
/// when the end was entered, so a replay posts exactly what the scorer saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct QueuedEnd {
    identity: String,
    end_number: u8,
    post: EndPost,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OfflineQueue {
    entries: Vec<QueuedEnd>,
}

impl OfflineQueue {
    fn load(store: &dyn LocalStore, round_id: Uuid) -> Self {
        store
            .get(&offline_queue_key(round_id))
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save(&self, store: &dyn LocalStore, round_id: Uuid) {
        if let Ok(raw) = serde_json::to_string(self) {
            if let Err(err) = store.set(&offline_queue_key(round_id), &raw) {
                warn!(error = %err, "failed to persist offline queue");
            }
        }
    }

    fn push(&mut self, identity: &str, end_number: u8, post: EndPost) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.identity == identity && e.end_number == end_number)
        {
            existing.post = post;
            return;
        }
        self.entries.push(QueuedEnd {
            identity: identity.to_string(),
            end_number,
            post,
        });
    }
}

/// Outcome counts of a master-sync sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasterSyncReport {
    /// Ends that needed posting.
    pub attempted: u32,
    /// Ends acknowledged by the server.
    pub synced: u32,
    /// Ends that failed and remain marked failed.
    pub failed: u32,
}

fn gender_code(gender: Gender) -> &'static str {
    match gender {
        Gender::M => "M",
        Gender::F => "F",
    }
}

fn registration_for(archer: &Archer, bale_number: u32) -> RegisterArcher {
    RegisterArcher {
        first_name: archer.first_name.clone(),
        last_name: archer.last_name.clone(),
        school: archer.school.clone(),
        level: archer.level.division_suffix().to_string(),
        gender: gender_code(archer.gender).to_string(),
        ext_id: Some(archer.identity.clone()),
        target_assignment: archer.target_assignment.map(|t| t.to_string()),
        target_size: Some(archer.target_face_size()),
        bale_number: Some(bale_number),
    }
}

fn end_post_for(archer: &Archer, end_number: u8) -> EndPost {
    let end = archer.scores.end(end_number);
    EndPost {
        end_number,
        a1: end[0].as_raw(),
        a2: end[1].as_raw(),
        a3: end[2].as_raw(),
        end_total: archer.scores.end_total(end_number),
        running_total: archer.scores.running_total(end_number),
        tens: archer.scores.end_tens(end_number),
        xs: archer.scores.end_xs(end_number),
        device_ts: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
    }
}

/// Make sure the session has a server round, creating one when missing.
/// Newly created rounds get every local archer registered up front.
async fn ensure_round(state: &SharedState) -> ClientResult<Uuid> {
    let (existing, request) = {
        let session = state.session.read().await;
        let division = session.effective_division().map(str::to_string);
        let (gender, level) = division
            .as_deref()
            .filter(|d| *d != OPEN_DIVISION)
            .and_then(|d| {
                // Division codes come from the server and are not guaranteed
                // ASCII; split on char boundaries.
                let mut chars = d.chars();
                let prefix = chars.next()?;
                let level = chars.as_str();
                if level.is_empty() {
                    return None;
                }
                let gender = if prefix == 'G' { "F" } else { "M" };
                Some((Some(gender.to_string()), Some(level.to_string())))
            })
            .unwrap_or((None, None));
        let request = NewRound {
            round_type: session.round_kind.code().to_string(),
            date: state
                .today
                .format(&time::macros::format_description!("[year]-[month]-[day]"))
                .unwrap_or_default(),
            bale_number: Some(session.bale_number),
            division,
            gender,
            level,
            event_id: session.event_id,
        };
        (session.round_id, request)
    };
    if let Some(round_id) = existing {
        return Ok(round_id);
    }

    let round_id = state.backend.create_round(request).await?;
    info!(%round_id, "round established server-side");
    {
        let mut session = state.session.write().await;
        session.round_id = Some(round_id);
    }
    state.persist().await;

    // Register the whole bale up front so later end-posts only need the
    // cached mapping. Individual failures are retried by ensure_registered.
    let identities: Vec<String> = {
        let session = state.session.read().await;
        session.archers.iter().map(|a| a.identity.clone()).collect()
    };
    for identity in identities {
        if let Err(err) = ensure_registered(state, round_id, &identity).await {
            warn!(archer = identity, error = %err, "up-front registration failed");
        }
    }
    Ok(round_id)
}

/// Resolve the server participant id for an archer, registering them when no
/// mapping exists. Idempotent: cached mappings (in the session and in the
/// per-round blob) short-circuit the network call.
async fn ensure_registered(
    state: &SharedState,
    round_id: Uuid,
    identity: &str,
) -> ClientResult<Uuid> {
    let (cached, registration) = {
        let session = state.session.read().await;
        let archer = session
            .archer(identity)
            .ok_or_else(|| ClientError::InvalidState(format!("no archer {identity} on bale")))?;
        (
            archer.round_participant_id,
            registration_for(archer, session.bale_number),
        )
    };
    if let Some(id) = cached {
        return Ok(id);
    }

    let mut blob = SyncSessionBlob::load(state.store.as_ref(), round_id);
    if let Some(&id) = blob.participants.get(identity) {
        let mut session = state.session.write().await;
        if let Some(archer) = session.archer_mut(identity) {
            archer.round_participant_id = Some(id);
        }
        return Ok(id);
    }

    let registered = state.backend.register_archer(round_id, registration).await?;
    let participant_id = registered.round_archer_id;
    blob.participants.insert(identity.to_string(), participant_id);
    blob.save(state.store.as_ref(), round_id);
    {
        let mut session = state.session.write().await;
        if let Some(archer) = session.archer_mut(identity) {
            archer.round_participant_id = Some(participant_id);
        }
    }
    state.persist().await;
    Ok(participant_id)
}

/// Post one end for one archer, updating the sync-status map either way. The
/// payload is captured before any network traffic, so a failed post can be
/// queued and replayed exactly as it was entered.
async fn sync_end(state: &SharedState, identity: &str, end_number: u8) -> ClientResult<()> {
    {
        let mut session = state.session.write().await;
        session.mark_sync(identity, end_number, EndSyncStatus::Pending);
    }

    let post = {
        let session = state.session.read().await;
        session
            .archer(identity)
            .map(|archer| end_post_for(archer, end_number))
            .ok_or_else(|| {
                // The mapping exists but the archer vanished from the bale;
                // a logic defect, not a retryable network condition.
                ClientError::InvalidState(format!("no archer {identity} on bale"))
            })
    };

    let (result, post) = match post {
        Ok(post) => {
            let outcome = async {
                let round_id = ensure_round(state).await?;
                let participant_id = ensure_registered(state, round_id, identity).await?;
                state
                    .backend
                    .post_end(round_id, participant_id, post.clone())
                    .await?;
                Ok::<Uuid, ClientError>(round_id)
            }
            .await;
            (outcome, Some(post))
        }
        Err(err) => (Err(err), None),
    };

    match result {
        Ok(round_id) => {
            let mut session = state.session.write().await;
            session.mark_sync(identity, end_number, EndSyncStatus::Synced);
            drop(session);
            let mut queue = OfflineQueue::load(state.store.as_ref(), round_id);
            let before = queue.entries.len();
            queue
                .entries
                .retain(|e| !(e.identity == identity && e.end_number == end_number));
            if queue.entries.len() != before {
                queue.save(state.store.as_ref(), round_id);
            }
            state.persist().await;
            Ok(())
        }
        Err(err) => {
            if let ClientError::InvalidState(message) = &err {
                error!(archer = identity, end = end_number, %message, "end post aborted");
            } else {
                warn!(archer = identity, end = end_number, error = %err, "end post failed");
            }
            {
                let mut session = state.session.write().await;
                session.mark_sync(identity, end_number, EndSyncStatus::Failed);
            }
            if let (Some(round_id), Some(post)) = (state.session.read().await.round_id, post) {
                let mut queue = OfflineQueue::load(state.store.as_ref(), round_id);
                queue.push(identity, end_number, post);
                queue.save(state.store.as_ref(), round_id);
            }
            state.persist().await;
            Err(err)
        }
    }
}

/// Record one arrow: guard, mutate locally, persist, then sync the affected
/// end. The local write always completes before any network traffic; network
/// failures only ever land in the sync-status map.
pub async fn record_arrow(
    state: &SharedState,
    identity: &str,
    arrow_index: usize,
    value: Arrow,
) -> ClientResult<()> {
    let end_number = {
        let mut session = state.session.write().await;
        session.write_arrow(identity, arrow_index, value)?;
        session.current_end
    };
    state.persist().await;

    if !state.config.enabled {
        return Ok(());
    }
    if let Err(err) = sync_end(state, identity, end_number).await {
        // Already reflected in the status map; scoring is never blocked on
        // the network.
        warn!(archer = identity, end = end_number, error = %err, "background sync failed");
    }
    Ok(())
}

/// Replay every queued end with the payload captured when it was entered.
/// Entries acknowledged by the server leave the queue; failures stay queued.
pub async fn flush_queue(state: &SharedState) -> ClientResult<MasterSyncReport> {
    if !state.config.enabled {
        return Err(ClientError::SyncDisabled);
    }
    let Some(round_id) = state.session.read().await.round_id else {
        return Ok(MasterSyncReport::default());
    };
    let mut queue = OfflineQueue::load(state.store.as_ref(), round_id);
    if queue.entries.is_empty() {
        return Ok(MasterSyncReport::default());
    }

    let mut report = MasterSyncReport::default();
    let mut remaining = Vec::new();
    for entry in std::mem::take(&mut queue.entries) {
        report.attempted += 1;
        let outcome = async {
            let participant_id = ensure_registered(state, round_id, &entry.identity).await?;
            state
                .backend
                .post_end(round_id, participant_id, entry.post.clone())
                .await?;
            Ok::<(), ClientError>(())
        }
        .await;
        let mut session = state.session.write().await;
        match outcome {
            Ok(()) => {
                session.mark_sync(&entry.identity, entry.end_number, EndSyncStatus::Synced);
                report.synced += 1;
            }
            Err(err) => {
                warn!(
                    archer = %entry.identity,
                    end = entry.end_number,
                    error = %err,
                    "queued end replay failed"
                );
                session.mark_sync(&entry.identity, entry.end_number, EndSyncStatus::Failed);
                report.failed += 1;
                remaining.push(entry);
            }
        }
    }
    queue.entries = remaining;
    queue.save(state.store.as_ref(), round_id);
    state.persist().await;
    info!(
        attempted = report.attempted,
        synced = report.synced,
        failed = report.failed,
        "offline queue flushed"
    );
    Ok(report)
}

/// Point the session at a different event (or at none). The old round's
/// cached blobs, entry codes and participant ids all belong to the old event
/// and are dropped so they can never address the wrong round.
pub async fn switch_event(state: &SharedState, event_id: Option<Uuid>) {
    let (old_round, old_event) = {
        let mut session = state.session.write().await;
        if session.event_id == event_id {
            return;
        }
        let old = (session.round_id.take(), session.event_id.take());
        session.event_id = event_id;
        for archer in &mut session.archers {
            archer.round_participant_id = None;
        }
        session.sync_status.clear();
        old
    };
    if let Some(round_id) = old_round {
        clear_round_cache(state.store.as_ref(), round_id);
    }
    if let Some(old_event) = old_event {
        clear_event_cache(state.store.as_ref(), old_event);
    }
    info!(event = ?event_id, "event switched; round linkage reset");
    state.persist().await;
}

/// Manual reconciliation sweep: replay the offline queue, then repost every
/// end with data that is not already synced, across all archers.
pub async fn master_sync(state: &SharedState) -> ClientResult<MasterSyncReport> {
    if !state.config.enabled {
        return Err(ClientError::SyncDisabled);
    }

    let mut report = flush_queue(state).await?;

    let targets: Vec<(String, u8)> = {
        let session = state.session.read().await;
        let mut targets = Vec::new();
        for archer in &session.archers {
            for end in 1..=session.round_kind.total_ends() {
                if !archer.scores.end_has_data(end) {
                    continue;
                }
                if session.sync_state(&archer.identity, end) == Some(EndSyncStatus::Synced) {
                    continue;
                }
                targets.push((archer.identity.clone(), end));
            }
        }
        targets
    };

    for (identity, end) in targets {
        report.attempted += 1;
        match sync_end(state, &identity, end).await {
            Ok(()) => report.synced += 1,
            Err(_) => report.failed += 1,
        }
    }
    info!(
        attempted = report.attempted,
        synced = report.synced,
        failed = report.failed,
        "master sync finished"
    );
    Ok(report)
}

/// Mark an archer's card complete locally and push the transition to the
/// server. Only the PENDING to COMPLETE transition is ever driven from the
/// client.
pub async fn complete_card(state: &SharedState, identity: &str) -> ClientResult<()> {
    let name = {
        let mut session = state.session.write().await;
        let archer = session
            .archer_mut(identity)
            .ok_or_else(|| ClientError::InvalidState(format!("no archer {identity} on bale")))?;
        if archer.card_status != CardStatus::Pending {
            return Err(ClientError::InvalidState(format!(
                "card is already {:?}",
                archer.card_status
            )));
        }
        archer.card_status = CardStatus::Complete;
        archer.display_name()
    };
    state.persist().await;

    if !state.config.enabled {
        return Ok(());
    }
    let round_id = ensure_round(state).await?;
    let participant_id = {
        let session = state.session.read().await;
        session
            .archer(identity)
            .and_then(|a| a.round_participant_id)
    };
    let Some(participant_id) = participant_id else {
        return Err(ClientError::NotRegistered { name });
    };
    state
        .backend
        .set_card_status(round_id, participant_id, CardStatus::Complete)
        .await?;
    Ok(())
}
