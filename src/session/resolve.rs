//! Startup resolution: decide whether the device is resuming an existing
//! round or starting fresh, and materialize a consistent bale roster from the
//! network sources.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::models::{RoundSnapshot, SnapshotArcher};
use crate::api::{BackendError, BackendResult};
use crate::roster::{Archer, merge_archers, normalize_record};
use crate::scoring::RoundKind;
use crate::state::SharedState;
use crate::sync;

use super::{BaleSession, EndSyncStatus, LocalStore, MAX_ARCHERS_PER_BALE};

/// Blob key of the saved-session pointer.
const POINTER_KEY: &str = "bale_session_pointer";
/// Blob key of the device's remembered archer identity.
const SELF_ARCHER_KEY: &str = "self_archer";

fn event_code_key(event_id: Uuid) -> String {
    format!("event_entry_code:{event_id}")
}

fn round_code_key(round_id: Uuid) -> String {
    format!("round_entry_code:{round_id}")
}

/// Launch parameters carried on the page URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParams {
    /// Event id (`event=`).
    pub event: Option<Uuid>,
    /// Explicit entry code (`code=`).
    pub code: Option<String>,
    /// Round id (`round=`).
    pub round: Option<Uuid>,
    /// Archer identity (`archer=`): server UUID, external id or composite.
    pub archer: Option<String>,
}

impl LaunchParams {
    /// Parse a raw query string (`event=...&round=...`). Unknown keys are
    /// ignored, unparsable ids dropped.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.trim_start_matches('?').split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match key {
                "event" => params.event = value.parse().ok(),
                "code" => params.code = Some(value.to_string()),
                "round" => params.round = value.parse().ok(),
                "archer" => params.archer = Some(value.to_string()),
                _ => {}
            }
        }
        params
    }
}

/// The saved pointer to the last materialized session, used for fast resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPointer {
    /// Identity the device was scoring as.
    pub archer_identity: Option<String>,
    /// Round the session belongs to.
    pub round_id: Uuid,
    /// Owning event, when event-linked.
    pub event_id: Option<Uuid>,
    /// Bale scored.
    pub bale_number: u32,
    /// Entry code that authenticated the session.
    pub entry_code: Option<String>,
    /// When the pointer was written, RFC 3339.
    pub saved_at: Option<String>,
}

impl SessionPointer {
    /// Load the saved pointer; corrupt blobs are dropped.
    pub fn load(store: &dyn LocalStore) -> Option<Self> {
        let raw = store.get(POINTER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(pointer) => Some(pointer),
            Err(err) => {
                warn!(error = %err, "saved session pointer is unreadable; dropping it");
                store.remove(POINTER_KEY);
                None
            }
        }
    }

    /// Persist the pointer. A failed write only costs fast resume, so it is
    /// logged and ignored.
    pub fn save(&self, store: &dyn LocalStore) {
        if let Ok(raw) = serde_json::to_string(self) {
            if let Err(err) = store.set(POINTER_KEY, &raw) {
                warn!(error = %err, "failed to save session pointer");
            }
        }
    }

    /// Remove the saved pointer.
    pub fn clear(store: &dyn LocalStore) {
        store.remove(POINTER_KEY);
    }
}

/// Outcome of startup resolution, in priority order of the states that can
/// produce it.
#[derive(Debug)]
pub enum Resolution {
    /// A session was materialized and installed; go straight to scoring.
    Scoring {
        /// Entry code authenticating subsequent writes.
        entry_code: Option<String>,
    },
    /// The linked archer exists but has no bale yet; offer manual setup with
    /// the division pre-filled.
    ManualSetup {
        /// Division pre-filled from the round.
        division: Option<String>,
        /// Round the archer belongs to.
        round_id: Uuid,
        /// Owning event.
        event_id: Option<Uuid>,
    },
    /// A resumable session was found and materialized; ask the user before
    /// installing it.
    ResumePrompt {
        /// The merged session, ready to install via [`accept_resume`].
        session: BaleSession,
        /// Whether the server round status looked stale.
        stale: bool,
        /// Entry code for subsequent writes.
        entry_code: Option<String>,
    },
    /// Start empty at event selection.
    Fresh {
        /// User-visible reason when a higher-priority state aborted.
        notice: Option<String>,
    },
}

/// Whether a server round status still counts as resumable.
fn status_is_current(status: Option<&str>) -> bool {
    match status.map(str::trim) {
        None => true,
        Some(s) => {
            s.eq_ignore_ascii_case("in progress")
                || s.eq_ignore_ascii_case("not started")
                || s.eq_ignore_ascii_case("created")
        }
    }
}

/// Resolve the entry code authorizing access to a round.
///
/// Canonical precedence: explicit launch-parameter code, then the cached
/// per-round code, then the cached event code, then the event snapshot's
/// advertised code (cached on success), and finally the coach key.
pub async fn resolve_entry_code(
    state: &SharedState,
    event_id: Option<Uuid>,
    round_id: Option<Uuid>,
    explicit: Option<&str>,
) -> Option<String> {
    if let Some(code) = explicit.map(str::trim).filter(|c| !c.is_empty()) {
        return Some(code.to_string());
    }
    if let Some(round_id) = round_id {
        if let Some(code) = state.store.get(&round_code_key(round_id)) {
            return Some(code);
        }
    }
    if let Some(event_id) = event_id {
        if let Some(code) = state.store.get(&event_code_key(event_id)) {
            return Some(code);
        }
        match state.backend.event_snapshot(event_id).await {
            Ok(snapshot) => {
                if let Some(code) = snapshot.event.entry_code {
                    if let Err(err) = state.store.set(&event_code_key(event_id), &code) {
                        warn!(error = %err, "failed to cache event entry code");
                    }
                    return Some(code);
                }
            }
            Err(err) => {
                warn!(%event_id, error = %err, "event snapshot fetch failed during code resolution");
            }
        }
    }
    state.config.coach_key().map(str::to_string)
}

/// Materialize the roster for one bale: the full bale-detail listing merged
/// with any snapshot stubs assigned to (or not yet assigned away from) the
/// bale, by identity, preferring the richer bale-detail fields.
async fn materialize_bale(
    state: &SharedState,
    round_id: Uuid,
    bale_number: u32,
    kind: RoundKind,
    available_divisions: &[String],
    stubs: &[SnapshotArcher],
) -> BackendResult<Vec<Archer>> {
    let details = state.backend.bale_archers(round_id, bale_number).await?;
    let mut archers: Vec<Archer> = details
        .into_iter()
        .map(|detail| normalize_record(&detail.into_record(), kind, available_divisions))
        .collect();

    for stub in stubs {
        if stub.bale.is_some_and(|b| b != bale_number) {
            continue;
        }
        let division = available_divisions.first().cloned();
        let candidate = normalize_record(
            &stub.clone().into_record(division),
            kind,
            available_divisions,
        );
        match archers.iter_mut().find(|a| {
            a.identity == candidate.identity
                || (a.round_participant_id.is_some()
                    && a.round_participant_id == candidate.round_participant_id)
        }) {
            Some(existing) => {
                *existing = merge_archers(existing.clone(), candidate);
            }
            None => archers.push(candidate),
        }
    }

    if archers.len() > MAX_ARCHERS_PER_BALE {
        warn!(
            round = %round_id,
            bale = bale_number,
            count = archers.len(),
            "server bale holds more archers than a device can score; truncating"
        );
        archers.truncate(MAX_ARCHERS_PER_BALE);
    }
    Ok(archers)
}

/// Build a session around a materialized roster, seeding the sync map: every
/// server-delivered end is by definition already synced.
fn build_session(
    round_id: Uuid,
    event_id: Option<Uuid>,
    bale_number: u32,
    kind: RoundKind,
    division: Option<String>,
    archers: Vec<Archer>,
    focus_identity: Option<&str>,
) -> BaleSession {
    let mut session = BaleSession::new(kind);
    session.round_id = Some(round_id);
    session.event_id = event_id;
    session.bale_number = bale_number;
    session.division_code = division;
    let focus_resume = focus_identity
        .and_then(|id| archers.iter().find(|a| a.identity == id))
        .map(|a| a.scores.resume_end());
    for archer in &archers {
        for end in 1..=kind.total_ends() {
            if archer.scores.end_has_data(end) {
                session.mark_sync(&archer.identity, end, EndSyncStatus::Synced);
            }
        }
    }
    let fallback_resume = archers
        .iter()
        .map(|a| a.scores.resume_end())
        .max()
        .unwrap_or(1);
    session.archers = archers;
    session.set_current_end(focus_resume.unwrap_or(fallback_resume));
    session
}

fn snapshot_divisions(snapshot: &RoundSnapshot) -> Vec<String> {
    snapshot
        .round
        .division
        .clone()
        .filter(|d| !d.trim().is_empty())
        .map(|d| vec![d])
        .unwrap_or_default()
}

/// Whether a snapshot stub answers to the launch-parameter archer id.
fn stub_matches_archer(stub: &SnapshotArcher, kind: RoundKind, archer_param: &str) -> bool {
    if stub
        .round_archer_id
        .is_some_and(|id| id.to_string() == archer_param)
    {
        return true;
    }
    let normalized = normalize_record(&stub.clone().into_record(None), kind, &[]);
    normalized.identity == archer_param
}

async fn resolve_direct_link(
    state: &SharedState,
    round_id: Uuid,
    archer_param: &str,
    params: &LaunchParams,
) -> Resolution {
    let Some(entry_code) =
        resolve_entry_code(state, params.event, Some(round_id), params.code.as_deref()).await
    else {
        warn!(%round_id, "no entry code could be resolved for the linked round");
        return Resolution::Fresh {
            notice: Some("Cannot access this round: no valid entry code.".to_string()),
        };
    };

    let snapshot = match state.backend.round_snapshot(round_id, &entry_code).await {
        Ok(snapshot) => snapshot,
        Err(BackendError::Unauthorized { .. }) => {
            return Resolution::Fresh {
                notice: Some("Cannot access this round: entry code rejected.".to_string()),
            };
        }
        Err(err) => {
            warn!(%round_id, error = %err, "round snapshot fetch failed");
            return Resolution::Fresh {
                notice: Some("Could not load the linked round.".to_string()),
            };
        }
    };

    let kind = RoundKind::from_code(&snapshot.round.round_type);
    let Some(stub) = snapshot
        .archers
        .iter()
        .find(|s| stub_matches_archer(s, kind, archer_param))
        .cloned()
    else {
        return Resolution::Fresh {
            notice: Some("You are not assigned to this round.".to_string()),
        };
    };

    // URL identity is authoritative over whatever the device remembered.
    if state.store.get(SELF_ARCHER_KEY).as_deref() != Some(archer_param) {
        if let Err(err) = state.store.set(SELF_ARCHER_KEY, archer_param) {
            warn!(error = %err, "failed to update stored archer identity");
        }
    }

    let Some(bale_number) = stub.bale.or(snapshot.round.bale_number) else {
        info!(%round_id, archer = archer_param, "linked archer has no bale yet");
        return Resolution::ManualSetup {
            division: snapshot.round.division.clone(),
            round_id,
            event_id: params.event,
        };
    };

    let divisions = snapshot_divisions(&snapshot);
    let archers = match materialize_bale(
        state,
        round_id,
        bale_number,
        kind,
        &divisions,
        &snapshot.archers,
    )
    .await
    {
        Ok(archers) => archers,
        Err(err) => {
            warn!(%round_id, bale = bale_number, error = %err, "bale listing fetch failed");
            return Resolution::Fresh {
                notice: Some("Could not load the bale roster.".to_string()),
            };
        }
    };

    let focus = archers
        .iter()
        .find(|a| {
            (stub.round_archer_id.is_some() && a.round_participant_id == stub.round_archer_id)
                || a.identity == archer_param
        })
        .map(|a| a.identity.clone());

    let session = build_session(
        round_id,
        params.event,
        bale_number,
        kind,
        snapshot.round.division.clone(),
        archers,
        focus.as_deref(),
    );

    if let Err(err) = state.store.set(&round_code_key(round_id), &entry_code) {
        warn!(error = %err, "failed to cache round entry code");
    }
    SessionPointer {
        archer_identity: Some(archer_param.to_string()),
        round_id,
        event_id: params.event,
        bale_number,
        entry_code: Some(entry_code.clone()),
        saved_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .ok(),
    }
    .save(state.store.as_ref());

    state.replace_session(session).await;
    info!(%round_id, bale = bale_number, "direct link resolved into scoring");
    Resolution::Scoring {
        entry_code: Some(entry_code),
    }
}

async fn resolve_saved_session(
    state: &SharedState,
    pointer: SessionPointer,
) -> Option<Resolution> {
    let entry_code = resolve_entry_code(
        state,
        pointer.event_id,
        Some(pointer.round_id),
        pointer.entry_code.as_deref(),
    )
    .await?;

    let snapshot = match state
        .backend
        .round_snapshot(pointer.round_id, &entry_code)
        .await
    {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(round = %pointer.round_id, error = %err, "freshness check failed; dropping saved pointer");
            SessionPointer::clear(state.store.as_ref());
            return None;
        }
    };

    let kind = RoundKind::from_code(&snapshot.round.round_type);
    let stale = !status_is_current(snapshot.round.status.as_deref());
    let divisions = snapshot_divisions(&snapshot);
    let archers = materialize_bale(
        state,
        pointer.round_id,
        pointer.bale_number,
        kind,
        &divisions,
        &snapshot.archers,
    )
    .await
    .ok()?;

    let session = build_session(
        pointer.round_id,
        pointer.event_id,
        pointer.bale_number,
        kind,
        snapshot.round.division.clone(),
        archers,
        pointer.archer_identity.as_deref(),
    );

    // Multi-device scoring: never resume silently after a live check, the
    // user confirms with the staleness indicator in view.
    Some(Resolution::ResumePrompt {
        session,
        stale,
        entry_code: Some(entry_code),
    })
}

async fn resolve_server_in_progress(state: &SharedState, identity: &str) -> Option<Resolution> {
    let history = match state.backend.archer_rounds(identity).await {
        Ok(history) => history,
        Err(err) => {
            warn!(archer = identity, error = %err, "round history lookup failed");
            return None;
        }
    };

    for row in &history.history {
        if let Some(status) = row.status.as_deref() {
            if status.eq_ignore_ascii_case("completed") || status.eq_ignore_ascii_case("verified") {
                warn!(round = %row.round_id, status, "archer has a finalized round on record");
            }
        }
    }

    let row = history.history.iter().find(|row| {
        row.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("in progress"))
    })?;
    let bale_number = row.bale_number?;

    let entry_code = resolve_entry_code(state, row.event_id, Some(row.round_id), None).await?;
    let snapshot = state
        .backend
        .round_snapshot(row.round_id, &entry_code)
        .await
        .ok()?;
    let kind = RoundKind::from_code(&snapshot.round.round_type);
    let divisions = snapshot_divisions(&snapshot);
    let archers = materialize_bale(
        state,
        row.round_id,
        bale_number,
        kind,
        &divisions,
        &snapshot.archers,
    )
    .await
    .ok()?;
    let session = build_session(
        row.round_id,
        row.event_id,
        bale_number,
        kind,
        snapshot.round.division.clone(),
        archers,
        Some(identity),
    );
    Some(Resolution::ResumePrompt {
        session,
        stale: false,
        entry_code: Some(entry_code),
    })
}

/// Run the startup state machine.
///
/// States are evaluated in fixed priority order: direct link, saved-session
/// pointer, local in-progress data, server-detected in-progress round, fresh.
pub async fn resolve_startup(state: &SharedState, params: LaunchParams) -> Resolution {
    if let (Some(round_id), Some(archer)) = (params.round, params.archer.clone()) {
        return resolve_direct_link(state, round_id, &archer, &params).await;
    }

    if let Some(pointer) = SessionPointer::load(state.store.as_ref()) {
        if let Some(resolution) = resolve_saved_session(state, pointer).await {
            return resolution;
        }
    }

    {
        let session = state.session.read().await;
        if session.archers.iter().any(|a| a.scores.has_any_data()) {
            info!("local session has score data; resuming implicitly");
            return Resolution::Scoring { entry_code: None };
        }
    }

    let identity = params
        .archer
        .clone()
        .or_else(|| state.store.get(SELF_ARCHER_KEY));
    if let Some(identity) = identity {
        if let Some(resolution) = resolve_server_in_progress(state, &identity).await {
            return resolution;
        }
    }

    Resolution::Fresh { notice: None }
}

/// Install a session the user agreed to resume and persist the pointer.
pub async fn accept_resume(state: &SharedState, session: BaleSession, entry_code: Option<String>) {
    if let Some(round_id) = session.round_id {
        SessionPointer {
            archer_identity: state.store.get(SELF_ARCHER_KEY),
            round_id,
            event_id: session.event_id,
            bale_number: session.bale_number,
            entry_code,
            saved_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .ok(),
        }
        .save(state.store.as_ref());
    }
    state.replace_session(session).await;
    if state.config.enabled {
        if let Err(err) = sync::flush_queue(state).await {
            warn!(error = %err, "offline queue flush after resume failed");
        }
    }
}

/// The user declined a resume offer: drop the pointer and the round's cached
/// sync state, then fall back to a fresh session of the same kind.
pub async fn decline_resume(state: &SharedState, declined: &BaleSession) {
    SessionPointer::clear(state.store.as_ref());
    if let Some(round_id) = declined.round_id {
        sync::clear_round_cache(state.store.as_ref(), round_id);
    }
    let kind = declined.round_kind;
    state.replace_session(BaleSession::new(kind)).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::macros::date;

    use crate::api::models::{BaleArcher, BaleEnd, RoundHeader};
    use crate::api::testing::FakeBackend;
    use crate::config::SyncConfig;
    use crate::session::MemoryStore;
    use crate::state::ClientState;

    use super::*;

    fn shared(backend: FakeBackend, config: SyncConfig) -> SharedState {
        ClientState::new(
            config,
            Arc::new(backend),
            Arc::new(MemoryStore::new()),
            RoundKind::Ranking300,
            date!(2026 - 03 - 14),
        )
    }

    fn round_snapshot(round_id: Uuid, division: &str, archers: Vec<SnapshotArcher>) -> RoundSnapshot {
        RoundSnapshot {
            round: RoundHeader {
                id: round_id,
                round_type: "R300".into(),
                date: Some("2026-03-14".into()),
                bale_number: None,
                division: Some(division.into()),
                status: Some("In Progress".into()),
            },
            archers,
        }
    }

    fn stub(id: Uuid, name: &str, bale: Option<u32>) -> SnapshotArcher {
        SnapshotArcher {
            round_archer_id: Some(id),
            archer_name: name.into(),
            school: Some("WDV".into()),
            gender: Some("F".into()),
            level: Some("VAR".into()),
            bale,
            ..Default::default()
        }
    }

    #[test]
    fn launch_params_parse_known_keys() {
        let round = Uuid::new_v4();
        let params = LaunchParams::from_query(&format!(
            "?round={round}&archer=jane-doe-wdv&code=ABC123&theme=dark"
        ));
        assert_eq!(params.round, Some(round));
        assert_eq!(params.archer.as_deref(), Some("jane-doe-wdv"));
        assert_eq!(params.code.as_deref(), Some("ABC123"));
        assert_eq!(params.event, None);
    }

    #[tokio::test]
    async fn direct_link_lands_in_scoring_with_merged_roster() {
        let backend = FakeBackend::new();
        let round_id = Uuid::new_v4();
        let participant = Uuid::new_v4();
        backend.seed_round_snapshot(
            round_id,
            round_snapshot(
                round_id,
                "GVAR",
                vec![
                    stub(participant, "Jane Doe", Some(3)),
                    stub(Uuid::new_v4(), "Amy Yu", Some(3)),
                ],
            ),
        );
        backend.seed_bale(
            round_id,
            3,
            vec![BaleArcher {
                round_archer_id: Some(participant),
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                school: "WDV".into(),
                gender: "F".into(),
                level: "VAR".into(),
                bale_number: Some(3),
                target_assignment: Some("A".into()),
                ..Default::default()
            }],
        );

        let state = shared(backend, SyncConfig::default());
        let params = LaunchParams::from_query(&format!(
            "round={round_id}&archer={participant}&code=CODE1"
        ));
        let resolution = resolve_startup(&state, params).await;
        let Resolution::Scoring { entry_code } = resolution else {
            panic!("expected scoring, got {resolution:?}");
        };
        assert_eq!(entry_code.as_deref(), Some("CODE1"));

        let session = state.session.read().await;
        assert_eq!(session.round_id, Some(round_id));
        assert_eq!(session.bale_number, 3);
        // Bale detail and snapshot stub merged into one; Amy unioned in.
        assert_eq!(session.archers.len(), 2);
        let jane = session
            .archers
            .iter()
            .find(|a| a.first_name == "Jane")
            .expect("jane");
        assert_eq!(jane.last_name, "Doe");
        assert_eq!(jane.target_assignment, Some('A'));

        // Pointer written for future fast resume.
        assert!(SessionPointer::load(state.store.as_ref()).is_some());
    }

    #[tokio::test]
    async fn direct_link_without_bale_offers_manual_setup_with_division() {
        let backend = FakeBackend::new();
        let round_id = Uuid::new_v4();
        let participant = Uuid::new_v4();
        backend.seed_round_snapshot(
            round_id,
            round_snapshot(round_id, "BJV", vec![stub(participant, "Ian Li", None)]),
        );

        let state = shared(backend, SyncConfig::default());
        let params = LaunchParams {
            round: Some(round_id),
            archer: Some(participant.to_string()),
            code: Some("CODE1".into()),
            ..Default::default()
        };
        let resolution = resolve_startup(&state, params).await;
        let Resolution::ManualSetup {
            division, round_id: got, ..
        } = resolution
        else {
            panic!("expected manual setup, got {resolution:?}");
        };
        assert_eq!(division.as_deref(), Some("BJV"));
        assert_eq!(got, round_id);
    }

    #[tokio::test]
    async fn direct_link_unassigned_archer_is_a_hard_stop() {
        let backend = FakeBackend::new();
        let round_id = Uuid::new_v4();
        backend.seed_round_snapshot(
            round_id,
            round_snapshot(round_id, "GVAR", vec![stub(Uuid::new_v4(), "Amy Yu", Some(1))]),
        );

        let state = shared(backend, SyncConfig::default());
        let params = LaunchParams {
            round: Some(round_id),
            archer: Some(Uuid::new_v4().to_string()),
            code: Some("CODE1".into()),
            ..Default::default()
        };
        let resolution = resolve_startup(&state, params).await;
        let Resolution::Fresh { notice } = resolution else {
            panic!("expected fresh, got {resolution:?}");
        };
        assert!(notice.expect("notice").contains("not assigned"));
    }

    #[tokio::test]
    async fn missing_entry_code_falls_back_to_fresh_with_notice() {
        let backend = FakeBackend::new();
        let round_id = Uuid::new_v4();

        // No explicit code, nothing cached, no coach key configured.
        let state = shared(backend, SyncConfig::default());
        let params = LaunchParams {
            round: Some(round_id),
            archer: Some("jane-doe-wdv".into()),
            ..Default::default()
        };
        let resolution = resolve_startup(&state, params).await;
        let Resolution::Fresh { notice } = resolution else {
            panic!("expected fresh, got {resolution:?}");
        };
        assert!(notice.expect("notice").contains("entry code"));
    }

    #[tokio::test]
    async fn saved_pointer_yields_resume_prompt_with_staleness() {
        let backend = FakeBackend::new();
        let round_id = Uuid::new_v4();
        let participant = Uuid::new_v4();
        let mut snapshot = round_snapshot(
            round_id,
            "GVAR",
            vec![stub(participant, "Jane Doe", Some(2))],
        );
        snapshot.round.status = Some("Completed".into());
        backend.seed_round_snapshot(round_id, snapshot);
        backend.seed_bale(round_id, 2, Vec::new());

        let state = shared(backend, SyncConfig::default());
        SessionPointer {
            archer_identity: Some(participant.to_string()),
            round_id,
            event_id: None,
            bale_number: 2,
            entry_code: Some("CODE1".into()),
            saved_at: None,
        }
        .save(state.store.as_ref());

        let resolution = resolve_startup(&state, LaunchParams::default()).await;
        let Resolution::ResumePrompt { session, stale, .. } = resolution else {
            panic!("expected resume prompt, got {resolution:?}");
        };
        assert!(stale, "completed round must be flagged stale");
        assert_eq!(session.round_id, Some(round_id));
        assert_eq!(session.archers.len(), 1);
    }

    #[tokio::test]
    async fn declining_resume_clears_pointer_and_round_cache() {
        let backend = FakeBackend::new();
        let state = shared(backend, SyncConfig::default());
        let round_id = Uuid::new_v4();

        let mut declined = BaleSession::new(RoundKind::Ranking300);
        declined.round_id = Some(round_id);
        SessionPointer {
            archer_identity: None,
            round_id,
            event_id: None,
            bale_number: 1,
            entry_code: None,
            saved_at: None,
        }
        .save(state.store.as_ref());
        state
            .store
            .set(&sync::sync_session_key(round_id), "{}")
            .expect("seed");
        state
            .store
            .set(&sync::offline_queue_key(round_id), "[]")
            .expect("seed");

        decline_resume(&state, &declined).await;
        assert!(SessionPointer::load(state.store.as_ref()).is_none());
        assert!(state.store.get(&sync::sync_session_key(round_id)).is_none());
        assert!(state.store.get(&sync::offline_queue_key(round_id)).is_none());
        assert!(state.session.read().await.archers.is_empty());
    }

    #[tokio::test]
    async fn accepting_resume_flushes_queued_ends() {
        let backend = FakeBackend::new();
        let round_id = Uuid::new_v4();
        let participant = Uuid::new_v4();
        let state = shared(backend.clone(), SyncConfig::default());
        state
            .store
            .set(
                &sync::offline_queue_key(round_id),
                r#"{"entries":[{"identity":"jane","end_number":1,"post":{"endNumber":1,"a1":"9","a2":"9","a3":"9","endTotal":27,"runningTotal":27,"tens":0,"xs":0}}]}"#,
            )
            .expect("seed");

        let mut session = BaleSession::new(RoundKind::Ranking300);
        session.round_id = Some(round_id);
        let mut jane = Archer::new("jane", RoundKind::Ranking300);
        jane.division_code = "OPEN".into();
        jane.round_participant_id = Some(participant);
        session.add_archer(jane).expect("add");

        accept_resume(&state, session, None).await;

        let posted = backend.posted_ends();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].1, participant);
        assert_eq!(posted[0].2.a1, "9");
        assert_eq!(
            state.session.read().await.sync_state("jane", 1),
            Some(EndSyncStatus::Synced)
        );
    }

    #[tokio::test]
    async fn local_data_resumes_implicitly_without_network() {
        let backend = FakeBackend::new();
        backend.go_offline();
        let state = shared(backend.clone(), SyncConfig::default());
        {
            let mut session = state.session.write().await;
            let mut archer = Archer::new("jane-doe-wdv", RoundKind::Ranking300);
            archer.division_code = "OPEN".into();
            session.archers.push(archer);
            session
                .archers[0]
                .scores
                .set_arrow(1, 0, crate::scoring::Arrow::from_raw("9"));
        }
        let resolution = resolve_startup(&state, LaunchParams::default()).await;
        assert!(matches!(resolution, Resolution::Scoring { .. }));
        assert!(backend.calls().is_empty(), "no network calls expected");
    }

    #[tokio::test]
    async fn entry_code_precedence_prefers_explicit_then_caches() {
        let backend = FakeBackend::new();
        let event_id = Uuid::new_v4();
        let round_id = Uuid::new_v4();
        let mut config = SyncConfig::default();
        config.api_key = Some("coach-key".into());
        let state = shared(backend, config);

        // Nothing cached: coach key is the last resort.
        assert_eq!(
            resolve_entry_code(&state, None, Some(round_id), None).await,
            Some("coach-key".to_string())
        );

        state
            .store
            .set(&format!("event_entry_code:{event_id}"), "EVT")
            .expect("seed");
        assert_eq!(
            resolve_entry_code(&state, Some(event_id), Some(round_id), None).await,
            Some("EVT".to_string())
        );

        state
            .store
            .set(&format!("round_entry_code:{round_id}"), "RND")
            .expect("seed");
        assert_eq!(
            resolve_entry_code(&state, Some(event_id), Some(round_id), None).await,
            Some("RND".to_string())
        );

        assert_eq!(
            resolve_entry_code(&state, Some(event_id), Some(round_id), Some("URL")).await,
            Some("URL".to_string())
        );
    }

    #[tokio::test]
    async fn server_detected_sessions_are_synced_not_pending() {
        // Server-delivered ends land in the sync map as synced, so a master
        // sync afterwards has nothing to repost for them.
        let backend = FakeBackend::new();
        let round_id = Uuid::new_v4();
        let participant = Uuid::new_v4();
        backend.seed_round_snapshot(
            round_id,
            round_snapshot(round_id, "GVAR", vec![stub(participant, "Jane Doe", Some(5))]),
        );
        backend.seed_bale(
            round_id,
            5,
            vec![BaleArcher {
                round_archer_id: Some(participant),
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                school: "WDV".into(),
                gender: "F".into(),
                level: "VAR".into(),
                bale_number: Some(5),
                ends: vec![
                    BaleEnd {
                        end_number: 1,
                        a1: "9".into(),
                        a2: "9".into(),
                        a3: "9".into(),
                    },
                    BaleEnd {
                        end_number: 2,
                        a1: "X".into(),
                        a2: "10".into(),
                        a3: "8".into(),
                    },
                ],
                ..Default::default()
            }],
        );

        let state = shared(backend, SyncConfig::default());
        let params = LaunchParams {
            round: Some(round_id),
            archer: Some(participant.to_string()),
            code: Some("CODE1".into()),
            ..Default::default()
        };
        let resolution = resolve_startup(&state, params).await;
        assert!(matches!(resolution, Resolution::Scoring { .. }));

        let session = state.session.read().await;
        let jane = &session.archers[0];
        assert_eq!(
            session.sync_state(&jane.identity, 1),
            Some(EndSyncStatus::Synced)
        );
        assert_eq!(
            session.sync_state(&jane.identity, 2),
            Some(EndSyncStatus::Synced)
        );
        assert_eq!(session.sync_state(&jane.identity, 3), None);
        // Resume lands one past the last end with data.
        assert_eq!(session.current_end, 3);
    }
}
