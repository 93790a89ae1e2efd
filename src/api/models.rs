//! Wire-level request and response bodies for the scoring backend, plus the
//! conversions into the normalizer's source-record shapes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roster::{BaleDetailRecord, EndRecord, RosterRecord, SnapshotStub};

/// One event as listed by the recent-events endpoint. The entry code is only
/// present when the request was made with a coach key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    /// Event id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Event date, `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
    /// Free-form event status.
    #[serde(default)]
    pub status: Option<String>,
    /// Entry code, coach-authenticated requests only.
    #[serde(default)]
    pub entry_code: Option<String>,
}

/// Envelope of the recent-events listing.
#[derive(Debug, Clone, Deserialize)]
pub struct EventList {
    /// Listed events, newest first.
    pub events: Vec<EventSummary>,
}

/// Body posted to verify an entry code against an event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Event to verify against.
    pub event_id: Uuid,
    /// Candidate entry code; the server compares case-insensitively.
    pub entry_code: String,
}

/// Outcome of an entry-code verification.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOutcome {
    /// Whether the code matched.
    pub verified: bool,
    /// Event header on success.
    #[serde(default)]
    pub event: Option<EventSummary>,
}

/// Event header inside a snapshot. Carries the entry code so a device that
/// arrived via direct link can authenticate subsequent writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeader {
    /// Event id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Event date, `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
    /// Free-form event status.
    #[serde(default)]
    pub status: Option<String>,
    /// `manual` or `assigned`.
    #[serde(default)]
    pub assignment_mode: Option<String>,
    /// Entry code for client-side authentication.
    #[serde(default)]
    pub entry_code: Option<String>,
}

/// Per-division round inside an event snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DivisionRound {
    /// Round id for this division.
    pub round_id: Uuid,
    /// Round type code, e.g. `R360`.
    pub round_type: String,
    /// Division code.
    pub division: String,
    /// Free-form round status.
    #[serde(default)]
    pub status: Option<String>,
    /// Participants in this division.
    #[serde(default)]
    pub archers: Vec<SnapshotArcher>,
}

/// Participant stub as event and round snapshots report it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotArcher {
    /// Server join-row id.
    #[serde(default)]
    pub round_archer_id: Option<Uuid>,
    /// Concatenated display name.
    pub archer_name: String,
    /// School or club.
    #[serde(default)]
    pub school: Option<String>,
    /// Raw gender string.
    #[serde(default)]
    pub gender: Option<String>,
    /// Raw level string.
    #[serde(default)]
    pub level: Option<String>,
    /// Assigned target letter.
    #[serde(default)]
    pub target: Option<String>,
    /// Assigned bale.
    #[serde(default)]
    pub bale: Option<u32>,
    /// Ends already submitted server-side.
    #[serde(default)]
    pub ends_completed: u32,
    /// Running total after the last submitted end.
    #[serde(default)]
    pub running_total: u32,
    /// Tens over all submitted ends, X included.
    #[serde(default)]
    pub tens: u32,
    /// Inner tens over all submitted ends.
    #[serde(default)]
    pub xs: u32,
    /// Scorecard lifecycle status string; older servers send a bare
    /// completion flag instead.
    #[serde(default)]
    pub card_status: Option<String>,
    /// Legacy completion flag.
    #[serde(default)]
    pub completed: bool,
}

impl SnapshotArcher {
    /// Downgrade to the normalizer's snapshot-stub shape.
    pub fn into_record(self, division: Option<String>) -> RosterRecord {
        let card_status = self
            .card_status
            .unwrap_or_else(|| if self.completed { "COMP".into() } else { String::new() });
        RosterRecord::Snapshot(SnapshotStub {
            round_participant_id: self.round_archer_id,
            archer_name: self.archer_name,
            school: self.school.unwrap_or_default(),
            gender: self.gender.unwrap_or_default(),
            level: self.level.unwrap_or_default(),
            division,
            bale_number: self.bale,
            target: self.target.and_then(|t| t.trim().chars().next()),
            card_status,
            ends_completed: self.ends_completed,
        })
    }
}

/// Full event snapshot: header plus one round per division.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    /// Event header.
    pub event: EventHeader,
    /// Division rounds, keyed by division code in server order.
    #[serde(default)]
    pub divisions: IndexMap<String, DivisionRound>,
}

impl EventSnapshot {
    /// Division codes this event runs, in server order.
    pub fn division_codes(&self) -> Vec<String> {
        self.divisions.keys().cloned().collect()
    }

    /// The division round holding the given round id, if any.
    pub fn round(&self, round_id: Uuid) -> Option<&DivisionRound> {
        self.divisions.values().find(|r| r.round_id == round_id)
    }
}

/// Round header inside a round snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundHeader {
    /// Round id.
    pub id: Uuid,
    /// Round type code.
    pub round_type: String,
    /// Round date, `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
    /// Bale this round covers, when bale-scoped.
    #[serde(default)]
    pub bale_number: Option<u32>,
    /// Division code, when declared.
    #[serde(default)]
    pub division: Option<String>,
    /// Free-form round status.
    #[serde(default)]
    pub status: Option<String>,
}

/// Snapshot of a single round and its participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Round header.
    pub round: RoundHeader,
    /// Participant stubs.
    #[serde(default)]
    pub archers: Vec<SnapshotArcher>,
}

/// One submitted end on the bale-detail listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaleEnd {
    /// 1-based end number.
    pub end_number: u8,
    /// First arrow, raw scoring string.
    #[serde(default)]
    pub a1: String,
    /// Second arrow.
    #[serde(default)]
    pub a2: String,
    /// Third arrow.
    #[serde(default)]
    pub a3: String,
}

/// Full archer detail from the per-bale listing, nested ends included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaleArcher {
    /// Server join-row id.
    #[serde(default)]
    pub round_archer_id: Option<Uuid>,
    /// Server master-archer id.
    #[serde(default)]
    pub archer_id: Option<Uuid>,
    /// External roster id.
    #[serde(default)]
    pub ext_id: Option<String>,
    /// Given name.
    #[serde(default)]
    pub first_name: String,
    /// Family name.
    #[serde(default)]
    pub last_name: String,
    /// School or club.
    #[serde(default)]
    pub school: String,
    /// School grade.
    #[serde(default)]
    pub grade: String,
    /// Raw gender string.
    #[serde(default)]
    pub gender: String,
    /// Raw level string.
    #[serde(default)]
    pub level: String,
    /// Assigned bale.
    #[serde(default)]
    pub bale_number: Option<u32>,
    /// Assigned target letter.
    #[serde(default)]
    pub target_assignment: Option<String>,
    /// Raw card status string.
    #[serde(default)]
    pub card_status: Option<String>,
    /// Explicit lock flag, when the server sends one.
    #[serde(default)]
    pub locked: Option<bool>,
    /// Submitted ends, sparse over end numbers.
    #[serde(default)]
    pub ends: Vec<BaleEnd>,
}

impl BaleArcher {
    /// Downgrade to the normalizer's bale-detail shape.
    pub fn into_record(self) -> RosterRecord {
        RosterRecord::BaleDetail(BaleDetailRecord {
            round_participant_id: self.round_archer_id,
            archer_id: self.archer_id,
            ext_id: self.ext_id,
            first_name: self.first_name,
            last_name: self.last_name,
            school: self.school,
            grade: self.grade,
            gender: self.gender,
            level: self.level,
            bale_number: self.bale_number,
            target: self.target_assignment.and_then(|t| t.trim().chars().next()),
            card_status: self.card_status.unwrap_or_default(),
            locked: self.locked,
            ends: self
                .ends
                .into_iter()
                .map(|e| EndRecord {
                    end_number: e.end_number,
                    a1: e.a1,
                    a2: e.a2,
                    a3: e.a3,
                })
                .collect(),
        })
    }
}

/// Body posted to find-or-create a round. The server treats this as an
/// idempotent lookup keyed on event, bale and division before creating.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRound {
    /// Round type code.
    pub round_type: String,
    /// Round date, `YYYY-MM-DD`.
    pub date: String,
    /// Bale the device is scoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bale_number: Option<u32>,
    /// Division code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    /// Raw gender component of the division.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// Raw level component of the division.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Owning event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
}

/// Response of the round find-or-create endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRound {
    /// Id of the found or created round.
    pub round_id: Uuid,
}

/// Body posted to register an archer onto a round.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterArcher {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// School or club.
    pub school: String,
    /// Raw level string.
    pub level: String,
    /// Raw gender string.
    pub gender: String,
    /// External roster id, the server's dedup key of choice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_id: Option<String>,
    /// Target letter on the bale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_assignment: Option<String>,
    /// Target face diameter in centimeters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_size: Option<u16>,
    /// Bale number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bale_number: Option<u32>,
}

/// Response of archer registration. Registration is an upsert: re-sending the
/// same archer returns the existing join-row id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredArcher {
    /// Join-row id to address this archer's scores with.
    pub round_archer_id: Uuid,
    /// Server master-archer id.
    #[serde(default)]
    pub archer_id: Option<Uuid>,
}

/// One end as posted to the server. Derived totals ride along so scoreboard
/// reads never recompute them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndPost {
    /// 1-based end number; the upsert key together with the participant.
    pub end_number: u8,
    /// First arrow, raw scoring string.
    pub a1: String,
    /// Second arrow.
    pub a2: String,
    /// Third arrow.
    pub a3: String,
    /// Point total of this end.
    pub end_total: u32,
    /// Running total through this end.
    pub running_total: u32,
    /// Tens in this end, X included.
    pub tens: u32,
    /// Inner tens in this end.
    pub xs: u32,
    /// Device-side timestamp, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_ts: Option<String>,
}

/// One historical round on an archer's cross-event history. The server
/// returns these rows with snake_case keys.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArcherRoundSummary {
    /// Owning event.
    pub event_id: Option<Uuid>,
    /// Event name.
    #[serde(default)]
    pub event_name: Option<String>,
    /// Event date.
    #[serde(default)]
    pub event_date: Option<String>,
    /// Round id.
    pub round_id: Uuid,
    /// Round status, when the server reports one.
    #[serde(default)]
    pub status: Option<String>,
    /// Division code.
    #[serde(default)]
    pub division: Option<String>,
    /// Round type code.
    #[serde(default)]
    pub round_type: Option<String>,
    /// Join-row id in that round.
    pub round_archer_id: Uuid,
    /// Bale shot on.
    #[serde(default)]
    pub bale_number: Option<u32>,
    /// Target letter.
    #[serde(default)]
    pub target_assignment: Option<String>,
    /// Final running total.
    #[serde(default)]
    pub final_score: Option<u32>,
    /// Ends submitted.
    #[serde(default)]
    pub ends_completed: u32,
    /// Tens over the round.
    #[serde(default)]
    pub total_tens: Option<u32>,
    /// Inner tens over the round.
    #[serde(default)]
    pub total_xs: Option<u32>,
}

/// An archer's round history across events.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcherHistory {
    /// Historical rounds, newest event first.
    #[serde(default)]
    pub history: Vec<ArcherRoundSummary>,
    /// Total rounds on record.
    #[serde(default)]
    pub total_rounds: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_archer_decodes_server_shape() {
        let raw = r#"{
            "roundArcherId": "4b3e2f60-0000-0000-0000-000000000001",
            "archerName": "Jane Doe",
            "school": "WDV",
            "gender": "F",
            "level": "VAR",
            "target": "B",
            "bale": 7,
            "endsCompleted": 3,
            "lastEnd": 3,
            "lastEndTotal": 28,
            "runningTotal": 81,
            "avgPerArrow": 9.0,
            "tens": 4,
            "xs": 1,
            "completed": false,
            "lastSyncTime": "2026-03-14 10:22:01"
        }"#;
        let archer: SnapshotArcher = serde_json::from_str(raw).expect("decode");
        assert_eq!(archer.archer_name, "Jane Doe");
        assert_eq!(archer.bale, Some(7));
        assert_eq!(archer.ends_completed, 3);

        let record = archer.into_record(Some("GVAR".into()));
        let RosterRecord::Snapshot(stub) = record else {
            panic!("expected snapshot stub");
        };
        assert_eq!(stub.target, Some('B'));
        assert_eq!(stub.division.as_deref(), Some("GVAR"));
        assert_eq!(stub.card_status, "");
    }

    #[test]
    fn legacy_completed_flag_maps_to_comp() {
        let archer = SnapshotArcher {
            archer_name: "Jane Doe".into(),
            completed: true,
            ..Default::default()
        };
        let RosterRecord::Snapshot(stub) = archer.into_record(None) else {
            panic!("expected snapshot stub");
        };
        assert_eq!(stub.card_status, "COMP");
    }

    #[test]
    fn bale_archer_carries_sparse_ends_through() {
        let raw = r#"{
            "roundArcherId": "4b3e2f60-0000-0000-0000-000000000002",
            "firstName": "Jane",
            "lastName": "Doe",
            "school": "WDV",
            "gender": "F",
            "level": "JV",
            "baleNumber": 3,
            "targetAssignment": "A",
            "cardStatus": "VER",
            "ends": [
                {"endNumber": 1, "a1": "X", "a2": "9", "a3": "M"},
                {"endNumber": 4, "a1": "7", "a2": "7", "a3": "7"}
            ]
        }"#;
        let archer: BaleArcher = serde_json::from_str(raw).expect("decode");
        let RosterRecord::BaleDetail(detail) = archer.into_record() else {
            panic!("expected bale detail");
        };
        assert_eq!(detail.target, Some('A'));
        assert_eq!(detail.card_status, "VER");
        assert_eq!(detail.ends.len(), 2);
        assert_eq!(detail.ends[1].end_number, 4);
    }

    #[test]
    fn new_round_omits_absent_fields() {
        let body = NewRound {
            round_type: "R300".into(),
            date: "2026-03-14".into(),
            bale_number: Some(4),
            ..Default::default()
        };
        let json = serde_json::to_string(&body).expect("serialize");
        assert!(json.contains("\"baleNumber\":4"));
        assert!(!json.contains("eventId"));
        assert!(!json.contains("division"));
    }

    #[test]
    fn event_snapshot_preserves_division_order() {
        let raw = r#"{
            "event": {"id": "4b3e2f60-0000-0000-0000-00000000000e", "name": "City Finals"},
            "divisions": {
                "BVAR": {"roundId": "4b3e2f60-0000-0000-0000-000000000010", "roundType": "R360", "division": "BVAR", "archers": []},
                "GVAR": {"roundId": "4b3e2f60-0000-0000-0000-000000000011", "roundType": "R360", "division": "GVAR", "archers": []}
            }
        }"#;
        let snapshot: EventSnapshot = serde_json::from_str(raw).expect("decode");
        assert_eq!(snapshot.division_codes(), vec!["BVAR", "GVAR"]);
        assert!(
            snapshot
                .round("4b3e2f60-0000-0000-0000-000000000011".parse().expect("uuid"))
                .is_some()
        );
    }
}
