use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::scoring::{End, RoundKind, ScoreSheet};

use super::{Archer, ArcherStatus, CardStatus, Gender, Level, OPEN_DIVISION};

/// A raw archer record from one of the three sources the client merges.
///
/// Each variant is explicit about which fields its source guarantees; the
/// normalizer turns any of them into one canonical [`Archer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RosterRecord {
    /// Entry from the device-cached master roster (manual selection mode).
    Cached(CachedRosterRecord),
    /// Participant stub from an event or round snapshot. Names arrive as one
    /// concatenated display string.
    Snapshot(SnapshotStub),
    /// Full archer detail from the per-bale endpoint, including the nested
    /// scorecard ends.
    BaleDetail(BaleDetailRecord),
}

/// Master-roster entry cached on the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedRosterRecord {
    /// External id from the roster import, when present.
    pub ext_id: Option<String>,
    /// Given name.
    pub first: String,
    /// Family name.
    pub last: String,
    /// School or club.
    pub school: String,
    /// School grade, free-form.
    pub grade: String,
    /// Raw level string, normalized leniently.
    pub level: String,
    /// Raw gender string, normalized leniently.
    pub gender: String,
    /// Raw roster status; anything but `inactive` is treated as active.
    pub status: String,
}

/// Participant stub from an event or round snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotStub {
    /// Server join-row id for this participant, when the round exists.
    pub round_participant_id: Option<Uuid>,
    /// Concatenated display name (`"Jane Doe"`).
    pub archer_name: String,
    /// School or club.
    pub school: String,
    /// Raw gender string.
    pub gender: String,
    /// Raw level string.
    pub level: String,
    /// Division the snapshot placed this archer in, when declared.
    pub division: Option<String>,
    /// Assigned bale, `None` while unassigned.
    pub bale_number: Option<u32>,
    /// Assigned target letter.
    pub target: Option<char>,
    /// Raw card status string.
    pub card_status: String,
    /// Ends already submitted server-side.
    pub ends_completed: u32,
}

/// One submitted end as the bale-detail endpoint reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndRecord {
    /// 1-based end number.
    pub end_number: u8,
    /// First arrow, raw scoring string.
    pub a1: String,
    /// Second arrow.
    pub a2: String,
    /// Third arrow.
    pub a3: String,
}

/// Full archer detail from the per-bale endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaleDetailRecord {
    /// Server join-row id.
    pub round_participant_id: Option<Uuid>,
    /// Server master-archer UUID, the strongest identity source.
    pub archer_id: Option<Uuid>,
    /// External id carried over from roster import.
    pub ext_id: Option<String>,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// School or club.
    pub school: String,
    /// School grade.
    pub grade: String,
    /// Raw gender string.
    pub gender: String,
    /// Raw level string.
    pub level: String,
    /// Assigned bale.
    pub bale_number: Option<u32>,
    /// Assigned target letter.
    pub target: Option<char>,
    /// Raw card status string.
    pub card_status: String,
    /// Explicit lock override, when the backend sends one.
    pub locked: Option<bool>,
    /// Submitted ends, sparse.
    pub ends: Vec<EndRecord>,
}

/// Composite fallback identity: first, last and school lowercased and
/// hyphen-joined. Must stay byte-stable across sources or merges silently
/// duplicate archers.
pub fn composite_identity(first: &str, last: &str, school: &str) -> String {
    format!(
        "{}-{}-{}",
        first.trim().to_lowercase(),
        last.trim().to_lowercase(),
        school.trim().to_lowercase()
    )
}

/// Placeholder identity for a manual entry that matches no record anywhere.
pub fn placeholder_identity() -> String {
    format!(
        "new-{}",
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    )
}

/// Derive the division code for an archer given the divisions the event
/// actually runs.
///
/// An OPEN-only event collapses everyone to OPEN regardless of the naive
/// gender+level candidate. Otherwise the candidate `{B|G}{VAR|JV|BEG}` is
/// used when the event offers it, falling back to OPEN when available, and
/// finally to the first offered division.
pub fn derive_division(gender: Gender, level: Level, available: &[String]) -> String {
    if available.len() == 1 && available[0] == OPEN_DIVISION {
        return OPEN_DIVISION.to_string();
    }
    let candidate = format!("{}{}", gender.division_prefix(), level.division_suffix());
    if available.iter().any(|d| d == &candidate) {
        return candidate;
    }
    if available.iter().any(|d| d == OPEN_DIVISION) {
        return OPEN_DIVISION.to_string();
    }
    available
        .first()
        .cloned()
        .unwrap_or_else(|| OPEN_DIVISION.to_string())
}

/// Split a concatenated display name into (first, last). Everything after the
/// first word becomes the family name.
fn split_display_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

fn identity_for_bale_detail(record: &BaleDetailRecord) -> String {
    if let Some(id) = record.archer_id {
        return id.to_string();
    }
    if let Some(ext) = record
        .ext_id
        .as_deref()
        .filter(|ext| !ext.trim().is_empty())
    {
        return ext.to_string();
    }
    if record.first_name.trim().is_empty() && record.last_name.trim().is_empty() {
        return placeholder_identity();
    }
    composite_identity(&record.first_name, &record.last_name, &record.school)
}

/// Normalize a raw record from any source into one canonical [`Archer`].
pub fn normalize_record(
    record: &RosterRecord,
    round: RoundKind,
    available_divisions: &[String],
) -> Archer {
    match record {
        RosterRecord::Cached(cached) => {
            let identity = cached
                .ext_id
                .as_deref()
                .filter(|ext| !ext.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    if cached.first.trim().is_empty() && cached.last.trim().is_empty() {
                        placeholder_identity()
                    } else {
                        composite_identity(&cached.first, &cached.last, &cached.school)
                    }
                });
            let gender = Gender::from_raw(&cached.gender);
            let level = Level::from_raw(&cached.level);
            let mut archer = Archer::new(identity, round);
            archer.first_name = cached.first.trim().to_string();
            archer.last_name = cached.last.trim().to_string();
            archer.school = cached.school.trim().to_string();
            archer.grade = cached.grade.trim().to_string();
            archer.gender = gender;
            archer.level = level;
            archer.status = if cached.status.trim().eq_ignore_ascii_case("inactive") {
                ArcherStatus::Inactive
            } else {
                ArcherStatus::Active
            };
            archer.division_code = derive_division(gender, level, available_divisions);
            archer
        }
        RosterRecord::Snapshot(stub) => {
            let (first, last) = split_display_name(&stub.archer_name);
            let identity = stub
                .round_participant_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| {
                    if first.is_empty() && last.is_empty() {
                        placeholder_identity()
                    } else {
                        composite_identity(&first, &last, &stub.school)
                    }
                });
            let gender = Gender::from_raw(&stub.gender);
            let level = Level::from_raw(&stub.level);
            let card_status = CardStatus::from_raw(&stub.card_status);
            let mut archer = Archer::new(identity, round);
            archer.round_participant_id = stub.round_participant_id;
            archer.first_name = first;
            archer.last_name = last;
            archer.school = stub.school.trim().to_string();
            archer.gender = gender;
            archer.level = level;
            archer.division_code = stub
                .division
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| derive_division(gender, level, available_divisions));
            archer.bale_number = stub.bale_number;
            archer.target_assignment = stub.target;
            archer.card_status = card_status;
            archer.locked = card_status.finalizes_card();
            archer
        }
        RosterRecord::BaleDetail(detail) => {
            let gender = Gender::from_raw(&detail.gender);
            let level = Level::from_raw(&detail.level);
            let card_status = CardStatus::from_raw(&detail.card_status);
            let mut archer = Archer::new(identity_for_bale_detail(detail), round);
            archer.round_participant_id = detail.round_participant_id;
            archer.first_name = detail.first_name.trim().to_string();
            archer.last_name = detail.last_name.trim().to_string();
            archer.school = detail.school.trim().to_string();
            archer.grade = detail.grade.trim().to_string();
            archer.gender = gender;
            archer.level = level;
            archer.division_code = derive_division(gender, level, available_divisions);
            archer.bale_number = detail.bale_number;
            archer.target_assignment = detail.target;
            archer.card_status = card_status;
            archer.locked = detail
                .locked
                .unwrap_or_else(|| card_status.finalizes_card());
            archer.scores = ScoreSheet::from_sparse(
                round,
                detail.ends.iter().map(|e| {
                    let end: End = [
                        crate::scoring::Arrow::from_raw(&e.a1),
                        crate::scoring::Arrow::from_raw(&e.a2),
                        crate::scoring::Arrow::from_raw(&e.a3),
                    ];
                    (e.end_number, end)
                }),
            );
            archer
        }
    }
}

fn fill_string(target: &mut String, source: &str) {
    if target.trim().is_empty() && !source.trim().is_empty() {
        *target = source.to_string();
    }
}

/// Merge two normalized archers that share one identity.
///
/// `preferred` should come from the richer source (bale detail over snapshot
/// stub). Populated fields on the preferred side always win; fields it left
/// empty are filled from the other side. A less-complete source can never
/// blank out a populated field.
pub fn merge_archers(mut preferred: Archer, other: Archer) -> Archer {
    fill_string(&mut preferred.first_name, &other.first_name);
    fill_string(&mut preferred.last_name, &other.last_name);
    fill_string(&mut preferred.school, &other.school);
    fill_string(&mut preferred.grade, &other.grade);
    if preferred.round_participant_id.is_none() {
        preferred.round_participant_id = other.round_participant_id;
    }
    if preferred.bale_number.is_none() {
        preferred.bale_number = other.bale_number;
    }
    if preferred.target_assignment.is_none() {
        preferred.target_assignment = other.target_assignment;
    }
    if preferred.division_code.trim().is_empty() {
        preferred.division_code = other.division_code;
    }
    // A card finalized anywhere stays finalized after the merge.
    if preferred.card_status == CardStatus::Pending && other.card_status != CardStatus::Pending {
        preferred.card_status = other.card_status;
    }
    preferred.locked = preferred.locked || other.locked;
    if !preferred.scores.has_any_data() && other.scores.has_any_data() {
        preferred.scores = other.scores;
    }
    preferred
}
