//! Canonical archer entity and the normalizer over the heterogeneous record
//! shapes the client receives from its three data sources.

mod normalize;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::{RoundKind, ScoreSheet};

pub use self::normalize::{
    BaleDetailRecord, CachedRosterRecord, EndRecord, RosterRecord, SnapshotStub,
    composite_identity, derive_division, merge_archers, normalize_record,
};

/// Division code used when an event runs a single undivided field.
pub const OPEN_DIVISION: &str = "OPEN";

/// Archer gender as the scoring backend models it. There is no neutral
/// category in the upstream data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    /// Male; also the default for unrecognized input.
    #[default]
    M,
    /// Female.
    F,
}

impl Gender {
    /// Normalize a raw roster string: `F`, `FEMALE` and `G` map to [`Gender::F`],
    /// everything else to [`Gender::M`].
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "F" | "FEMALE" | "G" => Gender::F,
            _ => Gender::M,
        }
    }

    /// Single-letter division prefix (`B`/`G`).
    pub fn division_prefix(self) -> &'static str {
        match self {
            Gender::M => "B",
            Gender::F => "G",
        }
    }
}

/// Competition level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    /// Varsity; the deliberate default for empty or unrecognized input, since
    /// rosters skew varsity.
    #[default]
    #[serde(rename = "VAR")]
    Var,
    /// Junior varsity.
    #[serde(rename = "JV")]
    Jv,
    /// Beginner.
    #[serde(rename = "BEG")]
    Beg,
}

impl Level {
    /// Normalize a raw roster string by case-insensitive prefix: `JV*`/`J`
    /// map to JV, `BEG*`/`B` to BEG, everything else (including empty) to VAR.
    pub fn from_raw(raw: &str) -> Self {
        let s = raw.trim().to_ascii_uppercase();
        if s.starts_with("JV") || s == "J" {
            Level::Jv
        } else if s.starts_with("BEG") || s == "B" {
            Level::Beg
        } else {
            Level::Var
        }
    }

    /// Division code suffix.
    pub fn division_suffix(self) -> &'static str {
        match self {
            Level::Var => "VAR",
            Level::Jv => "JV",
            Level::Beg => "BEG",
        }
    }

    /// Target face diameter in centimeters: 122 for varsity, 80 otherwise.
    pub fn target_face_size(self) -> u16 {
        match self {
            Level::Var => 122,
            Level::Jv | Level::Beg => 80,
        }
    }
}

/// Roster participation status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArcherStatus {
    /// Shooting this season.
    #[default]
    Active,
    /// On the roster but not shooting.
    Inactive,
}

/// Scorecard lifecycle status. The client only ever drives the
/// PENDING -> COMPLETE transition locally; VERIFIED and VOID are
/// server-authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardStatus {
    /// Card is still being scored.
    #[default]
    #[serde(rename = "PEND", alias = "PENDING")]
    Pending,
    /// All ends entered; awaiting verification.
    #[serde(rename = "COMP", alias = "COMPLETE", alias = "COMPLETED")]
    Complete,
    /// Verified by an official.
    #[serde(rename = "VER", alias = "VRFD", alias = "VERIFIED")]
    Verified,
    /// Voided by an official.
    #[serde(rename = "VOID", alias = "VOIDED")]
    Void,
}

impl CardStatus {
    /// Lenient parse of the status strings seen across backend versions.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "COMP" | "COMPLETE" | "COMPLETED" => CardStatus::Complete,
            "VER" | "VRFD" | "VERIFIED" => CardStatus::Verified,
            "VOID" | "VOIDED" => CardStatus::Void,
            _ => CardStatus::Pending,
        }
    }

    /// Whether a card in this status can no longer be edited on this device.
    pub fn finalizes_card(self) -> bool {
        matches!(self, CardStatus::Verified | CardStatus::Void)
    }
}

/// One participant on a bale, merged into canonical form from whichever
/// sources mentioned them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archer {
    /// Stable identity across reloads and data sources. Server UUID when
    /// known, else an external id, else a composite name key.
    pub identity: String,
    /// Server-side join-row id; required before score syncing can address
    /// this archer, `None` until the server creates it.
    pub round_participant_id: Option<Uuid>,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// School or club.
    pub school: String,
    /// School grade, free-form.
    pub grade: String,
    /// Gender, defaulted to M when the source is silent.
    pub gender: Gender,
    /// Level, defaulted to VAR when the source is silent.
    pub level: Level,
    /// Roster status.
    pub status: ArcherStatus,
    /// Division code for this round (e.g. `BVAR`, or `OPEN`).
    pub division_code: String,
    /// Bale the archer shoots on; `None` while a coach has not grouped them.
    pub bale_number: Option<u32>,
    /// Target letter A-H, unique within a bale.
    pub target_assignment: Option<char>,
    /// Per-end arrow scores.
    pub scores: ScoreSheet,
    /// Once true, no local score mutation is permitted.
    pub locked: bool,
    /// Scorecard lifecycle status.
    pub card_status: CardStatus,
}

impl Archer {
    /// Blank archer with an empty sheet for the given round kind.
    pub fn new(identity: impl Into<String>, round: RoundKind) -> Self {
        Self {
            identity: identity.into(),
            round_participant_id: None,
            first_name: String::new(),
            last_name: String::new(),
            school: String::new(),
            grade: String::new(),
            gender: Gender::default(),
            level: Level::default(),
            status: ArcherStatus::default(),
            division_code: OPEN_DIVISION.to_string(),
            bale_number: None,
            target_assignment: None,
            scores: ScoreSheet::new(round),
            locked: false,
            card_status: CardStatus::default(),
        }
    }

    /// Display name as shown on score tables.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Target face diameter for this archer's level.
    pub fn target_face_size(&self) -> u16 {
        self.level.target_face_size()
    }

    /// Whether local input handlers must drop writes to this card.
    pub fn is_locked(&self) -> bool {
        self.locked || self.card_status.finalizes_card()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_prefix_matching_defaults_to_varsity() {
        assert_eq!(Level::from_raw("JV"), Level::Jv);
        assert_eq!(Level::from_raw("jv2"), Level::Jv);
        assert_eq!(Level::from_raw("J"), Level::Jv);
        assert_eq!(Level::from_raw("BEGINNER"), Level::Beg);
        assert_eq!(Level::from_raw("B"), Level::Beg);
        assert_eq!(Level::from_raw("VAR"), Level::Var);
        assert_eq!(Level::from_raw("V"), Level::Var);
        assert_eq!(Level::from_raw(""), Level::Var);
        assert_eq!(Level::from_raw("whatever"), Level::Var);
    }

    #[test]
    fn gender_has_no_neutral_category() {
        assert_eq!(Gender::from_raw("F"), Gender::F);
        assert_eq!(Gender::from_raw("female"), Gender::F);
        assert_eq!(Gender::from_raw("G"), Gender::F);
        assert_eq!(Gender::from_raw("M"), Gender::M);
        assert_eq!(Gender::from_raw(""), Gender::M);
        assert_eq!(Gender::from_raw("X"), Gender::M);
    }

    #[test]
    fn verified_and_void_cards_are_locked() {
        let mut archer = Archer::new("a", RoundKind::Ranking360);
        assert!(!archer.is_locked());
        archer.card_status = CardStatus::Verified;
        assert!(archer.is_locked());
        archer.card_status = CardStatus::Void;
        assert!(archer.is_locked());
        archer.card_status = CardStatus::Complete;
        assert!(!archer.is_locked());
        archer.locked = true;
        assert!(archer.is_locked());
    }

    #[test]
    fn card_status_parses_legacy_spellings() {
        assert_eq!(CardStatus::from_raw("VRFD"), CardStatus::Verified);
        assert_eq!(CardStatus::from_raw("comp"), CardStatus::Complete);
        assert_eq!(CardStatus::from_raw("PEND"), CardStatus::Pending);
        assert_eq!(CardStatus::from_raw(""), CardStatus::Pending);
    }

    #[test]
    fn face_size_follows_level() {
        assert_eq!(Level::Var.target_face_size(), 122);
        assert_eq!(Level::Jv.target_face_size(), 80);
        assert_eq!(Level::Beg.target_face_size(), 80);
    }
}
