//! Bale session state, the entry-guard invariants, local persistence and the
//! startup resolution engine.

mod resolve;
mod store;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;
use time::macros::format_description;
use tracing::warn;
use uuid::Uuid;

use crate::roster::{Archer, CardStatus, OPEN_DIVISION};
use crate::scoring::{Arrow, RoundKind};

pub use self::resolve::{
    LaunchParams, Resolution, SessionPointer, accept_resume, decline_resume, resolve_entry_code,
    resolve_startup,
};
pub use self::store::{FileStore, LocalStore, MemoryStore, StoreError, StoreResult};

/// Most archers a single bale can hold.
pub const MAX_ARCHERS_PER_BALE: usize = 4;

/// Target letters available on a bale, assigned in order.
pub const TARGET_LETTERS: [char; 8] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

/// How archers got onto this bale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentMode {
    /// The scorer picks archers freely from the cached roster.
    #[default]
    Manual,
    /// Event configuration fixed the archers, bale and targets; the roster is
    /// read-mostly.
    PreAssigned,
}

/// Synchronization state of one (archer, end) cell. Absence from the map
/// means no sync was ever attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndSyncStatus {
    /// A post is in flight (or was cut off mid-flight by a reload).
    Pending,
    /// The server acknowledged this end.
    Synced,
    /// The last post failed; a later write or a master sync will retry.
    Failed,
}

/// Rejection raised by the entry guard before any mutation happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// The bale already holds the maximum number of archers.
    #[error("bale is full ({max} archers)")]
    BaleFull {
        /// Maximum archers per bale.
        max: usize,
    },
    /// The candidate's division conflicts with the bale's division.
    #[error("division mismatch: bale is {existing}, archer is {candidate}")]
    DivisionMismatch {
        /// Division already implied by the session.
        existing: String,
        /// Division derived for the rejected archer.
        candidate: String,
    },
    /// The archer's card has been completed, verified or voided.
    #[error("scorecard for {name} is finalized and can no longer be changed")]
    CardFinalized {
        /// Display name of the affected archer.
        name: String,
    },
    /// The archer is already on this bale.
    #[error("archer {identity} is already on this bale")]
    DuplicateArcher {
        /// Identity of the duplicate.
        identity: String,
    },
    /// No archer with this identity is on the bale.
    #[error("no archer {identity} on this bale")]
    UnknownArcher {
        /// Identity that was looked up.
        identity: String,
    },
}

/// Local state for one device's active scoring session on one bale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaleSession {
    /// Server round id, `None` until the round exists server-side.
    pub round_id: Option<Uuid>,
    /// Owning event; `None` for a standalone round.
    pub event_id: Option<Uuid>,
    /// The single division permitted on this bale, once known.
    pub division_code: Option<String>,
    /// Bale the device is scoring.
    pub bale_number: u32,
    /// Round kind, fixing the number of ends.
    pub round_kind: RoundKind,
    /// 1-based end currently being entered.
    pub current_end: u8,
    /// Archers in insertion order, at most [`MAX_ARCHERS_PER_BALE`].
    pub archers: Vec<Archer>,
    /// Per-archer, per-end sync state; insertion-ordered by archer.
    pub sync_status: IndexMap<String, BTreeMap<u8, EndSyncStatus>>,
    /// Manual roster selection vs pre-assigned event configuration.
    pub assignment_mode: AssignmentMode,
}

impl BaleSession {
    /// Fresh empty session for the given round kind.
    pub fn new(round_kind: RoundKind) -> Self {
        Self {
            round_id: None,
            event_id: None,
            division_code: None,
            bale_number: 1,
            round_kind,
            current_end: 1,
            archers: Vec::new(),
            sync_status: IndexMap::new(),
            assignment_mode: AssignmentMode::default(),
        }
    }

    /// Division implied by the session: the explicit code when set, else the
    /// first archer's division.
    pub fn effective_division(&self) -> Option<&str> {
        self.division_code
            .as_deref()
            .or_else(|| self.archers.first().map(|a| a.division_code.as_str()))
    }

    /// Look up an archer by identity.
    pub fn archer(&self, identity: &str) -> Option<&Archer> {
        self.archers.iter().find(|a| a.identity == identity)
    }

    /// Mutable lookup by identity.
    pub fn archer_mut(&mut self, identity: &str) -> Option<&mut Archer> {
        self.archers.iter_mut().find(|a| a.identity == identity)
    }

    /// Lowest target letter not yet taken on this bale.
    pub fn next_free_target(&self) -> char {
        let used: Vec<char> = self
            .archers
            .iter()
            .filter_map(|a| a.target_assignment)
            .collect();
        TARGET_LETTERS
            .iter()
            .copied()
            .find(|letter| !used.contains(letter))
            .unwrap_or(TARGET_LETTERS[0])
    }

    /// Guard checks for adding an archer, without mutating anything.
    pub fn check_add(&self, archer: &Archer) -> Result<(), GuardError> {
        if self.archers.len() >= MAX_ARCHERS_PER_BALE {
            return Err(GuardError::BaleFull {
                max: MAX_ARCHERS_PER_BALE,
            });
        }
        if self.archer(&archer.identity).is_some() {
            return Err(GuardError::DuplicateArcher {
                identity: archer.identity.clone(),
            });
        }
        if archer.card_status == CardStatus::Complete || archer.is_locked() {
            return Err(GuardError::CardFinalized {
                name: archer.display_name(),
            });
        }
        if let Some(existing) = self.effective_division() {
            if existing != archer.division_code {
                return Err(GuardError::DivisionMismatch {
                    existing: existing.to_string(),
                    candidate: archer.division_code.clone(),
                });
            }
        }
        Ok(())
    }

    /// Add an archer after the guard checks pass, assigning the lowest unused
    /// target letter when the archer does not already carry one. A carried
    /// letter that collides with an existing archer's is reassigned too, so
    /// targets stay pairwise distinct on the bale.
    pub fn add_archer(&mut self, mut archer: Archer) -> Result<(), GuardError> {
        self.check_add(&archer)?;
        let taken = archer.target_assignment.is_some_and(|letter| {
            self.archers
                .iter()
                .any(|a| a.target_assignment == Some(letter))
        });
        if archer.target_assignment.is_none() || taken {
            archer.target_assignment = Some(self.next_free_target());
        }
        if self.division_code.is_none() {
            self.division_code = Some(archer.division_code.clone());
        }
        self.archers.push(archer);
        Ok(())
    }

    /// Remove an archer. Remaining archers keep their target letters; nothing
    /// is renumbered.
    pub fn remove_archer(&mut self, identity: &str) -> Result<Archer, GuardError> {
        let position = self
            .archers
            .iter()
            .position(|a| a.identity == identity)
            .ok_or_else(|| GuardError::UnknownArcher {
                identity: identity.to_string(),
            })?;
        self.sync_status.shift_remove(identity);
        Ok(self.archers.remove(position))
    }

    /// Write one arrow for an archer on the current end. Locked cards are
    /// rejected before anything changes.
    pub fn write_arrow(
        &mut self,
        identity: &str,
        arrow_index: usize,
        value: Arrow,
    ) -> Result<(), GuardError> {
        let end = self.current_end;
        let archer = self
            .archer_mut(identity)
            .ok_or_else(|| GuardError::UnknownArcher {
                identity: identity.to_string(),
            })?;
        if archer.is_locked() {
            return Err(GuardError::CardFinalized {
                name: archer.display_name(),
            });
        }
        archer.scores.set_arrow(end, arrow_index, value);
        Ok(())
    }

    /// Move to another end, clamped to `[1, total_ends]`.
    pub fn set_current_end(&mut self, end: u8) {
        self.current_end = end.clamp(1, self.round_kind.total_ends());
    }

    /// Record the sync state of one (archer, end) cell.
    pub fn mark_sync(&mut self, identity: &str, end: u8, status: EndSyncStatus) {
        self.sync_status
            .entry(identity.to_string())
            .or_default()
            .insert(end, status);
    }

    /// Sync state of one cell; `None` when never attempted.
    pub fn sync_state(&self, identity: &str, end: u8) -> Option<EndSyncStatus> {
        self.sync_status
            .get(identity)
            .and_then(|ends| ends.get(&end))
            .copied()
    }

    /// Re-validate a session loaded from a raw blob: stored shapes may come
    /// from an older schema version, so derived fields are recomputed and
    /// range invariants re-clamped rather than trusted.
    pub fn sanitize(&mut self) {
        self.current_end = self.current_end.clamp(1, self.round_kind.total_ends());
        if self.bale_number == 0 {
            self.bale_number = 1;
        }
        if self.archers.len() > MAX_ARCHERS_PER_BALE {
            warn!(
                count = self.archers.len(),
                "stored session exceeds bale capacity; truncating"
            );
            self.archers.truncate(MAX_ARCHERS_PER_BALE);
        }
        if self
            .division_code
            .as_deref()
            .is_none_or(|d| d.trim().is_empty())
        {
            self.division_code = self
                .archers
                .first()
                .map(|a| a.division_code.clone())
                .filter(|d| !d.trim().is_empty());
        }
        let fallback_division = self
            .division_code
            .clone()
            .unwrap_or_else(|| OPEN_DIVISION.to_string());
        let mut used: Vec<char> = Vec::new();
        for archer in &mut self.archers {
            if archer.card_status.finalizes_card() {
                archer.locked = true;
            }
            if archer.division_code.trim().is_empty() {
                archer.division_code = fallback_division.clone();
            }
            match archer.target_assignment {
                Some(letter) if !used.contains(&letter) => used.push(letter),
                _ => {
                    let next = TARGET_LETTERS
                        .iter()
                        .copied()
                        .find(|l| !used.contains(l))
                        .unwrap_or(TARGET_LETTERS[0]);
                    archer.target_assignment = Some(next);
                    used.push(next);
                }
            }
        }
        self.sync_status
            .retain(|identity, _| self.archers.iter().any(|a| &a.identity == identity));
    }
}

/// Day-keyed persistence for [`BaleSession`] blobs on top of a [`LocalStore`].
pub struct SessionStore {
    store: Arc<dyn LocalStore>,
    write_warned: AtomicBool,
}

impl SessionStore {
    /// Wrap a local store.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            write_warned: AtomicBool::new(false),
        }
    }

    /// Underlying blob store.
    pub fn raw(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Blob key for a session of the given kind on the given day.
    pub fn session_key(round_kind: RoundKind, day: Date) -> String {
        let format = format_description!("[year]-[month]-[day]");
        let day = day.format(&format).unwrap_or_else(|_| day.to_string());
        format!("ranking_round_{}:{day}", round_kind.code())
    }

    /// Load the session saved for `day`, if any. A corrupt blob is discarded
    /// and removed so it cannot wedge every subsequent startup.
    pub fn load(&self, round_kind: RoundKind, day: Date) -> Option<BaleSession> {
        let key = Self::session_key(round_kind, day);
        let raw = self.store.get(&key)?;
        match serde_json::from_str::<BaleSession>(&raw) {
            Ok(mut session) => {
                session.sanitize();
                Some(session)
            }
            Err(err) => {
                warn!(key, error = %err, "stored session is unreadable; starting fresh");
                self.store.remove(&key);
                None
            }
        }
    }

    /// Persist the session for `day`. Returns whether the caller should show
    /// the one-time "your data may be lost on refresh" warning.
    pub fn save(&self, session: &BaleSession, day: Date) -> bool {
        let key = Self::session_key(session.round_kind, day);
        let raw = match serde_json::to_string(session) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "session failed to serialize");
                return !self.write_warned.swap(true, Ordering::Relaxed);
            }
        };
        match self.store.set(&key, &raw) {
            Ok(()) => false,
            Err(err) => {
                warn!(error = %err, "session write failed; data survives in memory only");
                !self.write_warned.swap(true, Ordering::Relaxed)
            }
        }
    }

    /// Delete the session blob for `day`.
    pub fn clear(&self, round_kind: RoundKind, day: Date) {
        self.store.remove(&Self::session_key(round_kind, day));
    }
}
