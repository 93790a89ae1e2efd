use serde::{Deserialize, Serialize};

use super::{Arrow, RoundKind};

/// Number of arrows shot per end.
pub const ARROWS_PER_END: usize = 3;

/// One end of three arrows.
pub type End = [Arrow; ARROWS_PER_END];

/// Ordered per-end arrow scores for one archer over a whole round.
///
/// The sheet always holds exactly `round.total_ends()` ends; ends the archer
/// has not reached yet are all-[`Arrow::Empty`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSheet {
    ends: Vec<End>,
}

impl ScoreSheet {
    /// Empty sheet sized for the given round kind.
    pub fn new(round: RoundKind) -> Self {
        Self {
            ends: vec![End::default(); usize::from(round.total_ends())],
        }
    }

    /// Build a sheet from sparse server data: `(end_number, arrows)` pairs
    /// where only ends with submitted data are present. End numbers are
    /// 1-based; out-of-range entries are dropped.
    pub fn from_sparse(round: RoundKind, ends: impl IntoIterator<Item = (u8, End)>) -> Self {
        let mut sheet = Self::new(round);
        for (end_number, arrows) in ends {
            if let Some(slot) = sheet.end_slot(end_number) {
                *slot = arrows;
            }
        }
        sheet
    }

    /// Total number of ends on this sheet.
    pub fn total_ends(&self) -> u8 {
        self.ends.len() as u8
    }

    /// Arrows of the given 1-based end, or an empty end when out of range.
    pub fn end(&self, end_number: u8) -> End {
        end_number
            .checked_sub(1)
            .and_then(|idx| self.ends.get(usize::from(idx)))
            .copied()
            .unwrap_or_default()
    }

    fn end_slot(&mut self, end_number: u8) -> Option<&mut End> {
        end_number
            .checked_sub(1)
            .and_then(|idx| self.ends.get_mut(usize::from(idx)))
    }

    /// Overwrite a single arrow. Returns false when the position is out of
    /// range; stale positions from a re-rendered view are ignored rather than
    /// panicking mid-end.
    pub fn set_arrow(&mut self, end_number: u8, arrow_index: usize, value: Arrow) -> bool {
        if arrow_index >= ARROWS_PER_END {
            return false;
        }
        match self.end_slot(end_number) {
            Some(end) => {
                end[arrow_index] = value;
                true
            }
            None => false,
        }
    }

    /// Replace a whole end.
    pub fn set_end(&mut self, end_number: u8, arrows: End) -> bool {
        match self.end_slot(end_number) {
            Some(end) => {
                *end = arrows;
                true
            }
            None => false,
        }
    }

    /// Point total of one end; unset arrows contribute zero.
    pub fn end_total(&self, end_number: u8) -> u32 {
        self.end(end_number).iter().map(|a| a.points()).sum()
    }

    /// Count of tens in one end, X included.
    pub fn end_tens(&self, end_number: u8) -> u32 {
        self.end(end_number).iter().filter(|a| a.is_ten()).count() as u32
    }

    /// Count of inner tens in one end.
    pub fn end_xs(&self, end_number: u8) -> u32 {
        self.end(end_number).iter().filter(|a| a.is_x()).count() as u32
    }

    /// Whether every arrow of the end has been entered.
    pub fn end_is_complete(&self, end_number: u8) -> bool {
        self.end(end_number).iter().all(|a| a.is_set())
    }

    /// Whether the end has at least one arrow entered.
    pub fn end_has_data(&self, end_number: u8) -> bool {
        self.end(end_number).iter().any(|a| a.is_set())
    }

    /// Sum of end totals for ends `1..=through_end`. Partially entered ends
    /// contribute whatever arrows are set, which is what the current-end
    /// display needs.
    pub fn running_total(&self, through_end: u8) -> u32 {
        (1..=through_end.min(self.total_ends()))
            .map(|e| self.end_total(e))
            .sum()
    }

    /// Whether any arrow anywhere on the sheet has been entered.
    pub fn has_any_data(&self) -> bool {
        (1..=self.total_ends()).any(|e| self.end_has_data(e))
    }

    /// Number of ends with all three arrows entered.
    pub fn completed_ends(&self) -> u32 {
        (1..=self.total_ends())
            .filter(|&e| self.end_is_complete(e))
            .count() as u32
    }

    /// Per-arrow average over completed ends only; 0 when none are complete.
    pub fn average(&self) -> f64 {
        let completed = self.completed_ends();
        if completed == 0 {
            return 0.0;
        }
        let total: u32 = (1..=self.total_ends())
            .filter(|&e| self.end_is_complete(e))
            .map(|e| self.end_total(e))
            .sum();
        f64::from(total) / f64::from(completed * ARROWS_PER_END as u32)
    }

    /// End to land on when resuming: one past the last end with any data,
    /// capped at the final end. A partially entered end therefore counts as
    /// "with data" and is stepped over, matching the behavior scorers already
    /// rely on in the field.
    pub fn resume_end(&self) -> u8 {
        let last_with_data = (1..=self.total_ends())
            .filter(|&e| self.end_has_data(e))
            .next_back()
            .unwrap_or(0);
        (last_with_data + 1).min(self.total_ends()).max(1)
    }

    /// Whole-round totals for the verify-before-submit summary. The per-arrow
    /// average here is over every arrow actually set, partial ends included.
    pub fn totals(&self) -> BaleTotals {
        let mut totals = BaleTotals::default();
        for end in &self.ends {
            for arrow in end {
                if arrow.is_set() {
                    totals.arrows += 1;
                    totals.score += arrow.points();
                    if arrow.is_ten() {
                        totals.tens += 1;
                    }
                    if arrow.is_x() {
                        totals.xs += 1;
                    }
                }
            }
        }
        totals.completed_ends = self.completed_ends();
        totals
    }
}

/// Aggregated totals across a whole sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaleTotals {
    /// Total score over all set arrows.
    pub score: u32,
    /// Count of arrows actually entered.
    pub arrows: u32,
    /// Tens, X included.
    pub tens: u32,
    /// Inner tens.
    pub xs: u32,
    /// Ends with all three arrows set.
    pub completed_ends: u32,
}

impl BaleTotals {
    /// Average points per set arrow; 0 when nothing is entered.
    pub fn average_per_arrow(&self) -> f64 {
        if self.arrows == 0 {
            0.0
        } else {
            f64::from(self.score) / f64::from(self.arrows)
        }
    }
}
