//! Condition logic combinators
//!
//! Every condition in a macro carries a logic tag describing how its result
//! is folded into the accumulated result of the conditions before it. The
//! first (root) condition seeds the accumulator; the rest combine with it.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Raw values below this are only valid for the root condition.
const ROOT_LAST: u32 = 2;
/// Raw values at or above this are not valid logic tags at all.
const LAST: u32 = 105;

/// How a condition result combines with the accumulated result so far.
///
/// The numeric values are part of the persisted format; root tags sit
/// below [`ROOT_LAST`], non-root tags in the 100 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    /// Root condition, taken as-is.
    RootNone,
    /// Root condition, negated.
    RootNot,
    /// Condition is skipped (e.g. disabled); accumulator passes through.
    None,
    And,
    Or,
    AndNot,
    OrNot,
}

impl Logic {
    /// Numeric tag used in the persisted settings document.
    pub fn raw(self) -> u32 {
        match self {
            Logic::RootNone => 0,
            Logic::RootNot => 1,
            Logic::None => 100,
            Logic::And => 101,
            Logic::Or => 102,
            Logic::AndNot => 103,
            Logic::OrNot => 104,
        }
    }

    /// Decode a numeric tag from a settings document.
    pub fn from_raw(raw: u32) -> Option<Logic> {
        match raw {
            0 => Some(Logic::RootNone),
            1 => Some(Logic::RootNot),
            100 => Some(Logic::None),
            101 => Some(Logic::And),
            102 => Some(Logic::Or),
            103 => Some(Logic::AndNot),
            104 => Some(Logic::OrNot),
            _ => None,
        }
    }

    /// Whether this tag belongs at the root position of a condition list.
    pub fn is_root(self) -> bool {
        self.raw() < ROOT_LAST
    }

    /// Check that the tag agrees with the structural position of the
    /// condition it is attached to. Used after deserialization to catch
    /// corrupted save files.
    pub fn is_valid_selection(self, is_root_position: bool) -> bool {
        let raw = self.raw();
        if is_root_position {
            raw < ROOT_LAST
        } else {
            raw > ROOT_LAST && raw < LAST
        }
    }

    /// Fold one condition result into the accumulator.
    ///
    /// Called left-to-right across a macro's condition list. The root tags
    /// ignore `current` entirely and establish the initial accumulator.
    /// A tag used in the wrong position conservatively returns the
    /// accumulator unchanged.
    pub fn apply(self, current: bool, new: bool) -> bool {
        match self {
            Logic::RootNone => new,
            Logic::RootNot => !new,
            Logic::None => current,
            Logic::And => current && new,
            Logic::Or => current || new,
            Logic::AndNot => current && !new,
            Logic::OrNot => current || !new,
        }
    }

    /// Like [`Logic::apply`], but validates the position first. Invalid
    /// combinations are logged and leave the accumulator unchanged.
    pub fn apply_checked(self, current: bool, new: bool, is_root_position: bool) -> bool {
        if !self.is_valid_selection(is_root_position) {
            warn!(
                "logic tag {:?} used in {} position, keeping previous result",
                self,
                if is_root_position { "root" } else { "non-root" }
            );
            return current;
        }
        self.apply(current, new)
    }
}

impl Default for Logic {
    fn default() -> Self {
        Logic::RootNone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_matches_truth_table() {
        // Accumulator trace from the documented example:
        // [RootNone, And, Or] over [true, false, true] -> true, false, true
        let tags = [Logic::RootNone, Logic::And, Logic::Or];
        let results = [true, false, true];
        let expected = [true, false, true];

        let mut acc = false;
        for (i, (tag, result)) in tags.iter().zip(results).enumerate() {
            acc = tag.apply(acc, result);
            assert_eq!(acc, expected[i], "step {}", i);
        }
    }

    #[test]
    fn root_tags_ignore_accumulator() {
        assert!(Logic::RootNone.apply(false, true));
        assert!(!Logic::RootNone.apply(true, false));
        assert!(Logic::RootNot.apply(true, false));
        assert!(!Logic::RootNot.apply(false, true));
    }

    #[test]
    fn none_passes_accumulator_through() {
        assert!(Logic::None.apply(true, false));
        assert!(!Logic::None.apply(false, true));
    }

    #[test]
    fn not_variants() {
        assert!(Logic::AndNot.apply(true, false));
        assert!(!Logic::AndNot.apply(true, true));
        assert!(Logic::OrNot.apply(false, false));
        assert!(!Logic::OrNot.apply(false, true));
    }

    #[test]
    fn selection_validity() {
        assert!(Logic::RootNone.is_valid_selection(true));
        assert!(!Logic::RootNone.is_valid_selection(false));
        assert!(Logic::And.is_valid_selection(false));
        assert!(!Logic::And.is_valid_selection(true));
        assert!(Logic::RootNot.is_valid_selection(true));
        assert!(!Logic::OrNot.is_valid_selection(true));
    }

    #[test]
    fn mispositioned_tag_keeps_previous_result() {
        // An AND tag at root position must not change the accumulator.
        assert!(Logic::And.apply_checked(true, false, true));
        assert!(!Logic::And.apply_checked(false, true, true));
        // A root tag in a non-root slot likewise.
        assert!(Logic::RootNone.apply_checked(true, false, false));
    }

    #[test]
    fn raw_round_trip() {
        for tag in [
            Logic::RootNone,
            Logic::RootNot,
            Logic::None,
            Logic::And,
            Logic::Or,
            Logic::AndNot,
            Logic::OrNot,
        ] {
            assert_eq!(Logic::from_raw(tag.raw()), Some(tag));
        }
        assert_eq!(Logic::from_raw(2), None);
        assert_eq!(Logic::from_raw(105), None);
        assert_eq!(Logic::from_raw(42), None);
    }
}
