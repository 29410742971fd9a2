//! Conflict resolution for pairs where both sides changed.

use chrono::{DateTime, Utc};
use pairsync_model::SyncDirection;

/// Strategy for deciding which side wins when both sides changed since the
/// last reconciled state.
///
/// The resolver only selects a direction; content translation happens at
/// execution time via the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// A always wins.
    AWins,
    /// B always wins.
    BWins,
    /// The side with the newer modification instant wins; ties go to A.
    Automatic,
}

impl ConflictStrategy {
    /// Returns the fixed winning direction, or `None` for [`Automatic`],
    /// whose direction is only known at execution time.
    ///
    /// [`Automatic`]: ConflictStrategy::Automatic
    pub fn fixed_direction(&self) -> Option<SyncDirection> {
        match self {
            ConflictStrategy::AWins => Some(SyncDirection::AToB),
            ConflictStrategy::BWins => Some(SyncDirection::BToA),
            ConflictStrategy::Automatic => None,
        }
    }

    /// Resolves a direction from the two sides' modification instants.
    ///
    /// Fixed-winner strategies ignore the instants. For
    /// [`ConflictStrategy::Automatic`]: an entity with no modification
    /// instant is treated as never modified and therefore not newer, so a
    /// B without an instant always loses; equal instants go to A (A's
    /// check uses `>=`).
    pub fn resolve(
        &self,
        a_modified: Option<DateTime<Utc>>,
        b_modified: Option<DateTime<Utc>>,
    ) -> SyncDirection {
        if let Some(direction) = self.fixed_direction() {
            return direction;
        }
        match (a_modified, b_modified) {
            (_, None) => SyncDirection::AToB,
            (None, Some(_)) => SyncDirection::BToA,
            (Some(a), Some(b)) => {
                if a >= b {
                    SyncDirection::AToB
                } else {
                    SyncDirection::BToA
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, hour, 0, 0).unwrap()
    }

    #[test]
    fn fixed_strategies_ignore_instants() {
        assert_eq!(
            ConflictStrategy::AWins.resolve(Some(at(1)), Some(at(23))),
            SyncDirection::AToB
        );
        assert_eq!(
            ConflictStrategy::BWins.resolve(Some(at(23)), Some(at(1))),
            SyncDirection::BToA
        );
    }

    #[test]
    fn newer_side_wins() {
        assert_eq!(
            ConflictStrategy::Automatic.resolve(Some(at(10)), Some(at(9))),
            SyncDirection::AToB
        );
        assert_eq!(
            ConflictStrategy::Automatic.resolve(Some(at(9)), Some(at(10))),
            SyncDirection::BToA
        );
    }

    #[test]
    fn equal_instants_go_to_a() {
        assert_eq!(
            ConflictStrategy::Automatic.resolve(Some(at(12)), Some(at(12))),
            SyncDirection::AToB
        );
    }

    #[test]
    fn never_modified_b_is_not_newer() {
        assert_eq!(
            ConflictStrategy::Automatic.resolve(Some(at(1)), None),
            SyncDirection::AToB
        );
        assert_eq!(
            ConflictStrategy::Automatic.resolve(None, None),
            SyncDirection::AToB
        );
    }

    #[test]
    fn missing_a_instant_loses_to_modified_b() {
        assert_eq!(
            ConflictStrategy::Automatic.resolve(None, Some(at(1))),
            SyncDirection::BToA
        );
    }
}
