use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an election is in its lifecycle, derived from its window and the current instant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElectionStatus {
    /// Not open yet, or not fully scheduled.
    Scheduled,
    /// Accepting votes.
    Active,
    /// The window has ended.
    Closed,
}

impl ElectionStatus {
    /// Classify an election window at instant `now`.
    ///
    /// Both bounds are inclusive. An election with either bound unset is never active;
    /// it is closed only once a set end instant has passed.
    pub fn classify(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        match (start, end) {
            (_, Some(end)) if now > end => Self::Closed,
            (Some(start), Some(end)) if start <= now && now <= end => Self::Active,
            _ => Self::Scheduled,
        }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn classifies_window() {
        let (start, end) = (Some(t(0)), Some(t(100)));
        assert_eq!(ElectionStatus::classify(start, end, t(-1)), ElectionStatus::Scheduled);
        assert_eq!(ElectionStatus::classify(start, end, t(50)), ElectionStatus::Active);
        assert_eq!(ElectionStatus::classify(start, end, t(101)), ElectionStatus::Closed);
    }

    #[test]
    fn bounds_are_inclusive() {
        let (start, end) = (Some(t(0)), Some(t(100)));
        assert!(ElectionStatus::classify(start, end, t(0)).is_active());
        assert!(ElectionStatus::classify(start, end, t(100)).is_active());
        let just_after = t(100) + Duration::milliseconds(1);
        assert!(ElectionStatus::classify(start, end, just_after).is_closed());
    }

    #[test]
    fn unscheduled_is_never_active() {
        assert_eq!(ElectionStatus::classify(None, None, t(0)), ElectionStatus::Scheduled);
        assert_eq!(ElectionStatus::classify(Some(t(0)), None, t(50)), ElectionStatus::Scheduled);
        assert_eq!(ElectionStatus::classify(None, Some(t(100)), t(50)), ElectionStatus::Scheduled);
        // A passed end closes the election even without a start.
        assert_eq!(ElectionStatus::classify(None, Some(t(100)), t(150)), ElectionStatus::Closed);
    }
}
