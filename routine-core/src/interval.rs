//! Half-open time intervals.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// Build an interval, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Result<Self, ValidationError> {
        Self::new(start, start + length)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Shared endpoints do not count as overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// True when `other` lies entirely inside `self`.
    pub fn encloses(&self, other: &TimeInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn can_fit(&self, length: Duration) -> bool {
        self.duration() >= length
    }

    /// Split off the leading `length`, returning the head and the leftover tail
    /// (`None` when the head fills the interval exactly).
    pub fn take_front(&self, length: Duration) -> Option<(TimeInterval, Option<TimeInterval>)> {
        if length <= Duration::zero() || !self.can_fit(length) {
            return None;
        }
        let head = TimeInterval {
            start: self.start,
            end: self.start + length,
        };
        let tail = (head.end < self.end).then_some(TimeInterval {
            start: head.end,
            end: self.end,
        });
        Some((head, tail))
    }
}

/// True iff `candidate` overlaps any interval in `others`.
pub fn overlaps_any<'a>(
    candidate: &TimeInterval,
    others: impl IntoIterator<Item = &'a TimeInterval>,
) -> bool {
    others.into_iter().any(|o| candidate.overlaps(o))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn iv(a: (u32, u32), b: (u32, u32)) -> TimeInterval {
        TimeInterval::new(at(a.0, a.1), at(b.0, b.1)).unwrap()
    }

    #[test]
    fn rejects_inverted_and_empty_ranges() {
        assert!(TimeInterval::new(at(10, 0), at(9, 0)).is_err());
        assert!(TimeInterval::new(at(10, 0), at(10, 0)).is_err());
    }

    #[test]
    fn shared_boundary_is_not_overlap() {
        let a = iv((9, 0), (10, 0));
        let b = iv((10, 0), (11, 0));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn partial_and_nested_overlap() {
        let a = iv((9, 0), (10, 0));
        assert!(a.overlaps(&iv((9, 30), (10, 30))));
        assert!(a.overlaps(&iv((9, 15), (9, 45))));
        assert!(iv((8, 0), (12, 0)).overlaps(&a));
    }

    #[test]
    fn take_front_exact_fill_leaves_no_tail() {
        let slot = iv((8, 0), (9, 0));
        let (head, tail) = slot.take_front(Duration::hours(1)).unwrap();
        assert_eq!(head, slot);
        assert!(tail.is_none());
    }

    #[test]
    fn take_front_too_long_is_none() {
        let slot = iv((8, 0), (9, 0));
        assert!(slot.take_front(Duration::minutes(61)).is_none());
        assert!(slot.take_front(Duration::zero()).is_none());
    }

    #[test]
    fn contains_is_half_open() {
        let a = iv((9, 0), (10, 0));
        assert!(a.contains(at(9, 0)));
        assert!(!a.contains(at(10, 0)));
    }
}
