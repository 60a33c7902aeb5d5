//! Effective-date handling for versioned rules
//!
//! A rule is only considered while the evaluation instant lies inside its
//! effective window. Both bounds are inclusive and either may be open.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid window: start {start} is after end {end}")]
    InvalidWindow {
        start: String,
        end: String,
    },
}

/// The period during which a rule version applies.
///
/// `None` on either side means the window is unbounded in that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EffectiveWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl EffectiveWindow {
    /// Creates a window, rejecting one whose start is after its end
    pub fn new(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Self, TemporalError> {
        if let (Some(start), Some(end)) = (from, to) {
            if start > end {
                return Err(TemporalError::InvalidWindow {
                    start: start.to_rfc3339(),
                    end: end.to_rfc3339(),
                });
            }
        }
        Ok(Self { from, to })
    }

    /// A window open on both sides
    pub fn always() -> Self {
        Self { from: None, to: None }
    }

    pub fn starting(from: DateTime<Utc>) -> Self {
        Self { from: Some(from), to: None }
    }

    pub fn until(to: DateTime<Utc>) -> Self {
        Self { from: None, to: Some(to) }
    }

    pub fn bounded(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, TemporalError> {
        Self::new(Some(from), Some(to))
    }

    /// Returns true if `instant` lies within `[from, to]`
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from.map_or(true, |start| instant >= start)
            && self.to.map_or(true, |end| instant <= end)
    }

    /// Returns true if the window closed strictly before `instant`
    pub fn has_expired(&self, instant: DateTime<Utc>) -> bool {
        self.to.map_or(false, |end| end < instant)
    }

    /// Returns true if the window has not opened yet at `instant`
    pub fn is_pending(&self, instant: DateTime<Utc>) -> bool {
        self.from.map_or(false, |start| start > instant)
    }

    pub fn overlaps(&self, other: &EffectiveWindow) -> bool {
        let self_start = self.from.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let self_end = self.to.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let other_start = other.from.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let other_end = other.to.unwrap_or(DateTime::<Utc>::MAX_UTC);

        self_start <= other_end && other_start <= self_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let window = EffectiveWindow::bounded(at(1), at(10)).unwrap();
        assert!(window.contains(at(1)));
        assert!(window.contains(at(10)));
        assert!(!window.contains(at(10) + Duration::seconds(1)));
        assert!(!window.contains(at(1) - Duration::seconds(1)));
    }

    #[test]
    fn test_open_bounds_are_unbounded() {
        let window = EffectiveWindow::always();
        assert!(window.contains(DateTime::<Utc>::MIN_UTC));
        assert!(window.contains(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_inverted_window_rejected() {
        assert!(EffectiveWindow::bounded(at(10), at(1)).is_err());
    }

    #[test]
    fn test_expiry_and_pending() {
        let window = EffectiveWindow::bounded(at(5), at(10)).unwrap();
        assert!(window.is_pending(at(4)));
        assert!(window.has_expired(at(11)));
        assert!(!window.has_expired(at(10)));
    }
}
