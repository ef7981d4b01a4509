//! One-way status transitions for scrapers.
//!
//! Errors may push an `active` scraper to `degraded`. Nothing automatic
//! promotes a scraper back to `active` or into the operator-only states
//! (`broken`, `maintenance`, `development`).

use crate::models::ScraperStatus;

/// Something that happened to a scraper that may affect its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// An operation failed and the error was recorded.
    ErrorLogged,
    /// An operation succeeded.
    OperationSucceeded,
    /// An operator explicitly set the status.
    OperatorSet(ScraperStatus),
}

/// Compute the status following `event`.
pub fn next_status(current: ScraperStatus, event: StatusEvent) -> ScraperStatus {
    match (current, event) {
        (_, StatusEvent::OperatorSet(status)) => status,
        (ScraperStatus::Active, StatusEvent::ErrorLogged) => ScraperStatus::Degraded,
        (current, _) => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_degrades_active() {
        assert_eq!(
            next_status(ScraperStatus::Active, StatusEvent::ErrorLogged),
            ScraperStatus::Degraded
        );
    }

    #[test]
    fn test_error_leaves_other_states_alone() {
        for status in [
            ScraperStatus::Degraded,
            ScraperStatus::Maintenance,
            ScraperStatus::Broken,
            ScraperStatus::Development,
        ] {
            assert_eq!(next_status(status, StatusEvent::ErrorLogged), status);
        }
    }

    #[test]
    fn test_success_never_promotes() {
        for status in ScraperStatus::ALL {
            assert_eq!(next_status(status, StatusEvent::OperationSucceeded), status);
        }
    }

    #[test]
    fn test_operator_sets_any_state() {
        for from in ScraperStatus::ALL {
            for to in ScraperStatus::ALL {
                assert_eq!(next_status(from, StatusEvent::OperatorSet(to)), to);
            }
        }
    }
}
