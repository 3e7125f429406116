//! # Domain Invariants
//!
//! Rules about sync progress that must always hold true.

use super::entities::SyncProgress;

/// Default number of concurrent sync workers.
pub const DEFAULT_POOL_SIZE: usize = 300;

/// Default cap on one node API response body (16 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Invariant: the run never starts above where it currently is.
pub fn invariant_starting_not_after_current(progress: &SyncProgress) -> bool {
    progress.starting_block <= progress.current_block
}

/// Invariant: a progress update never moves a watermark backwards.
pub fn invariant_monotonic(before: &SyncProgress, after: &SyncProgress) -> bool {
    after.current_block >= before.current_block && after.highest_block >= before.highest_block
}

/// Check every progress invariant across one update.
pub fn check_progress_update(before: &SyncProgress, after: &SyncProgress) -> bool {
    invariant_starting_not_after_current(after) && invariant_monotonic(before, after)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(starting: u64, current: u64, highest: u64) -> SyncProgress {
        SyncProgress {
            starting_block: starting,
            current_block: current,
            highest_block: highest,
        }
    }

    #[test]
    fn test_starting_after_current_is_violation() {
        assert!(!invariant_starting_not_after_current(&progress(5, 4, 9)));
        assert!(invariant_starting_not_after_current(&progress(4, 4, 9)));
    }

    #[test]
    fn test_monotonic_update() {
        assert!(invariant_monotonic(&progress(0, 2, 5), &progress(0, 3, 5)));
        assert!(!invariant_monotonic(&progress(0, 2, 5), &progress(0, 3, 4)));
        assert!(!invariant_monotonic(&progress(0, 2, 5), &progress(0, 1, 5)));
    }

    #[test]
    fn test_check_progress_update() {
        assert!(check_progress_update(&progress(0, 0, 0), &progress(0, 10, 10)));
        assert!(!check_progress_update(&progress(0, 5, 10), &progress(6, 5, 10)));
    }
}
