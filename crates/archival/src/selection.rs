//! Choice of the snapshots that make up a run's covered data.

use std::collections::HashSet;

use storm_common::FetchLog;

/// Most recent successful, archived log per requirement name.
///
/// Logs are stably sorted by date descending and the first occurrence of
/// each requirement name is kept, so equal dates resolve to the earlier
/// log in `logs`.
pub fn select_latest_snapshots(logs: &[FetchLog]) -> Vec<FetchLog> {
    let mut candidates: Vec<&FetchLog> = logs
        .iter()
        .filter(|log| log.success && log.is_archived())
        .collect();
    candidates.sort_by(|a, b| b.date.cmp(&a.date));

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|log| seen.insert(log.requirement_name.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::fixtures::{self, day};

    #[test]
    fn test_latest_success_per_category_wins() {
        let storm = fixtures::storm();
        let winds = fixtures::requirement_with_id(&storm, 1, "Winds");
        let waves = fixtures::requirement_with_id(&storm, 2, "Waves");

        let logs = vec![
            fixtures::fetch_log(1, &winds, day(2020, 1, 1), true, "a/Winds-2020-01-01.tgz"),
            fixtures::fetch_log(2, &winds, day(2020, 1, 3), true, "a/Winds-2020-01-03.tgz"),
            fixtures::fetch_log(3, &winds, day(2020, 1, 4), false, ""),
            fixtures::fetch_log(4, &waves, day(2020, 1, 2), true, "a/Waves-2020-01-02.tgz"),
            fixtures::fetch_log(5, &waves, day(2020, 1, 5), true, ""),
        ];

        let selected: Vec<i64> = select_latest_snapshots(&logs).iter().map(|l| l.id).collect();
        assert_eq!(selected, vec![2, 4]);
    }

    #[test]
    fn test_ties_keep_first_log() {
        let storm = fixtures::storm();
        let winds = fixtures::requirement(&storm, "Winds");
        let logs = vec![
            fixtures::fetch_log(7, &winds, day(2020, 1, 3), true, "a/one.tgz"),
            fixtures::fetch_log(8, &winds, day(2020, 1, 3), true, "a/two.tgz"),
        ];
        assert_eq!(select_latest_snapshots(&logs)[0].id, 7);
    }

    #[test]
    fn test_no_successful_logs_selects_nothing() {
        let storm = fixtures::storm();
        let winds = fixtures::requirement(&storm, "Winds");
        let logs = vec![fixtures::fetch_log(1, &winds, day(2020, 1, 1), false, "")];
        assert!(select_latest_snapshots(&logs).is_empty());
    }
}
