//! Same-area streak detection over a newest-first timeline window.

use mood_types::{StreakResult, TimelineEntry};

/// Length and area of the run of calendar-contiguous, same-area days that
/// ends at `window[0]`.
///
/// The window must already be ordered newest-first; it is never re-sorted.
/// The run stops at the first date gap, area change or unclassified entry.
pub fn compute_streak(window: &[TimelineEntry]) -> StreakResult {
    let Some(newest) = window.first() else {
        return StreakResult::empty();
    };
    let Some(base) = newest.area else {
        return StreakResult::empty();
    };

    let mut length = 1u32;
    for pair in window.windows(2) {
        let (later, earlier) = (&pair[0], &pair[1]);
        if later.entry_date.pred_opt() != Some(earlier.entry_date) {
            break;
        }
        if earlier.area != Some(base) {
            break;
        }
        length += 1;
    }

    StreakResult {
        area: Some(base),
        length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use mood_types::{Area, EntryId};
    use proptest::prelude::*;

    fn on(date: &str, area: Option<Area>) -> TimelineEntry {
        let entry_date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        TimelineEntry::new(EntryId::new(format!("e-{date}")), entry_date, area)
    }

    #[test]
    fn empty_window_has_no_streak() {
        assert_eq!(compute_streak(&[]), StreakResult::empty());
    }

    #[test]
    fn unclassified_newest_entry_has_no_streak() {
        let window = vec![on("2025-01-05", None), on("2025-01-04", Some(Area::Red))];
        let streak = compute_streak(&window);
        assert_eq!(streak.area, None);
        assert_eq!(streak.length, 0);
    }

    #[test]
    fn streak_stops_at_date_gap() {
        let window = vec![
            on("2025-01-05", Some(Area::Red)),
            on("2025-01-04", Some(Area::Red)),
            on("2025-01-03", Some(Area::Red)),
            on("2025-01-01", Some(Area::Red)),
        ];
        assert_eq!(
            compute_streak(&window),
            StreakResult {
                area: Some(Area::Red),
                length: 3
            }
        );
    }

    #[test]
    fn streak_stops_at_area_change_and_missing_area() {
        let changed = vec![
            on("2025-01-05", Some(Area::Blue)),
            on("2025-01-04", Some(Area::Blue)),
            on("2025-01-03", Some(Area::Green)),
            on("2025-01-02", Some(Area::Blue)),
        ];
        assert_eq!(compute_streak(&changed).length, 2);

        let missing = vec![
            on("2025-01-05", Some(Area::Blue)),
            on("2025-01-04", None),
            on("2025-01-03", Some(Area::Blue)),
        ];
        assert_eq!(compute_streak(&missing).length, 1);
    }

    #[test]
    fn calendar_edges_do_not_overflow() {
        let last = TimelineEntry::new(EntryId::new("e-max"), NaiveDate::MAX, Some(Area::Red));
        let duplicate = vec![last.clone(), last.clone()];
        assert_eq!(compute_streak(&duplicate).length, 1);

        let first = TimelineEntry::new(EntryId::new("e-min"), NaiveDate::MIN, Some(Area::Red));
        let edges = vec![first, last];
        assert_eq!(compute_streak(&edges).length, 1);

        let eve = TimelineEntry::new(
            EntryId::new("e-eve"),
            NaiveDate::MAX.pred_opt().unwrap(),
            Some(Area::Red),
        );
        let closing = vec![
            TimelineEntry::new(EntryId::new("e-max"), NaiveDate::MAX, Some(Area::Red)),
            eve,
        ];
        assert_eq!(compute_streak(&closing).length, 2);
    }

    #[test]
    fn input_order_is_authoritative() {
        // Oldest-first input is not silently re-sorted.
        let window = vec![
            on("2025-01-01", Some(Area::Red)),
            on("2025-01-02", Some(Area::Red)),
        ];
        assert_eq!(compute_streak(&window).length, 1);
    }

    fn arb_window() -> impl Strategy<Value = Vec<TimelineEntry>> {
        let area = prop_oneof![
            Just(None),
            Just(Some(Area::Red)),
            Just(Some(Area::Yellow)),
            Just(Some(Area::Blue)),
            Just(Some(Area::Green)),
        ];
        prop::collection::vec((0i64..3, area), 0..10).prop_map(|steps| {
            let mut date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (gap, area))| {
                    date -= Duration::days(gap);
                    TimelineEntry::new(EntryId::new(format!("e-{i}")), date, area)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn streak_is_deterministic_and_bounded(window in arb_window()) {
            let first = compute_streak(&window);
            let second = compute_streak(&window);
            prop_assert_eq!(first, second);
            prop_assert!(first.length as usize <= window.len());
            prop_assert_eq!(first.length == 0, first.area.is_none());
        }
    }
}
