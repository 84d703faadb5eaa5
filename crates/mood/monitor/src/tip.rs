//! Self-care tip selection for the author of an entry.

use crate::config::TipPolicy;
use crate::streak::compute_streak;
use mood_types::{TimelineEntry, TipDecision};

/// Decide whether the newest entry of `window` earns a tip.
///
/// `consecutive_days` carries the exact streak length while `tip_code` only
/// names the tier (`RED_3`, `RED_5`, ...). Tiers are the policy thresholds.
pub fn decide_tip(window: &[TimelineEntry], policy: &TipPolicy) -> TipDecision {
    let window = &window[..window.len().min(policy.window_days)];
    let streak = compute_streak(window);

    let Some(area) = streak.area else {
        return TipDecision::hidden();
    };
    if streak.length < policy.show_threshold {
        return TipDecision::hidden();
    }

    let tier = if streak.length >= policy.high_tier_threshold {
        policy.high_tier_threshold
    } else {
        policy.show_threshold
    };

    TipDecision {
        show: true,
        area: Some(area),
        consecutive_days: Some(streak.length),
        tip_code: Some(format!("{}_{}", area.code(), tier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use mood_types::{Area, EntryId};

    fn run(area: Area, days: i64) -> Vec<TimelineEntry> {
        let newest = NaiveDate::from_ymd_opt(2025, 2, 10).unwrap();
        (0..days)
            .map(|i| {
                TimelineEntry::new(
                    EntryId::new(format!("e-{i}")),
                    newest - Duration::days(i),
                    Some(area),
                )
            })
            .collect()
    }

    #[test]
    fn two_days_show_nothing() {
        let tip = decide_tip(&run(Area::Red, 2), &TipPolicy::default());
        assert_eq!(tip, TipDecision::hidden());
    }

    #[test]
    fn three_days_use_the_low_tier() {
        let tip = decide_tip(&run(Area::Red, 3), &TipPolicy::default());
        assert!(tip.show);
        assert_eq!(tip.area, Some(Area::Red));
        assert_eq!(tip.consecutive_days, Some(3));
        assert_eq!(tip.tip_code.as_deref(), Some("RED_3"));
    }

    #[test]
    fn high_tier_code_saturates_but_days_do_not() {
        let five = decide_tip(&run(Area::Red, 5), &TipPolicy::default());
        assert_eq!(five.tip_code.as_deref(), Some("RED_5"));
        assert_eq!(five.consecutive_days, Some(5));

        let six = decide_tip(&run(Area::Red, 6), &TipPolicy::default());
        assert_eq!(six.tip_code.as_deref(), Some("RED_5"));
        assert_eq!(six.consecutive_days, Some(6));
    }

    #[test]
    fn window_caps_the_reported_length() {
        let tip = decide_tip(&run(Area::Green, 12), &TipPolicy::default());
        assert_eq!(tip.consecutive_days, Some(7));
        assert_eq!(tip.tip_code.as_deref(), Some("GREEN_5"));
    }
}
