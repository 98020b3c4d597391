use super::model::{AccountLedger, DAILY_COST, PURGE_AFTER_DAYS};
use crate::clock::{AccrualZone, elapsed_days};
use crate::core::Points;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccrualOutcome {
    /// Whole days charged by this call
    pub days: i64,
    /// The record was modified and must be persisted
    pub changed: bool,
    /// The 30-day deactivation window has elapsed
    pub purge_due: bool,
}

/// Deducts every outstanding daily cost exactly once.
///
/// Cost is O(1) regardless of how many days elapsed, and a second call with no
/// new day boundary crossed is a no-op.
pub fn apply_daily_costs(ledger: &mut AccountLedger, now: DateTime<Utc>, zone: AccrualZone) -> AccrualOutcome {
    let today = zone.day_start(now);
    let days = elapsed_days(ledger.last_cost_applied_at, today);
    let mut outcome = AccrualOutcome::default();

    if days <= 0 {
        if ledger.last_cost_applied_at > today {
            ledger.last_cost_applied_at = today;
            outcome.changed = true;
        }
    } else {
        if ledger.access_on {
            let cost = Points::from_half_units(DAILY_COST.half_units().saturating_mul(days as u64));
            ledger.points = ledger.points.saturating_sub(cost);
        }
        // advance by exactly `days` x 24h, not to `today`; after a DST change in a
        // server-local zone the stamp sits an hour off local midnight
        ledger.last_cost_applied_at += Duration::days(days);
        outcome.days = days;
        outcome.changed = true;
    }

    outcome.purge_due = purge_due(ledger, now);
    outcome
}

pub fn purge_due(ledger: &AccountLedger, now: DateTime<Utc>) -> bool {
    !ledger.access_on
        && ledger
            .access_off_since
            .is_some_and(|since| now - since >= Duration::days(PURGE_AFTER_DAYS))
}

/// Zeroed, deactivated state left behind after a purge. The countdown restarts
/// today, so the next access does not purge again.
pub fn reset_after_purge(ledger: &mut AccountLedger, now: DateTime<Utc>, zone: AccrualZone) {
    let today = zone.day_start(now);
    ledger.points = Points::ZERO;
    ledger.access_on = false;
    ledger.access_off_since = Some(today);
    ledger.last_cost_applied_at = today;
    ledger.last_check_in_at = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_idempotent_within_a_day() {
        let zone = AccrualZone::utc();
        let mut ledger = AccountLedger::new("a", day(1, 9), zone);
        let first = apply_daily_costs(&mut ledger, day(4, 10), zone);
        assert_eq!(first.days, 3);
        let snapshot = ledger.clone();

        let again = apply_daily_costs(&mut ledger, day(4, 23), zone);
        assert!(!again.changed);
        assert_eq!(ledger, snapshot);
    }

    #[test]
    fn test_rate_depends_on_access() {
        let zone = AccrualZone::utc();
        for days in 0..40u32 {
            let mut on = AccountLedger::new("on", day(1, 0), zone);
            let mut off = on.clone();
            off.access_on = false;
            let now = day(1, 12) + Duration::days(days as i64);

            apply_daily_costs(&mut on, now, zone);
            apply_daily_costs(&mut off, now, zone);

            let expected = Points::whole(20).saturating_sub(Points::whole(days as u64));
            assert_eq!(on.points, expected, "days={days}");
            assert_eq!(off.points, Points::whole(20), "days={days}");
        }
    }

    #[test]
    fn test_half_point_balance_clamps() {
        let zone = AccrualZone::utc();
        let mut ledger = AccountLedger::new("a", day(1, 0), zone);
        ledger.points = Points::from_half_units(3);
        apply_daily_costs(&mut ledger, day(3, 0), zone);
        assert_eq!(ledger.points, Points::ZERO);
    }

    #[test]
    fn test_future_high_water_mark_is_clamped() {
        let zone = AccrualZone::utc();
        let mut ledger = AccountLedger::new("a", day(10, 0), zone);
        let outcome = apply_daily_costs(&mut ledger, day(5, 12), zone);
        assert!(outcome.changed);
        assert_eq!(outcome.days, 0);
        assert_eq!(ledger.last_cost_applied_at, day(5, 0));
        assert_eq!(ledger.points, Points::whole(20));
    }

    #[test]
    fn test_purge_due_after_thirty_days_off() {
        let zone = AccrualZone::utc();
        let mut ledger = AccountLedger::new("a", day(1, 8), zone);
        ledger.access_on = false;
        ledger.access_off_since = Some(day(1, 8));

        assert!(!apply_daily_costs(&mut ledger, day(1, 8) + Duration::days(30) - Duration::seconds(1), zone).purge_due);
        assert!(apply_daily_costs(&mut ledger, day(1, 8) + Duration::days(30), zone).purge_due);

        let now = day(1, 8) + Duration::days(30);
        reset_after_purge(&mut ledger, now, zone);
        assert!(!purge_due(&ledger, now));
        assert_eq!(ledger.access_off_since, Some(zone.day_start(now)));
    }
}
