use crate::clock::{AccrualZone, elapsed_days};
use crate::core::Points;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const STARTING_POINTS: Points = Points::whole(20);
pub const DAILY_COST: Points = Points::whole(1);
pub const CHECK_IN_REWARD: Points = Points::whole(5);
pub const ACTIVATION_FEE: Points = Points::whole(1);
pub const CHECK_IN_COOLDOWN_HOURS: i64 = 24;
pub const PURGE_AFTER_DAYS: i64 = 30;
pub const LEADERBOARD_SIZE: usize = 50;

/// Per-handle entitlement record, stored under `account:<handle>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLedger {
    pub handle: String,
    pub points: Points,
    pub access_on: bool,
    /// Day boundary up to which daily costs have been deducted
    pub last_cost_applied_at: DateTime<Utc>,
    pub last_check_in_at: Option<DateTime<Utc>>,
    /// Drives the purge countdown; set only while access is off
    pub access_off_since: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AccountLedger {
    pub fn new(handle: &str, now: DateTime<Utc>, zone: AccrualZone) -> Self {
        Self {
            handle: handle.to_string(),
            points: STARTING_POINTS,
            access_on: true,
            last_cost_applied_at: zone.day_start(now),
            last_check_in_at: None,
            access_off_since: None,
            created_at: now,
        }
    }

    pub fn can_check_in(&self, now: DateTime<Utc>) -> bool {
        match self.last_check_in_at {
            None => true,
            Some(last) => now - last >= Duration::hours(CHECK_IN_COOLDOWN_HOURS),
        }
    }

    /// When the next check-in opens; `now` if the account never checked in.
    pub fn next_check_in_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_check_in_at {
            None => now,
            Some(last) => last + Duration::hours(CHECK_IN_COOLDOWN_HOURS),
        }
    }

    /// Whole accrual days since access was switched off; 0 while on.
    pub fn off_days(&self, now: DateTime<Utc>, zone: AccrualZone) -> i64 {
        match (self.access_on, self.access_off_since) {
            (false, Some(since)) => elapsed_days(zone.day_start(since), zone.day_start(now)).max(0),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatus {
    pub points: Points,
    pub access_on: bool,
    pub off_days: i64,
    pub can_check_in_today: bool,
    pub next_check_in_at: DateTime<Utc>,
    /// True only on the request that triggered the purge
    pub purged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInReceipt {
    pub points: Points,
    pub last_check_in_at: DateTime<Utc>,
    pub next_check_in_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessState {
    pub access_on: bool,
    pub points: Points,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemReceipt {
    pub points: Points,
    pub added_points: Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustAction {
    Add,
    Subtract,
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    NotLoggedIn,
    Banned,
    Off,
    NoPoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveAccess {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
}

impl EffectiveAccess {
    pub fn allowed() -> Self {
        Self { allowed: true, reason: None }
    }

    pub fn denied(reason: DenyReason) -> Self {
        Self { allowed: false, reason: Some(reason) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub handle: String,
    pub display_name: String,
    pub points: Points,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    pub total: usize,
    /// Caller's 1-based rank, even when outside the top entries
    pub my_rank: Option<usize>,
    pub my_points: Option<Points>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 15, 30, 0).unwrap();
        let ledger = AccountLedger::new("alice", now, AccrualZone::utc());
        assert_eq!(ledger.points, Points::whole(20));
        assert!(ledger.access_on);
        assert_eq!(ledger.last_cost_applied_at, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        assert!(ledger.can_check_in(now));
        assert_eq!(ledger.next_check_in_at(now), now);
    }

    #[test]
    fn test_cooldown_is_rolling() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 0).unwrap();
        let mut ledger = AccountLedger::new("alice", now, AccrualZone::utc());
        ledger.last_check_in_at = Some(now);
        // next calendar day, but only two minutes later
        assert!(!ledger.can_check_in(now + Duration::minutes(2)));
        assert!(ledger.can_check_in(now + Duration::hours(24)));
    }

    #[test]
    fn test_deny_reason_wire_names() {
        let json = serde_json::to_string(&EffectiveAccess::denied(DenyReason::NoPoints)).unwrap();
        assert_eq!(json, r#"{"allowed":false,"reason":"NO_POINTS"}"#);
        let json = serde_json::to_string(&EffectiveAccess::allowed()).unwrap();
        assert_eq!(json, r#"{"allowed":true}"#);
    }
}
