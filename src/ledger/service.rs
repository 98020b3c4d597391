use super::accrual;
use super::leaderboard;
use super::model::{
    ACTIVATION_FEE, AccessState, AccountLedger, AdjustAction, CHECK_IN_REWARD, CheckInReceipt,
    DenyReason, EffectiveAccess, LEADERBOARD_SIZE, Leaderboard, LedgerStatus, RedeemReceipt,
};
use crate::clock::{AccrualZone, Clock};
use crate::codec::keys::ACCOUNT_PREFIX;
use crate::codec::{account_key, normalize_handle};
use crate::codes::{CodeStore, RedeemCode};
use crate::core::{LedgerError, Points, Result};
use crate::purge::PurgeExecutor;
use crate::storage::{KeyedLocks, KvStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

/// A ledger with every outstanding daily cost applied.
#[derive(Debug, Clone)]
pub struct SettledLedger {
    pub ledger: AccountLedger,
    /// The settlement crossed the deactivation window and purged the account
    pub purged: bool,
}

/// The entitlement state machine.
///
/// Every public operation takes the handle's key lock, lazily creates the
/// record, settles daily costs (possibly purging), then applies its own
/// mutation and persists once.
pub struct LedgerService {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    zone: AccrualZone,
    locks: KeyedLocks,
    codes: Arc<CodeStore>,
    purger: Arc<PurgeExecutor>,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        zone: AccrualZone,
        locks: KeyedLocks,
        codes: Arc<CodeStore>,
        purger: Arc<PurgeExecutor>,
    ) -> Self {
        Self {
            store,
            clock,
            zone,
            locks,
            codes,
            purger,
        }
    }

    pub fn zone(&self) -> AccrualZone {
        self.zone
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn lock(&self, handle: &str) -> Result<OwnedMutexGuard<()>> {
        self.locks.lock(&account_key(handle)).await
    }

    async fn load(&self, handle: &str) -> Result<Option<AccountLedger>> {
        self.store.get_json(&account_key(handle)).await
    }

    async fn save(&self, ledger: &AccountLedger) -> Result<()> {
        self.store.set_json(&account_key(&ledger.handle), ledger).await
    }

    /// Caller must hold the handle's lock.
    async fn load_or_init(&self, handle: &str) -> Result<AccountLedger> {
        if let Some(ledger) = self.load(handle).await? {
            return Ok(ledger);
        }
        let ledger = AccountLedger::new(handle, self.clock.now(), self.zone);
        self.save(&ledger).await?;
        info!(handle, points = %ledger.points, "ledger initialised");
        Ok(ledger)
    }

    /// Caller must hold the handle's lock.
    async fn settle(&self, mut ledger: AccountLedger) -> Result<SettledLedger> {
        let now = self.clock.now();
        let outcome = accrual::apply_daily_costs(&mut ledger, now, self.zone);
        if outcome.days > 0 {
            debug!(handle = %ledger.handle, days = outcome.days, points = %ledger.points, "daily costs applied");
        }

        let mut purged = false;
        if outcome.purge_due {
            warn!(
                handle = %ledger.handle,
                off_since = ?ledger.access_off_since,
                "deactivation window elapsed, purging account"
            );
            self.purger.purge(&ledger.handle).await;
            accrual::reset_after_purge(&mut ledger, now, self.zone);
            purged = true;
        }

        if outcome.changed || purged {
            self.save(&ledger).await?;
        }
        Ok(SettledLedger { ledger, purged })
    }

    async fn load_settled(&self, handle: &str) -> Result<SettledLedger> {
        let ledger = self.load_or_init(handle).await?;
        self.settle(ledger).await
    }

    /// Existing record, or a freshly persisted default one. Does not settle.
    pub async fn get_or_init(&self, handle: &str) -> Result<AccountLedger> {
        let handle = normalize_handle(handle)?;
        let _guard = self.lock(&handle).await?;
        self.load_or_init(&handle).await
    }

    pub async fn apply_daily_costs(&self, handle: &str) -> Result<SettledLedger> {
        let handle = normalize_handle(handle)?;
        let _guard = self.lock(&handle).await?;
        self.load_settled(&handle).await
    }

    pub async fn status(&self, handle: &str) -> Result<LedgerStatus> {
        let settled = self.apply_daily_costs(handle).await?;
        let now = self.clock.now();
        let ledger = &settled.ledger;
        Ok(LedgerStatus {
            points: ledger.points,
            access_on: ledger.access_on,
            off_days: ledger.off_days(now, self.zone),
            can_check_in_today: ledger.can_check_in(now),
            next_check_in_at: ledger.next_check_in_at(now),
            purged: settled.purged,
        })
    }

    pub async fn check_in(&self, handle: &str) -> Result<CheckInReceipt> {
        let handle = normalize_handle(handle)?;
        let _guard = self.lock(&handle).await?;
        let mut ledger = self.load_settled(&handle).await?.ledger;
        let now = self.clock.now();

        if !ledger.can_check_in(now) {
            return Err(LedgerError::CheckInCooldown {
                next_check_in_at: ledger.next_check_in_at(now),
            });
        }

        ledger.points = ledger.points.saturating_add(CHECK_IN_REWARD);
        ledger.last_check_in_at = Some(now);
        self.save(&ledger).await?;
        info!(handle = %handle, points = %ledger.points, "checked in");

        Ok(CheckInReceipt {
            points: ledger.points,
            last_check_in_at: now,
            next_check_in_at: ledger.next_check_in_at(now),
        })
    }

    pub async fn toggle_access(&self, handle: &str, desired: bool) -> Result<AccessState> {
        let handle = normalize_handle(handle)?;
        let _guard = self.lock(&handle).await?;
        let mut ledger = self.load_settled(&handle).await?.ledger;

        if ledger.access_on == desired {
            return Ok(AccessState {
                access_on: ledger.access_on,
                points: ledger.points,
            });
        }

        if desired {
            if ledger.points.is_zero() {
                return Err(LedgerError::InsufficientPoints {
                    available: ledger.points.as_f64(),
                    required: ACTIVATION_FEE.as_f64(),
                });
            }
            ledger.points = ledger.points.saturating_sub(ACTIVATION_FEE);
            ledger.access_on = true;
            ledger.access_off_since = None;
        } else {
            ledger.access_on = false;
            ledger.access_off_since = Some(self.clock.now());
        }
        self.save(&ledger).await?;
        info!(handle = %handle, access_on = ledger.access_on, points = %ledger.points, "access toggled");

        Ok(AccessState {
            access_on: ledger.access_on,
            points: ledger.points,
        })
    }

    /// Consumes a redeem code and credits its value.
    ///
    /// The code is marked used before the ledger is credited; a storage failure
    /// between the two writes leaves a consumed code without credit, which is
    /// logged for manual repair.
    pub async fn redeem(&self, handle: &str, code: &str) -> Result<RedeemReceipt> {
        let handle = normalize_handle(handle)?;
        let redeemed = self.codes.mark_used::<RedeemCode>(code, &handle).await?;
        let added = Points::whole(redeemed.points as u64);

        let credited = async {
            let _guard = self.lock(&handle).await?;
            let mut ledger = self.load_settled(&handle).await?.ledger;
            ledger.points = ledger.points.saturating_add(added);
            self.save(&ledger).await?;
            Ok::<_, LedgerError>(ledger.points)
        }
        .await;

        match credited {
            Ok(points) => {
                info!(handle = %handle, code = %redeemed.code, added = %added, "code redeemed");
                Ok(RedeemReceipt {
                    points,
                    added_points: added,
                })
            }
            Err(err) => {
                error!(handle = %handle, code = %redeemed.code, error = %err, "code consumed but credit failed");
                Err(err)
            }
        }
    }

    /// Direct balance override; bypasses daily-cost timing.
    pub async fn admin_adjust(&self, handle: &str, action: AdjustAction, amount: f64) -> Result<Points> {
        let amount = Points::parse_amount(amount)?;
        let handle = normalize_handle(handle)?;
        let _guard = self.lock(&handle).await?;
        let mut ledger = self.load_or_init(&handle).await?;

        let before = ledger.points;
        ledger.points = match action {
            AdjustAction::Add => ledger.points.saturating_add(amount),
            AdjustAction::Subtract => ledger.points.saturating_sub(amount),
            AdjustAction::Set => amount,
        };
        self.save(&ledger).await?;
        info!(handle = %handle, ?action, %amount, %before, after = %ledger.points, "points adjusted by admin");
        Ok(ledger.points)
    }

    /// Gate for the main experience; `None` means not logged in.
    pub async fn effective_access(&self, handle: Option<&str>) -> Result<EffectiveAccess> {
        let Some(handle) = handle else {
            return Ok(EffectiveAccess::denied(DenyReason::NotLoggedIn));
        };
        let ledger = self.apply_daily_costs(handle).await?.ledger;
        if !ledger.access_on {
            return Ok(EffectiveAccess::denied(DenyReason::Off));
        }
        if ledger.points.is_zero() {
            return Ok(EffectiveAccess::denied(DenyReason::NoPoints));
        }
        Ok(EffectiveAccess::allowed())
    }

    /// Overwrites the record with a fresh default ledger.
    pub async fn reset(&self, handle: &str) -> Result<AccountLedger> {
        let handle = normalize_handle(handle)?;
        let _guard = self.lock(&handle).await?;
        let ledger = AccountLedger::new(&handle, self.clock.now(), self.zone);
        self.save(&ledger).await?;
        Ok(ledger)
    }

    pub async fn remove(&self, handle: &str) -> Result<bool> {
        let handle = normalize_handle(handle)?;
        let _guard = self.lock(&handle).await?;
        self.store.delete(&account_key(&handle)).await
    }

    /// Read-only view with outstanding costs applied in memory; never persists
    /// and never purges.
    pub async fn projected(&self, handle: &str) -> Result<Option<AccountLedger>> {
        let handle = normalize_handle(handle)?;
        Ok(self.load(&handle).await?.map(|ledger| self.project(ledger)))
    }

    fn project(&self, mut ledger: AccountLedger) -> AccountLedger {
        accrual::apply_daily_costs(&mut ledger, self.clock.now(), self.zone);
        ledger
    }

    /// Ranks the `eligible` handles (handle → display name). The caller's own
    /// ledger is settled first; everyone else is projected read-only.
    pub async fn leaderboard(&self, caller: &str, eligible: &HashMap<String, String>) -> Result<Leaderboard> {
        let caller = normalize_handle(caller)?;
        let own = self.apply_daily_costs(&caller).await?.ledger;

        let mut rows = Vec::with_capacity(eligible.len());
        for (_, ledger) in self.store.scan_json::<AccountLedger>(ACCOUNT_PREFIX).await? {
            let Some(display_name) = eligible.get(&ledger.handle) else {
                continue;
            };
            let points = if ledger.handle == caller {
                own.points
            } else {
                self.project(ledger.clone()).points
            };
            rows.push((ledger.handle, display_name.clone(), points));
        }

        Ok(leaderboard::rank(rows, Some(&caller), LEADERBOARD_SIZE))
    }
}
