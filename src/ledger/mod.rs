//! Account ledger: per-handle balance, access flag and the timestamps that
//! drive daily accrual, check-in cooldown and purge.

pub mod accrual;
pub mod leaderboard;
pub mod model;
pub mod service;

pub use model::{
    AccessState, AccountLedger, AdjustAction, CheckInReceipt, DenyReason, EffectiveAccess,
    Leaderboard, LeaderboardEntry, LedgerStatus, RedeemReceipt,
};
pub use service::{LedgerService, SettledLedger};
