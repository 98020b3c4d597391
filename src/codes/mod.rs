//! Redemption code subsystem: invite codes gate registration, redeem codes
//! top up a ledger. Both share the same one-time-consumption contract.

pub mod generator;
pub mod model;
pub mod store;

pub use model::{CodeKind, CodeRecord, InviteCode, RedeemCode};
pub use store::CodeStore;
