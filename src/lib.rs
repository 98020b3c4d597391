// ============================================================================
// PointGate Library
// ============================================================================

//! Point-based entitlement service: every account holds a balance that
//! drains by one point per day while access is on, is topped up by daily
//! check-ins and redeem codes, and is purged after thirty days switched off.
//!
//! ```
//! use pointgate::PointGate;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> pointgate::Result<()> {
//! let gate = PointGate::in_memory();
//! let status = gate.ledger().status("alice").await?;
//! assert_eq!(status.points.as_f64(), 20.0);
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod clock;
pub mod codec;
pub mod codes;
pub mod config;
pub mod core;
pub mod facade;
pub mod identity;
pub mod ledger;
pub mod purge;
pub mod storage;
pub mod web;

pub use crate::core::{ErrorKind, LedgerError, Points, Result};
pub use admin::{AdminConsole, AdminCredentials};
pub use clock::{AccrualZone, Clock, ManualClock, SystemClock};
pub use facade::PointGate;
pub use storage::{FileKvStore, KvStore, MemoryKvStore};
