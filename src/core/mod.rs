pub mod error;
pub mod points;

pub use error::{ErrorKind, LedgerError, Result};
pub use points::Points;
