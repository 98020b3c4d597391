pub mod engine;
pub mod locks;
pub mod memory;
pub mod persistence;

pub use engine::KvStore;
pub use locks::KeyedLocks;
pub use memory::MemoryKvStore;
pub use persistence::{DurabilityMode, FileKvStore};
