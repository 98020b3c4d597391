pub mod gate;

pub use gate::{PointGate, PointGateBuilder};
