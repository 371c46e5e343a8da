//! Decision threshold calibration

mod threshold;

pub use threshold::{ThresholdChoice, ThresholdSweep};
