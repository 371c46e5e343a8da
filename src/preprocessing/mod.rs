//! Data preprocessing module
//!
//! Column standardization shared by the unimodal trainer and the serving
//! path.

mod scaler;

pub use scaler::StandardScaler;
