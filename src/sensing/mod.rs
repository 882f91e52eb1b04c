// Sensing: payload normalization
// Maps heterogeneous backend payloads into stable, always-complete readings.

pub mod reading;
pub mod family;
pub mod normalizer;
