pub mod config;
pub mod recorder;
pub mod series;
