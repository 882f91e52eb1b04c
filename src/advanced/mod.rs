pub mod console;
pub mod control;
pub mod dashboard;
pub mod simulated;
