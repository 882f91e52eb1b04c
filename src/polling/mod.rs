pub mod commands;
pub mod poll_loop;
pub mod sink;
pub mod transport;
