pub mod advisory;
pub mod api;
pub mod board;
pub mod clock;
pub mod config;
pub mod error;
pub mod line;
pub mod runtime;
pub mod schedule;
pub mod state;
