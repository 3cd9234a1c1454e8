//! Small engine for tracking habits and counters. Every logged action is an event in an
//! append-only log split into one file per calendar month, and all counts, goals and day
//! histories are reconstructed from those events on demand.
//!

pub mod cli;
pub mod engine;
pub mod period;
pub mod storage;
pub mod utils;
