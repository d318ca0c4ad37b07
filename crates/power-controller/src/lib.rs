//! Power pod controller
//!
//! Watches pods that hold exclusive CPUs and keeps the per-profile
//! `PowerWorkload` records consumed by the node power agents in sync with them.

pub mod app;
pub mod config;
pub mod domain;
pub mod infrastructure;
