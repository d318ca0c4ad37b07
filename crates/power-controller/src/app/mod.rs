//! Application module
//!
//! Lifecycle of the daemon: building the services, running the controller task
//! and shutting down on SIGTERM/SIGINT.

pub mod builder;
pub mod core;
pub mod services;
pub mod tasks;

pub use builder::ApplicationBuilder;
pub use core::Application;
pub use services::ApplicationServices;
