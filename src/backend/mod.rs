//! R backend lifecycle.
//!
//! This module finds the R interpreter and supervises the Plumber API
//! child process.

pub mod locator;
pub mod supervisor;

pub use supervisor::Supervisor;
