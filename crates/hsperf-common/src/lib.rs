//! # hsperf common
//!
//! Error types and shared domain types used by every hsperf crate.
//!
//! The measurement harness supervises four long-running processes. Each of
//! them is identified by a [`Role`], and every fallible operation in the
//! workspace reports failures through [`Error`]. Every long-running loop
//! polls the process-wide [`Shutdown`] signal instead of sleeping blindly.

pub mod errors;
pub mod shutdown;
pub mod types;

pub use errors::{Error, Result, ResultExt};
pub use shutdown::Shutdown;
pub use types::{Role, Side};
