//! Shared plumbing for the Tapline binaries.

pub mod common;
