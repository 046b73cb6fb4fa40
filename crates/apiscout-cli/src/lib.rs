//! `apiscout` crate (library surface).
//!
//! The primary entrypoint for end users is the `apiscout` binary. This
//! library module exists to support embedding and to provide a stable way
//! to reuse the core types and engine without depending on internal crate
//! layout.

pub use apiscout_core as core;
pub use apiscout_engine as engine;
