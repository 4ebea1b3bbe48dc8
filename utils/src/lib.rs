//! Shared utilities for the tally poll ledger.

pub mod logging;
pub mod text;

pub use logging::init_tracing;
pub use text::normalize;
