//! HTTP interface for the tally poll ledger.
//!
//! Four endpoints over shared state: vote submission, the per-poll masked
//! results table, the popular-polls listing, and the recent-activity feed.
//! Every handler is an independent, stateless invocation; all coordination
//! lives in the store.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use server::{AppState, RpcServer};
