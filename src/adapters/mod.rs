//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, JSON-RPC, file I/O). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `http`: paced, HMAC-authenticated REST client
//! - `venue`: REST order-book, perp, and swap venues
//! - `ledger`: JSON-RPC ledger client
//! - `signer`: external signing service client
//! - `notify`: log, webhook, and JSONL journal sinks
//! - `metrics`: Prometheus metrics export and health checks
//! - `paper`: in-memory exchange for dry runs

pub mod http;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod paper;
pub mod signer;
pub mod venue;
