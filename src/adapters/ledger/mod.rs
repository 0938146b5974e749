//! Ledger connections.

pub mod json_rpc;

pub use json_rpc::JsonRpcLedger;
