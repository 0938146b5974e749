//! Use Cases Layer - Application Logic Orchestration
//!
//! Orchestrates domain logic via ports (traits). Contains the session
//! loop, the reconciliation engine, the paired-leg coordinator, the
//! swap rotation, and the transaction submitter they all share.
//!
//! Use cases depend on domain types and port traits only,
//! never on concrete adapters (hexagonal architecture).

pub mod coordinator;
pub mod engine;
pub mod retry;
pub mod rotation;
pub mod scheduler;
pub mod session;
pub mod submitter;
