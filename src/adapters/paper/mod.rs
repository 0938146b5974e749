//! In-memory paper exchange for dry runs and tests.

pub mod exchange;

pub use exchange::{LedgerMode, PaperExchange, PaperInstruction, PaperPerpLeg, PaperTx};
