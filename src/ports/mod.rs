//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the use-case layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `VenueAdapter`: order-book state and place/cancel/amend intents
//! - `PerpLeg`: one account on a perpetual-futures venue
//! - `SwapVenue`: routed swap quotes and intents
//! - `LedgerClient`: broadcast and confirmation polling
//! - `IntentSigner`: external signing service
//! - `Notifier`: fire-and-forget terminal events

pub mod ledger;
pub mod notifier;
pub mod perp;
pub mod signer;
pub mod swap;
pub mod venue;
