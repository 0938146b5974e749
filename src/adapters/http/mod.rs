//! Venue HTTP plumbing: request signing and the paced REST client.

pub mod auth;
pub mod client;

pub use auth::VenueAuth;
pub use client::{VenueClientConfig, VenueHttpClient};
