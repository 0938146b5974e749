//! External signing services.

pub mod remote;

pub use remote::RemoteSigner;
