//! The `relay` binary's only `matrix-sdk`-aware module. Nothing outside
//! `matrix::` names a concrete SDK type; `relay_core` talks to this module
//! only through [`client::RelayMatrixClient`]'s narrow trait impl.

pub mod client;
pub mod credentials;

pub use client::RelayMatrixClient;
pub use credentials::Credentials;
