//! # nexstream-shared
//!
//! Value types and constants shared by the NexStream store and client
//! crates: the user identity handed out by the identity provider, and the
//! application-wide limits (query sizes, watch-history depth).

pub mod constants;
pub mod identity;

pub use identity::Identity;
