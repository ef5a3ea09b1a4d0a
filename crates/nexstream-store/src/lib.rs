//! # nexstream-store
//!
//! The remote document store the NexStream client talks to.
//!
//! The store holds loosely typed JSON documents grouped in named
//! collections and supports ordered, filtered, limited queries with push
//! subscriptions: every change to a collection re-evaluates the open
//! queries and delivers a fresh snapshot to each subscriber. Writes and
//! atomic counter increments are fire-and-forget commands whose
//! completions come back on the same event channel as the snapshots, so a
//! consumer never blocks on a round-trip.
//!
//! The crate also owns the typed domain models ([`VideoRecord`],
//! [`CommentRecord`]) and the fail-closed decoding from raw documents into
//! them. Real persistence and the wire protocol are out of scope; the
//! in-memory implementation in [`memory`] carries the contractual
//! semantics.

pub mod memory;
pub mod models;
pub mod query;

mod error;

pub use error::StoreError;
pub use memory::{spawn_store, RequestId, StoreCommand, StoreEvent, SubscriptionId};
pub use models::{CommentRecord, Document, VideoDraft, VideoRecord};
pub use query::{Direction, Filter, Query};
