//! # nexstream-client
//!
//! The NexStream client core: the view router, the subscription manager,
//! the optimistic mutation ledger, the watch history, the feed projection
//! and the single-task engine loop binding them together. The rendering
//! layer on top consumes [`EngineHandle`] and the notification stream;
//! nothing in this crate draws pixels.

pub mod engine;
pub mod history;
pub mod identity;
pub mod ledger;
pub mod projection;
pub mod router;
pub mod streams;

mod error;

pub use engine::{spawn_engine, EngineConfig, EngineHandle, EngineNotification};
pub use error::EngineError;
pub use identity::IdentityProvider;
pub use projection::Projection;
pub use router::{View, ViewKind, ViewParams};
pub use streams::StreamKey;

use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use nexstream_shared::constants::NOTIFICATION_CHANNEL_CAPACITY;
use nexstream_store::{spawn_store, StoreCommand};

/// A fully wired client session: store task, identity provider, engine.
pub struct Client {
    /// Command facade handed to the presentation layer.
    pub handle: EngineHandle,
    /// Engine notifications (projection changes, failures).
    pub notifications: mpsc::Receiver<EngineNotification>,
    /// The identity collaborator; sign in/out through this.
    pub identity: IdentityProvider,
    /// Direct store access, used by tooling and tests.
    pub store: mpsc::Sender<StoreCommand>,
}

impl Client {
    /// Spawn the store and engine tasks and wire them together.
    pub fn start(config: EngineConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let store = spawn_store(event_tx);
        let identity = IdentityProvider::new();
        let (handle, notifications) =
            spawn_engine(store.clone(), event_rx, identity.subscribe(), config);
        Self {
            handle,
            notifications,
            identity,
            store,
        }
    }
}

/// Initialise the tracing subscriber for binaries.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nexstream_client=debug,nexstream_store=debug,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
