//! In-memory push store with the tokio mpsc command/event pattern.
//!
//! The store runs in a dedicated tokio task. Consumers send typed
//! [`StoreCommand`]s in and receive [`StoreEvent`]s out; snapshots and
//! write completions share the one event channel, so the consumer side
//! stays a single event loop with no inline awaits on store round-trips.
//!
//! Subscription ids are chosen by the caller. That keeps snapshot routing
//! on the consumer side a plain table lookup and makes the
//! cancelled-subscription race trivial to resolve: an event carrying an id
//! the consumer no longer tracks is dropped.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use nexstream_shared::constants::{COMMAND_CHANNEL_CAPACITY, COMMENTS_COLLECTION, VIDEOS_COLLECTION};

use crate::error::StoreError;
use crate::models::{Document, FIELD_CREATED_AT, FIELD_ID};
use crate::query::Query;

/// Caller-assigned identifier of one open subscription.
pub type SubscriptionId = u64;

/// Caller-assigned identifier correlating a write with its completion.
pub type RequestId = u64;

/// Commands sent *into* the store task.
#[derive(Debug)]
pub enum StoreCommand {
    /// Open a push subscription for `query` under the caller's `id`.
    /// The current snapshot is delivered immediately, then again on every
    /// matching change.
    Subscribe { id: SubscriptionId, query: Query },
    /// Close a subscription. Unknown ids are ignored.
    Cancel { id: SubscriptionId },
    /// Append a new document to `collection`. The store assigns `id` and
    /// `created_at` and reports the outcome as a `WriteCompleted` event.
    Write {
        request: RequestId,
        collection: String,
        document: Document,
    },
    /// Atomically add `delta` to an integer field of one document.
    Increment {
        request: RequestId,
        collection: String,
        id: Uuid,
        field: String,
        delta: i64,
    },
    /// Report the number of currently open subscriptions.
    SubscriptionCount(oneshot::Sender<usize>),
    /// Gracefully shut down the store task.
    Shutdown,
}

/// Events sent *from* the store task to the consumer.
#[derive(Debug)]
pub enum StoreEvent {
    /// A fresh evaluation of one subscription's query.
    Snapshot {
        subscription: SubscriptionId,
        documents: Vec<Document>,
    },
    /// The subscription could not be opened; it is not live.
    SubscriptionFailed {
        subscription: SubscriptionId,
        error: StoreError,
    },
    /// Outcome of a `Write` command.
    WriteCompleted {
        request: RequestId,
        result: Result<Uuid, StoreError>,
    },
    /// Outcome of an `Increment` command.
    IncrementCompleted {
        request: RequestId,
        result: Result<(), StoreError>,
    },
}

/// Spawn the in-memory store in a background tokio task.
///
/// `event_tx` is the consumer's event channel; every snapshot and write
/// completion is delivered on it. Returns the command sender.
pub fn spawn_store(event_tx: mpsc::Sender<StoreEvent>) -> mpsc::Sender<StoreCommand> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<StoreCommand>(COMMAND_CHANNEL_CAPACITY);
    tokio::spawn(run_store(cmd_rx, event_tx));
    cmd_tx
}

async fn run_store(mut cmd_rx: mpsc::Receiver<StoreCommand>, event_tx: mpsc::Sender<StoreEvent>) {
    let mut store = MemoryStore::new();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            StoreCommand::Subscribe { id, query } => {
                match store.subscribe(id, query) {
                    Ok(documents) => {
                        debug!(subscription = id, "Subscription opened");
                        if event_tx
                            .send(StoreEvent::Snapshot {
                                subscription: id,
                                documents,
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(subscription = id, error = %error, "Subscription rejected");
                        if event_tx
                            .send(StoreEvent::SubscriptionFailed {
                                subscription: id,
                                error,
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }

            StoreCommand::Cancel { id } => {
                store.cancel(id);
                debug!(subscription = id, "Subscription cancelled");
            }

            StoreCommand::Write {
                request,
                collection,
                document,
            } => {
                let result = store.write(&collection, document);
                let changed = result.is_ok();
                if event_tx
                    .send(StoreEvent::WriteCompleted { request, result })
                    .await
                    .is_err()
                {
                    break;
                }
                if changed && push_snapshots(&store, &collection, &event_tx).await.is_err() {
                    break;
                }
            }

            StoreCommand::Increment {
                request,
                collection,
                id,
                field,
                delta,
            } => {
                let result = store.increment(&collection, id, &field, delta);
                let changed = result.is_ok();
                if event_tx
                    .send(StoreEvent::IncrementCompleted { request, result })
                    .await
                    .is_err()
                {
                    break;
                }
                if changed && push_snapshots(&store, &collection, &event_tx).await.is_err() {
                    break;
                }
            }

            StoreCommand::SubscriptionCount(reply) => {
                let _ = reply.send(store.subscriptions.len());
            }

            StoreCommand::Shutdown => {
                info!("Store shutdown requested");
                break;
            }
        }
    }

    info!("Store task terminated");
}

/// Re-evaluate and deliver every subscription touching `collection`.
async fn push_snapshots(
    store: &MemoryStore,
    collection: &str,
    event_tx: &mpsc::Sender<StoreEvent>,
) -> Result<(), ()> {
    for (&id, query) in &store.subscriptions {
        if query.collection != collection {
            continue;
        }
        let documents = query.evaluate(store.docs(collection));
        event_tx
            .send(StoreEvent::Snapshot {
                subscription: id,
                documents,
            })
            .await
            .map_err(|_| ())?;
    }
    Ok(())
}

/// The store state proper. Synchronous; only the task above touches it.
struct MemoryStore {
    collections: HashMap<String, Vec<Document>>,
    subscriptions: HashMap<SubscriptionId, Query>,
}

impl MemoryStore {
    fn new() -> Self {
        let mut collections = HashMap::new();
        collections.insert(VIDEOS_COLLECTION.to_string(), Vec::new());
        collections.insert(COMMENTS_COLLECTION.to_string(), Vec::new());
        Self {
            collections,
            subscriptions: HashMap::new(),
        }
    }

    fn docs(&self, collection: &str) -> &[Document] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn subscribe(&mut self, id: SubscriptionId, query: Query) -> Result<Vec<Document>, StoreError> {
        let docs = self
            .collections
            .get(&query.collection)
            .ok_or_else(|| StoreError::UnknownCollection(query.collection.clone()))?;
        let snapshot = query.evaluate(docs);
        self.subscriptions.insert(id, query);
        Ok(snapshot)
    }

    fn cancel(&mut self, id: SubscriptionId) {
        self.subscriptions.remove(&id);
    }

    fn write(&mut self, collection: &str, mut document: Document) -> Result<Uuid, StoreError> {
        if document.contains_key(FIELD_ID) {
            return Err(StoreError::InvalidDocument(
                "client-assigned ids are not accepted".to_string(),
            ));
        }
        let docs = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let id = Uuid::new_v4();
        document.insert(FIELD_ID.to_string(), json!(id.to_string()));
        document.insert(FIELD_CREATED_AT.to_string(), json!(Utc::now().to_rfc3339()));
        docs.push(document);
        debug!(collection, record = %id, "Document written");
        Ok(id)
    }

    fn increment(
        &mut self,
        collection: &str,
        id: Uuid,
        field: &str,
        delta: i64,
    ) -> Result<(), StoreError> {
        let docs = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let id_value = json!(id.to_string());
        let doc = docs
            .iter_mut()
            .find(|d| d.get(FIELD_ID) == Some(&id_value))
            .ok_or(StoreError::NotFound)?;

        let current = doc.get(field).and_then(serde_json::Value::as_i64).unwrap_or(0);
        doc.insert(field.to_string(), json!(current + delta));
        debug!(collection, record = %id, field, delta, "Counter incremented");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn draft(title: &str) -> Document {
        let mut doc = Document::new();
        doc.insert("title".to_string(), json!(title));
        doc.insert("views".to_string(), json!(0));
        doc
    }

    #[test]
    fn write_assigns_id_and_timestamp() {
        let mut store = MemoryStore::new();
        let id = store.write(VIDEOS_COLLECTION, draft("one")).unwrap();
        let docs = store.docs(VIDEOS_COLLECTION);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get(FIELD_ID), Some(&json!(id.to_string())));
        assert!(docs[0].get(FIELD_CREATED_AT).is_some());
    }

    #[test]
    fn write_rejects_unknown_collection() {
        let mut store = MemoryStore::new();
        let err = store.write("playlists", draft("x")).unwrap_err();
        assert_eq!(err, StoreError::UnknownCollection("playlists".to_string()));
    }

    #[test]
    fn increment_missing_document_is_not_found() {
        let mut store = MemoryStore::new();
        let err = store
            .increment(VIDEOS_COLLECTION, Uuid::new_v4(), "views", 1)
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound);
    }

    #[test]
    fn increment_creates_missing_field_from_zero() {
        let mut store = MemoryStore::new();
        let mut doc = Document::new();
        doc.insert("title".to_string(), json!("no counters"));
        let id = store.write(VIDEOS_COLLECTION, doc).unwrap();
        store.increment(VIDEOS_COLLECTION, id, "likes", 2).unwrap();
        let stored = &store.docs(VIDEOS_COLLECTION)[0];
        assert_eq!(stored.get("likes").and_then(Value::as_i64), Some(2));
    }

    #[test]
    fn subscribe_returns_current_snapshot() {
        let mut store = MemoryStore::new();
        store.write(VIDEOS_COLLECTION, draft("one")).unwrap();
        let snapshot = store
            .subscribe(1, Query::collection(VIDEOS_COLLECTION))
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.subscriptions.len(), 1);
        store.cancel(1);
        assert!(store.subscriptions.is_empty());
    }
}
