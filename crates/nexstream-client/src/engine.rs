//! The client engine: one tokio task owning every piece of mutable state.
//!
//! The task selects over three inputs: commands from the presentation
//! layer (via [`EngineHandle`]), events from the store task, and identity
//! changes from the provider. All state (router, subscriptions, snapshots,
//! ledger, history) is mutated only on this task, so no locks exist and
//! every mutation is atomic with respect to the next event.
//!
//! Store round-trips are never awaited inline. Writes and increments carry
//! a request id and complete through the store event channel, which keeps
//! the loop responsive and gives the cancelled-subscription race exactly
//! one resolution point: an event whose id is no longer routed is dropped.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use nexstream_shared::constants::{
    COMMAND_CHANNEL_CAPACITY, COMMENTS_COLLECTION, NOTIFICATION_CHANNEL_CAPACITY,
    VIDEOS_COLLECTION,
};
use nexstream_shared::Identity;
use nexstream_store::{
    CommentRecord, RequestId, StoreCommand, StoreError, StoreEvent, VideoDraft, VideoRecord,
};

use crate::error::{EngineError, Result};
use crate::history::WatchHistory;
use crate::ledger::{Change, CounterField, OptimisticMutationLedger, Reconciliation};
use crate::projection::{project, DefaultRanking, Projection, RankingPolicy};
use crate::router::{View, ViewKind, ViewParams, ViewRouter};
use crate::streams::{StreamKey, StreamSnapshot, SubscriptionManager};

/// Engine tuning knobs.
pub struct EngineConfig {
    /// Depth of the handle command channel.
    pub command_capacity: usize,
    /// Depth of the notification channel.
    pub notification_capacity: usize,
    /// Subset-selection policy for subscriptions and categories.
    pub ranking: Box<dyn RankingPolicy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_capacity: COMMAND_CHANNEL_CAPACITY,
            notification_capacity: NOTIFICATION_CHANNEL_CAPACITY,
            ranking: Box::new(DefaultRanking),
        }
    }
}

/// Commands sent *into* the engine task.
enum EngineCommand {
    Navigate {
        kind: ViewKind,
        params: ViewParams,
        reply: oneshot::Sender<Result<View>>,
    },
    CurrentView {
        reply: oneshot::Sender<View>,
    },
    CurrentProjection {
        reply: oneshot::Sender<Projection>,
    },
    ApplyLocal {
        entity: Uuid,
        field: CounterField,
        delta: i64,
        reply: oneshot::Sender<Result<i64>>,
    },
    SubmitComment {
        video_id: Uuid,
        text: String,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    UploadVideo {
        draft: VideoDraft,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    SetCategory {
        category: Option<String>,
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Notifications pushed to the presentation layer.
#[derive(Debug, Clone)]
pub enum EngineNotification {
    /// The displayable record list changed.
    ProjectionChanged(Projection),
    /// A stream failed and was closed; re-navigation reopens it.
    StreamFailed { key: StreamKey, error: StoreError },
    /// A counter write failed; the optimistic value was rolled back.
    WriteFailed {
        entity: Uuid,
        field: CounterField,
        error: StoreError,
    },
    /// The session identity changed.
    IdentityChanged(Option<Identity>),
}

/// Cloneable facade over the engine command channel.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Replace the active view. Returns the new view, or a
    /// `Configuration` error with the previous view retained.
    pub async fn navigate(&self, kind: ViewKind, params: ViewParams) -> Result<View> {
        self.request(|reply| EngineCommand::Navigate {
            kind,
            params,
            reply,
        })
        .await?
    }

    /// Navigate to the watch page for `video`.
    pub async fn watch(&self, video: VideoRecord) -> Result<View> {
        self.navigate(
            ViewKind::Watch,
            ViewParams {
                video: Some(video),
                ..Default::default()
            },
        )
        .await
    }

    /// Navigate to the search results for `query`.
    pub async fn search(&self, query: impl Into<String>) -> Result<View> {
        self.navigate(
            ViewKind::Results,
            ViewParams {
                query: Some(query.into()),
                ..Default::default()
            },
        )
        .await
    }

    /// The active view.
    pub async fn current_view(&self) -> Result<View> {
        self.request(|reply| EngineCommand::CurrentView { reply }).await
    }

    /// The displayable records for the active view.
    pub async fn current_projection(&self) -> Result<Projection> {
        self.request(|reply| EngineCommand::CurrentProjection { reply })
            .await
    }

    /// Apply an optimistic counter change (e.g. a like toggle) and return
    /// the immediately visible value.
    pub async fn apply_local(&self, entity: Uuid, field: CounterField, delta: i64) -> Result<i64> {
        self.request(|reply| EngineCommand::ApplyLocal {
            entity,
            field,
            delta,
            reply,
        })
        .await?
    }

    /// Submit a comment under a video. Requires a signed-in identity.
    pub async fn submit_comment(&self, video_id: Uuid, text: impl Into<String>) -> Result<Uuid> {
        self.request(|reply| EngineCommand::SubmitComment {
            video_id,
            text: text.into(),
            reply,
        })
        .await?
    }

    /// Publish a new video. Requires a signed-in identity.
    pub async fn upload_video(&self, draft: VideoDraft) -> Result<Uuid> {
        self.request(|reply| EngineCommand::UploadVideo { draft, reply })
            .await?
    }

    /// Set the active Home category pill. Projection-only; never touches
    /// subscriptions.
    pub async fn set_category(&self, category: Option<String>) -> Result<()> {
        self.request(|reply| EngineCommand::SetCategory { category, reply })
            .await
    }

    /// Ask the engine task to stop.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::Closed)?;
        reply_rx.await.map_err(|_| EngineError::Closed)
    }
}

/// Spawn the engine task.
///
/// `store_tx` / `store_events` are the store's command and event channels;
/// `identity_rx` is the provider's watch receiver. Returns the handle and
/// the notification stream.
pub fn spawn_engine(
    store_tx: mpsc::Sender<StoreCommand>,
    store_events: mpsc::Receiver<StoreEvent>,
    identity_rx: watch::Receiver<Option<Identity>>,
    config: EngineConfig,
) -> (EngineHandle, mpsc::Receiver<EngineNotification>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
    let (notif_tx, notif_rx) = mpsc::channel(config.notification_capacity);

    let engine = Engine {
        store_tx,
        notif_tx,
        router: ViewRouter::new(),
        subs: SubscriptionManager::new(),
        snapshots: HashMap::new(),
        ledger: OptimisticMutationLedger::new(),
        history: WatchHistory::new(),
        ranking: config.ranking,
        identity: identity_rx.borrow().clone(),
        category: None,
        projection: Projection::Videos(Vec::new()),
        next_request: 1,
        pending_writes: HashMap::new(),
    };

    tokio::spawn(run_engine(engine, cmd_rx, store_events, identity_rx));

    (EngineHandle { cmd_tx }, notif_rx)
}

async fn run_engine(
    mut engine: Engine,
    mut cmd_rx: mpsc::Receiver<EngineCommand>,
    mut store_events: mpsc::Receiver<StoreEvent>,
    mut identity_rx: watch::Receiver<Option<Identity>>,
) {
    info!("Engine task started");

    // Open the streams the initial view needs (the provider may already
    // hold an identity).
    engine.reconcile().await;
    engine.refresh_projection(false).await;

    let mut identity_live = true;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(EngineCommand::Shutdown) | None => {
                        info!("Engine shutdown requested");
                        break;
                    }
                    Some(cmd) => engine.handle_command(cmd).await,
                }
            }

            event = store_events.recv() => {
                match event {
                    Some(event) => engine.handle_store_event(event).await,
                    None => {
                        info!("Store event channel closed, shutting down engine");
                        break;
                    }
                }
            }

            changed = identity_rx.changed(), if identity_live => {
                match changed {
                    Ok(()) => {
                        let identity = identity_rx.borrow_and_update().clone();
                        engine.handle_identity_change(identity).await;
                    }
                    // Provider dropped; keep the last known identity.
                    Err(_) => identity_live = false,
                }
            }
        }
    }

    info!("Engine task terminated");
}

/// What a store completion event resolves to.
enum PendingWrite {
    Upload(oneshot::Sender<Result<Uuid>>),
    Comment(oneshot::Sender<Result<Uuid>>),
    Counter { entity: Uuid, field: CounterField },
}

struct Engine {
    store_tx: mpsc::Sender<StoreCommand>,
    notif_tx: mpsc::Sender<EngineNotification>,
    router: ViewRouter,
    subs: SubscriptionManager,
    snapshots: HashMap<StreamKey, StreamSnapshot>,
    ledger: OptimisticMutationLedger,
    history: WatchHistory,
    ranking: Box<dyn RankingPolicy>,
    identity: Option<Identity>,
    category: Option<String>,
    projection: Projection,
    next_request: RequestId,
    pending_writes: HashMap<RequestId, PendingWrite>,
}

impl Engine {
    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Navigate { kind, params, reply } => {
                match self.router.navigate(kind, params) {
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                    Ok(view) => {
                        let view = view.clone();
                        if let View::Watch { video } = &view {
                            self.on_watch(video.clone()).await;
                        }
                        self.reconcile().await;
                        self.refresh_projection(true).await;
                        let _ = reply.send(Ok(view));
                    }
                }
            }

            EngineCommand::CurrentView { reply } => {
                let _ = reply.send(self.router.current().clone());
            }

            EngineCommand::CurrentProjection { reply } => {
                let _ = reply.send(self.projection.clone());
            }

            EngineCommand::ApplyLocal {
                entity,
                field,
                delta,
                reply,
            } => {
                let visible = self.apply_counter(entity, field, delta).await;
                self.refresh_projection(true).await;
                let _ = reply.send(visible);
            }

            EngineCommand::SubmitComment {
                video_id,
                text,
                reply,
            } => {
                self.submit_comment(video_id, text, reply).await;
            }

            EngineCommand::UploadVideo { draft, reply } => {
                self.upload_video(draft, reply).await;
            }

            EngineCommand::SetCategory { category, reply } => {
                self.category = category;
                self.refresh_projection(true).await;
                let _ = reply.send(());
            }

            // Handled by the loop before dispatch.
            EngineCommand::Shutdown => {}
        }
    }

    async fn handle_store_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Snapshot {
                subscription,
                documents,
            } => {
                let Some(key) = self.subs.key_for(subscription).cloned() else {
                    debug!(subscription, "Snapshot for cancelled stream dropped");
                    return;
                };
                let snapshot = key.decode(&documents);
                if let StreamSnapshot::Videos(videos) = &snapshot {
                    for video in videos {
                        self.reconcile_counters(video);
                    }
                }
                debug!(key = %key, "Snapshot applied");
                self.snapshots.insert(key, snapshot);
                self.refresh_projection(true).await;
            }

            StoreEvent::SubscriptionFailed {
                subscription,
                error,
            } => {
                let Some(key) = self.subs.drop_stream(subscription) else {
                    debug!(subscription, "Failure for cancelled stream dropped");
                    return;
                };
                self.snapshots.remove(&key);
                warn!(key = %key, error = %error, "Stream failed");
                self.notify(EngineNotification::StreamFailed { key, error }).await;
                self.refresh_projection(true).await;
            }

            StoreEvent::WriteCompleted { request, result } => {
                match self.pending_writes.remove(&request) {
                    Some(PendingWrite::Upload(reply)) | Some(PendingWrite::Comment(reply)) => {
                        let _ = reply.send(result.map_err(EngineError::Write));
                    }
                    Some(PendingWrite::Counter { .. }) | None => {
                        debug!(request, "Unmatched write completion dropped");
                    }
                }
            }

            StoreEvent::IncrementCompleted { request, result } => {
                match self.pending_writes.remove(&request) {
                    Some(PendingWrite::Counter { entity, field }) => {
                        if let Err(error) = result {
                            // The confirming snapshot will never arrive;
                            // revert to the last confirmed value.
                            let rolled = self.ledger.roll_back(entity, field);
                            warn!(entity = %entity, field = %field, error = %error, rolled, "Counter write failed");
                            self.notify(EngineNotification::WriteFailed {
                                entity,
                                field,
                                error,
                            })
                            .await;
                            self.refresh_projection(true).await;
                        }
                    }
                    _ => debug!(request, "Unmatched increment completion dropped"),
                }
            }
        }
    }

    async fn handle_identity_change(&mut self, identity: Option<Identity>) {
        if identity == self.identity {
            return;
        }
        match &identity {
            Some(id) => info!(user = id.short_id(), "Identity changed"),
            None => info!("Identity cleared"),
        }
        self.identity = identity.clone();
        self.notify(EngineNotification::IdentityChanged(identity)).await;
        self.reconcile().await;
        self.refresh_projection(true).await;
    }

    /// Entering the watch page: record history and bump the view counter
    /// optimistically, with the store increment in flight.
    async fn on_watch(&mut self, video: VideoRecord) {
        self.history.record(video.clone());
        let _ = self
            .apply_counter(video.id, CounterField::Views, 1)
            .await;
    }

    /// Optimistically change a counter and issue the store increment.
    async fn apply_counter(
        &mut self,
        entity: Uuid,
        field: CounterField,
        delta: i64,
    ) -> Result<i64> {
        let authoritative = self.authoritative_counter(entity, field);
        let visible = self
            .ledger
            .apply(entity, field, Change::Increment(delta), authoritative);

        let request = self.allocate_request();
        let cmd = StoreCommand::Increment {
            request,
            collection: VIDEOS_COLLECTION.to_string(),
            id: entity,
            field: field.as_str().to_string(),
            delta,
        };
        if self.store_tx.send(cmd).await.is_err() {
            self.ledger.roll_back(entity, field);
            return Err(EngineError::Closed);
        }
        self.pending_writes
            .insert(request, PendingWrite::Counter { entity, field });
        Ok(visible)
    }

    async fn submit_comment(
        &mut self,
        video_id: Uuid,
        text: String,
        reply: oneshot::Sender<Result<Uuid>>,
    ) {
        let Some(identity) = self.identity.clone() else {
            let _ = reply.send(Err(EngineError::IdentityRequired));
            return;
        };
        let text = text.trim();
        if text.is_empty() {
            let _ = reply.send(Err(EngineError::Configuration(
                "comment text must be non-blank".to_string(),
            )));
            return;
        }

        let document = CommentRecord::draft_document(video_id, text, &identity);
        let request = self.allocate_request();
        let cmd = StoreCommand::Write {
            request,
            collection: COMMENTS_COLLECTION.to_string(),
            document,
        };
        if self.store_tx.send(cmd).await.is_err() {
            let _ = reply.send(Err(EngineError::Closed));
            return;
        }
        self.pending_writes
            .insert(request, PendingWrite::Comment(reply));
    }

    async fn upload_video(&mut self, draft: VideoDraft, reply: oneshot::Sender<Result<Uuid>>) {
        let Some(identity) = self.identity.clone() else {
            let _ = reply.send(Err(EngineError::IdentityRequired));
            return;
        };
        if draft.title.trim().is_empty() || draft.url.trim().is_empty() {
            let _ = reply.send(Err(EngineError::Configuration(
                "upload requires a title and a url".to_string(),
            )));
            return;
        }

        let document = draft.into_document(&identity);
        let request = self.allocate_request();
        let cmd = StoreCommand::Write {
            request,
            collection: VIDEOS_COLLECTION.to_string(),
            document,
        };
        if self.store_tx.send(cmd).await.is_err() {
            let _ = reply.send(Err(EngineError::Closed));
            return;
        }
        self.pending_writes
            .insert(request, PendingWrite::Upload(reply));
    }

    /// Make the open subscription set match the active view and identity.
    async fn reconcile(&mut self) {
        let plan = self
            .subs
            .reconcile(self.router.current(), self.identity.as_ref());

        for (id, key) in plan.close {
            self.snapshots.remove(&key);
            debug!(subscription = id, key = %key, "Stream closed");
            let _ = self.store_tx.send(StoreCommand::Cancel { id }).await;
        }

        for open in plan.open {
            debug!(subscription = open.id, key = %open.key, "Stream opening");
            let cmd = StoreCommand::Subscribe {
                id: open.id,
                query: open.query,
            };
            if self.store_tx.send(cmd).await.is_err() {
                self.subs.drop_stream(open.id);
                warn!(key = %open.key, "Store unreachable, stream not opened");
            }
        }
    }

    /// Retire ledger entries the snapshot already reflects.
    fn reconcile_counters(&mut self, video: &VideoRecord) {
        for (field, value) in [
            (CounterField::Views, video.views),
            (CounterField::Likes, video.likes),
        ] {
            if self.ledger.reconcile(video.id, field, value) == Reconciliation::Confirmed {
                debug!(entity = %video.id, field = %field, value, "Counter confirmed");
            }
        }
    }

    /// The freshest confirmed value for a counter, from any live snapshot
    /// or the watch history. Zero when the entity is unknown.
    fn authoritative_counter(&self, entity: Uuid, field: CounterField) -> i64 {
        let pick = |video: &VideoRecord| match field {
            CounterField::Views => video.views,
            CounterField::Likes => video.likes,
        };

        for snapshot in self.snapshots.values() {
            if let StreamSnapshot::Videos(videos) = snapshot {
                if let Some(video) = videos.iter().find(|v| v.id == entity) {
                    return pick(video);
                }
            }
        }
        if let View::Watch { video } = self.router.current() {
            if video.id == entity {
                return pick(video);
            }
        }
        self.history
            .videos()
            .iter()
            .find(|v| v.id == entity)
            .map(pick)
            .unwrap_or(0)
    }

    async fn refresh_projection(&mut self, notify: bool) {
        self.projection = project(
            self.router.current(),
            self.category.as_deref(),
            &self.snapshots,
            &self.ledger,
            &self.history,
            self.ranking.as_ref(),
        );
        if notify {
            self.notify(EngineNotification::ProjectionChanged(self.projection.clone()))
                .await;
        }
    }

    async fn notify(&self, notification: EngineNotification) {
        let _ = self.notif_tx.send(notification).await;
    }

    fn allocate_request(&mut self) -> RequestId {
        let request = self.next_request;
        self.next_request += 1;
        request
    }
}
