//! Logical streams and the subscription manager.
//!
//! A [`StreamKey`] names one logical remote read; it is a pure function of
//! the active view. The [`SubscriptionManager`] owns the key → open
//! subscription mapping and, on every view or identity change, produces
//! the minimal open/close plan that makes the open set equal the required
//! set. Keys present before and after a change are left untouched, so an
//! unrelated parameter change never reopens a live stream.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use uuid::Uuid;

use nexstream_shared::constants::{COMMENT_QUERY_LIMIT, COMMENTS_COLLECTION, FEED_QUERY_LIMIT, VIDEOS_COLLECTION};
use nexstream_shared::Identity;
use nexstream_store::models::{FIELD_CREATED_AT, FIELD_UPLOADER_ID, FIELD_VIDEO_ID, FIELD_VIEWS};
use nexstream_store::{CommentRecord, Document, Query, SubscriptionId, VideoRecord};

use crate::router::View;

/// Identifier of one logical subscription, derived from the active view.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamKey {
    /// Videos ordered by creation time, newest first.
    FeedRecent,
    /// Videos ordered by view counter, highest first.
    FeedTrending,
    /// Uploads of one channel, newest first.
    ChannelUploads(String),
    /// Comments under one video, newest first.
    Comments(Uuid),
}

impl StreamKey {
    /// The store query this key subscribes with.
    pub fn query(&self) -> Query {
        match self {
            StreamKey::FeedRecent => Query::collection(VIDEOS_COLLECTION)
                .order_desc(FIELD_CREATED_AT)
                .limit(FEED_QUERY_LIMIT),
            StreamKey::FeedTrending => Query::collection(VIDEOS_COLLECTION)
                .order_desc(FIELD_VIEWS)
                .limit(FEED_QUERY_LIMIT),
            StreamKey::ChannelUploads(channel_id) => Query::collection(VIDEOS_COLLECTION)
                .filter_eq(FIELD_UPLOADER_ID, channel_id.as_str())
                .order_desc(FIELD_CREATED_AT)
                .limit(FEED_QUERY_LIMIT),
            StreamKey::Comments(video_id) => Query::collection(COMMENTS_COLLECTION)
                .filter_eq(FIELD_VIDEO_ID, video_id.to_string())
                .order_desc(FIELD_CREATED_AT)
                .limit(COMMENT_QUERY_LIMIT),
        }
    }

    /// Whether the store will only serve this stream to a signed-in
    /// session. Currently true for every key: the store denies all
    /// unauthenticated reads.
    pub fn requires_identity(&self) -> bool {
        match self {
            StreamKey::FeedRecent
            | StreamKey::FeedTrending
            | StreamKey::ChannelUploads(_)
            | StreamKey::Comments(_) => true,
        }
    }

    /// Decode a raw snapshot into the typed form this key carries.
    pub fn decode(&self, documents: &[Document]) -> StreamSnapshot {
        match self {
            StreamKey::Comments(_) => StreamSnapshot::Comments(
                documents.iter().map(CommentRecord::from_document).collect(),
            ),
            _ => StreamSnapshot::Videos(
                documents.iter().map(VideoRecord::from_document).collect(),
            ),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKey::FeedRecent => write!(f, "feed:recent"),
            StreamKey::FeedTrending => write!(f, "feed:trending"),
            StreamKey::ChannelUploads(channel_id) => write!(f, "feed:channel:{channel_id}"),
            StreamKey::Comments(video_id) => write!(f, "comments:{video_id}"),
        }
    }
}

/// The typed snapshot most recently delivered for one stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSnapshot {
    Videos(Vec<VideoRecord>),
    Comments(Vec<CommentRecord>),
}

/// The streams a view needs. Pure; the manager reconciles against it.
///
/// History and Upload need no remote data: the watch history is
/// session-local and the upload form shows no list.
pub fn stream_keys_for(view: &View) -> BTreeSet<StreamKey> {
    let mut keys = BTreeSet::new();
    match view {
        View::Home | View::Subscriptions | View::Results { .. } => {
            keys.insert(StreamKey::FeedRecent);
        }
        View::Trending => {
            keys.insert(StreamKey::FeedTrending);
        }
        View::Watch { video } => {
            keys.insert(StreamKey::FeedRecent);
            keys.insert(StreamKey::Comments(video.id));
        }
        View::Channel { channel_id } => {
            keys.insert(StreamKey::ChannelUploads(channel_id.clone()));
        }
        View::History | View::Upload => {}
    }
    keys
}

/// One entry of a reconciliation plan: a subscription to open.
#[derive(Debug)]
pub struct OpenStream {
    pub id: SubscriptionId,
    pub key: StreamKey,
    pub query: Query,
}

/// The minimal set of store commands that realises the required key set.
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    pub open: Vec<OpenStream>,
    pub close: Vec<(SubscriptionId, StreamKey)>,
}

/// Owner of the logical-stream → live-subscription mapping.
///
/// Subscription ids are allocated here, never reused, and removed from the
/// routing table at cancel time, so a snapshot racing its own cancellation
/// resolves to an unknown id and is dropped by the engine.
pub struct SubscriptionManager {
    open: BTreeMap<StreamKey, SubscriptionId>,
    routes: HashMap<SubscriptionId, StreamKey>,
    next_id: SubscriptionId,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            open: BTreeMap::new(),
            routes: HashMap::new(),
            next_id: 1,
        }
    }

    /// Reconcile the open set against what `view` requires.
    ///
    /// Identity-scoped keys are deferred while no identity is present; on
    /// sign-out they land in the close list like any other stale stream.
    /// The plan is applied to the internal tables before it is returned,
    /// so a snapshot for a closed stream is already unroutable by the time
    /// the store processes the cancel.
    pub fn reconcile(&mut self, view: &View, identity: Option<&Identity>) -> ReconcilePlan {
        let mut required = stream_keys_for(view);
        if identity.is_none() {
            required.retain(|key| !key.requires_identity());
        }

        let mut plan = ReconcilePlan::default();

        let stale: Vec<StreamKey> = self
            .open
            .keys()
            .filter(|key| !required.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(id) = self.open.remove(&key) {
                self.routes.remove(&id);
                plan.close.push((id, key));
            }
        }

        for key in required {
            if self.open.contains_key(&key) {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.open.insert(key.clone(), id);
            self.routes.insert(id, key.clone());
            plan.open.push(OpenStream {
                id,
                query: key.query(),
                key,
            });
        }

        plan
    }

    /// Route a subscription id back to its key. `None` means the stream
    /// was cancelled (or failed) and the event must be dropped.
    pub fn key_for(&self, id: SubscriptionId) -> Option<&StreamKey> {
        self.routes.get(&id)
    }

    /// Forget a stream after a store-side failure. Idempotent.
    pub fn drop_stream(&mut self, id: SubscriptionId) -> Option<StreamKey> {
        let key = self.routes.remove(&id)?;
        self.open.remove(&key);
        Some(key)
    }

    /// The currently open keys, in key order.
    pub fn open_keys(&self) -> Vec<StreamKey> {
        self.open.keys().cloned().collect()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
