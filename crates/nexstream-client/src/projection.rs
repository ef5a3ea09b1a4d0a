//! Pure derivation of the displayable record list.
//!
//! [`project`] folds the active view, the per-stream snapshots, the
//! optimistic ledger and the watch history into the exact sequence the
//! presentation layer renders. It reads already-subscribed data only and
//! holds no state of its own, so recomputing it is always safe.

use std::collections::HashMap;

use nexstream_shared::constants::SUBSCRIPTION_SLICE_LEN;
use nexstream_store::{CommentRecord, VideoRecord};

use crate::history::WatchHistory;
use crate::ledger::{CounterField, OptimisticMutationLedger};
use crate::router::View;
use crate::streams::{StreamKey, StreamSnapshot};

/// How the Subscriptions tab and the Home category pills select their
/// subset of the feed. The real rule belongs to a ranking collaborator;
/// implementations must stay pure and order-preserving.
pub trait RankingPolicy: Send + Sync {
    /// Subset of the feed shown on the Subscriptions tab.
    fn subscription_slice(&self, feed: &[VideoRecord]) -> Vec<VideoRecord>;

    /// Subset of the feed shown while a Home category pill is active.
    fn category_filter(&self, category: &str, feed: &[VideoRecord]) -> Vec<VideoRecord>;
}

/// Placeholder policies: first N for subscriptions, every other record for
/// a category. Deterministic stand-ins until a ranking service exists.
pub struct DefaultRanking;

impl RankingPolicy for DefaultRanking {
    fn subscription_slice(&self, feed: &[VideoRecord]) -> Vec<VideoRecord> {
        feed.iter().take(SUBSCRIPTION_SLICE_LEN).cloned().collect()
    }

    fn category_filter(&self, _category: &str, feed: &[VideoRecord]) -> Vec<VideoRecord> {
        feed.iter().step_by(2).cloned().collect()
    }
}

/// The ordered records the active view displays.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// A list of videos (every feed-shaped view).
    Videos(Vec<VideoRecord>),
    /// The watch page: the video itself plus its comments.
    Watch {
        video: VideoRecord,
        comments: Vec<CommentRecord>,
    },
}

impl Projection {
    /// The video list, empty for non-feed projections.
    pub fn videos(&self) -> &[VideoRecord] {
        match self {
            Projection::Videos(videos) => videos,
            Projection::Watch { .. } => &[],
        }
    }

    /// The comment list, empty outside the watch page.
    pub fn comments(&self) -> &[CommentRecord] {
        match self {
            Projection::Watch { comments, .. } => comments,
            Projection::Videos(_) => &[],
        }
    }
}

/// Derive the displayable records for `view`.
pub fn project(
    view: &View,
    category: Option<&str>,
    snapshots: &HashMap<StreamKey, StreamSnapshot>,
    ledger: &OptimisticMutationLedger,
    history: &WatchHistory,
    ranking: &dyn RankingPolicy,
) -> Projection {
    match view {
        View::Home => {
            let feed = feed(snapshots, &StreamKey::FeedRecent);
            let selected = match category.filter(|c| !c.eq_ignore_ascii_case("all")) {
                Some(cat) => ranking.category_filter(cat, feed),
                None => feed.to_vec(),
            };
            Projection::Videos(overlay_all(ledger, selected))
        }
        View::Trending => Projection::Videos(overlay_all(
            ledger,
            feed(snapshots, &StreamKey::FeedTrending).to_vec(),
        )),
        View::Subscriptions => Projection::Videos(overlay_all(
            ledger,
            ranking.subscription_slice(feed(snapshots, &StreamKey::FeedRecent)),
        )),
        View::Results { query } => {
            let needle = query.to_lowercase();
            let hits = feed(snapshots, &StreamKey::FeedRecent)
                .iter()
                .filter(|v| v.title.to_lowercase().contains(&needle))
                .cloned()
                .collect();
            Projection::Videos(overlay_all(ledger, hits))
        }
        View::History => Projection::Videos(overlay_all(ledger, history.videos().to_vec())),
        View::Channel { channel_id } => Projection::Videos(overlay_all(
            ledger,
            feed(snapshots, &StreamKey::ChannelUploads(channel_id.clone())).to_vec(),
        )),
        View::Upload => Projection::Videos(Vec::new()),
        View::Watch { video } => {
            // Prefer the freshest copy of the record from the live feed;
            // the one captured at click time can be stale.
            let current = feed(snapshots, &StreamKey::FeedRecent)
                .iter()
                .find(|v| v.id == video.id)
                .cloned()
                .unwrap_or_else(|| video.clone());
            let comments = match snapshots.get(&StreamKey::Comments(video.id)) {
                Some(StreamSnapshot::Comments(comments)) => comments.clone(),
                _ => Vec::new(),
            };
            Projection::Watch {
                video: overlay(ledger, current),
                comments,
            }
        }
    }
}

fn feed<'a>(snapshots: &'a HashMap<StreamKey, StreamSnapshot>, key: &StreamKey) -> &'a [VideoRecord] {
    match snapshots.get(key) {
        Some(StreamSnapshot::Videos(videos)) => videos,
        _ => &[],
    }
}

fn overlay(ledger: &OptimisticMutationLedger, mut video: VideoRecord) -> VideoRecord {
    video.views = ledger.overlay(video.id, CounterField::Views, video.views);
    video.likes = ledger.overlay(video.id, CounterField::Likes, video.likes);
    video
}

fn overlay_all(ledger: &OptimisticMutationLedger, videos: Vec<VideoRecord>) -> Vec<VideoRecord> {
    videos.into_iter().map(|v| overlay(ledger, v)).collect()
}
