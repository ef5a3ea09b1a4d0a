//! Navigation state machine.
//!
//! Exactly one [`View`] is active at a time. Navigation is synchronous,
//! total and atomic: building the new view can fail (and the previous view
//! is retained), but once built it replaces the active view wholesale.

use tracing::debug;

use nexstream_store::VideoRecord;

use crate::error::{EngineError, Result};

/// The view the user asked for, before parameter validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Home,
    Trending,
    Subscriptions,
    History,
    Results,
    Watch,
    Channel,
    Upload,
}

/// Optional navigation parameters. Kinds that need none ignore extras,
/// matching the wholesale-replacement contract.
#[derive(Debug, Clone, Default)]
pub struct ViewParams {
    /// The video to watch (required by [`ViewKind::Watch`]).
    pub video: Option<VideoRecord>,
    /// The channel to browse (required by [`ViewKind::Channel`]).
    pub channel_id: Option<String>,
    /// The search query (required, non-blank, by [`ViewKind::Results`]).
    pub query: Option<String>,
}

/// The active view with its validated parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Home,
    Trending,
    Subscriptions,
    History,
    Results { query: String },
    Watch { video: VideoRecord },
    Channel { channel_id: String },
    Upload,
}

impl View {
    /// Validate a `(kind, params)` pair into a view.
    pub fn build(kind: ViewKind, params: ViewParams) -> Result<Self> {
        match kind {
            ViewKind::Home => Ok(View::Home),
            ViewKind::Trending => Ok(View::Trending),
            ViewKind::Subscriptions => Ok(View::Subscriptions),
            ViewKind::History => Ok(View::History),
            ViewKind::Upload => Ok(View::Upload),
            ViewKind::Results => {
                let query = params.query.unwrap_or_default();
                let query = query.trim().to_string();
                if query.is_empty() {
                    return Err(EngineError::Configuration(
                        "results view requires a non-blank query".to_string(),
                    ));
                }
                Ok(View::Results { query })
            }
            ViewKind::Watch => match params.video {
                Some(video) => Ok(View::Watch { video }),
                None => Err(EngineError::Configuration(
                    "watch view requires a video".to_string(),
                )),
            },
            ViewKind::Channel => match params.channel_id.filter(|c| !c.trim().is_empty()) {
                Some(channel_id) => Ok(View::Channel { channel_id }),
                None => Err(EngineError::Configuration(
                    "channel view requires a channel id".to_string(),
                )),
            },
        }
    }

    /// Short lowercase label used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            View::Home => "home",
            View::Trending => "trending",
            View::Subscriptions => "subscriptions",
            View::History => "history",
            View::Results { .. } => "results",
            View::Watch { .. } => "watch",
            View::Channel { .. } => "channel",
            View::Upload => "upload",
        }
    }
}

/// Holder of the active view.
pub struct ViewRouter {
    current: View,
}

impl ViewRouter {
    /// A fresh session starts on the home feed.
    pub fn new() -> Self {
        Self {
            current: View::Home,
        }
    }

    /// The active view.
    pub fn current(&self) -> &View {
        &self.current
    }

    /// Replace the active view. On a configuration error the previous
    /// view is retained and returned untouched by `current()`.
    pub fn navigate(&mut self, kind: ViewKind, params: ViewParams) -> Result<&View> {
        let view = View::build(kind, params)?;
        debug!(from = self.current.name(), to = view.name(), "Navigating");
        self.current = view;
        Ok(&self.current)
    }
}

impl Default for ViewRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_without_video_is_rejected_and_previous_view_kept() {
        let mut router = ViewRouter::new();
        router.navigate(ViewKind::Trending, ViewParams::default()).unwrap();

        let err = router
            .navigate(ViewKind::Watch, ViewParams::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(router.current(), &View::Trending);
    }

    #[test]
    fn results_query_is_trimmed_and_must_be_non_blank() {
        let mut router = ViewRouter::new();
        let view = router
            .navigate(
                ViewKind::Results,
                ViewParams {
                    query: Some("  rust  ".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            view,
            &View::Results {
                query: "rust".to_string()
            }
        );

        let err = router
            .navigate(
                ViewKind::Results,
                ViewParams {
                    query: Some("   ".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn channel_requires_a_channel_id() {
        let mut router = ViewRouter::new();
        let err = router
            .navigate(ViewKind::Channel, ViewParams::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(router.current(), &View::Home);
    }
}
