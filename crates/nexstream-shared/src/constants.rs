/// Application name
pub const APP_NAME: &str = "NexStream";

/// Collection holding every published video document
pub const VIDEOS_COLLECTION: &str = "videos";

/// Collection holding every comment document
pub const COMMENTS_COLLECTION: &str = "comments";

/// Maximum number of records delivered per feed snapshot
pub const FEED_QUERY_LIMIT: u32 = 50;

/// Maximum number of comments delivered per comment snapshot
pub const COMMENT_QUERY_LIMIT: u32 = 50;

/// Number of entries kept in the client-side watch history
pub const WATCH_HISTORY_CAPACITY: usize = 20;

/// Number of feed records shown on the Subscriptions tab
/// (placeholder slice until a real ranking collaborator exists)
pub const SUBSCRIPTION_SLICE_LEN: usize = 5;

/// Bounded depth of the engine and store command channels
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Bounded depth of the notification channels pushed to the UI
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;
