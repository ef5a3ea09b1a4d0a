use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated user as reported by the identity provider.
///
/// The `user_id` doubles as the channel identifier for everything the user
/// uploads. How the identity was established (token exchange, anonymous
/// session) is the provider's concern and never leaks into this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Stable opaque user identifier.
    pub user_id: String,
    /// Human-readable display name shown on uploads and comments.
    pub display_name: String,
    /// Optional avatar image locator.
    pub avatar_url: Option<String>,
}

impl Identity {
    /// Mint a throwaway anonymous identity with a fresh random user id.
    ///
    /// Mirrors the anonymous sign-in path of the hosted identity provider:
    /// the session is fully usable but carries no profile.
    pub fn anonymous() -> Self {
        Self {
            user_id: Uuid::new_v4().to_string(),
            display_name: "Anonymous".to_string(),
            avatar_url: None,
        }
    }

    /// Shortened user id for log output. The id is opaque and may hold
    /// multi-byte characters, so the cut lands on a char boundary.
    pub fn short_id(&self) -> &str {
        let mut end = self.user_id.len().min(8);
        while !self.user_id.is_char_boundary(end) {
            end -= 1;
        }
        &self.user_id[..end]
    }
}
