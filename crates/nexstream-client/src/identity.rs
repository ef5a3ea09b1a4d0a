//! Identity provider collaborator.
//!
//! The engine never performs the authentication handshake itself; it
//! observes a `tokio::sync::watch` channel owned by this provider. Signing
//! in or out replaces the watched value, and every subscriber sees the
//! change on its next poll.

use tokio::sync::watch;
use tracing::info;

use nexstream_shared::Identity;

/// Source of the current authenticated identity and its change stream.
#[derive(Debug)]
pub struct IdentityProvider {
    tx: watch::Sender<Option<Identity>>,
}

impl IdentityProvider {
    /// Create a provider with no signed-in identity.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// The identity of the current session, if any.
    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// Replace the session identity.
    pub fn sign_in(&self, identity: Identity) {
        info!(user = identity.short_id(), "Signed in");
        self.tx.send_replace(Some(identity));
    }

    /// Mint and sign in a throwaway anonymous identity.
    pub fn sign_in_anonymous(&self) -> Identity {
        let identity = Identity::anonymous();
        self.sign_in(identity.clone());
        identity
    }

    /// Clear the session identity.
    pub fn sign_out(&self) {
        info!("Signed out");
        self.tx.send_replace(None);
    }

    /// Subscribe to identity changes. The receiver initially holds the
    /// current value.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}

impl Default for IdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_sign_in_and_out() {
        let provider = IdentityProvider::new();
        let mut rx = provider.subscribe();
        assert!(rx.borrow().is_none());

        let identity = provider.sign_in_anonymous();
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow_and_update().as_ref().map(|i| i.user_id.clone()),
            Some(identity.user_id)
        );

        provider.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());
    }
}
