//! Identity provider
//!
//! Reports the signed-in user and notifies subscribers when the user
//! changes. A session reloads or clears its state on every change.

use tokio::sync::watch;
use tracing::info;

use crate::models::User;

/// Source of the current user
pub trait IdentityProvider {
    /// The signed-in user, or `None` when anonymous
    fn current_user(&self) -> Option<User>;

    /// Receive every subsequent sign-in and sign-out
    fn subscribe(&self) -> watch::Receiver<Option<User>>;
}

/// Identity held in process, for the CLI and tests
#[derive(Debug)]
pub struct LocalIdentity {
    current: watch::Sender<Option<User>>,
}

impl LocalIdentity {
    /// Start anonymous
    pub fn anonymous() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    /// Start signed in as `user`
    pub fn signed_in(user: User) -> Self {
        let (current, _) = watch::channel(Some(user));
        Self { current }
    }

    pub fn sign_in(&self, user: User) {
        info!("Signed in as {}", user.id);
        self.current.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        info!("Signed out");
        self.current.send_replace(None);
    }
}

impl IdentityProvider for LocalIdentity {
    fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }
}
