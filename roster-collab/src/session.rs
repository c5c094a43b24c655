//! Logged-in user for the console.

use std::sync::{Arc, PoisonError, RwLock};

use crate::presence::IdentityProvider;

/// Current user, shared between the UI and the presence coordinator.
#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Arc<RwLock<Option<String>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session already logged in as `user_name`.
    pub fn logged_in(user_name: impl Into<String>) -> Self {
        let session = Self::new();
        session.login(user_name);
        session
    }

    pub fn login(&self, user_name: impl Into<String>) {
        let user_name = user_name.into();
        log::info!("Logged in as {user_name}");
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user_name);
    }

    pub fn logout(&self) {
        let previous = self.user.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(user_name) = previous {
            log::info!("{user_name} logged out");
        }
    }

    pub fn user_name(&self) -> Option<String> {
        self.user.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// A non-blank user name is set.
    pub fn is_authenticated(&self) -> bool {
        self.user_name().is_some_and(|name| !name.trim().is_empty())
    }
}

impl IdentityProvider for Session {
    fn current_user_name(&self) -> Option<String> {
        self.user_name()
    }
}
