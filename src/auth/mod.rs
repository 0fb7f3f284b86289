//! The authenticated session: the shared token and the controller that keeps
//! it alive.

pub mod lifecycle;

use std::sync::{Arc, PoisonError, RwLock};

pub use lifecycle::{SessionLifecycle, SessionTimings};

/// The current access token. Every outbound call reads it; only the session
/// lifecycle controller writes it.
#[derive(Debug, Clone, Default)]
pub struct TokenStore(Arc<RwLock<Option<String>>>);

impl TokenStore {
    pub fn get(&self) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn set(&self, token: String) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    pub(crate) fn clear(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Recovery path for an authorization failure discovered by any REST caller.
pub trait UnauthorizedHandler: Send + Sync {
    fn handle_unauthorized(&self);
}
