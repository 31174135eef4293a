//! Authenticated session state shared by everything that talks to the
//! backend.
//!
//! One `SessionContext` is created per application run and handed out as an
//! `Arc`. Authentication calls [`SessionContext::begin`], logout calls
//! [`SessionContext::end`]; the HTTP client reads the bearer token on every
//! request, so a renewed token takes effect immediately.

use std::sync::{PoisonError, RwLock};

use tracing::debug;

#[derive(Debug, Default)]
pub struct SessionContext {
    token: RwLock<Option<String>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that is already authenticated.
    pub fn with_token(token: impl Into<String>) -> Self {
        let ctx = Self::new();
        ctx.begin(token);
        ctx
    }

    /// Store the token issued on successful authentication (or renewal).
    pub fn begin(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
        debug!("session started");
    }

    /// Drop the token on logout.
    pub fn end(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("session ended");
    }

    /// Current bearer token, if authenticated.
    pub fn bearer(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_active(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
