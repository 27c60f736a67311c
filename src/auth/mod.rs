//! Passwordless sign-in and the per-session context handed to the board.

use crate::{
    domain::UserId,
    error::{Result, TaskboardError},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub mod memory;

pub use memory::MemoryIdentityProvider;

/// The authenticated account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

/// Token pair issued on sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

/// Identity provider contract
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sends a one-time sign-in link to `email`
    async fn send_magic_link(&self, email: &str) -> Result<()>;

    /// Completes a sign-in link and starts a session
    async fn verify_magic_link(&self, token: &str) -> Result<Session>;

    /// The active session, if any
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Exchanges the refresh token for a new token pair
    async fn refresh_session(&self) -> Result<Session>;

    async fn sign_out(&self) -> Result<()>;

    /// Fires on sign-in, sign-out and token refresh
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Capabilities derived once per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub is_admin: bool,
}

/// Explicit session state passed into the store, view and admin services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    session: Session,
    capabilities: Capabilities,
}

impl SessionContext {
    pub fn new(session: Session, capabilities: Capabilities) -> Self {
        Self {
            session,
            capabilities,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Owner id stamped on created rows
    pub fn user_id(&self) -> &UserId {
        &self.session.user.id
    }

    pub fn email(&self) -> &str {
        &self.session.user.email
    }

    pub fn is_admin(&self) -> bool {
        self.capabilities.is_admin
    }

    pub fn require_admin(&self) -> Result<()> {
        if !self.capabilities.is_admin {
            return Err(TaskboardError::NotAuthorized);
        }
        Ok(())
    }

    /// Swaps in a refreshed token pair for the same user
    pub fn refresh(&mut self, session: Session) {
        if session.user.id == self.session.user.id {
            self.session = session;
        }
    }
}
