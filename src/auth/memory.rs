use crate::{
    auth::{AuthEvent, IdentityProvider, Session, User},
    domain::{normalize_email, UserId},
    error::{Result, TaskboardError},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct PendingLink {
    email: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct ProviderState {
    pending: HashMap<String, PendingLink>,
    outbox: Vec<(String, String)>,
    users: HashMap<String, UserId>,
    session: Option<Session>,
    unavailable: bool,
}

/// In-process identity provider.
///
/// Sent links land in an outbox instead of a mailbox; users get a stable id per
/// email on first sign-in.
pub struct MemoryIdentityProvider {
    state: Mutex<ProviderState>,
    events: broadcast::Sender<AuthEvent>,
    link_ttl: Duration,
    session_ttl: Duration,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(ProviderState::default()),
            events,
            link_ttl: Duration::hours(1),
            session_ttl: Duration::hours(1),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Simulates an outage: every call fails until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Latest link token sent to `email`
    pub fn last_link_for(&self, email: &str) -> Option<String> {
        let email = email.trim().to_lowercase();
        self.lock()
            .outbox
            .iter()
            .rev()
            .find(|(to, _)| *to == email)
            .map(|(_, token)| token.clone())
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(state: &ProviderState) -> Result<()> {
        if state.unavailable {
            return Err(TaskboardError::AuthFailed(
                "identity provider unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn issue(&self, user: User) -> Session {
        Session {
            user,
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + self.session_ttl,
        }
    }

    fn notify(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn send_magic_link(&self, email: &str) -> Result<()> {
        let email = normalize_email(email)?;
        let mut state = self.lock();
        Self::check_available(&state)?;

        let token = Uuid::new_v4().to_string();
        state.pending.insert(
            token.clone(),
            PendingLink {
                email: email.clone(),
                expires_at: Utc::now() + self.link_ttl,
            },
        );
        state.outbox.push((email.clone(), token));
        debug!(%email, "sign-in link sent");
        Ok(())
    }

    async fn verify_magic_link(&self, token: &str) -> Result<Session> {
        let session = {
            let mut state = self.lock();
            Self::check_available(&state)?;

            let link = state
                .pending
                .remove(token)
                .filter(|link| Utc::now() < link.expires_at)
                .ok_or_else(|| {
                    warn!("rejected invalid or expired sign-in link");
                    TaskboardError::AuthFailed("invalid or expired sign-in link".to_string())
                })?;

            let id = state
                .users
                .entry(link.email.clone())
                .or_insert_with(UserId::generate)
                .clone();
            let session = self.issue(User {
                id,
                email: link.email,
            });
            state.session = Some(session.clone());
            session
        };

        info!(email = %session.user.email, "signed in");
        self.notify(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn current_session(&self) -> Result<Option<Session>> {
        let state = self.lock();
        Self::check_available(&state)?;
        Ok(state
            .session
            .clone()
            .filter(|session| !session.is_expired(Utc::now())))
    }

    async fn refresh_session(&self) -> Result<Session> {
        let session = {
            let mut state = self.lock();
            Self::check_available(&state)?;
            let current = state.session.clone().ok_or(TaskboardError::NotSignedIn)?;
            let session = self.issue(current.user);
            state.session = Some(session.clone());
            session
        };

        debug!(email = %session.user.email, "session refreshed");
        self.notify(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let was_signed_in = {
            let mut state = self.lock();
            Self::check_available(&state)?;
            state.session.take().is_some()
        };

        if was_signed_in {
            info!("signed out");
            self.notify(AuthEvent::SignedOut);
        }
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sign_in(provider: &MemoryIdentityProvider, email: &str) -> Session {
        provider.send_magic_link(email).await.unwrap();
        let token = provider.last_link_for(email).unwrap();
        provider.verify_magic_link(&token).await.unwrap()
    }

    #[tokio::test]
    async fn test_magic_link_sign_in() {
        let provider = MemoryIdentityProvider::new();
        let mut events = provider.auth_events();

        let session = sign_in(&provider, "User@Example.com").await;
        assert_eq!(session.user.email, "user@example.com");
        assert_eq!(
            provider.current_session().await.unwrap(),
            Some(session.clone())
        );
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedIn(session));
    }

    #[tokio::test]
    async fn test_link_is_single_use() {
        let provider = MemoryIdentityProvider::new();
        provider.send_magic_link("a@example.com").await.unwrap();
        let token = provider.last_link_for("a@example.com").unwrap();

        provider.verify_magic_link(&token).await.unwrap();
        assert!(matches!(
            provider.verify_magic_link(&token).await,
            Err(TaskboardError::AuthFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_user_id_is_stable_per_email() {
        let provider = MemoryIdentityProvider::new();
        let first = sign_in(&provider, "a@example.com").await;
        provider.sign_out().await.unwrap();
        let second = sign_in(&provider, "a@example.com").await;

        assert_eq!(first.user.id, second.user.id);
        assert_ne!(first.access_token, second.access_token);
    }

    #[tokio::test]
    async fn test_sign_out_clears_session() {
        let provider = MemoryIdentityProvider::new();
        sign_in(&provider, "a@example.com").await;
        let mut events = provider.auth_events();

        provider.sign_out().await.unwrap();
        assert_eq!(provider.current_session().await.unwrap(), None);
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedOut);
        assert!(matches!(
            provider.refresh_session().await,
            Err(TaskboardError::NotSignedIn)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_not_current() {
        let provider = MemoryIdentityProvider::new().with_session_ttl(Duration::seconds(-1));
        sign_in(&provider, "a@example.com").await;
        assert_eq!(provider.current_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable_provider_fails() {
        let provider = MemoryIdentityProvider::new();
        provider.set_unavailable(true);
        assert!(matches!(
            provider.current_session().await,
            Err(TaskboardError::AuthFailed(_))
        ));
    }
}
