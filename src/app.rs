//! Application shell: authentication phases, per-session services and the
//! admin screens.

use crate::{
    admin::{AllowList, SettingsService},
    auth::{AuthEvent, IdentityProvider, Session, SessionContext},
    config::ClientConfig,
    domain::ThemeSettings,
    error::{Result, TaskboardError},
    gateway::Gateway,
    store::BoardStore,
    view::BoardView,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    SignedOut,
    /// Blocking failure; leave it with [`App::retry`]
    AuthFailed(String),
    SignedIn,
}

/// What the signed-in user is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Board,
    ThemeSettings,
    EmailManagement,
}

/// Everything that lives exactly as long as one session
struct Signed<G: Gateway + ?Sized> {
    context: SessionContext,
    view: BoardView<G>,
    settings: SettingsService<G>,
    screen: Screen,
}

pub struct App<P: IdentityProvider + ?Sized, G: Gateway + ?Sized> {
    provider: Arc<P>,
    gateway: Arc<G>,
    allow_list: AllowList<G>,
    fallback_theme: ThemeSettings,
    phase: Phase,
    signed: Option<Signed<G>>,
}

impl<P: IdentityProvider + ?Sized, G: Gateway + ?Sized> App<P, G> {
    pub fn new(provider: Arc<P>, gateway: Arc<G>) -> Self {
        Self {
            allow_list: AllowList::new(Arc::clone(&gateway)),
            provider,
            gateway,
            fallback_theme: ThemeSettings::default(),
            phase: Phase::SignedOut,
            signed: None,
        }
    }

    /// Takes client-side defaults from `config`; a stored settings row still
    /// wins over them
    pub fn with_config(mut self, config: &ClientConfig) -> Self {
        self.fallback_theme.default_column_bg = config.default_column_color.clone();
        self
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Current screen; `None` unless signed in
    pub fn screen(&self) -> Option<Screen> {
        self.signed.as_ref().map(|signed| signed.screen)
    }

    pub fn context(&self) -> Option<&SessionContext> {
        self.signed.as_ref().map(|signed| &signed.context)
    }

    pub fn board(&self) -> Option<&BoardView<G>> {
        self.signed.as_ref().map(|signed| &signed.view)
    }

    pub fn board_mut(&mut self) -> Option<&mut BoardView<G>> {
        self.signed.as_mut().map(|signed| &mut signed.view)
    }

    pub fn settings(&self) -> Option<&SettingsService<G>> {
        self.signed.as_ref().map(|signed| &signed.settings)
    }

    pub fn allow_list(&self) -> &AllowList<G> {
        &self.allow_list
    }

    /// Resumes an existing session if the provider has one
    pub async fn start(&mut self) {
        match self.provider.current_session().await {
            Ok(Some(session)) => self.enter(session).await,
            Ok(None) => {
                debug!("no session to resume");
                self.leave();
            }
            Err(err) => self.fail(err),
        }
    }

    /// Leaves the auth-failure phase by checking the session again
    pub async fn retry(&mut self) {
        if matches!(self.phase, Phase::AuthFailed(_)) {
            info!("retrying authentication");
            self.start().await;
        }
    }

    pub async fn request_link(&self, email: &str) -> Result<()> {
        self.provider.send_magic_link(email).await.map_err(|err| {
            warn!(error = %err, "failed to send sign-in link");
            err
        })
    }

    pub async fn complete_link(&mut self, token: &str) -> Result<()> {
        match self.provider.verify_magic_link(token).await {
            Ok(session) => {
                self.enter(session).await;
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.fail(err);
                Err(TaskboardError::AuthFailed(message))
            }
        }
    }

    /// Ends the session; local state is dropped even if the provider fails
    pub async fn sign_out(&mut self) {
        if let Err(err) = self.provider.sign_out().await {
            warn!(error = %err, "provider sign-out failed");
        }
        self.leave();
    }

    /// Applies a notification from the identity provider
    pub async fn handle_auth_event(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) => {
                let same_user = self
                    .context()
                    .map(|ctx| ctx.user_id() == &session.user.id)
                    .unwrap_or(false);
                if !same_user {
                    self.enter(session).await;
                }
            }
            AuthEvent::TokenRefreshed(session) => {
                if let Some(signed) = self.signed.as_mut() {
                    signed.context.refresh(session);
                    debug!("session token refreshed");
                }
            }
            AuthEvent::SignedOut => self.leave(),
        }
    }

    pub fn toggle_theme_settings(&mut self) -> Result<Screen> {
        self.toggle(Screen::ThemeSettings)
    }

    pub fn toggle_email_management(&mut self) -> Result<Screen> {
        self.toggle(Screen::EmailManagement)
    }

    /// Opens an admin screen, or returns to the board if it is already open
    fn toggle(&mut self, screen: Screen) -> Result<Screen> {
        let signed = self.signed.as_mut().ok_or(TaskboardError::NotSignedIn)?;
        signed.context.require_admin()?;
        signed.screen = if signed.screen == screen {
            Screen::Board
        } else {
            screen
        };
        debug!(screen = ?signed.screen, "screen changed");
        Ok(signed.screen)
    }

    async fn enter(&mut self, session: Session) {
        self.leave();

        let capabilities = self.allow_list.capabilities(&session.user.email).await;
        let context = SessionContext::new(session, capabilities);

        let settings = SettingsService::new(Arc::clone(&self.gateway))
            .with_fallback(self.fallback_theme.clone());
        let theme = settings.load().await;
        let store = BoardStore::new(Arc::clone(&self.gateway), context.clone())
            .with_default_column_color(theme.default_column_bg);
        let view = BoardView::mount(Arc::new(store)).await;

        info!(
            email = context.email(),
            is_admin = context.is_admin(),
            "session started"
        );
        self.signed = Some(Signed {
            context,
            view,
            settings,
            screen: Screen::Board,
        });
        self.phase = Phase::SignedIn;
    }

    fn leave(&mut self) {
        if let Some(signed) = self.signed.take() {
            signed.view.unmount();
            info!(email = signed.context.email(), "session ended");
        }
        self.phase = Phase::SignedOut;
    }

    fn fail(&mut self, err: TaskboardError) {
        error!(error = %err, "authentication failed");
        self.leave();
        self.phase = Phase::AuthFailed(err.to_string());
    }
}
