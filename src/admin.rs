//! Administration services: the allow-list of permitted accounts and the global
//! presentation settings.
//!
//! Reads that decide capabilities never fail: a missing row or a gateway
//! error means "not an admin" and "default colors". Every mutation requires an
//! admin [`SessionContext`].

use crate::{
    auth::{Capabilities, SessionContext},
    domain::{normalize_email, AllowedEmail, SortOrder, ThemeSettings},
    error::{Result, TaskboardError},
    gateway::{
        from_row, from_rows, to_row, ChangeEvent, ChangeKind, Filter, Gateway, Query, Row,
        Subscription, Table,
    },
};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct NewAllowedEmail<'a> {
    email: &'a str,
    is_admin: bool,
}

/// Permitted accounts and their admin flag
pub struct AllowList<G: Gateway + ?Sized> {
    gateway: Arc<G>,
}

impl<G: Gateway + ?Sized> AllowList<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Whether `email` carries the admin flag; lookup failures deny
    pub async fn is_admin(&self, email: &str) -> bool {
        let Ok(email) = normalize_email(email) else {
            return false;
        };
        match self.find_by_email(&email).await {
            Ok(Some(entry)) => entry.is_admin,
            Ok(None) => false,
            Err(err) => {
                warn!(%email, error = %err, "admin lookup failed, denying");
                false
            }
        }
    }

    /// Capabilities for a freshly signed-in account
    pub async fn capabilities(&self, email: &str) -> Capabilities {
        Capabilities {
            is_admin: self.is_admin(email).await,
        }
    }

    /// Every entry ordered by creation time
    pub async fn list(&self, ctx: &SessionContext, order: SortOrder) -> Result<Vec<AllowedEmail>> {
        ctx.require_admin()?;
        let rows = self
            .gateway
            .select(
                Table::AllowedEmails,
                &Query::all().order_by("created_at", order),
            )
            .await?;
        from_rows(Table::AllowedEmails, rows)
    }

    pub async fn add(
        &self,
        ctx: &SessionContext,
        email: &str,
        is_admin: bool,
    ) -> Result<AllowedEmail> {
        ctx.require_admin()?;
        let email = normalize_email(email)?;
        if self.find_by_email(&email).await?.is_some() {
            return Err(TaskboardError::EmailAlreadyAllowed(email));
        }

        let row = to_row(
            Table::AllowedEmails,
            &NewAllowedEmail {
                email: &email,
                is_admin,
            },
        )?;
        let inserted = match self.gateway.insert(Table::AllowedEmails, vec![row]).await {
            Ok(rows) => rows,
            Err(err) if err.is_unique_violation() => {
                return Err(TaskboardError::EmailAlreadyAllowed(email))
            }
            Err(err) => {
                warn!(%email, error = %err, "failed to add allowed email");
                return Err(err.into());
            }
        };

        let entry: AllowedEmail = inserted
            .into_iter()
            .next()
            .map(|row| from_row(Table::AllowedEmails, row))
            .transpose()?
            .ok_or_else(|| TaskboardError::EmailNotFound(email.clone()))?;
        info!(email = %entry.email, is_admin, "email allowed");
        Ok(entry)
    }

    /// Removes an entry; an unknown id is ignored
    pub async fn remove(&self, ctx: &SessionContext, id: &str) -> Result<()> {
        ctx.require_admin()?;
        let removed = self
            .gateway
            .delete(Table::AllowedEmails, &Filter::by_id(id))
            .await
            .map_err(|err| {
                warn!(id, error = %err, "failed to remove allowed email");
                err
            })?;
        if removed.is_empty() {
            debug!(id, "allowed email already gone");
        } else {
            info!(id, "allowed email removed");
        }
        Ok(())
    }

    /// Flips the admin flag and returns the updated entry
    pub async fn toggle_admin(&self, ctx: &SessionContext, id: &str) -> Result<AllowedEmail> {
        ctx.require_admin()?;
        let current: AllowedEmail = self
            .gateway
            .select(Table::AllowedEmails, &Query::all().filter(Filter::by_id(id)).limit(1))
            .await?
            .into_iter()
            .next()
            .map(|row| from_row(Table::AllowedEmails, row))
            .transpose()?
            .ok_or_else(|| TaskboardError::EmailNotFound(id.to_string()))?;

        let mut patch = Row::new();
        patch.insert("is_admin".to_string(), Value::Bool(!current.is_admin));
        let updated = self
            .gateway
            .update(Table::AllowedEmails, &Filter::by_id(id), patch)
            .await
            .map_err(|err| {
                warn!(id, error = %err, "failed to toggle admin flag");
                err
            })?;

        let entry: AllowedEmail = updated
            .into_iter()
            .next()
            .map(|row| from_row(Table::AllowedEmails, row))
            .transpose()?
            .ok_or_else(|| TaskboardError::EmailNotFound(id.to_string()))?;
        info!(email = %entry.email, is_admin = entry.is_admin, "admin flag changed");
        Ok(entry)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AllowedEmail>> {
        let rows = self
            .gateway
            .select(
                Table::AllowedEmails,
                &Query::all().filter(Filter::eq("email", email)).limit(1),
            )
            .await?;
        rows.into_iter()
            .next()
            .map(|row| from_row(Table::AllowedEmails, row))
            .transpose()
    }
}

/// Cached presentation settings backed by the singleton settings row
pub struct SettingsService<G: Gateway + ?Sized> {
    gateway: Arc<G>,
    fallback: ThemeSettings,
    current: RwLock<ThemeSettings>,
}

impl<G: Gateway + ?Sized> SettingsService<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            fallback: ThemeSettings::default(),
            current: RwLock::new(ThemeSettings::default()),
        }
    }

    /// Settings used when there is no readable settings row
    pub fn with_fallback(mut self, fallback: ThemeSettings) -> Self {
        self.current = RwLock::new(fallback.clone());
        self.fallback = fallback;
        self
    }

    /// Last loaded or saved settings
    pub fn current(&self) -> ThemeSettings {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetches the settings row; falls back when it is missing or unreadable
    pub async fn load(&self) -> ThemeSettings {
        let settings = match self.fetch_row().await {
            Ok(Some(row)) => match from_row::<ThemeSettings>(Table::ThemeSettings, row) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!(error = %err, "unreadable settings row, using defaults");
                    self.fallback.clone()
                }
            },
            Ok(None) => {
                debug!("no settings row, using defaults");
                self.fallback.clone()
            }
            Err(err) => {
                warn!(error = %err, "failed to load settings, using defaults");
                self.fallback.clone()
            }
        };
        self.replace(settings.clone());
        settings
    }

    /// Writes all six colors to the existing settings row
    pub async fn save(&self, ctx: &SessionContext, settings: &ThemeSettings) -> Result<ThemeSettings> {
        ctx.require_admin()?;
        let settings = settings.validated()?;

        let id = self
            .fetch_row()
            .await?
            .and_then(|row| row.get("id").and_then(Value::as_str).map(str::to_string))
            .ok_or(TaskboardError::SettingNotFound)?;

        let patch = to_row(Table::ThemeSettings, &settings)?;
        self.gateway
            .update(Table::ThemeSettings, &Filter::by_id(&id), patch)
            .await
            .map_err(|err| {
                warn!(error = %err, "failed to save settings");
                err
            })?;

        info!(%id, "settings saved");
        self.replace(settings.clone());
        Ok(settings)
    }

    /// Change feed for the settings table
    pub fn watch(&self) -> Subscription {
        self.gateway.subscribe(&[Table::ThemeSettings])
    }

    /// Applies a settings change from the feed; returns whether it differed
    pub fn on_remote_change(&self, event: &ChangeEvent) -> bool {
        if event.table != Table::ThemeSettings || event.kind == ChangeKind::Delete {
            return false;
        }
        let Some(row) = event.new_row.clone() else {
            return false;
        };
        match from_row::<ThemeSettings>(Table::ThemeSettings, row) {
            Ok(settings) => self.replace(settings),
            Err(err) => {
                warn!(error = %err, "ignoring unreadable settings change");
                false
            }
        }
    }

    async fn fetch_row(&self) -> Result<Option<Row>> {
        let rows = self
            .gateway
            .select(Table::ThemeSettings, &Query::all().limit(1))
            .await?;
        Ok(rows.into_iter().next())
    }

    fn replace(&self, settings: ThemeSettings) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if *current == settings {
            return false;
        }
        *current = settings;
        true
    }
}
