//! # Taskboard Core
//!
//! Headless core of a shared kanban task board.
//!
//! Columns and cards live in a remote row store behind the [`Gateway`] trait
//! and are mirrored locally by a [`BoardStore`]. Drag gestures go through the
//! pure reorder engine ([`domain::plan_move`]), are applied optimistically, and
//! are then persisted; a [`BoardView`] keeps the mirror in step with every
//! other client through the gateway's change feed.

pub mod admin;
pub mod app;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod store;
pub mod view;

// Re-export commonly used types
pub use admin::{AllowList, SettingsService};
pub use app::{App, Phase, Screen};
pub use auth::{IdentityProvider, MemoryIdentityProvider, Session, SessionContext};
pub use config::ClientConfig;
pub use domain::{
    board::{Board, Column},
    card::Card,
    ids::{CardId, ColumnId, UserId},
    reorder::{Gesture, MoveOutcome, Slot},
};
pub use error::{Result, TaskboardError};
pub use gateway::{Gateway, GatewayError, MemoryGateway};
pub use store::BoardStore;
pub use view::BoardView;
