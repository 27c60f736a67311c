//! Board view model.
//!
//! A mounted [`BoardView`] holds the only change-feed subscription for its
//! board. Mounting subscribes and loads; unmounting (or dropping the view)
//! releases the subscription.

use crate::{
    domain::{Card, CardId, Column, ColumnId, Gesture, MoveOutcome},
    error::Result,
    gateway::{Gateway, Notification, Subscription, Table},
    store::{Banner, BoardStore},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tables the board listens to
const WATCHED: [Table; 2] = [Table::Columns, Table::Cards];

/// One rendered column with its cards in view order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnView {
    pub column: Column,
    pub cards: Vec<Card>,
}

/// Everything needed to draw the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardRender {
    pub columns: Vec<ColumnView>,
    pub banner: Option<Banner>,
    /// False until the first load succeeds
    pub loaded: bool,
}

impl BoardRender {
    pub fn column(&self, id: &ColumnId) -> Option<&ColumnView> {
        self.columns.iter().find(|view| &view.column.id == id)
    }

    /// Card titles per column, handy for assertions and debugging
    pub fn titles(&self) -> Vec<(String, Vec<String>)> {
        self.columns
            .iter()
            .map(|view| {
                (
                    view.column.title.clone(),
                    view.cards.iter().map(|card| card.title.clone()).collect(),
                )
            })
            .collect()
    }
}

pub struct BoardView<G: Gateway + ?Sized> {
    store: Arc<BoardStore<G>>,
    subscription: Subscription,
}

impl<G: Gateway + ?Sized> BoardView<G> {
    /// Subscribes to the board tables, then loads.
    ///
    /// The subscription is opened first so nothing written during the load is
    /// missed. A failed load leaves the view mounted with the banner raised.
    pub async fn mount(store: Arc<BoardStore<G>>) -> Self {
        let subscription = store.gateway().subscribe(&WATCHED);
        if store.load().await.is_err() {
            debug!("board view mounted without data");
        }
        info!(
            subscribers = store.gateway().subscriber_count(),
            "board view mounted"
        );
        Self {
            store,
            subscription,
        }
    }

    pub fn store(&self) -> &Arc<BoardStore<G>> {
        &self.store
    }

    pub fn render(&self) -> BoardRender {
        let state = self.store.snapshot();
        let columns = state
            .board
            .columns
            .iter()
            .map(|column| ColumnView {
                column: column.clone(),
                cards: state.board.column_cards(&column.id),
            })
            .collect();
        BoardRender {
            columns,
            banner: state.banner,
            loaded: state.loaded,
        }
    }

    /// Forwards a completed drag to the store
    pub async fn drop_item(&self, gesture: Gesture) -> Result<MoveOutcome> {
        self.store.apply_move(&gesture).await
    }

    pub async fn add_column(&self, title: &str, color: Option<&str>) -> Result<Column> {
        self.store.create_column(title, color).await
    }

    pub async fn add_card(&self, column_id: &ColumnId, title: &str) -> Result<Card> {
        self.store.create_card(column_id, title).await
    }

    pub async fn delete_column(&self, id: &ColumnId) -> Result<()> {
        self.store.delete_column(id).await
    }

    pub async fn delete_card(&self, id: &CardId) -> Result<()> {
        self.store.delete_card(id).await
    }

    pub fn dismiss_banner(&self) {
        self.store.dismiss_banner();
    }

    /// Waits for the next change on the board tables and applies it.
    ///
    /// Returns false once the gateway has shut the feed down.
    pub async fn sync_next(&mut self) -> bool {
        match self.subscription.recv().await {
            Some(notification) => {
                self.apply(notification).await;
                true
            }
            None => {
                warn!("change feed closed");
                false
            }
        }
    }

    /// Applies every change already queued, without waiting; returns how many
    pub async fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Some(notification) = self.subscription.try_recv() {
            self.apply(notification).await;
            applied += 1;
        }
        applied
    }

    async fn apply(&self, notification: Notification) {
        match notification {
            Notification::Change(event) => {
                if let Err(err) = self.store.on_remote_change(&event) {
                    warn!(table = %event.table, error = %err, "undecodable change, reloading");
                    if self.store.load().await.is_err() {
                        debug!("reload after undecodable change failed");
                    }
                }
            }
            Notification::Missed(count) => {
                warn!(count, "change feed lagged, reloading");
                if self.store.load().await.is_err() {
                    debug!("reload after lagged feed failed");
                }
            }
        }
    }

    /// Tears down the subscription
    pub fn unmount(self) {
        let Self {
            store,
            subscription,
        } = self;
        subscription.unsubscribe();
        info!(
            subscribers = store.gateway().subscriber_count(),
            "board view unmounted"
        );
    }
}
