//! Board state as a reducer over a closed set of events.
//!
//! Every event carries whole rows; the reducer never merges fields.

use crate::domain::{Board, Card, CardId, Column, ColumnId, ItemRef, WriteSet};
use std::fmt;

/// Inline error shown above the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    FetchFailed(String),
    WriteFailed(String),
}

impl fmt::Display for Banner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed(message) => write!(f, "Could not load the board: {}", message),
            Self::WriteFailed(message) => write!(f, "Could not save changes: {}", message),
        }
    }
}

/// A whole row of either kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Column(Column),
    Card(Card),
}

/// A change reported by the change feed, already decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChange {
    ColumnUpserted(Column),
    CardUpserted(Card),
    ColumnRemoved(ColumnId),
    CardRemoved(CardId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    /// Wholesale replacement from a fetch
    Loaded(Board),
    /// Rows rewritten by a reorder
    Moved(WriteSet),
    Created(Item),
    /// Title or color change on one row
    Edited(Item),
    /// Removal; a column takes its cards with it
    Deleted(ItemRef),
    RemoteChanged(RemoteChange),
    Failed(Banner),
    BannerCleared,
}

impl BoardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Loaded(_) => "loaded",
            Self::Moved(_) => "moved",
            Self::Created(_) => "created",
            Self::Edited(_) => "edited",
            Self::Deleted(_) => "deleted",
            Self::RemoteChanged(_) => "remote-changed",
            Self::Failed(_) => "failed",
            Self::BannerCleared => "banner-cleared",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardState {
    pub board: Board,
    /// False until the first successful load
    pub loaded: bool,
    pub banner: Option<Banner>,
}

impl BoardState {
    /// Applies one event; returns whether anything visible changed
    pub fn reduce(&mut self, event: BoardEvent) -> bool {
        match event {
            BoardEvent::Loaded(board) => {
                let changed = !self.loaded || self.board != board;
                self.board = board;
                self.loaded = true;
                changed
            }
            BoardEvent::Moved(writes) => {
                let mut changed = false;
                for column in writes.columns {
                    changed |= self.board.put_column(column);
                }
                for card in writes.cards {
                    changed |= self.board.put_card(card);
                }
                changed
            }
            BoardEvent::Created(item) | BoardEvent::Edited(item) => self.put(item),
            BoardEvent::Deleted(item) => self.remove(&item),
            BoardEvent::RemoteChanged(change) => match change {
                RemoteChange::ColumnUpserted(column) => self.put(Item::Column(column)),
                // A card never outlives its column locally.
                RemoteChange::CardUpserted(card)
                    if self.board.find_column(&card.column_id).is_none() =>
                {
                    self.remove(&ItemRef::Card(card.id))
                }
                RemoteChange::CardUpserted(card) => self.put(Item::Card(card)),
                RemoteChange::ColumnRemoved(id) => self.remove(&ItemRef::Column(id)),
                RemoteChange::CardRemoved(id) => self.remove(&ItemRef::Card(id)),
            },
            BoardEvent::Failed(banner) => {
                let changed = self.banner.as_ref() != Some(&banner);
                self.banner = Some(banner);
                changed
            }
            BoardEvent::BannerCleared => self.banner.take().is_some(),
        }
    }

    fn put(&mut self, item: Item) -> bool {
        match item {
            Item::Column(column) => self.board.put_column(column),
            Item::Card(card) => self.board.put_card(card),
        }
    }

    fn remove(&mut self, item: &ItemRef) -> bool {
        match item {
            ItemRef::Column(id) => self.board.remove_column(id).is_some(),
            ItemRef::Card(id) => self.board.remove_card(id).is_some(),
        }
    }
}
