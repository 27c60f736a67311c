use crate::domain::{
    card::Card,
    ids::{CardId, ColumnId, UserId},
    ordering::{is_dense, sort_by_position, Positioned},
};
use serde::{Deserialize, Serialize};

/// Default display color for new columns
pub const DEFAULT_COLUMN_COLOR: &str = "#e2e8f0";

/// A board column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub title: String,
    pub color: String,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl Column {
    pub fn new(id: ColumnId, title: String, position: u32) -> Self {
        Self {
            id,
            title,
            color: DEFAULT_COLUMN_COLOR.to_string(),
            position,
            user_id: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn owned_by(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

impl Positioned for Column {
    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

/// Insert payload for a column; the gateway assigns the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewColumn {
    pub title: String,
    pub color: String,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// Checks a `#rrggbb` color string
pub fn validate_color(color: &str) -> Result<String, crate::error::TaskboardError> {
    let trimmed = color.trim();
    let valid = trimmed.len() == 7
        && trimmed.starts_with('#')
        && trimmed[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(crate::error::TaskboardError::InvalidColor(color.to_string()));
    }
    Ok(trimmed.to_lowercase())
}

/// Snapshot of all columns and cards.
///
/// `columns` is kept in view order (stable by stored position). `cards` is a
/// flat list in arrival order; per-column view order is derived on read, so
/// stored positions are never trusted to be dense.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<Column>,
    pub cards: Vec<Card>,
}

impl Board {
    /// Builds a board from fetched rows; cards whose column is absent are dropped
    pub fn new(mut columns: Vec<Column>, mut cards: Vec<Card>) -> Self {
        sort_by_position(&mut columns);
        cards.retain(|card| columns.iter().any(|c| c.id == card.column_id));
        Self { columns, cards }
    }

    pub fn find_column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    pub fn find_card(&self, id: &CardId) -> Option<&Card> {
        self.cards.iter().find(|c| &c.id == id)
    }

    /// Cards of one column in view order
    pub fn cards_in(&self, column_id: &ColumnId) -> Vec<&Card> {
        let mut cards: Vec<&Card> = self
            .cards
            .iter()
            .filter(|c| &c.column_id == column_id)
            .collect();
        cards.sort_by_key(|c| c.position);
        cards
    }

    /// Owned copy of one column's cards in view order
    pub fn column_cards(&self, column_id: &ColumnId) -> Vec<Card> {
        self.cards_in(column_id).into_iter().cloned().collect()
    }

    /// View index of a card within its column
    pub fn card_index(&self, id: &CardId) -> Option<usize> {
        let card = self.find_card(id)?;
        self.cards_in(&card.column_id)
            .iter()
            .position(|c| &c.id == id)
    }

    /// View index of a column within the board
    pub fn column_index(&self, id: &ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| &c.id == id)
    }

    /// Position a newly appended column receives
    pub fn next_column_position(&self) -> u32 {
        self.columns.len() as u32
    }

    /// Position a newly appended card in `column_id` receives
    pub fn next_card_position(&self, column_id: &ColumnId) -> u32 {
        self.cards
            .iter()
            .filter(|c| &c.column_id == column_id)
            .count() as u32
    }

    /// Replaces a column by id, or appends it when unknown.
    ///
    /// Returns false when the stored value was already identical.
    pub fn put_column(&mut self, column: Column) -> bool {
        match self.columns.iter_mut().find(|c| c.id == column.id) {
            Some(existing) if *existing == column => return false,
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        sort_by_position(&mut self.columns);
        true
    }

    /// Replaces a card by id, or appends it when unknown.
    ///
    /// Returns false when the stored value was already identical.
    pub fn put_card(&mut self, card: Card) -> bool {
        match self.cards.iter_mut().find(|c| c.id == card.id) {
            Some(existing) if *existing == card => false,
            Some(existing) => {
                *existing = card;
                true
            }
            None => {
                self.cards.push(card);
                true
            }
        }
    }

    /// Removes a column together with every card that references it
    pub fn remove_column(&mut self, id: &ColumnId) -> Option<(Column, Vec<Card>)> {
        let index = self.column_index(id)?;
        let column = self.columns.remove(index);
        let (removed, kept): (Vec<Card>, Vec<Card>) = std::mem::take(&mut self.cards)
            .into_iter()
            .partition(|c| &c.column_id == id);
        self.cards = kept;
        Some((column, removed))
    }

    pub fn remove_card(&mut self, id: &CardId) -> Option<Card> {
        let index = self.cards.iter().position(|c| &c.id == id)?;
        Some(self.cards.remove(index))
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// True when column positions and every column's card positions are `0..n`
    pub fn is_dense(&self) -> bool {
        is_dense(&self.columns)
            && self
                .columns
                .iter()
                .all(|column| is_dense(&self.column_cards(&column.id)))
    }

    /// Cards whose column reference does not resolve
    pub fn dangling_cards(&self) -> Vec<&Card> {
        self.cards
            .iter()
            .filter(|card| self.find_column(&card.column_id).is_none())
            .collect()
    }
}
