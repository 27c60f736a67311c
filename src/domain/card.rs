use crate::domain::{
    ids::{CardId, ColumnId, UserId},
    ordering::Positioned,
};
use serde::{Deserialize, Serialize};

/// A card (task) placed in exactly one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub title: String,
    pub column_id: ColumnId,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl Card {
    pub fn new(id: CardId, title: String, column_id: ColumnId, position: u32) -> Self {
        Self {
            id,
            title,
            column_id,
            position,
            user_id: None,
        }
    }

    pub fn owned_by(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Sets the title
    pub fn set_title(&mut self, title: String) {
        self.title = title;
    }

    /// Reassigns the card to another column at the given position
    pub fn relocate(&mut self, column_id: ColumnId, position: u32) {
        self.column_id = column_id;
        self.position = position;
    }
}

impl Positioned for Card {
    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

/// Insert payload for a card; the gateway assigns the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCard {
    pub title: String,
    pub column_id: ColumnId,
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// Trims a user-supplied title, rejecting blank input
pub fn validate_title(title: &str) -> Result<String, crate::error::TaskboardError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(crate::error::TaskboardError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_relocate() {
        let mut card = Card::new(CardId::from("c1"), "Card".to_string(), "a".into(), 3);
        card.relocate("b".into(), 0);
        assert_eq!(card.column_id.as_str(), "b");
        assert_eq!(card.position, 0);
    }

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("  Write tests ").unwrap(), "Write tests");
        assert!(validate_title("   ").is_err());
        assert!(validate_title("").is_err());
    }

    #[test]
    fn test_card_row_deserialization_without_owner() {
        let json = r#"{
            "id": "8a6f",
            "title": "Legacy",
            "column_id": "todo",
            "position": 2
        }"#;

        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.id.as_str(), "8a6f");
        assert!(card.user_id.is_none());
    }

    #[test]
    fn test_card_serialization_omits_missing_owner() {
        let card = Card::new(CardId::from("c1"), "Card".to_string(), "a".into(), 0);
        let json = serde_json::to_string(&card).unwrap();
        assert!(!json.contains("user_id"));

        let owned = card.owned_by(UserId::from("u1"));
        let json = serde_json::to_string(&owned).unwrap();
        assert!(json.contains("\"user_id\":\"u1\""));
    }
}
