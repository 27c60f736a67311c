//! Row storage and change-notification interface.
//!
//! Everything the board persists goes through [`Gateway`]: untyped rows in a
//! handful of named tables, plus a broadcast feed of every mutation made by any
//! client. Typed records cross the boundary with [`to_row`] / [`from_row`].

use crate::{
    domain::SortOrder,
    error::{Result, TaskboardError},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;

#[cfg(feature = "file-gateway")]
pub mod file;
pub mod memory;
mod table;

#[cfg(feature = "file-gateway")]
pub use file::FileGateway;
pub use memory::MemoryGateway;
pub use table::TableSet;

/// A stored row: a JSON object keyed by column name
pub type Row = serde_json::Map<String, Value>;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// The tables the board knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Columns,
    Cards,
    ThemeSettings,
    AllowedEmails,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Columns,
        Table::Cards,
        Table::ThemeSettings,
        Table::AllowedEmails,
    ];

    /// Name of the table on the backend
    pub fn name(&self) -> &'static str {
        match self {
            Self::Columns => "kanban_columns",
            Self::Cards => "tasks",
            Self::ThemeSettings => "theme_settings",
            Self::AllowedEmails => "allowed_emails",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Structured failure reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({code})")]
pub struct GatewayError {
    pub code: String,
    pub message: String,
}

impl GatewayError {
    pub const UNIQUE_VIOLATION: &'static str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &'static str = "23503";
    pub const INVALID_ROW: &'static str = "invalid_row";
    pub const UNAVAILABLE: &'static str = "unavailable";
    pub const STORAGE: &'static str = "storage";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_row(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_ROW, message)
    }

    pub fn unavailable() -> Self {
        Self::new(Self::UNAVAILABLE, "gateway unavailable")
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code == Self::UNIQUE_VIOLATION
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.code == Self::FOREIGN_KEY_VIOLATION
    }
}

/// Row predicate used by select, update and delete
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    #[default]
    All,
    Eq { field: String, value: Value },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn by_id(id: impl fmt::Display) -> Self {
        Self::eq("id", id.to_string())
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => row.get(field) == Some(value),
        }
    }
}

/// A select: filter, optional ordering, optional row limit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub filter: Filter,
    pub order_by: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One mutation as seen on the change feed.
///
/// Inserts and updates carry `new_row`; deletes carry `old_row`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub new_row: Option<Row>,
    pub old_row: Option<Row>,
}

impl ChangeEvent {
    pub fn inserted(table: Table, row: Row) -> Self {
        Self {
            table,
            kind: ChangeKind::Insert,
            new_row: Some(row),
            old_row: None,
        }
    }

    pub fn updated(table: Table, row: Row) -> Self {
        Self {
            table,
            kind: ChangeKind::Update,
            new_row: Some(row),
            old_row: None,
        }
    }

    pub fn deleted(table: Table, row: Row) -> Self {
        Self {
            table,
            kind: ChangeKind::Delete,
            new_row: None,
            old_row: Some(row),
        }
    }

    /// Id of the affected row, from whichever side is present
    pub fn row_id(&self) -> Option<&str> {
        self.new_row
            .as_ref()
            .or(self.old_row.as_ref())
            .and_then(|row| row.get("id"))
            .and_then(Value::as_str)
    }
}

/// What a subscription yields
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Change(ChangeEvent),
    /// The subscriber fell behind and this many events were dropped
    Missed(u64),
}

/// A live change feed for a set of tables.
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`]) stops
/// delivery.
#[derive(Debug)]
pub struct Subscription {
    tables: Vec<Table>,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(tables: &[Table], receiver: broadcast::Receiver<ChangeEvent>) -> Self {
        Self {
            tables: tables.to_vec(),
            receiver,
        }
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Waits for the next event on a watched table.
    ///
    /// Returns `None` once the gateway has shut down.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.tables.contains(&event.table) => {
                    return Some(Notification::Change(event))
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    return Some(Notification::Missed(missed))
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next pending event on a watched table without waiting
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.tables.contains(&event.table) => {
                    return Some(Notification::Change(event))
                }
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    return Some(Notification::Missed(missed))
                }
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

/// Remote row storage with a change feed
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Returns matching rows, ordered as requested; ties keep insertion order
    async fn select(&self, table: Table, query: &Query) -> GatewayResult<Vec<Row>>;

    /// Inserts rows, assigning `id` and `created_at` when absent
    async fn insert(&self, table: Table, rows: Vec<Row>) -> GatewayResult<Vec<Row>>;

    /// Merges `patch` into every matching row
    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> GatewayResult<Vec<Row>>;

    /// Inserts or merges rows, using `id` as the conflict key
    async fn upsert(&self, table: Table, rows: Vec<Row>) -> GatewayResult<Vec<Row>>;

    /// Deletes matching rows and returns them
    async fn delete(&self, table: Table, filter: &Filter) -> GatewayResult<Vec<Row>>;

    /// Opens a change feed for the given tables
    fn subscribe(&self, tables: &[Table]) -> Subscription;

    /// Number of live subscriptions
    fn subscriber_count(&self) -> usize;
}

/// Serializes a record into a row
pub fn to_row<T: Serialize>(table: Table, value: &T) -> Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(TaskboardError::MalformedRow {
            table: table.name().to_string(),
            message: format!("expected an object, got {}", other),
        }),
    }
}

/// Deserializes a row into a record
pub fn from_row<T: DeserializeOwned>(table: Table, row: Row) -> Result<T> {
    serde_json::from_value(Value::Object(row)).map_err(|e| TaskboardError::MalformedRow {
        table: table.name().to_string(),
        message: e.to_string(),
    })
}

/// Deserializes a batch of rows
pub fn from_rows<T: DeserializeOwned>(table: Table, rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(|row| from_row(table, row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matches() {
        let r = row(json!({"id": "1", "column_id": "a"}));
        assert!(Filter::All.matches(&r));
        assert!(Filter::eq("column_id", "a").matches(&r));
        assert!(!Filter::eq("column_id", "b").matches(&r));
        assert!(!Filter::eq("missing", "a").matches(&r));
    }

    #[test]
    fn test_change_event_row_id() {
        let insert = ChangeEvent::inserted(Table::Cards, row(json!({"id": "n"})));
        assert_eq!(insert.row_id(), Some("n"));

        let delete = ChangeEvent::deleted(Table::Cards, row(json!({"id": "o"})));
        assert_eq!(delete.row_id(), Some("o"));
        assert_eq!(delete.kind, ChangeKind::Delete);
    }

    #[test]
    fn test_table_names() {
        assert_eq!(Table::Columns.name(), "kanban_columns");
        assert_eq!(Table::Cards.to_string(), "tasks");
    }

    #[test]
    fn test_from_row_reports_table() {
        let err = from_row::<crate::domain::Card>(Table::Cards, row(json!({"id": "x"})))
            .unwrap_err();
        assert!(matches!(err, TaskboardError::MalformedRow { ref table, .. } if table == "tasks"));
    }

    #[tokio::test]
    async fn test_subscription_filters_tables() {
        let (sender, receiver) = broadcast::channel(8);
        let mut sub = Subscription::new(&[Table::Cards], receiver);

        sender
            .send(ChangeEvent::inserted(Table::Columns, row(json!({"id": "c"}))))
            .unwrap();
        sender
            .send(ChangeEvent::inserted(Table::Cards, row(json!({"id": "k"}))))
            .unwrap();

        match sub.recv().await {
            Some(Notification::Change(event)) => assert_eq!(event.row_id(), Some("k")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(sub.try_recv().is_none());
    }
}
