use crate::{
    domain::SortOrder,
    gateway::{ChangeEvent, Filter, GatewayError, GatewayResult, Query, Row, Table},
};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::{cmp::Ordering, collections::BTreeMap};
use uuid::Uuid;

/// In-process row tables with backend semantics.
///
/// Rows are kept in insertion order per table. Every mutation returns the
/// change events it produced so the owner can publish them.
///
/// A card row's `column_id` must name an existing column, and deleting a
/// column deletes its cards with it.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: BTreeMap<Table, Vec<Row>>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents of one table
    pub fn load(&mut self, table: Table, rows: Vec<Row>) {
        self.tables.insert(table, rows);
    }

    /// All rows of a table in insertion order
    pub fn rows(&self, table: Table) -> &[Row] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn select(&self, table: Table, query: &Query) -> Vec<Row> {
        let mut rows: Vec<Row> = self
            .rows(table)
            .iter()
            .filter(|row| query.filter.matches(row))
            .cloned()
            .collect();

        if let Some((field, order)) = &query.order_by {
            rows.sort_by(|a, b| {
                let cmp = compare_values(a.get(field), b.get(field));
                match order {
                    SortOrder::Ascending => cmp,
                    SortOrder::Descending => cmp.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows
    }

    pub fn insert(
        &mut self,
        table: Table,
        rows: Vec<Row>,
    ) -> GatewayResult<(Vec<Row>, Vec<ChangeEvent>)> {
        for row in &rows {
            self.check_column_ref(table, row)?;
        }
        let existing = self.tables.entry(table).or_default();
        let mut prepared = Vec::with_capacity(rows.len());

        for mut row in rows {
            let id = match row.get("id") {
                Some(Value::String(id)) if !id.is_empty() => id.clone(),
                Some(Value::Null) | None => {
                    let id = Uuid::new_v4().to_string();
                    row.insert("id".to_string(), Value::String(id.clone()));
                    id
                }
                Some(other) => {
                    return Err(GatewayError::invalid_row(format!(
                        "{}: id must be a string, got {}",
                        table, other
                    )))
                }
            };
            if existing
                .iter()
                .any(|r| r.get("id").and_then(Value::as_str) == Some(id.as_str()))
                || prepared.iter().any(|r: &Row| {
                    r.get("id").and_then(Value::as_str) == Some(id.as_str())
                })
            {
                return Err(GatewayError::new(
                    GatewayError::UNIQUE_VIOLATION,
                    format!("duplicate key value violates unique constraint on {}.id", table),
                ));
            }
            stamp_created_at(&mut row);
            prepared.push(row);
        }

        existing.extend(prepared.iter().cloned());
        let events = prepared
            .iter()
            .map(|row| ChangeEvent::inserted(table, row.clone()))
            .collect();
        Ok((prepared, events))
    }

    pub fn update(
        &mut self,
        table: Table,
        filter: &Filter,
        patch: &Row,
    ) -> GatewayResult<(Vec<Row>, Vec<ChangeEvent>)> {
        self.check_column_ref(table, patch)?;
        let mut updated = Vec::new();
        for row in self.tables.entry(table).or_default().iter_mut() {
            if filter.matches(row) {
                merge(row, patch);
                updated.push(row.clone());
            }
        }
        let events = updated
            .iter()
            .map(|row| ChangeEvent::updated(table, row.clone()))
            .collect();
        Ok((updated, events))
    }

    pub fn upsert(
        &mut self,
        table: Table,
        rows: Vec<Row>,
    ) -> GatewayResult<(Vec<Row>, Vec<ChangeEvent>)> {
        if let Some(row) = rows
            .iter()
            .find(|row| row.get("id").and_then(Value::as_str).is_none())
        {
            return Err(GatewayError::invalid_row(format!(
                "{}: upsert requires an id, got {}",
                table,
                Value::Object(row.clone())
            )));
        }
        for row in &rows {
            self.check_column_ref(table, row)?;
        }

        let existing = self.tables.entry(table).or_default();
        let mut written = Vec::with_capacity(rows.len());
        let mut events = Vec::with_capacity(rows.len());

        for mut row in rows {
            let id = row.get("id").cloned();
            match existing.iter_mut().find(|r| r.get("id") == id.as_ref()) {
                Some(current) => {
                    merge(current, &row);
                    written.push(current.clone());
                    events.push(ChangeEvent::updated(table, current.clone()));
                }
                None => {
                    stamp_created_at(&mut row);
                    existing.push(row.clone());
                    events.push(ChangeEvent::inserted(table, row.clone()));
                    written.push(row);
                }
            }
        }
        Ok((written, events))
    }

    /// Removes matching rows; removing a column also removes its cards,
    /// whose events come first
    pub fn delete(&mut self, table: Table, filter: &Filter) -> (Vec<Row>, Vec<ChangeEvent>) {
        let (removed, events) = self.remove_where(table, |row| filter.matches(row));
        if table != Table::Columns || removed.is_empty() {
            return (removed, events);
        }

        let column_ids: Vec<&Value> = removed.iter().filter_map(|row| row.get("id")).collect();
        let (_, mut cascaded) = self.remove_where(Table::Cards, |card| {
            card.get("column_id")
                .map_or(false, |column_id| column_ids.contains(&column_id))
        });
        cascaded.extend(events);
        (removed, cascaded)
    }

    fn remove_where(
        &mut self,
        table: Table,
        predicate: impl Fn(&Row) -> bool,
    ) -> (Vec<Row>, Vec<ChangeEvent>) {
        let rows = self.tables.entry(table).or_default();
        let (removed, kept): (Vec<Row>, Vec<Row>) =
            std::mem::take(rows).into_iter().partition(|r| predicate(r));
        *rows = kept;
        let events = removed
            .iter()
            .map(|row| ChangeEvent::deleted(table, row.clone()))
            .collect();
        (removed, events)
    }

    /// Rejects a card row whose `column_id` names no column
    fn check_column_ref(&self, table: Table, row: &Row) -> GatewayResult<()> {
        if table != Table::Cards {
            return Ok(());
        }
        let column_id = match row.get("column_id") {
            Some(Value::String(id)) => id,
            _ => return Ok(()),
        };
        let exists = self
            .rows(Table::Columns)
            .iter()
            .any(|column| column.get("id").and_then(Value::as_str) == Some(column_id.as_str()));
        if exists {
            return Ok(());
        }
        Err(GatewayError::new(
            GatewayError::FOREIGN_KEY_VIOLATION,
            format!(
                "{}.column_id violates foreign key constraint: column {} does not exist",
                table, column_id
            ),
        ))
    }
}

/// Fixed-width timestamps so string ordering matches time ordering
fn stamp_created_at(row: &mut Row) {
    if !matches!(row.get("created_at"), Some(Value::String(_))) {
        row.insert(
            "created_at".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
    }
}

fn merge(target: &mut Row, patch: &Row) {
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

/// Column ordering; missing and null values sort last
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(_), Some(_)) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChangeKind;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn ids(rows: &[Row]) -> Vec<&str> {
        rows.iter()
            .map(|r| r.get("id").and_then(Value::as_str).unwrap())
            .collect()
    }

    #[test]
    fn test_insert_assigns_id_and_created_at() {
        let mut set = TableSet::new();
        let (rows, events) = set
            .insert(Table::Columns, vec![row(json!({"title": "Todo"}))])
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows[0].get("id").and_then(Value::as_str).is_some());
        assert!(rows[0].contains_key("created_at"));
        assert_eq!(events[0].kind, ChangeKind::Insert);
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let mut set = TableSet::new();
        set.insert(Table::Cards, vec![row(json!({"id": "a"}))]).unwrap();
        let err = set
            .insert(Table::Cards, vec![row(json!({"id": "a"}))])
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(set.rows(Table::Cards).len(), 1);
    }

    #[test]
    fn test_select_orders_with_stable_ties() {
        let mut set = TableSet::new();
        set.insert(
            Table::Cards,
            vec![
                row(json!({"id": "a", "position": 1})),
                row(json!({"id": "b", "position": 0})),
                row(json!({"id": "c", "position": 1})),
                row(json!({"id": "d"})),
            ],
        )
        .unwrap();

        let query = Query::all().order_by("position", SortOrder::Ascending);
        assert_eq!(ids(&set.select(Table::Cards, &query)), vec!["b", "a", "c", "d"]);

        let query = Query::all()
            .order_by("position", SortOrder::Descending)
            .limit(2);
        assert_eq!(ids(&set.select(Table::Cards, &query)), vec!["d", "a"]);
    }

    #[test]
    fn test_upsert_merges_existing_and_inserts_new() {
        let mut set = TableSet::new();
        set.insert(
            Table::Cards,
            vec![row(json!({"id": "a", "title": "A", "position": 0}))],
        )
        .unwrap();

        let (written, events) = set
            .upsert(
                Table::Cards,
                vec![
                    row(json!({"id": "a", "position": 3})),
                    row(json!({"id": "b", "title": "B", "position": 0})),
                ],
            )
            .unwrap();

        assert_eq!(written[0].get("title"), Some(&json!("A")));
        assert_eq!(written[0].get("position"), Some(&json!(3)));
        assert_eq!(events[0].kind, ChangeKind::Update);
        assert_eq!(events[1].kind, ChangeKind::Insert);
        assert_eq!(ids(set.rows(Table::Cards)), vec!["a", "b"]);
    }

    #[test]
    fn test_upsert_without_id_writes_nothing() {
        let mut set = TableSet::new();
        let result = set.upsert(
            Table::Cards,
            vec![row(json!({"id": "a"})), row(json!({"title": "no id"}))],
        );
        assert!(result.is_err());
        assert!(set.rows(Table::Cards).is_empty());
    }

    fn columns(set: &mut TableSet, ids: &[&str]) {
        let rows = ids.iter().map(|id| row(json!({"id": id}))).collect();
        set.insert(Table::Columns, rows).unwrap();
    }

    #[test]
    fn test_update_and_delete_by_filter() {
        let mut set = TableSet::new();
        columns(&mut set, &["x", "y"]);
        set.insert(
            Table::Cards,
            vec![
                row(json!({"id": "a", "column_id": "x"})),
                row(json!({"id": "b", "column_id": "y"})),
                row(json!({"id": "c", "column_id": "x"})),
            ],
        )
        .unwrap();

        let (updated, _) = set
            .update(
                Table::Cards,
                &Filter::by_id("b"),
                &row(json!({"title": "B"})),
            )
            .unwrap();
        assert_eq!(updated.len(), 1);

        let (removed, events) = set.delete(Table::Cards, &Filter::eq("column_id", "x"));
        assert_eq!(ids(&removed), vec!["a", "c"]);
        assert!(events.iter().all(|e| e.kind == ChangeKind::Delete));
        assert_eq!(ids(set.rows(Table::Cards)), vec!["b"]);
    }

    #[test]
    fn test_card_requires_existing_column() {
        let mut set = TableSet::new();
        columns(&mut set, &["x"]);
        set.insert(Table::Cards, vec![row(json!({"id": "a", "column_id": "x"}))])
            .unwrap();

        let err = set
            .insert(Table::Cards, vec![row(json!({"id": "b", "column_id": "gone"}))])
            .unwrap_err();
        assert!(err.is_foreign_key_violation());

        let err = set
            .upsert(
                Table::Cards,
                vec![
                    row(json!({"id": "a", "position": 1})),
                    row(json!({"id": "c", "column_id": "gone"})),
                ],
            )
            .unwrap_err();
        assert_eq!(err.code, GatewayError::FOREIGN_KEY_VIOLATION);

        assert!(set
            .update(
                Table::Cards,
                &Filter::by_id("a"),
                &row(json!({"column_id": "gone"})),
            )
            .is_err());

        assert_eq!(ids(set.rows(Table::Cards)), vec!["a"]);
        assert_eq!(set.rows(Table::Cards)[0].get("column_id"), Some(&json!("x")));
        assert!(!set.rows(Table::Cards)[0].contains_key("position"));
    }

    #[test]
    fn test_column_delete_cascades_cards() {
        let mut set = TableSet::new();
        columns(&mut set, &["x", "y"]);
        set.insert(
            Table::Cards,
            vec![
                row(json!({"id": "a", "column_id": "x"})),
                row(json!({"id": "b", "column_id": "y"})),
            ],
        )
        .unwrap();

        let (removed, events) = set.delete(Table::Columns, &Filter::by_id("x"));
        assert_eq!(ids(&removed), vec!["x"]);
        let deleted: Vec<(Table, Option<&str>)> = events
            .iter()
            .map(|e| (e.table, e.row_id()))
            .collect();
        assert_eq!(
            deleted,
            vec![(Table::Cards, Some("a")), (Table::Columns, Some("x"))]
        );
        assert_eq!(ids(set.rows(Table::Cards)), vec!["b"]);

        // Stale writes cannot bring the card back.
        assert!(set
            .upsert(Table::Cards, vec![row(json!({"id": "a", "column_id": "x"}))])
            .is_err());
    }
}
