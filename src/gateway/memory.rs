use crate::gateway::{
    ChangeEvent, Filter, Gateway, GatewayError, GatewayResult, Query, Row, Subscription, Table,
    TableSet,
};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard, PoisonError,
};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// In-process gateway shared by every client holding it.
///
/// Writes are applied under one lock, so each call is atomic and the change
/// feed sees events in the order the writes were processed.
pub struct MemoryGateway {
    tables: Mutex<TableSet>,
    changes: broadcast::Sender<ChangeEvent>,
    offline: AtomicBool,
}

impl MemoryGateway {
    const FEED_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_tables(TableSet::new())
    }

    /// Creates a gateway over pre-loaded tables
    pub fn with_tables(tables: TableSet) -> Self {
        let (changes, _) = broadcast::channel(Self::FEED_CAPACITY);
        Self {
            tables: Mutex::new(tables),
            changes,
            offline: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent call fail as unavailable until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Copy of one table's rows in insertion order
    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.lock().rows(table).to_vec()
    }

    /// Copy of every table, for staging a write outside the lock
    pub(crate) fn snapshot(&self) -> TableSet {
        self.lock().clone()
    }

    /// Replaces every table with a staged copy and publishes its events
    pub(crate) fn commit(&self, tables: TableSet, events: Vec<ChangeEvent>) {
        let mut current = self.lock();
        *current = tables;
        self.publish(events);
        drop(current);
    }

    fn lock(&self) -> MutexGuard<'_, TableSet> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> GatewayResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::unavailable());
        }
        Ok(())
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            trace!(table = %event.table, kind = ?event.kind, id = ?event.row_id(), "publishing change");
            // No receivers is not an error: nobody is watching.
            let _ = self.changes.send(event);
        }
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn select(&self, table: Table, query: &Query) -> GatewayResult<Vec<Row>> {
        self.check_online()?;
        let rows = self.lock().select(table, query);
        debug!(%table, count = rows.len(), "select");
        Ok(rows)
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> GatewayResult<Vec<Row>> {
        self.check_online()?;
        let mut tables = self.lock();
        let (inserted, events) = tables.insert(table, rows)?;
        // Published under the lock so the feed order matches write order.
        self.publish(events);
        drop(tables);
        Ok(inserted)
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> GatewayResult<Vec<Row>> {
        self.check_online()?;
        let mut tables = self.lock();
        let (updated, events) = tables.update(table, filter, &patch)?;
        self.publish(events);
        drop(tables);
        Ok(updated)
    }

    async fn upsert(&self, table: Table, rows: Vec<Row>) -> GatewayResult<Vec<Row>> {
        self.check_online()?;
        let mut tables = self.lock();
        let (written, events) = tables.upsert(table, rows)?;
        self.publish(events);
        drop(tables);
        Ok(written)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> GatewayResult<Vec<Row>> {
        self.check_online()?;
        let mut tables = self.lock();
        let (removed, events) = tables.delete(table, filter);
        self.publish(events);
        drop(tables);
        Ok(removed)
    }

    fn subscribe(&self, tables: &[Table]) -> Subscription {
        debug!(?tables, "subscribing to change feed");
        Subscription::new(tables, self.changes.subscribe())
    }

    fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }
}
