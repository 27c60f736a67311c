use crate::{
    error::Result,
    gateway::{
        ChangeEvent, Filter, Gateway, GatewayError, GatewayResult, MemoryGateway, Query, Row,
        Subscription, Table, TableSet,
    },
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error, info};

/// File-backed gateway: one JSON array per table under a data directory.
///
/// Rows live in memory while the gateway is open. A write is applied to a
/// staged copy of the tables first; only once every affected table file has
/// been rewritten does it become visible and reach the change feed.
pub struct FileGateway {
    root_path: PathBuf,
    inner: MemoryGateway,
    write_lock: Mutex<()>,
}

impl FileGateway {
    const TABLE_EXTENSION: &'static str = "json";

    /// Opens (creating if needed) a data directory and loads every table file
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root_path = root.as_ref().to_path_buf();
        Self::ensure_directory_exists(&root_path).await?;

        let mut tables = TableSet::new();
        for table in Table::ALL {
            let path = Self::table_file(&root_path, table);
            if !path.exists() {
                continue;
            }
            let contents = fs::read_to_string(&path).await?;
            let rows: Vec<Row> = serde_json::from_str(&contents)?;
            debug!(%table, count = rows.len(), "loaded table file");
            tables.load(table, rows);
        }

        info!(path = %root_path.display(), "opened file gateway");
        Ok(Self {
            root_path,
            inner: MemoryGateway::with_tables(tables),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn table_file(root: &Path, table: Table) -> PathBuf {
        root.join(format!("{}.{}", table.name(), Self::TABLE_EXTENSION))
    }

    async fn ensure_directory_exists(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
        }
        Ok(())
    }

    /// Stages `op` against a copy of the tables, persists the tables it
    /// touched, then commits
    async fn write<F>(&self, table: Table, op: F) -> GatewayResult<Vec<Row>>
    where
        F: FnOnce(&mut TableSet) -> GatewayResult<(Vec<Row>, Vec<ChangeEvent>)> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut staged = self.inner.snapshot();
        let (rows, events) = op(&mut staged)?;

        let mut touched = vec![table];
        for event in &events {
            if !touched.contains(&event.table) {
                touched.push(event.table);
            }
        }
        self.persist(&staged, &touched).await?;
        self.inner.commit(staged, events);
        Ok(rows)
    }

    /// Writes every table to a sibling temp file, then renames them into place
    async fn persist(&self, tables: &TableSet, touched: &[Table]) -> GatewayResult<()> {
        let mut pending = Vec::with_capacity(touched.len());
        for &table in touched {
            let path = Self::table_file(&self.root_path, table);
            let staging = path.with_extension("json.tmp");
            let json = serde_json::to_string_pretty(tables.rows(table)).map_err(storage_error)?;
            fs::write(&staging, json).await.map_err(|e| {
                error!(path = %staging.display(), error = %e, "failed to write table file");
                storage_error(e)
            })?;
            pending.push((staging, path));
        }

        for (staging, path) in pending {
            if let Err(e) = fs::rename(&staging, &path).await {
                error!(path = %path.display(), error = %e, "failed to replace table file");
                if fs::remove_file(&staging).await.is_err() {
                    debug!(path = %staging.display(), "staged table file left behind");
                }
                return Err(storage_error(e));
            }
        }
        Ok(())
    }
}

fn storage_error(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::new(GatewayError::STORAGE, err.to_string())
}

#[async_trait]
impl Gateway for FileGateway {
    async fn select(&self, table: Table, query: &Query) -> GatewayResult<Vec<Row>> {
        self.inner.select(table, query).await
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> GatewayResult<Vec<Row>> {
        self.write(table, |tables| tables.insert(table, rows)).await
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Row) -> GatewayResult<Vec<Row>> {
        self.write(table, |tables| tables.update(table, filter, &patch))
            .await
    }

    async fn upsert(&self, table: Table, rows: Vec<Row>) -> GatewayResult<Vec<Row>> {
        self.write(table, |tables| tables.upsert(table, rows)).await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> GatewayResult<Vec<Row>> {
        self.write(table, |tables| Ok(tables.delete(table, filter)))
            .await
    }

    fn subscribe(&self, tables: &[Table]) -> Subscription {
        self.inner.subscribe(tables)
    }

    fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }
}
