//! The in-process mirror of the board's rows.
//!
//! Local changes are applied before they are persisted. Any gateway failure
//! raises the banner and reloads everything from the gateway, discarding
//! whatever optimistic state was in place.

use crate::{
    auth::SessionContext,
    domain::{
        plan_move, validate_color, validate_title, Board, Card, CardId, Column, ColumnId,
        Gesture, ItemRef, MoveOutcome, NewCard, NewColumn, NoOpReason, SortOrder,
        DEFAULT_COLUMN_COLOR,
    },
    error::{Result, TaskboardError},
    gateway::{
        from_row, from_rows, to_row, ChangeEvent, ChangeKind, Filter, Gateway, Query, Row, Table,
    },
};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

pub mod reducer;

pub use reducer::{Banner, BoardEvent, BoardState, Item, RemoteChange};

pub struct BoardStore<G: Gateway + ?Sized> {
    gateway: Arc<G>,
    context: SessionContext,
    default_column_color: String,
    state: RwLock<BoardState>,
}

impl<G: Gateway + ?Sized> BoardStore<G> {
    pub fn new(gateway: Arc<G>, context: SessionContext) -> Self {
        Self {
            gateway,
            context,
            default_column_color: DEFAULT_COLUMN_COLOR.to_string(),
            state: RwLock::new(BoardState::default()),
        }
    }

    /// Color used when a column is created without one
    pub fn with_default_column_color(mut self, color: impl Into<String>) -> Self {
        self.default_column_color = color.into();
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> BoardState {
        self.read().clone()
    }

    pub fn board(&self) -> Board {
        self.read().board.clone()
    }

    pub fn banner(&self) -> Option<Banner> {
        self.read().banner.clone()
    }

    pub fn dismiss_banner(&self) {
        self.dispatch(BoardEvent::BannerCleared);
    }

    /// Fetches every column and card, replacing local state
    pub async fn load(&self) -> Result<()> {
        match self.fetch().await {
            Ok(board) => {
                info!(
                    columns = board.columns.len(),
                    cards = board.cards.len(),
                    "board loaded"
                );
                self.dispatch(BoardEvent::Loaded(board));
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "failed to load board");
                self.dispatch(BoardEvent::Failed(Banner::FetchFailed(err.to_string())));
                Err(err)
            }
        }
    }

    async fn fetch(&self) -> Result<Board> {
        let by_position = Query::all().order_by("position", SortOrder::Ascending);
        let columns = self.gateway.select(Table::Columns, &by_position).await?;
        let cards = self.gateway.select(Table::Cards, &by_position).await?;

        let columns: Vec<Column> = from_rows(Table::Columns, columns)?;
        let cards: Vec<Card> = from_rows(Table::Cards, cards)?;
        Ok(Board::new(columns, cards))
    }

    /// Applies a drag gesture locally, then persists the rows it changed
    pub async fn apply_move(&self, gesture: &Gesture) -> Result<MoveOutcome> {
        let outcome = {
            let mut state = self.write();
            let outcome = plan_move(&state.board, gesture);
            if let MoveOutcome::Applied { writes, .. } = &outcome {
                state.reduce(BoardEvent::Moved(writes.clone()));
            }
            outcome
        };

        let writes = match &outcome {
            MoveOutcome::NoOp(NoOpReason::ItemNotFound(item)) => {
                debug!(%item, "ignoring move of an item that is no longer on the board");
                return Ok(outcome);
            }
            MoveOutcome::NoOp(reason) => {
                debug!(?reason, "move produced no changes");
                return Ok(outcome);
            }
            MoveOutcome::Applied { writes, .. } => writes,
        };

        debug!(
            item = %gesture.item(),
            columns = writes.columns.len(),
            cards = writes.cards.len(),
            "persisting move"
        );
        if let Err(err) = self.persist_move(writes).await {
            return Err(self.fail_write("move", err).await);
        }
        Ok(outcome)
    }

    async fn persist_move(&self, writes: &crate::domain::WriteSet) -> Result<()> {
        if !writes.columns.is_empty() {
            let rows = writes
                .columns
                .iter()
                .map(|column| to_row(Table::Columns, column))
                .collect::<Result<Vec<Row>>>()?;
            self.gateway.upsert(Table::Columns, rows).await?;
        }
        if !writes.cards.is_empty() {
            let rows = writes
                .cards
                .iter()
                .map(|card| to_row(Table::Cards, card))
                .collect::<Result<Vec<Row>>>()?;
            self.gateway.upsert(Table::Cards, rows).await?;
        }
        Ok(())
    }

    /// Appends a new column at the end of the board
    pub async fn create_column(&self, title: &str, color: Option<&str>) -> Result<Column> {
        let title = validate_title(title)?;
        let color = validate_color(color.unwrap_or(&self.default_column_color))?;
        let new_column = NewColumn {
            title,
            color,
            position: self.read().board.next_column_position(),
            user_id: Some(self.context.user_id().clone()),
        };

        let result = async {
            let row = to_row(Table::Columns, &new_column)?;
            let inserted = self.gateway.insert(Table::Columns, vec![row]).await?;
            first_row::<Column>(Table::Columns, inserted)
        }
        .await;

        match result {
            Ok(column) => {
                info!(id = %column.id, position = column.position, "column created");
                self.dispatch(BoardEvent::Created(Item::Column(column.clone())));
                Ok(column)
            }
            Err(err) => Err(self.fail_write("create column", err).await),
        }
    }

    /// Appends a new card at the end of `column_id`
    pub async fn create_card(&self, column_id: &ColumnId, title: &str) -> Result<Card> {
        let title = validate_title(title)?;
        let position = {
            let state = self.read();
            if state.board.find_column(column_id).is_none() {
                return Err(TaskboardError::ColumnNotFound(column_id.to_string()));
            }
            state.board.next_card_position(column_id)
        };
        let new_card = NewCard {
            title,
            column_id: column_id.clone(),
            position,
            user_id: Some(self.context.user_id().clone()),
        };

        let result = async {
            let row = to_row(Table::Cards, &new_card)?;
            let inserted = self.gateway.insert(Table::Cards, vec![row]).await?;
            first_row::<Card>(Table::Cards, inserted)
        }
        .await;

        match result {
            Ok(card) => {
                info!(id = %card.id, column = %card.column_id, position = card.position, "card created");
                self.dispatch(BoardEvent::Created(Item::Card(card.clone())));
                Ok(card)
            }
            Err(err) => Err(self.fail_write("create card", err).await),
        }
    }

    /// Removes a column and its cards; surviving positions are left as they are
    pub async fn delete_column(&self, id: &ColumnId) -> Result<()> {
        if !self.dispatch(BoardEvent::Deleted(ItemRef::Column(id.clone()))) {
            debug!(%id, "column already gone");
            return Ok(());
        }

        let result = async {
            self.gateway
                .delete(Table::Cards, &Filter::eq("column_id", id.as_str()))
                .await?;
            self.gateway
                .delete(Table::Columns, &Filter::by_id(id))
                .await?;
            Ok::<(), TaskboardError>(())
        }
        .await;

        match result {
            Ok(()) => {
                info!(%id, "column deleted");
                Ok(())
            }
            Err(err) => Err(self.fail_write("delete column", err).await),
        }
    }

    /// Removes one card; surviving positions are left as they are
    pub async fn delete_card(&self, id: &CardId) -> Result<()> {
        if !self.dispatch(BoardEvent::Deleted(ItemRef::Card(id.clone()))) {
            debug!(%id, "card already gone");
            return Ok(());
        }

        match self.gateway.delete(Table::Cards, &Filter::by_id(id)).await {
            Ok(_) => {
                info!(%id, "card deleted");
                Ok(())
            }
            Err(err) => Err(self.fail_write("delete card", err.into()).await),
        }
    }

    pub async fn rename_column(&self, id: &ColumnId, title: &str) -> Result<()> {
        let title = validate_title(title)?;
        let Some(mut column) = self.read().board.find_column(id).cloned() else {
            debug!(%id, "rename of missing column ignored");
            return Ok(());
        };
        column.title = title.clone();
        self.edit(Table::Columns, id.as_str(), Item::Column(column), "title", title)
            .await
    }

    pub async fn recolor_column(&self, id: &ColumnId, color: &str) -> Result<()> {
        let color = validate_color(color)?;
        let Some(mut column) = self.read().board.find_column(id).cloned() else {
            debug!(%id, "recolor of missing column ignored");
            return Ok(());
        };
        column.color = color.clone();
        self.edit(Table::Columns, id.as_str(), Item::Column(column), "color", color)
            .await
    }

    pub async fn rename_card(&self, id: &CardId, title: &str) -> Result<()> {
        let title = validate_title(title)?;
        let Some(mut card) = self.read().board.find_card(id).cloned() else {
            debug!(%id, "rename of missing card ignored");
            return Ok(());
        };
        card.set_title(title.clone());
        self.edit(Table::Cards, id.as_str(), Item::Card(card), "title", title)
            .await
    }

    async fn edit(
        &self,
        table: Table,
        id: &str,
        item: Item,
        field: &str,
        value: String,
    ) -> Result<()> {
        self.dispatch(BoardEvent::Edited(item));

        let mut patch = Row::new();
        patch.insert(field.to_string(), Value::String(value));
        match self.gateway.update(table, &Filter::by_id(id), patch).await {
            Ok(_) => {
                debug!(%table, id, field, "row updated");
                Ok(())
            }
            Err(err) => Err(self.fail_write("update", err.into()).await),
        }
    }

    /// Reconciles one change-feed event into local state.
    ///
    /// Returns whether local state changed; echoes of this store's own writes
    /// find identical rows and change nothing.
    pub fn on_remote_change(&self, event: &ChangeEvent) -> Result<bool> {
        let change = match decode_change(event)? {
            Some(change) => change,
            None => return Ok(false),
        };
        let changed = self.dispatch(BoardEvent::RemoteChanged(change));
        if changed {
            debug!(table = %event.table, kind = ?event.kind, id = ?event.row_id(), "applied remote change");
        }
        Ok(changed)
    }

    async fn fail_write(&self, action: &str, err: TaskboardError) -> TaskboardError {
        error!(action, error = %err, "write failed, resynchronizing");
        self.dispatch(BoardEvent::Failed(Banner::WriteFailed(err.to_string())));
        if let Err(reload) = self.load().await {
            warn!(error = %reload, "resynchronization failed");
        }
        err
    }

    fn dispatch(&self, event: BoardEvent) -> bool {
        let name = event.name();
        let changed = self.write().reduce(event);
        debug!(event = name, changed, "board event");
        changed
    }

    fn read(&self) -> RwLockReadGuard<'_, BoardState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BoardState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn first_row<T: serde::de::DeserializeOwned>(table: Table, rows: Vec<Row>) -> Result<T> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| TaskboardError::MalformedRow {
            table: table.name().to_string(),
            message: "insert returned no rows".to_string(),
        })?;
    from_row(table, row)
}

fn decode_change(event: &ChangeEvent) -> Result<Option<RemoteChange>> {
    let change = match (event.table, event.kind) {
        (Table::Columns, ChangeKind::Insert | ChangeKind::Update) => event
            .new_row
            .clone()
            .map(|row| from_row(Table::Columns, row).map(RemoteChange::ColumnUpserted))
            .transpose()?,
        (Table::Cards, ChangeKind::Insert | ChangeKind::Update) => event
            .new_row
            .clone()
            .map(|row| from_row(Table::Cards, row).map(RemoteChange::CardUpserted))
            .transpose()?,
        (Table::Columns, ChangeKind::Delete) => event
            .row_id()
            .map(|id| RemoteChange::ColumnRemoved(ColumnId::from(id))),
        (Table::Cards, ChangeKind::Delete) => event
            .row_id()
            .map(|id| RemoteChange::CardRemoved(CardId::from(id))),
        _ => None,
    };
    Ok(change)
}
