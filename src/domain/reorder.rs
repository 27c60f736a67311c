//! Translates a single drag gesture into a new board snapshot plus the rows
//! that have to be persisted for it.
//!
//! Planning is pure: the input board is never touched, and a gesture either
//! yields a complete new snapshot or nothing at all.

use crate::domain::{
    board::{Board, Column},
    card::Card,
    ids::{CardId, ColumnId},
    ordering::{move_within, normalize},
};
use std::fmt;

/// A drop location inside one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub column_id: ColumnId,
    pub index: usize,
}

impl Slot {
    pub fn new(column_id: impl Into<ColumnId>, index: usize) -> Self {
        Self {
            column_id: column_id.into(),
            index,
        }
    }
}

/// One completed drag, in view indices.
///
/// The dragged item is resolved by id; `from` is what the view reported and
/// is not trusted over the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    Column {
        id: ColumnId,
        from: usize,
        to: Option<usize>,
    },
    Card {
        id: CardId,
        from: Slot,
        to: Option<Slot>,
    },
}

impl Gesture {
    pub fn column(id: impl Into<ColumnId>, from: usize, to: usize) -> Self {
        Self::Column {
            id: id.into(),
            from,
            to: Some(to),
        }
    }

    pub fn card(id: impl Into<CardId>, from: Slot, to: Slot) -> Self {
        Self::Card {
            id: id.into(),
            from,
            to: Some(to),
        }
    }

    pub fn item(&self) -> ItemRef {
        match self {
            Self::Column { id, .. } => ItemRef::Column(id.clone()),
            Self::Card { id, .. } => ItemRef::Card(id.clone()),
        }
    }
}

/// Identity of a board item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemRef {
    Column(ColumnId),
    Card(CardId),
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(id) => write!(f, "column {}", id),
            Self::Card(id) => write!(f, "card {}", id),
        }
    }
}

/// Rows whose stored value changes because of a move
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    pub columns: Vec<Column>,
    pub cards: Vec<Card>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.cards.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len() + self.cards.len()
    }
}

/// Why a gesture produced no writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoOpReason {
    /// Dropped outside any target
    NoDestination,
    /// Dropped back onto its own index
    Unchanged,
    /// The dragged item is not in the snapshot
    ItemNotFound(ItemRef),
    /// The destination column is not in the snapshot
    ColumnNotFound(ColumnId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Applied { board: Board, writes: WriteSet },
    NoOp(NoOpReason),
}

impl MoveOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp(_))
    }

    pub fn writes(&self) -> Option<&WriteSet> {
        match self {
            Self::Applied { writes, .. } => Some(writes),
            Self::NoOp(_) => None,
        }
    }
}

/// Plans a gesture against a snapshot
pub fn plan_move(board: &Board, gesture: &Gesture) -> MoveOutcome {
    match gesture {
        Gesture::Column { id, to, .. } => plan_column_move(board, id, *to),
        Gesture::Card { id, to, .. } => plan_card_move(board, id, to.as_ref()),
    }
}

fn plan_column_move(board: &Board, id: &ColumnId, to: Option<usize>) -> MoveOutcome {
    let Some(from) = board.column_index(id) else {
        return MoveOutcome::NoOp(NoOpReason::ItemNotFound(ItemRef::Column(id.clone())));
    };
    let Some(to) = to else {
        return MoveOutcome::NoOp(NoOpReason::NoDestination);
    };
    if from == to.min(board.columns.len() - 1) {
        return MoveOutcome::NoOp(NoOpReason::Unchanged);
    }

    let reordered = move_within(board.columns.clone(), from, to);
    let writes: Vec<Column> = reordered
        .iter()
        .filter(|column| board.find_column(&column.id) != Some(*column))
        .cloned()
        .collect();

    let next = Board {
        columns: reordered,
        cards: board.cards.clone(),
    };
    MoveOutcome::Applied {
        board: next,
        writes: WriteSet {
            columns: writes,
            cards: Vec::new(),
        },
    }
}

fn plan_card_move(board: &Board, id: &CardId, to: Option<&Slot>) -> MoveOutcome {
    let Some(card) = board.find_card(id) else {
        return MoveOutcome::NoOp(NoOpReason::ItemNotFound(ItemRef::Card(id.clone())));
    };
    let Some(to) = to else {
        return MoveOutcome::NoOp(NoOpReason::NoDestination);
    };
    if board.find_column(&to.column_id).is_none() {
        return MoveOutcome::NoOp(NoOpReason::ColumnNotFound(to.column_id.clone()));
    }

    let source_id = card.column_id.clone();
    let mut source = board.column_cards(&source_id);
    let Some(from) = source.iter().position(|c| &c.id == id) else {
        return MoveOutcome::NoOp(NoOpReason::ItemNotFound(ItemRef::Card(id.clone())));
    };

    let touched: Vec<Card> = if source_id == to.column_id {
        if from == to.index.min(source.len() - 1) {
            return MoveOutcome::NoOp(NoOpReason::Unchanged);
        }
        move_within(source, from, to.index)
    } else {
        let mut moved = source.remove(from);
        let mut destination = board.column_cards(&to.column_id);
        let index = to.index.min(destination.len());
        moved.column_id = to.column_id.clone();
        destination.insert(index, moved);

        let mut touched = normalize(source);
        touched.extend(normalize(destination));
        touched
    };

    let writes: Vec<Card> = touched
        .into_iter()
        .filter(|c| board.find_card(&c.id) != Some(c))
        .collect();

    let mut next = board.clone();
    for card in &writes {
        next.put_card(card.clone());
    }
    MoveOutcome::Applied {
        board: next,
        writes: WriteSet {
            columns: Vec::new(),
            cards: writes,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(id: &str, column: &str, position: u32) -> Card {
        Card::new(id.into(), id.to_uppercase(), column.into(), position)
    }

    /// Columns A(0), B(1); A holds x(0), y(1); B holds z(0)
    fn board() -> Board {
        Board::new(
            vec![
                Column::new("A".into(), "A".to_string(), 0),
                Column::new("B".into(), "B".to_string(), 1),
            ],
            vec![card("x", "A", 0), card("y", "A", 1), card("z", "B", 0)],
        )
    }

    fn order(board: &Board, column: &str) -> Vec<(String, u32)> {
        board
            .cards_in(&column.into())
            .iter()
            .map(|c| (c.id.to_string(), c.position))
            .collect()
    }

    fn applied(outcome: MoveOutcome) -> (Board, WriteSet) {
        match outcome {
            MoveOutcome::Applied { board, writes } => (board, writes),
            MoveOutcome::NoOp(reason) => panic!("expected a move, got {:?}", reason),
        }
    }

    #[test]
    fn test_reorder_within_column() {
        let gesture = Gesture::card("y", Slot::new("A", 1), Slot::new("A", 0));
        let (next, writes) = applied(plan_move(&board(), &gesture));

        assert_eq!(
            order(&next, "A"),
            vec![("y".to_string(), 0), ("x".to_string(), 1)]
        );
        assert_eq!(writes.cards.len(), 2);
        assert!(writes.columns.is_empty());
        assert!(next.is_dense());
    }

    #[test]
    fn test_move_across_columns() {
        let gesture = Gesture::card("x", Slot::new("A", 0), Slot::new("B", 0));
        let before = board();
        let (next, writes) = applied(plan_move(&before, &gesture));

        assert_eq!(order(&next, "A"), vec![("y".to_string(), 0)]);
        assert_eq!(
            order(&next, "B"),
            vec![("x".to_string(), 0), ("z".to_string(), 1)]
        );
        assert_eq!(next.find_card(&"x".into()).unwrap().column_id.as_str(), "B");

        assert_eq!(next.cards_in(&"A".into()).len(), 1);
        assert_eq!(next.cards_in(&"B".into()).len(), 2);
        assert_eq!(next.card_count(), before.card_count());

        let written: Vec<&str> = writes.cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(written, vec!["y", "x", "z"]);
    }

    #[test]
    fn test_move_into_empty_column_clamps_index() {
        let mut start = board();
        start.put_column(Column::new("C".into(), "C".to_string(), 2));
        let gesture = Gesture::card("y", Slot::new("A", 1), Slot::new("C", 7));
        let (next, writes) = applied(plan_move(&start, &gesture));

        assert_eq!(order(&next, "C"), vec![("y".to_string(), 0)]);
        assert_eq!(writes.cards.len(), 1);
        assert!(next.is_dense());
    }

    #[test]
    fn test_column_move_renumbers_columns() {
        let mut start = board();
        start.put_column(Column::new("C".into(), "C".to_string(), 2));
        let gesture = Gesture::column("C", 2, 0);
        let (next, writes) = applied(plan_move(&start, &gesture));

        let ids: Vec<&str> = next.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
        assert_eq!(writes.columns.len(), 3);
        assert_eq!(next.cards, start.cards);
        assert!(next.is_dense());
    }

    #[test]
    fn test_noop_without_destination() {
        let gesture = Gesture::Card {
            id: "x".into(),
            from: Slot::new("A", 0),
            to: None,
        };
        assert_eq!(
            plan_move(&board(), &gesture),
            MoveOutcome::NoOp(NoOpReason::NoDestination)
        );
    }

    #[test]
    fn test_noop_when_index_unchanged() {
        let gesture = Gesture::card("y", Slot::new("A", 1), Slot::new("A", 1));
        assert_eq!(
            plan_move(&board(), &gesture),
            MoveOutcome::NoOp(NoOpReason::Unchanged)
        );

        let gesture = Gesture::column("B", 1, 9);
        assert_eq!(
            plan_move(&board(), &gesture),
            MoveOutcome::NoOp(NoOpReason::Unchanged)
        );
    }

    #[test]
    fn test_missing_item_is_reported_not_fatal() {
        let gesture = Gesture::card("ghost", Slot::new("A", 0), Slot::new("B", 0));
        assert_eq!(
            plan_move(&board(), &gesture),
            MoveOutcome::NoOp(NoOpReason::ItemNotFound(ItemRef::Card("ghost".into())))
        );

        let gesture = Gesture::card("x", Slot::new("A", 0), Slot::new("Q", 0));
        assert_eq!(
            plan_move(&board(), &gesture),
            MoveOutcome::NoOp(NoOpReason::ColumnNotFound("Q".into()))
        );
    }

    #[test]
    fn test_planning_leaves_input_untouched() {
        let before = board();
        let snapshot = before.clone();
        let gesture = Gesture::card("x", Slot::new("A", 0), Slot::new("B", 1));
        let _ = plan_move(&before, &gesture);
        assert_eq!(before, snapshot);
    }

    #[test]
    fn test_source_index_is_advisory() {
        let gesture = Gesture::card("x", Slot::new("B", 5), Slot::new("A", 1));
        let (next, _) = applied(plan_move(&board(), &gesture));
        assert_eq!(
            order(&next, "A"),
            vec![("y".to_string(), 0), ("x".to_string(), 1)]
        );
    }

    #[test]
    fn test_move_repairs_gaps_in_touched_column() {
        let gapped = Board::new(
            board().columns,
            vec![card("x", "A", 0), card("y", "A", 4), card("w", "A", 9)],
        );
        let gesture = Gesture::card("w", Slot::new("A", 2), Slot::new("A", 0));
        let (next, writes) = applied(plan_move(&gapped, &gesture));

        assert_eq!(
            order(&next, "A"),
            vec![
                ("w".to_string(), 0),
                ("x".to_string(), 1),
                ("y".to_string(), 2)
            ]
        );
        assert_eq!(writes.len(), 3);
    }
}
