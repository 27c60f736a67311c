pub mod board;
pub mod card;
pub mod ids;
pub mod ordering;
pub mod reorder;
pub mod settings;

pub use board::{validate_color, Board, Column, NewColumn, DEFAULT_COLUMN_COLOR};
pub use card::{validate_title, Card, NewCard};
pub use ids::{CardId, ColumnId, UserId};
pub use ordering::{is_dense, move_within, normalize, sort_by_position, Positioned, SortOrder};
pub use reorder::{plan_move, Gesture, ItemRef, MoveOutcome, NoOpReason, Slot, WriteSet};
pub use settings::{normalize_email, AllowedEmail, ThemeSettings};
