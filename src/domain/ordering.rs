use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Sort order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Ascending),
            "desc" => Ok(SortOrder::Descending),
            _ => Err(format!(
                "Invalid sort order '{}'. Valid orders: asc, desc",
                s
            )),
        }
    }
}

/// An item that carries a stored position within one ordered sequence
pub trait Positioned {
    fn position(&self) -> u32;
    fn set_position(&mut self, position: u32);
}

/// Stable sort by stored position.
///
/// Stored positions may contain gaps or duplicates (for example after a
/// delete), so every reader goes through this instead of indexing by position.
/// Items with equal positions keep their relative order.
pub fn sort_by_position<T: Positioned>(items: &mut [T]) {
    items.sort_by_key(|item| item.position());
}

/// Reassigns positions `0..n` in the order the items currently appear.
///
/// # Examples
/// ```
/// use taskboard_core::domain::ordering::{normalize, Positioned};
///
/// #[derive(Debug, PartialEq)]
/// struct Slot(u32);
///
/// impl Positioned for Slot {
///     fn position(&self) -> u32 { self.0 }
///     fn set_position(&mut self, position: u32) { self.0 = position; }
/// }
///
/// let items = normalize(vec![Slot(4), Slot(9), Slot(9)]);
/// assert_eq!(items, vec![Slot(0), Slot(1), Slot(2)]);
/// ```
pub fn normalize<T: Positioned>(mut items: Vec<T>) -> Vec<T> {
    for (index, item) in items.iter_mut().enumerate() {
        item.set_position(index as u32);
    }
    items
}

/// Moves the item at view index `from` to view index `to`, then normalizes.
///
/// `to` is clamped to the last index. The sequence comes back untouched when
/// there is nothing to move: an empty sequence, an out-of-range `from`, or a
/// move onto the item's own index.
pub fn move_within<T: Positioned>(mut items: Vec<T>, from: usize, to: usize) -> Vec<T> {
    if items.is_empty() || from >= items.len() {
        return items;
    }
    let to = to.min(items.len() - 1);
    if from == to {
        return items;
    }

    let item = items.remove(from);
    items.insert(to, item);
    normalize(items)
}

/// Checks that positions are exactly `0..n` in sequence order
pub fn is_dense<T: Positioned>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(index, item)| item.position() == index as u32)
}
