//! A cursor identifies a point in the total order of committed events.
use serde::{Deserialize, Serialize};

/// The pair `(transaction_id, position)`.
///
/// The authoritative total order of committed events is the lexicographic
/// order of this pair. `position` alone is globally unique and strictly
/// increasing within a transaction, but a transaction with a larger id may
/// commit before one with a smaller id, so consumers must order and paginate
/// by the pair. "After a cursor" means strictly greater in this order.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Cursor {
    pub transaction_id: i64,
    pub position: i64,
}

impl Cursor {
    pub fn new(transaction_id: i64, position: i64) -> Self {
        Self {
            transaction_id,
            position,
        }
    }
}
