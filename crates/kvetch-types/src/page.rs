use serde::{Deserialize, Serialize};

use crate::object::ObjectId;

/// Cursor pagination request.
///
/// `after` excludes everything up to and including the cursor; `first` caps
/// the number of returned elements. For object scans the cursor is compared
/// by id; for edge scans it names a `to_id` that must be present in the list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub after: Option<ObjectId>,
    pub first: Option<usize>,
}

impl Page {
    /// No cursor, no limit.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn after(mut self, cursor: ObjectId) -> Self {
        self.after = Some(cursor);
        self
    }

    pub fn first(mut self, count: usize) -> Self {
        self.first = Some(count);
        self
    }

    /// Apply the `first` cap to an already-ordered iterator.
    pub fn truncate<I: Iterator>(&self, items: I) -> impl Iterator<Item = I::Item> {
        items.take(self.first.unwrap_or(usize::MAX))
    }
}
