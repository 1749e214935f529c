use crate::Marketplace;

/// Identifier of one item to collect, as listed by the marketplace.
pub type TaskId = String;

/// One item's identifier plus retry bookkeeping.
///
/// Immutable after planning except for `attempt`, which the retry layer
/// bumps at the start of each attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub marketplace: Marketplace,
    pub attempt: u32,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, marketplace: Marketplace) -> Self {
        Self {
            id: id.into(),
            marketplace,
            attempt: 0,
        }
    }

    /// URL of the detail page this task's session will load.
    pub fn listing_url(&self) -> String {
        self.marketplace.listing_url(&self.id)
    }
}
