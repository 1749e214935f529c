use crate::{Marketplace, Task, TaskId};

/// Slices an ordered id list into fixed-size batches of tasks.
///
/// Pure and lazy: batches are materialized as the iterator is driven, input
/// order is preserved, and the total batch count is `ceil(N / batch_size)`.
/// A batch size of zero is clamped to one.
pub fn plan_batches(
    ids: &[TaskId],
    marketplace: Marketplace,
    batch_size: usize,
) -> impl Iterator<Item = Vec<Task>> + '_ {
    let batch_size = batch_size.max(1);
    ids.chunks(batch_size).map(move |chunk| {
        chunk
            .iter()
            .map(|id| Task::new(id.clone(), marketplace))
            .collect()
    })
}
