//! Bounded-parallel map over the node list
//!
//! Filtering and prioritizing fan out across a fixed worker pool. Every
//! task writes only its own output slot, indexed by node position, so
//! ordering is preserved regardless of completion order.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::context::CancelToken;
use crate::error::{OversimError, Result};

/// Default fan-out parallelism
pub const DEFAULT_WORKER_NUM: usize = 16;

/// Build the worker pool the driver fans out on
pub fn build_pool(worker_num: usize) -> Result<ThreadPool> {
    if worker_num == 0 {
        return Err(OversimError::config("worker_num must be positive"));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(worker_num)
        .build()
        .map_err(|e| OversimError::config(format!("cannot build worker pool: {e}")))
}

/// Apply `f` to every item on the pool, returning one slot per input index.
///
/// A slot is `None` only when the token was cancelled before its task ran;
/// outstanding tasks abandon work instead of computing results nobody will
/// read.
pub fn fan_out<T, R, F>(pool: &ThreadPool, items: &[T], cancel: &CancelToken, f: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Send + Sync,
{
    pool.install(|| {
        items
            .par_iter()
            .enumerate()
            .map(|(i, item)| {
                if cancel.is_cancelled() {
                    None
                } else {
                    Some(f(i, item))
                }
            })
            .collect()
    })
}
