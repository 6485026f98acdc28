//! Fixed-size worker pool.
//!
//! Workers pull tasks from a shared queue until it is empty. Results come
//! back in the order the items were queued.

use std::collections::VecDeque;
use std::future::Future;

use futures_util::future::join_all;
use log::debug;
use tokio::sync::Mutex;

/// Run `task` on every item with at most `workers` tasks in flight.
pub async fn run_pool<T, R, F, Fut>(items: Vec<T>, workers: usize, task: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let total = items.len();
    let queue = Mutex::new(items.into_iter().enumerate().collect::<VecDeque<_>>());
    let results = Mutex::new(Vec::with_capacity(total));

    let worker_count = workers.max(1).min(total);
    debug!("Running {} task(s) on {} worker(s)", total, worker_count);

    let worker = |id: usize| {
        let queue = &queue;
        let results = &results;
        let task = &task;
        async move {
            loop {
                let next = queue.lock().await.pop_front();
                let Some((index, item)) = next else {
                    break;
                };
                debug!("Worker {} picked task {}", id, index);
                let result = task(item).await;
                results.lock().await.push((index, result));
            }
        }
    };
    join_all((0..worker_count).map(worker)).await;

    let mut results = results.into_inner();
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
