use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Caps the number of in-flight futures when fanning out over a list.
///
/// Clones share the same semaphore, so one `Throttle` handed to several
/// callers bounds their combined concurrency.
#[derive(Debug, Clone)]
pub struct Throttle {
    semaphore: Arc<Semaphore>,
    max_tasks: usize,
}

impl Throttle {
    pub fn new(max_tasks: usize) -> Self {
        let max_tasks = max_tasks.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_tasks)),
            max_tasks,
        }
    }

    pub const fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    /// Runs `func` over every item with at most `max_tasks` running at once
    /// and returns the outputs in input order.
    ///
    /// Every item runs to completion. When `func` returns a `Result`, each
    /// error lands in its own slot and siblings keep going.
    pub async fn submit<I, F, Fut>(&self, items: I, func: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future,
    {
        let func = &func;
        let workers = items.into_iter().map(|item| async move {
            // The semaphore is never closed, so acquire cannot fail; the
            // permit is dropped on every exit path of the worker.
            let _permit = self.semaphore.acquire().await;
            func(item).await
        });

        join_all(workers).await
    }
}
