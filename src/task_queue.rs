/// Per-row Task Queue
///
/// Serializes writes to the same row: a second edit of a row is not sent
/// until the first edit's request has resolved. Writes to different rows
/// run concurrently. Idle rows hold no entry.

use crate::row::RowId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct RowTaskQueue {
    locks: Mutex<HashMap<RowId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RowTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once every earlier task for `id` has finished.
    pub async fn run<F, T>(&self, id: RowId, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self.locks.lock().entry(id).or_default().clone();

        let result = {
            let _turn = lock.lock().await;
            task.await
        };

        let mut locks = self.locks.lock();
        // Only the map and this task still reference the lock
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
        result
    }

    /// Rows with a running or waiting task.
    pub fn active(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_row_runs_in_order() {
        let queue = Arc::new(RowTaskQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let (queue, log) = (queue.clone(), log.clone());
            tokio::spawn(async move {
                queue
                    .run(1, async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        log.lock().push("first");
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = {
            let (queue, log) = (queue.clone(), log.clone());
            tokio::spawn(async move { queue.run(1, async { log.lock().push("second") }).await })
        };

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(*log.lock(), vec!["first", "second"]);
        assert_eq!(queue.active(), 0);
    }

    #[tokio::test]
    async fn test_different_rows_do_not_wait() {
        let queue = Arc::new(RowTaskQueue::new());
        let slow = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .run(1, tokio::time::sleep(Duration::from_millis(200)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        let fast = tokio::time::timeout(Duration::from_millis(100), queue.run(2, async { 7 })).await;
        assert_eq!(fast.ok(), Some(7));
        assert_eq!(queue.active(), 1);
        slow.await.unwrap();
    }
}
