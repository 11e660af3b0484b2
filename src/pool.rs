//! The runtime dispatches are scheduled on.
//!
//! A client either borrows the tokio runtime it was built inside of, or owns
//! a bounded multi-thread runtime. Owned runtimes are shut down in the
//! background when the last client clone is dropped, so dropping a client
//! from async code does not block.

use crate::{Error, Result};
use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime};

/// Worker threads of an owned runtime when none is configured.
pub const DEFAULT_WORKER_THREADS: usize = 4;

#[derive(Debug)]
pub(crate) struct WorkerPool {
    handle: Handle,
    owned: Option<Runtime>,
}

impl WorkerPool {
    /// With `Some(n)`, owns an `n`-thread runtime. With `None`, uses the
    /// ambient runtime if there is one.
    pub(crate) fn new(worker_threads: Option<usize>) -> Result<Self> {
        match worker_threads {
            Some(threads) => Self::owned(threads),
            None => match Handle::try_current() {
                Ok(handle) => Ok(Self {
                    handle,
                    owned: None,
                }),
                Err(_) => Self::owned(DEFAULT_WORKER_THREADS),
            },
        }
    }

    fn owned(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::Configuration(
                "Worker pool needs at least one thread".to_string(),
            ));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("searchwire-worker")
            .enable_all()
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to start worker pool: {}", e)))?;

        tracing::debug!(worker_threads = threads, "Started dispatch worker pool");

        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(runtime),
        })
    }

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Detached; results travel back through the dispatch handle.
        drop(self.handle.spawn(future));
    }

    pub(crate) fn is_owned(&self) -> bool {
        self.owned.is_some()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn test_owned_pool_runs_futures() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        assert!(pool.is_owned());

        let (tx, rx) = oneshot::channel();
        pool.spawn(async move {
            let _ = tx.send(std::thread::current().name().map(str::to_string));
        });

        let name = rx.blocking_recv().unwrap();
        assert_eq!(name.as_deref(), Some("searchwire-worker"));
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(
            WorkerPool::new(Some(0)),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_borrows_ambient_runtime() {
        let pool = WorkerPool::new(None).unwrap();
        assert!(!pool.is_owned());

        let (tx, rx) = oneshot::channel();
        pool.spawn(async move {
            let _ = tx.send(42);
        });
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_dropping_owned_pool_inside_async_context() {
        let pool = WorkerPool::new(Some(1)).unwrap();
        drop(pool);
    }
}
