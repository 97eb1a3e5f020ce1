//! Non-blocking admission control for background plugin continuations
//! (spec §4.E, §5) — a `Semaphore` bounds concurrently *running*
//! background tasks, and an atomic counter bounds the total number of
//! tasks in flight (including ones queued behind the semaphore).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    in_flight: AtomicUsize,
    max_tasks: usize,
}

/// Held by a background task for its lifetime; releases both the
/// semaphore permit and the in-flight count on drop.
pub struct WorkerPermit {
    pool: Arc<WorkerPool>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        self.permit.take();
        self.pool.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl WorkerPool {
    pub fn new(max_workers: usize, max_tasks: usize) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            in_flight: AtomicUsize::new(0),
            max_tasks,
        })
    }

    /// Non-blocking admission: `None` iff the semaphore has no free
    /// permit or the in-flight counter has already reached `max_tasks`.
    pub fn try_acquire(self: &Arc<Self>) -> Option<WorkerPermit> {
        if self.in_flight.load(Ordering::Relaxed) >= self.max_tasks {
            return None;
        }
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        Some(WorkerPermit {
            pool: Arc::clone(self),
            permit: Some(permit),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_semaphore_limit() {
        let pool = WorkerPool::new(2, 10);
        let a = pool.try_acquire();
        let b = pool.try_acquire();
        let c = pool.try_acquire();
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(c.is_none());
        assert_eq!(pool.in_flight(), 2);
    }

    #[test]
    fn releasing_a_permit_frees_a_slot() {
        let pool = WorkerPool::new(1, 10);
        let a = pool.try_acquire();
        assert!(a.is_some());
        assert!(pool.try_acquire().is_none());
        drop(a);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn max_tasks_caps_admission_even_with_free_semaphore_capacity() {
        let pool = WorkerPool::new(10, 1);
        let a = pool.try_acquire();
        assert!(a.is_some());
        assert!(pool.try_acquire().is_none());
    }
}
