// Module implementing the worker pool seam the reactor schedules onto.

use std::sync::Arc;

/// A unit of work handed to a pool. Boxed so the pool never learns anything
/// about the reactor that produced it.
pub type WorkUnit = Box<dyn FnOnce() + Send>;

/// `WorkerPool` receives units of work and eventually runs each of them on
/// some thread. The contract the reactor leans on:
///
/// - every submitted unit eventually runs (a pool that drops work leaves the
///   reactor blocked forever),
/// - `submit` returns quickly and never runs the unit on the submitting
///   thread, since submission happens while the reactor holds its lock.
pub trait WorkerPool: Send + Sync {
    fn submit(&self, work: WorkUnit);
}

impl<P: WorkerPool + ?Sized> WorkerPool for Arc<P> {
    fn submit(&self, work: WorkUnit) {
        self.as_ref().submit(work);
    }
}

/// Adapts a closure into a pool, so callers can bridge whatever executor
/// they already run, say `PoolFn(|work| rayon::spawn(work))`.
pub struct PoolFn<F>(pub F);

impl<F> WorkerPool for PoolFn<F>
where
    F: Fn(WorkUnit) + Send + Sync,
{
    fn submit(&self, work: WorkUnit) {
        (self.0)(work);
    }
}
