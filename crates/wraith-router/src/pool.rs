//! Free-list of reusable request contexts.
//!
//! A context moves through four states: free (in the pool), acquired (reset
//! and bound to a request), in use (borrowed by the handler chain) and
//! released (returned to the pool). Acquisition resets the context before
//! anyone can observe it. Release consumes the [`PooledContext`] guard, so
//! nothing can touch a context after it went back to the pool.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::context::Context;
use crate::request::Request;

/// Default number of idle contexts kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Counters describing pool behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Contexts allocated because the pool was empty.
    pub created: usize,
    /// Acquisitions served from the free list.
    pub reused: usize,
    /// Contexts currently idle in the pool.
    pub idle: usize,
}

/// A pool of [`Context`] values.
#[derive(Debug)]
pub struct ContextPool {
    free: Mutex<Vec<Box<Context>>>,
    max_idle: usize,
    created: AtomicUsize,
    reused: AtomicUsize,
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

impl ContextPool {
    /// Creates a pool that keeps at most `max_idle` released contexts.
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle,
            created: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        }
    }

    /// Takes a context from the pool, resets it and binds it to `request`.
    pub fn acquire(&self, request: Request) -> PooledContext<'_> {
        let recycled = self.free.lock().pop();
        let ctx = match recycled {
            Some(mut ctx) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                ctx.reset(request);
                ctx
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                Box::new(Context::new(request))
            }
        };

        PooledContext {
            ctx: Some(ctx),
            pool: self,
        }
    }

    /// Returns a context to the pool.
    ///
    /// Equivalent to dropping the guard; spelled out for readability at call
    /// sites.
    pub fn release(&self, ctx: PooledContext<'_>) {
        debug_assert!(std::ptr::eq(ctx.pool, self), "context released to a foreign pool");
        drop(ctx);
    }

    fn put(&self, ctx: Box<Context>) {
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(ctx);
        } else {
            debug!(max_idle = self.max_idle, "Context pool full, discarding context");
        }
    }

    /// Returns the current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            idle: self.free.lock().len(),
        }
    }
}

/// Exclusive handle to a pooled context.
///
/// Dereferences to [`Context`]. The context goes back to its pool when the
/// guard is dropped or passed to [`ContextPool::release`].
#[derive(Debug)]
pub struct PooledContext<'p> {
    ctx: Option<Box<Context>>,
    pool: &'p ContextPool,
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        match self.ctx.as_deref() {
            Some(ctx) => ctx,
            None => unreachable!("pooled context accessed after release"),
        }
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        match self.ctx.as_deref_mut() {
            Some(ctx) => ctx,
            None => unreachable!("pooled context accessed after release"),
        }
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.put(ctx);
        }
    }
}
