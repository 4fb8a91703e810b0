//! Object pools with explicit acquire and reset-on-release.
//!
//! Contexts, compressors and scratch buffers are recycled across requests.
//! An item is owned by exactly one caller between [`Pool::acquire`] and
//! [`Pool::release`]; the pool only ever hands out idle items.

use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Items that can be returned to a pool.
pub trait Reset {
    /// Clears all per-use state.
    fn reset(&mut self);
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

type Factory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

const DEFAULT_MAX_IDLE: usize = 1024;

/// A thread-safe pool of reusable `T`.
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    factory: Factory<T>,
    max_idle: usize,
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle.lock().len())
            .field("max_idle", &self.max_idle)
            .finish_non_exhaustive()
    }
}

impl<T: Reset + Send> Pool<T> {
    /// Creates a pool whose items are built by an infallible factory.
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::with_factory(move || Ok(factory()))
    }

    /// Creates a pool whose factory may fail.
    ///
    /// A factory failure is reported from [`acquire`](Self::acquire) as
    /// [`Error::Internal`].
    pub fn with_factory(factory: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            factory: Box::new(factory),
            max_idle: DEFAULT_MAX_IDLE,
        }
    }

    /// Caps how many idle items are retained. Extra releases are dropped.
    #[must_use]
    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Takes an idle item or builds a new one.
    pub fn acquire(&self) -> Result<T> {
        if let Some(item) = self.idle.lock().pop() {
            return Ok(item);
        }
        (self.factory)().map_err(|err| match err {
            Error::Internal { .. } => err,
            other => Error::internal(format!("pool factory failed: {other}")),
        })
    }

    /// Resets `item` and makes it available again.
    pub fn release(&self, mut item: T) {
        item.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(item);
        }
    }

    /// Acquires an item wrapped in a guard that releases it on drop.
    pub fn get(&self) -> Result<Pooled<'_, T>> {
        Ok(Pooled {
            pool: self,
            item: Some(self.acquire()?),
        })
    }

    /// Number of idle items.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

/// Guard returned by [`Pool::get`]. Releases the item when dropped,
/// including during unwinding.
pub struct Pooled<'a, T: Reset + Send> {
    pool: &'a Pool<T>,
    item: Option<T>,
}

impl<T: Reset + Send> Pooled<'_, T> {
    /// Keeps the item instead of returning it to the pool.
    pub fn detach(mut self) -> Option<T> {
        self.item.take()
    }
}

impl<T: Reset + Send> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // `item` is only emptied by `detach` and `drop`, both of which consume the guard.
        match &self.item {
            Some(item) => item,
            None => unreachable!("pooled item accessed after release"),
        }
    }
}

impl<T: Reset + Send> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pooled item accessed after release"),
        }
    }
}

impl<T: Reset + Send> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Scratch {
        data: Vec<u8>,
        resets: usize,
    }

    impl Reset for Scratch {
        fn reset(&mut self) {
            self.data.clear();
            self.resets += 1;
        }
    }

    #[test]
    fn test_release_resets_and_reuses() {
        let pool = Pool::new(Scratch::default);

        let mut item = pool.acquire().unwrap();
        item.data.extend_from_slice(b"secret");
        pool.release(item);

        let item = pool.acquire().unwrap();
        assert!(item.data.is_empty());
        assert_eq!(item.resets, 1);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let pool = Pool::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Vec::<u8>::new()
        });

        {
            let mut buf = pool.get().unwrap();
            buf.push(1);
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.get().unwrap();
        assert!(buf.is_empty());
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_releases_during_unwind() {
        let pool = Arc::new(Pool::new(Vec::<u8>::new));
        let shared = pool.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _buf = shared.get().unwrap();
            panic!("handler blew up");
        }));

        assert!(result.is_err());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_factory_failure_is_internal() {
        let pool: Pool<Vec<u8>> =
            Pool::with_factory(|| Err(Error::unsupported("compression level 12")));

        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }

    #[test]
    fn test_max_idle_drops_extras() {
        let pool = Pool::new(Vec::<u8>::new).max_idle(1);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_detach_keeps_item() {
        let pool = Pool::new(Vec::<u8>::new);
        let guard = pool.get().unwrap();
        let item = guard.detach();
        assert!(item.is_some());
        assert_eq!(pool.idle(), 0);
    }

    #[derive(Debug)]
    struct Tagged {
        id: usize,
        owner: Option<usize>,
    }

    impl Reset for Tagged {
        fn reset(&mut self) {
            self.owner = None;
        }
    }

    #[test]
    fn test_concurrent_acquire_is_exclusive() {
        let next_id = AtomicUsize::new(0);
        let pool = Pool::new(move || Tagged {
            id: next_id.fetch_add(1, Ordering::SeqCst),
            owner: None,
        })
        .max_idle(4);
        let live = Mutex::new(std::collections::HashSet::new());

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let pool = &pool;
                let live = &live;
                scope.spawn(move || {
                    for _ in 0..500 {
                        let mut item = pool.get().unwrap();
                        assert_eq!(item.owner, None, "item {} was not reset", item.id);
                        assert!(live.lock().insert(item.id), "item {} handed out twice", item.id);

                        item.owner = Some(worker);
                        std::thread::yield_now();
                        assert_eq!(item.owner, Some(worker));

                        live.lock().remove(&item.id);
                    }
                });
            }
        });

        assert!(live.lock().is_empty());
        assert!(pool.idle() <= 4);
    }
}
