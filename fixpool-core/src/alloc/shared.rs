//! ## fixpool-core::alloc::shared
//! **Thread-safe pool wrapper**
//!
//! [`SharedPool`] serialises every operation on a [`ChunkPool`] through one
//! coarse lock, held for the whole operation and released on every exit
//! path by its guard. The lock type is a parameter so callers can pick the
//! primitive: `std::sync::Mutex` (default, poisoning reported as
//! `LockFailure`) or `parking_lot::Mutex`.

use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ops::DerefMut;
use std::ptr::NonNull;

use crate::alloc::growth::Relocation;
use crate::alloc::instrument::PoolId;
use crate::alloc::pool::ChunkPool;
use crate::alloc::stats::PoolStats;
use crate::error::{PoolError, Result};
use crate::GrowthStrategy;

/// Mutual exclusion primitive guarding a value of type `T`.
pub trait PoolLock<T>: Sized + Send + Sync {
    type Guard<'a>: DerefMut<Target = T>
    where
        Self: 'a;

    /// Wraps `value`; failure to set up the primitive is reported as an error.
    fn wrap(value: T) -> Result<Self>;

    /// Blocks until the lock is held.
    fn acquire(&self) -> Result<Self::Guard<'_>>;

    /// Consumes the lock and returns the guarded value.
    fn into_inner(self) -> Result<T>;
}

impl<T: Send> PoolLock<T> for std::sync::Mutex<T> {
    type Guard<'a>
        = std::sync::MutexGuard<'a, T>
    where
        Self: 'a;

    fn wrap(value: T) -> Result<Self> {
        Ok(std::sync::Mutex::new(value))
    }

    fn acquire(&self) -> Result<Self::Guard<'_>> {
        self.lock()
            .map_err(|e| PoolError::LockFailure(e.to_string()))
    }

    fn into_inner(self) -> Result<T> {
        std::sync::Mutex::into_inner(self).map_err(|e| PoolError::LockFailure(e.to_string()))
    }
}

impl<T: Send> PoolLock<T> for parking_lot::Mutex<T> {
    type Guard<'a>
        = parking_lot::MutexGuard<'a, T>
    where
        Self: 'a;

    fn wrap(value: T) -> Result<Self> {
        Ok(parking_lot::Mutex::new(value))
    }

    fn acquire(&self) -> Result<Self::Guard<'_>> {
        Ok(self.lock())
    }

    fn into_inner(self) -> Result<T> {
        Ok(parking_lot::Mutex::into_inner(self))
    }
}

/// A [`ChunkPool`] that can be shared between threads.
///
/// Chunk pointers are plain addresses; moving them between threads is the
/// caller's business, just as with [`ChunkPool`].
pub struct SharedPool<L = std::sync::Mutex<ChunkPool>>
where
    L: PoolLock<ChunkPool>,
{
    lock: L,
    id: PoolId,
    growth: GrowthStrategy,
}

impl<L: PoolLock<ChunkPool>> SharedPool<L> {
    /// Wraps `pool` in lock `L`. If the lock cannot be set up the pool is
    /// dropped, releasing its memory.
    pub fn new(pool: ChunkPool) -> Result<Self> {
        let id = pool.id();
        let growth = pool.growth_strategy();
        Ok(Self {
            lock: L::wrap(pool)?,
            id,
            growth,
        })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    /// See [`ChunkPool::alloc`].
    pub fn alloc(&self) -> Result<Option<NonNull<u8>>> {
        Ok(self.lock.acquire()?.alloc())
    }

    /// See [`ChunkPool::free`].
    ///
    /// # Safety
    ///
    /// Same contract as [`ChunkPool::free`].
    pub unsafe fn free(&self, ptr: Option<NonNull<u8>>) -> Result<()> {
        let mut pool = self.lock.acquire()?;
        // Safety: upheld by caller.
        unsafe { pool.free(ptr) };
        Ok(())
    }

    /// See [`ChunkPool::expand`].
    pub fn expand(&self, extra_capacity: usize) -> Result<()> {
        self.lock.acquire()?.expand(extra_capacity)
    }

    /// See [`ChunkPool::resize`].
    pub fn resize(&self, new_capacity: usize) -> Result<Relocation> {
        self.lock.acquire()?.resize(new_capacity)
    }

    /// Allocates a chunk that is returned to the pool when the guard drops.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on pools that grow by resizing, since a resize
    /// would move the chunk out from under the handle.
    pub fn alloc_chunk(&self) -> Result<Option<PooledChunk<'_, L>>> {
        if self.growth == GrowthStrategy::Resize {
            return Err(PoolError::invalid(format!(
                "{} grows by resizing; chunk handles are unavailable",
                self.id
            )));
        }
        let mut pool = self.lock.acquire()?;
        Ok(pool.alloc().map(|ptr| PooledChunk {
            pool: self,
            ptr,
            len: pool.chunk_size(),
            _not_send: PhantomData,
        }))
    }

    /// Runs `f` with the pool locked.
    pub fn with<R>(&self, f: impl FnOnce(&ChunkPool) -> R) -> Result<R> {
        let pool = self.lock.acquire()?;
        Ok(f(&pool))
    }

    pub fn capacity(&self) -> Result<usize> {
        Ok(self.lock.acquire()?.capacity())
    }

    pub fn free_chunks(&self) -> Result<usize> {
        Ok(self.lock.acquire()?.free_chunks())
    }

    pub fn chunk_size(&self) -> Result<usize> {
        Ok(self.lock.acquire()?.chunk_size())
    }

    pub fn stats(&self) -> Result<PoolStats> {
        Ok(self.lock.acquire()?.stats())
    }

    /// Unwraps the pool.
    pub fn into_inner(self) -> Result<ChunkPool> {
        self.lock.into_inner()
    }
}

impl<L: PoolLock<ChunkPool>> fmt::Debug for SharedPool<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPool").field("id", &self.id).finish()
    }
}

/// RAII handle to a chunk of a [`SharedPool`].
///
/// The chunk goes back to the pool when the handle drops. Handles only
/// exist for pools that grow by expanding, so the chunk never moves.
pub struct PooledChunk<'a, L: PoolLock<ChunkPool>> {
    pool: &'a SharedPool<L>,
    ptr: NonNull<u8>,
    len: usize,
    _not_send: PhantomData<*mut u8>,
}

impl<L: PoolLock<ChunkPool>> PooledChunk<'_, L> {
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Views the chunk as bytes.
    ///
    /// # Safety
    ///
    /// Chunk memory starts uninitialised; the caller must have written
    /// every byte before reading it.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // Safety: the chunk spans `len` bytes owned by this handle.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Views the chunk as possibly uninitialised bytes.
    pub fn as_mut_slice(&mut self) -> &mut [MaybeUninit<u8>] {
        // Safety: the chunk spans `len` bytes owned by this handle and
        // `MaybeUninit` makes no claim about their contents.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast(), self.len) }
    }

    /// Zeroes the chunk and returns it as a mutable byte slice.
    pub fn zeroed(&mut self) -> &mut [u8] {
        // Safety: the chunk spans `len` writable bytes owned by this handle.
        unsafe {
            std::ptr::write_bytes(self.ptr.as_ptr(), 0, self.len);
            std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len)
        }
    }

    /// Gives up ownership without returning the chunk to the pool.
    pub fn into_raw(self) -> NonNull<u8> {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }
}

impl<L: PoolLock<ChunkPool>> Drop for PooledChunk<'_, L> {
    fn drop(&mut self) {
        // Safety: the handle owns a live chunk of this pool.
        if let Err(err) = unsafe { self.pool.free(Some(self.ptr)) } {
            tracing::error!(pool = %self.pool.id, %err, "failed to return chunk to pool");
        }
    }
}

impl<L: PoolLock<ChunkPool>> fmt::Debug for PooledChunk<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledChunk")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PoolBuilder;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};

    const NUM_THREADS: usize = 4;
    const ALLOCS_PER_THREAD: usize = 50;

    fn shared(capacity: usize) -> SharedPool {
        SharedPool::new(ChunkPool::new(capacity, std::mem::size_of::<u64>()).unwrap()).unwrap()
    }

    fn alloc_then_free_all(pool: &SharedPool, count: usize) -> usize {
        let chunks: Vec<_> = (0..count).map(|_| pool.alloc().unwrap()).collect();
        let allocated = chunks.iter().filter(|c| c.is_some()).count();
        for c in chunks {
            // Safety: each chunk is freed once.
            unsafe { pool.free(c).unwrap() };
        }
        allocated
    }

    #[test]
    fn test_basic_alloc_free_from_threads() {
        let pool = shared(NUM_THREADS * ALLOCS_PER_THREAD);
        let total = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..NUM_THREADS {
                s.spawn(|| {
                    let n = alloc_then_free_all(&pool, ALLOCS_PER_THREAD);
                    total.fetch_add(n, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(total.load(Ordering::SeqCst), NUM_THREADS * ALLOCS_PER_THREAD);
        assert_eq!(pool.free_chunks().unwrap(), NUM_THREADS * ALLOCS_PER_THREAD);
    }

    #[test]
    fn test_contention_never_exceeds_capacity() {
        const CAPACITY: usize = 25;
        let pool = shared(CAPACITY);
        let live: Mutex<HashSet<usize>> = Mutex::new(HashSet::new());
        let barrier = Barrier::new(NUM_THREADS);

        std::thread::scope(|s| {
            for _ in 0..NUM_THREADS {
                s.spawn(|| {
                    barrier.wait();
                    for _ in 0..20 {
                        let mut mine = Vec::new();
                        for _ in 0..ALLOCS_PER_THREAD {
                            if let Some(c) = pool.alloc().unwrap() {
                                let addr = c.as_ptr() as usize;
                                let mut set = live.lock().unwrap();
                                assert!(set.insert(addr), "address {addr:#x} handed out twice");
                                assert!(set.len() <= CAPACITY);
                                mine.push(c);
                            }
                        }
                        for c in mine {
                            live.lock().unwrap().remove(&(c.as_ptr() as usize));
                            // Safety: freed once, after leaving the live set.
                            unsafe { pool.free(Some(c)).unwrap() };
                        }
                    }
                });
            }
        });

        assert_eq!(pool.free_chunks().unwrap(), CAPACITY);
    }

    #[test]
    fn test_rapid_cycles() {
        let pool = shared(NUM_THREADS);
        std::thread::scope(|s| {
            for _ in 0..NUM_THREADS {
                s.spawn(|| {
                    for _ in 0..100 {
                        if let Some(c) = pool.alloc().unwrap() {
                            // Safety: freed right after allocation.
                            unsafe { pool.free(Some(c)).unwrap() };
                        }
                    }
                });
            }
        });
        assert_eq!(pool.free_chunks().unwrap(), NUM_THREADS);
    }

    #[test]
    fn test_concurrent_expand() {
        let pool = shared(NUM_THREADS * ALLOCS_PER_THREAD);
        std::thread::scope(|s| {
            for _ in 0..NUM_THREADS {
                s.spawn(|| {
                    for _ in 0..10 {
                        alloc_then_free_all(&pool, ALLOCS_PER_THREAD);
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..10 {
                    pool.expand(10).unwrap();
                }
            });
        });

        let expected = NUM_THREADS * ALLOCS_PER_THREAD + 100;
        assert_eq!(pool.capacity().unwrap(), expected);
        assert_eq!(pool.free_chunks().unwrap(), expected);
    }

    #[test]
    fn test_parking_lot_lock() {
        let pool: SharedPool<parking_lot::Mutex<ChunkPool>> =
            SharedPool::new(ChunkPool::new(8, 16).unwrap()).unwrap();
        let pool = Arc::new(pool);

        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if let Some(c) = pool.alloc().unwrap() {
                            // Safety: freed right after allocation.
                            unsafe { pool.free(Some(c)).unwrap() };
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.free_chunks().unwrap(), 8);
    }

    #[test]
    fn test_pooled_chunk_returns_on_drop() {
        let pool = shared(2);
        {
            let mut a = pool.alloc_chunk().unwrap().unwrap();
            let b = pool.alloc_chunk().unwrap().unwrap();
            assert!(pool.alloc_chunk().unwrap().is_none());
            assert_ne!(a.as_ptr(), b.as_ptr());

            let bytes = a.zeroed();
            bytes[0] = 7;
            // Safety: every byte was written by `zeroed`.
            assert_eq!(unsafe { a.as_slice() }[0], 7);
            assert_eq!(a.len(), 8);

            let mut b = b;
            for (i, byte) in b.as_mut_slice().iter_mut().enumerate() {
                byte.write(i as u8);
            }
            // Safety: every byte was written above.
            assert_eq!(unsafe { b.as_slice() }, &[0, 1, 2, 3, 4, 5, 6, 7]);
        }
        assert_eq!(pool.free_chunks().unwrap(), 2);
    }

    #[test]
    fn test_pooled_chunk_into_raw() {
        let pool = shared(1);
        let raw = pool.alloc_chunk().unwrap().unwrap().into_raw();
        assert_eq!(pool.free_chunks().unwrap(), 0);
        // Safety: `raw` is live.
        unsafe { pool.free(Some(raw)).unwrap() };
        assert_eq!(pool.free_chunks().unwrap(), 1);
    }

    #[test]
    fn test_poisoned_lock_reports_failure() {
        let pool = Arc::new(shared(4));
        let poisoner = Arc::clone(&pool);
        let _ = std::thread::spawn(move || {
            poisoner
                .with(|_| panic!("poison the pool lock"))
                .unwrap();
        })
        .join();

        assert!(matches!(pool.alloc(), Err(PoolError::LockFailure(_))));
        assert!(matches!(pool.expand(1), Err(PoolError::LockFailure(_))));
    }

    #[test]
    fn test_resize_through_shared_pool() {
        let inner = ChunkPool::builder(2, 16)
            .growth(GrowthStrategy::Resize)
            .build()
            .unwrap();
        let pool: SharedPool = SharedPool::new(inner).unwrap();
        let a = pool.alloc().unwrap().unwrap();
        let relocation = pool.resize(4).unwrap();
        let moved = relocation.translate(a).unwrap();
        assert!(pool.with(|p| p.owns(moved)).unwrap());
        assert_eq!(pool.free_chunks().unwrap(), 3);
    }

    #[test]
    fn test_chunk_handles_refused_on_resizing_pool() {
        let pool: SharedPool = PoolBuilder::new(2, 16)
            .growth(GrowthStrategy::Resize)
            .build_shared()
            .unwrap();
        assert!(matches!(
            pool.alloc_chunk(),
            Err(PoolError::InvalidArgument(_))
        ));

        // Raw allocation and resizing are unaffected.
        let a = pool.alloc().unwrap().unwrap();
        let moved = pool.resize(8).unwrap().translate(a).unwrap();
        assert!(pool.with(|p| p.owns(moved)).unwrap());
        assert_eq!(pool.free_chunks().unwrap(), 7);
    }

    #[test]
    fn test_chunk_handle_survives_expand() {
        let pool = shared(1);
        let mut chunk = pool.alloc_chunk().unwrap().unwrap();
        chunk.zeroed()[0] = 42;
        pool.expand(4).unwrap();
        assert!(pool.with(|p| p.owns(chunk.as_ptr())).unwrap());
        // Safety: every byte was written by `zeroed`.
        assert_eq!(unsafe { chunk.as_slice() }[0], 42);
        drop(chunk);
        assert_eq!(pool.free_chunks().unwrap(), 5);
    }

    #[test]
    fn test_into_inner() {
        let pool = shared(3);
        let _ = pool.alloc().unwrap();
        let inner = pool.into_inner().unwrap();
        assert_eq!(inner.free_chunks(), 2);
    }

    #[test]
    fn test_shared_pool_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedPool>();
        assert_send_sync::<SharedPool<parking_lot::Mutex<ChunkPool>>>();
    }
}
