/// Append-only, chunked buffer with stable element addresses
///
/// Memory layout:
/// - Elements live in fixed-capacity chunks that are never reallocated, so a
///   reference returned by `push` stays valid while later pushes continue
/// - Only the chunk table (a list of chunk headers) grows, doubling as needed
/// - Chunks and tables are recycled through a shared `ChunkPool`
use std::cell::{Cell, RefCell};
use std::sync::{Mutex, PoisonError};

/// Elements per chunk
pub const CHUNK_CAPACITY: usize = 1024;

/// Initial number of entries in a fresh chunk table
const INITIAL_TABLE_CAPACITY: usize = 4;

struct PoolInner<T> {
    chunks: Vec<Vec<T>>,
    tables: Vec<Vec<Vec<T>>>,
}

/// Recycled chunk storage shared by successive collectors.
pub struct ChunkPool<T> {
    inner: Mutex<PoolInner<T>>,
}

impl<T> ChunkPool<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                chunks: Vec::new(),
                tables: Vec::new(),
            }),
        }
    }

    /// Chunks currently parked in the pool.
    pub fn available_chunks(&self) -> usize {
        self.lock().chunks.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_chunk(&self) -> Vec<T> {
        self.lock()
            .chunks
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(CHUNK_CAPACITY))
    }

    fn take_table(&self) -> Vec<Vec<T>> {
        self.lock()
            .tables
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(INITIAL_TABLE_CAPACITY))
    }

    fn give_back(&self, mut table: Vec<Vec<T>>) {
        let mut inner = self.lock();
        for mut chunk in table.drain(..) {
            chunk.clear();
            inner.chunks.push(chunk);
        }
        inner.tables.push(table);
    }
}

impl<T> Default for ChunkPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-writer collector drawing its chunks from a [`ChunkPool`].
///
/// `push` takes `&self` and hands out `&mut T` to the new element. Those
/// references remain valid until the collector is dropped; reading the
/// collected elements back (`get`, `iter`) needs `&mut self`, which ends
/// every outstanding reference first.
pub struct Collector<'p, T> {
    pool: &'p ChunkPool<T>,
    chunks: RefCell<Vec<Vec<T>>>,
    len: Cell<usize>,
}

impl<'p, T> Collector<'p, T> {
    pub fn new(pool: &'p ChunkPool<T>) -> Self {
        Self {
            pool,
            chunks: RefCell::new(pool.take_table()),
            len: Cell::new(0),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.get()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `value`, returning a reference that survives later pushes.
    #[allow(clippy::mut_from_ref)]
    pub fn push(&self, value: T) -> &mut T {
        let mut chunks = self.chunks.borrow_mut();
        let needs_chunk = chunks
            .last()
            .map_or(true, |chunk| chunk.len() == CHUNK_CAPACITY);
        if needs_chunk {
            if chunks.len() == chunks.capacity() {
                let grow = chunks.capacity().max(INITIAL_TABLE_CAPACITY);
                chunks.reserve_exact(grow);
            }
            chunks.push(self.pool.take_chunk());
        }

        let last = chunks.len() - 1;
        let chunk = &mut chunks[last];
        debug_assert!(chunk.len() < chunk.capacity());
        let offset = chunk.len();
        chunk.push(value);
        // Safety: `offset` was just initialized by the push above
        let slot = unsafe { chunk.as_mut_ptr().add(offset) };
        self.len.set(self.len.get() + 1);
        drop(chunks);

        // Safety: the chunk buffer never grows past CHUNK_CAPACITY, so it is
        // never reallocated while the collector lives; each slot is handed
        // out exactly once.
        unsafe { &mut *slot }
    }

    /// Append a default-initialized element and return it for filling in.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub fn add(&self) -> &mut T
    where
        T: Default,
    {
        self.push(T::default())
    }

    pub fn get(&mut self, index: usize) -> Option<&T> {
        self.chunks
            .get_mut()
            .get(index / CHUNK_CAPACITY)
            .and_then(|chunk| chunk.get(index % CHUNK_CAPACITY))
    }

    /// Elements in insertion order.
    pub fn iter(&mut self) -> impl Iterator<Item = &T> + '_ {
        self.chunks.get_mut().iter().flat_map(|chunk| chunk.iter())
    }

    /// Return all chunks to the pool.
    pub fn dispose(self) {
        drop(self);
    }
}

impl<T> Drop for Collector<'_, T> {
    fn drop(&mut self) {
        let table = std::mem::take(self.chunks.get_mut());
        self.pool.give_back(table);
    }
}
