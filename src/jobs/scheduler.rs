/// Fork-join dispatch over 2D index spaces
/// Work items must write disjoint memory; no ordering is guaranteed between them
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::SchedulerError;

/// Smallest parallel threshold regardless of worker count
pub const MIN_PARALLEL_LOAD: usize = 32;

/// Runs `action(context, x, y)` for every point of a `width × height` grid.
pub trait JobScheduler: Sync {
    fn dispatch<C, F>(&self, width: usize, height: usize, context: &C, action: F)
    where
        C: Sync + ?Sized,
        F: Fn(&C, usize, usize) + Sync;

    /// `height = 1` form of [`JobScheduler::dispatch`].
    fn dispatch_1d<C, F>(&self, width: usize, context: &C, action: F)
    where
        C: Sync + ?Sized,
        F: Fn(&C, usize) + Sync,
    {
        self.dispatch(width, 1, context, |ctx, x, _| action(ctx, x));
    }

    /// Same contract as `dispatch`; completes before returning.
    fn dispatch_async<C, F>(&self, width: usize, height: usize, context: &C, action: F)
    where
        C: Sync + ?Sized,
        F: Fn(&C, usize, usize) + Sync,
    {
        self.dispatch(width, height, context, action);
    }

    /// Barrier for outstanding `dispatch_async` work. Idempotent.
    fn wait_for_completion(&self) {}

    fn worker_count(&self) -> usize;
}

#[inline]
fn run_sequential<C, F>(width: usize, height: usize, context: &C, action: &F)
where
    C: ?Sized,
    F: Fn(&C, usize, usize),
{
    for y in 0..height {
        for x in 0..width {
            action(context, x, y);
        }
    }
}

/// Runs every item on the calling thread, y outer, x inner.
#[derive(Copy, Clone, Debug, Default)]
pub struct SequentialScheduler;

impl JobScheduler for SequentialScheduler {
    fn dispatch<C, F>(&self, width: usize, height: usize, context: &C, action: F)
    where
        C: Sync + ?Sized,
        F: Fn(&C, usize, usize) + Sync,
    {
        run_sequential(width, height, context, &action);
    }

    fn worker_count(&self) -> usize {
        1
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Dedicated pool size; `None` uses the global rayon pool
    pub worker_threads: Option<usize>,
    /// Index spaces smaller than this run sequentially.
    /// Defaults to `max(32, 2 × workers)`.
    pub min_parallel_load: Option<usize>,
}

/// Spreads the flattened index space over a rayon pool.
pub struct ParallelScheduler {
    pool: Option<ThreadPool>,
    min_load: usize,
}

impl ParallelScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let pool = match config.worker_threads {
            Some(threads) => Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("raster-worker-{}", i))
                    .build()?,
            ),
            None => None,
        };
        let workers = pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, ThreadPool::current_num_threads);
        let min_load = config
            .min_parallel_load
            .unwrap_or_else(|| MIN_PARALLEL_LOAD.max(2 * workers));

        log::debug!(
            "parallel scheduler: {} workers ({}), min load {}",
            workers,
            if pool.is_some() { "dedicated" } else { "global" },
            min_load
        );

        Ok(Self { pool, min_load })
    }

    /// Scheduler on the global rayon pool with the default threshold.
    pub fn global() -> Self {
        let workers = rayon::current_num_threads();
        Self {
            pool: None,
            min_load: MIN_PARALLEL_LOAD.max(2 * workers),
        }
    }

    #[inline]
    pub fn min_load(&self) -> usize {
        self.min_load
    }
}

impl Default for ParallelScheduler {
    fn default() -> Self {
        Self::global()
    }
}

impl JobScheduler for ParallelScheduler {
    fn dispatch<C, F>(&self, width: usize, height: usize, context: &C, action: F)
    where
        C: Sync + ?Sized,
        F: Fn(&C, usize, usize) + Sync,
    {
        let total = width * height;
        if total == 0 {
            return;
        }
        if total < self.min_load {
            run_sequential(width, height, context, &action);
            return;
        }

        let run = || {
            (0..total).into_par_iter().for_each(|flat| {
                let (y, x) = (flat / width, flat % width);
                action(context, x, y);
            })
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn worker_count(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, ThreadPool::current_num_threads)
    }
}
