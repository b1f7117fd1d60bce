/// Work dispatch and per-draw scratch storage
pub mod collector;
pub mod scheduler;

pub use collector::{ChunkPool, Collector, CHUNK_CAPACITY};
pub use scheduler::{JobScheduler, ParallelScheduler, SchedulerConfig, SequentialScheduler};
