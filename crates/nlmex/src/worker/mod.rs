pub mod job;
pub mod pool;

pub use job::ExtractionJob;
pub use pool::WorkerPool;
