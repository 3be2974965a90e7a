pub mod id;
pub mod record;
pub mod result;

pub use id::{TaskId, TaskIdAllocator};
pub use record::{ErrorInfo, ErrorKind, ExtractionTask, TaskStatus};
pub use result::{fields, ExtractionResult, ResultType};
