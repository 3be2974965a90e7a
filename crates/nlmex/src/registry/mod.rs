//! Task ownership and change notification.

pub mod events;
pub mod store;

pub use events::{TaskEvent, TaskEventBroadcaster};
pub use store::{TaskCounts, TaskRegistry};
