pub mod errors;
pub mod fetcher;
pub mod injector;
pub mod manager;
pub mod store;
pub mod task;

#[cfg(test)]
pub(crate) mod testsupport;

pub use errors::{FetchError, InjectError, TaskError};
pub use manager::TaskManager;
pub use store::TaskStore;
pub use task::{DownloadTask, SinfRecord, TaskStatus};
