mod command;
mod config;
mod pool;
mod session;
mod store;

pub use command::{Command, Fields, Operation, Reply};
pub use config::StoreOptions;
pub use pool::{JobHandle, WorkerPool};
pub use session::Session;
pub use store::Store;
