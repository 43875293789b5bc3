#[macro_use]
mod log_macros;

pub mod client;
pub mod error;
pub mod id;
pub mod memory;
pub mod remote;
pub mod tracing_init;

pub use client::{PREFIX, Task, TaskClient, href, href_output};
pub use error::{TaskError, TaskReason, TaskResult};
pub use id::{IdGenerator, UuidGenerator};
pub use remote::{
    Connector, CreateTaskOptions, Dbrp, EngineConnection, Link, ListTasksOptions, RemoteError,
    RemoteTask, TaskStatus, UpdateTaskOptions,
};
