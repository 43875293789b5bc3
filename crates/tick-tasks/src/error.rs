use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

/// Failure classes of the task repository client.
#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum TaskReason {
    /// The engine could not be reached or rejected the credentials.
    #[error("connection error")]
    Connection,
    /// The rule could not be rendered; nothing was sent.
    #[error("script generation error")]
    Generation,
    /// The engine rejected or failed a request.
    #[error("remote request error")]
    RemoteRequest,
    /// No alert with the requested id.
    #[error("alert not found")]
    NotFound,
    #[error("operation cancelled")]
    Cancelled,
    #[error("id generation error")]
    IdGeneration,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for TaskReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Connection => 3001,
            Self::Generation => 3002,
            Self::RemoteRequest => 3003,
            Self::NotFound => 3004,
            Self::Cancelled => 3005,
            Self::IdGeneration => 3006,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type TaskError = StructError<TaskReason>;
pub type TaskResult<T> = Result<T, TaskError>;
