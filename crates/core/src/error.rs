use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unknown alert state: {0}")]
    UnknownAlertState(String),

    #[error("unknown no-data option: {0}")]
    UnknownNoDataOption(String),

    #[error("unknown execution-error option: {0}")]
    UnknownExecutionErrorOption(String),

    #[error("{0}")]
    Other(String),
}
