use thiserror::Error;

#[derive(Error, Debug)]
pub enum AerationError {
    #[error("Reporting backend already registered")]
    Busy,

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AerationError>;
