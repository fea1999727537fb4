//! Protocol error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("identifier cannot be empty: {0}")]
    EmptyId(&'static str),

    #[error("invalid queue entry id: {0}")]
    InvalidQueueEntryId(String),

    #[error("queue entry id cannot be negative: {0}")]
    NegativeQueueEntryId(i64),

    #[error("unsupported parameter value: {0}")]
    UnsupportedValue(String),
}
