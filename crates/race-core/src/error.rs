use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Upsert,
    Fetch,
    Delete,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Upsert => "upsert",
            OpKind::Fetch => "fetch",
            OpKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("{op} failed for key {key}: {message}")]
    Operation {
        op: OpKind,
        key: String,
        message: String,
    },

    #[error("{op} timed out after {timeout_ms}ms for key {key}")]
    Timeout {
        op: OpKind,
        key: String,
        timeout_ms: u64,
    },

    #[error("field `{field}` is not an array")]
    NotAnArray { field: String },
}

impl StoreError {
    pub fn operation(op: OpKind, key: &str, message: impl fmt::Display) -> Self {
        StoreError::Operation {
            op,
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// Run-level errors. Per-trial operation failures are not represented here;
/// they are recorded on the trial and the run continues.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("client {client_id} could not connect: {source}")]
    Connection {
        client_id: String,
        #[source]
        source: StoreError,
    },
}
