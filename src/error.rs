//! Error types for graph transfer

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Run phase a failure is attributed to in operator-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ReadStats,
    ReadNodeWindow,
    ReadRelationWindow,
    WipeTarget,
    WriteNodeBatch,
    WriteRelationBatch,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::ReadStats => "read stats",
            Phase::ReadNodeWindow => "read node window",
            Phase::ReadRelationWindow => "read relation window",
            Phase::WipeTarget => "wipe target",
            Phase::WriteNodeBatch => "write node batch",
            Phase::WriteRelationBatch => "write relation batch",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("unsupported property value for `{key}` ({found})")]
    Format { key: String, found: &'static str },

    #[error("node {id} already carries import key `{key}`")]
    MarkerCollision { id: i64, key: String },

    #[error("no mapped target id for source node {node_id} (relationship {relation_id})")]
    MissingMapping { node_id: i64, relation_id: i64 },

    #[error("script ended with an unterminated statement (line {line})")]
    MalformedScript { line: usize },

    #[error("unexpected result shape: {0}")]
    UnexpectedResult(String),

    // `cause` is folded into the message, not exposed as source()
    #[error("{phase}: {cause}")]
    Phased {
        phase: Phase,
        cause: Box<TransferError>,
    },

    #[error("replay line {line}: {cause}")]
    Replay {
        line: usize,
        cause: Box<TransferError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransferError {
    /// Attach the run phase to an error bubbling out of a batch operation.
    pub fn in_phase(self, phase: Phase) -> Self {
        TransferError::Phased {
            phase,
            cause: Box::new(self),
        }
    }

    pub fn at_line(self, line: usize) -> Self {
        TransferError::Replay {
            line,
            cause: Box::new(self),
        }
    }
}
