use thiserror::Error;

use super::types::{AgentId, GroupId, LayerId, NodeId, RequestId};

/// API misuse and configuration failures.
///
/// Per-request planning outcomes are never errors; they are reported through
/// [`PathStatus`](super::PathStatus) so a tick always makes forward progress.
#[derive(Error, Debug)]
pub enum NavError {
    /// Request rejected at intake.
    #[error("invalid path request: {0}")]
    InvalidRequest(String),

    #[error("unknown request {0:?}")]
    UnknownRequest(RequestId),

    #[error("unknown agent {0:?}")]
    UnknownAgent(AgentId),

    #[error("unknown group {0:?}")]
    UnknownGroup(GroupId),

    #[error("unknown flow-field layer {0:?}")]
    UnknownLayer(LayerId),

    #[error("edge references missing node {0:?}")]
    MissingNode(NodeId),

    /// World position outside the flow-field grid.
    #[error("position ({x:.2}, {y:.2}) is outside the flow-field grid")]
    OutOfGrid { x: f32, y: f32 },

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: ron::error::SpannedError,
    },
}

pub type NavResult<T> = Result<T, NavError>;
