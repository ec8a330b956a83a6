//! Error types for ladder state management

use thiserror::Error;

/// Errors produced by registry, selection, rating and persistence code
#[derive(Debug, Error)]
pub enum LadderError {
    /// Identity fields failed validation at construction time
    #[error("invalid agent identity: {0}")]
    InvalidAgent(String),

    /// The network directory holds no candidate files to sample from
    #[error("network directory is empty, cannot sample a new agent")]
    EmptyDirectory,

    /// Pair selection needs at least two eligible agents
    #[error("need at least 2 eligible agents, have {0}")]
    NotEnoughAgents(usize),

    /// An agent referenced by an update is not in the registry
    #[error("agent not registered: {0}")]
    UnknownAgent(String),

    /// Bandit statistics updated without a preceding virtual-loss increment
    #[error("zero visit count at update time for {0} (virtual loss missing)")]
    NoVirtualLoss(String),

    /// A match outcome with zero games cannot be scored
    #[error("match outcome has zero games played")]
    EmptyOutcome,

    /// Population could not be refilled to the requested size
    #[error("configuration error: {0}")]
    Config(String),

    /// A checkpoint file contains a record that cannot be decoded
    #[error("malformed record in checkpoint file '{file}': {detail}")]
    MalformedRecord { file: String, detail: String },

    /// Checkpoint read or write failed at the filesystem level
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LadderError>;
