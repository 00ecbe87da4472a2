use thiserror::Error;

#[derive(Error, Debug)]
pub enum FollowbackError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Membership source failed: {0}")]
    Membership(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Pass interrupted before completion")]
    Interrupted,
}

/// Failures reading or writing the progress record.
///
/// `Corrupt` is fatal for a run: acting on an untrustworthy cursor risks
/// repeating or skipping actions.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint is corrupt: {0}")]
    Corrupt(String),

    #[error("Checkpoint serialization failed: {0}")]
    Serialize(String),
}
