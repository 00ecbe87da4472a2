pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, FilterMode, TransportKind};
pub use error::{CheckpointError, FollowbackError};
pub use types::*;
