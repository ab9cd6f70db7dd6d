use thiserror::Error;

use crate::model::ModelError;

#[derive(Debug, Error)]
pub enum Error {
    /// The tool server is unreachable or the handshake failed.
    #[error("tool server connection error: {0}")]
    Connection(#[from] mcp::Error),

    /// The model service rejected the request or could not be reached.
    #[error("model service error: {0}")]
    Model(#[from] ModelError),

    /// The model kept requesting tools past the configured bound.
    #[error("tool-use round limit of {limit} reached")]
    RoundLimit { limit: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
