use thiserror::Error;

/// Why a model service call produced no usable response.
///
/// Any of these ends the current `converse` call; the conversation history
/// is left as it was before the failed request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The request never completed (DNS, TLS, connection reset).
    #[error("model service unreachable: {0}")]
    Network(String),

    /// The service answered with a non-success status.
    #[error("model service rejected the request: {0}")]
    Api(String),

    /// The body did not decode as a Converse response.
    #[error("malformed model response: {0}")]
    InvalidResponse(String),

    /// Bad endpoint override or similar local setup problem.
    #[error("model backend misconfigured: {0}")]
    Config(String),
}
