use thiserror::Error;

/// Errors scoped to a single request; never retried.
///
/// `InvalidArgument` maps to 400 at the HTTP boundary, `Capacity` to 503.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrainingError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Capacity(String),
}

impl TrainingError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Failure of the language-model provider.
///
/// Absorbed by the coaching message generator; never reaches a client.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("language model credential is not configured")]
    MissingCredential,
    #[error("request to language model failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("language model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model returned an empty completion")]
    EmptyCompletion,
}

/// Failure of the text-to-speech provider.
///
/// Surfaced to the caller; no fallback audio is substituted.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("text-to-speech credential is not configured")]
    MissingCredential,
    #[error("request to text-to-speech provider failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("text-to-speech provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("text-to-speech provider returned no audio")]
    EmptyAudio,
}
