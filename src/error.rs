use thiserror::Error;

use crate::models::PipelinePhase;

/// Errors raised by a language-model collaborator (network, auth, quota).
///
/// The pipeline never retries these; they end the current phase.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Missing or invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection failed or the byte stream broke mid-response
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the endpoint
    #[error("API error: {0}")]
    Api(String),

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Template rendering failures. These are caller errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("template '{template}' is missing a value for placeholder '{{{placeholder}}}'")]
    MissingValue {
        template: String,
        placeholder: String,
    },

    #[error("template '{template}' has an unclosed placeholder at byte {offset}")]
    UnclosedPlaceholder { template: String, offset: usize },
}

/// Failure to recover a structured mapping from a model response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// The response was empty or whitespace only; no parse was attempted
    #[error("model returned an empty response")]
    EmptyResponse,

    /// Every parse tier failed; carries the untouched response for debugging
    #[error("could not parse a JSON object from the model response")]
    Unparseable { raw: String },
}

impl ExtractionError {
    /// The offending response text, when the failure came from parsing
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ExtractionError::EmptyResponse => None,
            ExtractionError::Unparseable { raw } => Some(raw),
        }
    }
}

/// Errors from the knowledge-base collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("record {0} not found")]
    NotFound(String),
}

/// Rejected caller input, detected before any collaborator call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("{0} must not be empty")]
    Blank(&'static str),
}

/// Terminal failure of a generation run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// Rejected before any phase ran
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    #[error("{phase} phase: {source}")]
    Prompt {
        phase: PipelinePhase,
        source: PromptError,
    },

    #[error("{phase} phase: {source}")]
    Transport {
        phase: PipelinePhase,
        source: TransportError,
    },

    /// The draft came back blank, so there is nothing to review
    #[error("draft phase produced no text")]
    EmptyDraft,
}

impl GenerationError {
    /// Phase that failed; `None` for rejected input
    pub fn phase(&self) -> Option<PipelinePhase> {
        match self {
            GenerationError::Input(_) => None,
            GenerationError::Prompt { phase, .. } | GenerationError::Transport { phase, .. } => Some(*phase),
            GenerationError::EmptyDraft => Some(PipelinePhase::Draft),
        }
    }
}
