//! Error types for the modification engine
//!
//! Each layer returns its own kind so callers can tell a service outage from
//! a malformed reply from a structural rejection:
//! - `LlmError`: the reasoning service call itself failed
//! - `ReplyError`: the call succeeded but the reply was unusable
//! - `PatchError`: an edit could not be produced or was rejected
//! - `EngineError`: a whole pipeline stage failed

use std::time::Duration;
use tailor_adapters::FsError;
use tailor_core::{RouteUpdateError, SpliceError, ValidationFailure};

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("no API key configured; set TAILOR_API_KEY or OPENROUTER_API_KEY")]
    MissingApiKey,

    #[error("reasoning service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("could not reach the reasoning service: {0}")]
    Network(String),

    #[error("reasoning service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("request was refused: {0}")]
    Refused(String),

    #[error("reasoning service returned an empty reply")]
    EmptyReply,

    #[error("unreadable service response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplyError {
    #[error("reply is not valid structured output: {0}")]
    Malformed(String),

    #[error("reply contains no code")]
    MissingCode,

    #[error("reply field `{field}` has an unusable value: {value}")]
    InvalidField { field: &'static str, value: String },
}

impl ReplyError {
    pub fn invalid_field(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Reply(#[from] ReplyError),

    #[error(transparent)]
    Splice(#[from] SpliceError),

    #[error("structural validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Route(#[from] RouteUpdateError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("edited content of {0} does not parse")]
    Unparseable(String),

    #[error("no target nodes for {0}")]
    NoTargets(String),

    #[error("reply left {0} unchanged")]
    NoChanges(String),

    #[error("file is not in the session file map: {0}")]
    UnknownFile(String),

    #[error("{path} is too large to send whole ({bytes} bytes, limit {limit})")]
    TooLarge { path: String, bytes: usize, limit: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("no file met the admission threshold of {threshold}")]
    NothingAdmitted { threshold: u8 },

    #[error("no admitted file could be changed: {0}")]
    NothingApplied(String),

    #[error("stage panicked: {0}")]
    Panicked(String),
}
