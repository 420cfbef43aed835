use crate::screen::Screen;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("{name} is not a supported video: {reason}")]
    InvalidInput { name: String, reason: String },

    #[error("analysis of {name} failed: {message}")]
    AnalysisRequestFailed { name: String, message: String },

    #[error("chat request failed: {message}")]
    ChatRequestFailed { message: String },

    #[error("selection index {index} is out of range for {len} results")]
    SelectionOutOfRange { index: usize, len: usize },

    #[error("screen capture denied: {message}")]
    CaptureDenied { message: String },

    #[error("cannot move from {from} to {to}")]
    IllegalTransition { from: Screen, to: Screen },
}
