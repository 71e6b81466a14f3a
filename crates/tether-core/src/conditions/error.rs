use std::ops::Range;

use thiserror::Error;

/// A conditions string that cannot be lexed or parsed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (at {}..{})", .span.start, .span.end)]
pub struct ConditionsError {
    pub message: String,
    pub span: Range<usize>,
}

impl ConditionsError {
    pub fn new(message: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}
