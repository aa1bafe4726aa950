//! Error type shared by every stage of a filter chain.

use thiserror::Error;

/// Errors surfaced while building or pulling a filter chain.
///
/// Construction errors (`AdapterUnavailable`, `DeviceRequest`,
/// `PipelineCompilation`) mean no object was created.  `Dispatch` and
/// `InvalidInput` leave the affected node dirty, so pulling again after
/// fixing the cause is always safe.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("no suitable GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("failed to create GPU device: {0}")]
    DeviceRequest(String),

    #[error("kernel function `{function}` could not be compiled: {reason}")]
    PipelineCompilation { function: String, reason: String },

    #[error("dispatch of `{function}` failed: {reason}")]
    Dispatch { function: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("texture readback failed: {0}")]
    Readback(String),

    #[error("image decoding failed: {0}")]
    Image(#[from] image::ImageError),
}

impl FilterError {
    pub(crate) fn compilation(function: &str, reason: impl ToString) -> Self {
        Self::PipelineCompilation {
            function: function.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn dispatch(function: &str, reason: impl ToString) -> Self {
        Self::Dispatch {
            function: function.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for errors after which pulling the same node again may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Dispatch { .. } | Self::InvalidInput(_) | Self::Readback(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type FilterResult<T> = Result<T, FilterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_kernel_function() {
        let err = FilterError::compilation("octahedral_square", "entry point not found");
        assert_eq!(
            err.to_string(),
            "kernel function `octahedral_square` could not be compiled: entry point not found"
        );
        let err = FilterError::dispatch("equirect_to_cubemap", "device lost");
        assert!(err.to_string().contains("equirect_to_cubemap"));
    }

    #[test]
    fn only_runtime_errors_are_recoverable() {
        assert!(FilterError::dispatch("f", "x").is_recoverable());
        assert!(FilterError::InvalidInput("cycle".into()).is_recoverable());
        assert!(!FilterError::compilation("f", "x").is_recoverable());
        assert!(!FilterError::AdapterUnavailable("none".into()).is_recoverable());
    }
}
