//! Defines the main `Error` struct.

use alloc::string::String;
use core::fmt;

/// Error categories for engine-core operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Binary decoding errors
    Load = 1,
    /// Form-checking errors
    Validation = 2,
    /// Pipeline stage-ordering errors
    Workflow = 3,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => f.write_str("load"),
            Self::Validation => f.write_str("validation"),
            Self::Workflow => f.write_str("workflow"),
        }
    }
}

/// The error type for engine-core operations.
///
/// Carries a category, a `u16` code from [`crate::codes`], the byte
/// offset at which the failing input was consumed (when one exists),
/// and a human-readable message. Offsets come from the decoder's
/// position tracking; validator errors reuse the offset recorded on
/// the failing instruction at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// Error category
    pub category: ErrorCategory,
    /// Error code
    pub code: u16,
    /// Byte offset of the input that produced the error, if any
    pub offset: Option<u64>,
    /// Error message
    pub message: String,
}

impl Error {
    /// Create a new error without positional context.
    pub fn new<S: Into<String>>(category: ErrorCategory, code: u16, message: S) -> Self {
        Self {
            category,
            code,
            offset: None,
            message: message.into(),
        }
    }

    /// Create a new error annotated with the byte offset it was
    /// detected at.
    pub fn at<S: Into<String>>(
        category: ErrorCategory,
        code: u16,
        offset: u64,
        message: S,
    ) -> Self {
        Self {
            category,
            code,
            offset: Some(offset),
            message: message.into(),
        }
    }

    /// Attach a byte offset to an error that was constructed without
    /// one. An offset already present is kept.
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset.get_or_insert(offset);
        self
    }

    /// Whether the error belongs to the given category.
    pub fn is_category(&self, category: ErrorCategory) -> bool {
        self.category == category
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} E{:04}] {}", self.category, self.code, self.message)?;
        if let Some(offset) = self.offset {
            write!(f, " (at byte 0x{offset:x})")?;
        }
        Ok(())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;
    use alloc::string::ToString;

    #[test]
    fn display_includes_code_and_offset() {
        let err = Error::at(
            ErrorCategory::Load,
            codes::INTEGER_TOO_LONG,
            0x2a,
            "integer representation too long",
        );
        assert_eq!(
            err.to_string(),
            "[load E1001] integer representation too long (at byte 0x2a)"
        );
    }

    #[test]
    fn with_offset_does_not_override() {
        let err = Error::at(ErrorCategory::Load, codes::UNEXPECTED_END, 7, "eof");
        assert_eq!(err.with_offset(9).offset, Some(7));

        let err = Error::new(ErrorCategory::Validation, codes::TYPE_CHECK_FAILED, "bad");
        assert_eq!(err.with_offset(9).offset, Some(9));
    }
}
