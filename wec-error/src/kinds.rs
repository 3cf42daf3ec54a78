//! Constructor helpers for common error kinds.
//!
//! These keep error construction out of the decoding and checking
//! cores: callers pick a helper, the helper picks the category and
//! code.

use alloc::string::String;

use crate::{codes, Error, ErrorCategory};

/// Input ended while more bytes were required.
pub fn unexpected_end(offset: u64) -> Error {
    Error::at(
        ErrorCategory::Load,
        codes::UNEXPECTED_END,
        offset,
        "unexpected end of input",
    )
}

/// LEB128 integer used more bytes than its type permits.
pub fn integer_too_long(offset: u64) -> Error {
    Error::at(
        ErrorCategory::Load,
        codes::INTEGER_TOO_LONG,
        offset,
        "integer representation too long",
    )
}

/// LEB128 integer value exceeds the range of its type.
pub fn integer_too_large(offset: u64) -> Error {
    Error::at(
        ErrorCategory::Load,
        codes::INTEGER_TOO_LARGE,
        offset,
        "integer too large",
    )
}

/// General load-time structural failure.
pub fn load_error<S: Into<String>>(code: u16, offset: u64, message: S) -> Error {
    Error::at(ErrorCategory::Load, code, offset, message)
}

/// Form-checking failure.
pub fn validation_error<S: Into<String>>(code: u16, message: S) -> Error {
    Error::new(ErrorCategory::Validation, code, message)
}

/// Form-checking failure at a known instruction offset.
pub fn validation_error_at<S: Into<String>>(code: u16, offset: u64, message: S) -> Error {
    Error::at(ErrorCategory::Validation, code, offset, message)
}

/// Stack discipline violation.
pub fn type_check_failed<S: Into<String>>(message: S) -> Error {
    validation_error(codes::TYPE_CHECK_FAILED, message)
}

/// Pipeline operation invoked from the wrong stage.
pub fn wrong_vm_workflow<S: Into<String>>(message: S) -> Error {
    Error::new(ErrorCategory::Workflow, codes::WRONG_VM_WORKFLOW, message)
}
