// WEC - wec-error
// Module: Error handling
//
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

//! Error handling for the WEC engine core.
//!
//! Every fallible operation in the loader, the validator, and the
//! pipeline facade reports failures through the [`Error`] type defined
//! here. Errors are organized into categories, each with its own range
//! of `u16` codes:
//!
//! - Load errors (1000-1999): malformed binaries, truncated input,
//!   integer encoding faults, proposal-gated productions.
//! - Validation errors (2000-2999): type-check failures and invalid
//!   index references discovered by the form checker.
//! - Workflow errors (3000-3999): pipeline operations invoked from the
//!   wrong stage.
//!
//! Load and validation errors additionally carry the byte offset at
//! which the failing input was consumed, so embedders can report
//! "at byte X in section Y" diagnostics without re-parsing.

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod codes;
pub mod errors;
pub mod kinds;

pub use errors::{Error, ErrorCategory};

/// A specialized `Result` type for engine-core operations.
pub type Result<T> = core::result::Result<T, Error>;
