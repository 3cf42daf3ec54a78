// WEC - wec-validator
// Module: Form checker
//
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

//! Structural validation for the WEC engine core.
//!
//! The [`FormChecker`] validates one instruction sequence at a time
//! against the stack type discipline: an abstract value stack whose
//! slots may be the polymorphic bottom element, and a stack of control
//! frames mirroring the static nesting of blocks. The [`Validator`]
//! drives it across a whole decoded module: every section's index
//! references, every function body, and every constant expression
//! (which shares the checker in a restricted mode).
//!
//! The checker holds no global state; validating the same module twice
//! on freshly reset checkers yields identical outcomes.

extern crate alloc;

mod checker;
mod module;

pub use checker::{CtrlFrame, FormChecker, FrameKind, StackSlot};
pub use module::Validator;
