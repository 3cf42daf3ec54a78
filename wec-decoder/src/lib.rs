// WEC - wec-decoder
// Module: Binary decoder
//
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

//! Binary decoder for the WEC engine core.
//!
//! The decoder is a pull-style pipeline over a byte slice: a
//! [`FileReader`] tracks positions and decodes the LEB128 primitives,
//! and a [`Loader`] drives it section by section into the owned module
//! AST of `wec-format`. Productions that are syntactically well-formed
//! but belong to a disabled proposal are rejected with an error naming
//! the proposal.
//!
//! Decoding never recovers internally: the first error aborts the load
//! and surfaces to the caller annotated with the byte offset at which
//! input was last consumed and the kind of AST node being read.

extern crate alloc;

mod expr;
mod loader;
mod module;
mod reader;

pub use loader::Loader;
pub use module::load_module;
pub use reader::FileReader;

#[cfg(feature = "std")]
pub use module::load_module_from_file;
