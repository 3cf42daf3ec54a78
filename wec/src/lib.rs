// WEC - wec
// Module: Pipeline facade
//
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

//! WEC: a WebAssembly engine core.
//!
//! This crate is the facade over the engine-core stack: the binary
//! decoder (`wec-decoder`), the form checker (`wec-validator`), and
//! the type model (`wec-foundation`). An [`Engine`] sequences the
//! pipeline as a staged state machine — a module must be loaded before
//! it is validated, and validated before it is handed to an embedder's
//! [`Executor`] for instantiation. Operations invoked from the wrong
//! stage fail with a workflow error instead of touching the
//! downstream components.
//!
//! ```
//! use wec::{Config, Engine};
//!
//! let bytes = wat::parse_str("(module (func (export \"f\")))").unwrap();
//! let mut engine = Engine::new(Config::default());
//! engine.load_from_bytes(&bytes).unwrap();
//! engine.validate().unwrap();
//! ```

extern crate alloc;

mod engine;

pub use engine::{Engine, Executor, Stage};

// The public surface of the engine core, re-exported for embedders.
pub use wec_decoder::load_module;
#[cfg(feature = "std")]
pub use wec_decoder::load_module_from_file;
pub use wec_error::{codes, Error, ErrorCategory, Result};
pub use wec_format::Module;
pub use wec_foundation::{Config, Proposal};
pub use wec_validator::{FormChecker, Validator};
