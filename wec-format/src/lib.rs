// WEC - wec-format
// Module: Binary format
//
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

//! Binary-format definitions for the WEC engine core.
//!
//! Three things live here: the byte-level constants of the module
//! format (magic, section IDs, type tags, limit kinds, opcode
//! prefixes), the owned module AST the decoder produces, and the
//! instruction AST the form checker walks. Decoding logic itself lives
//! in `wec-decoder`; this crate only describes shapes.

extern crate alloc;

pub mod binary;
pub mod instructions;
pub mod module;

pub use instructions::{BlockType, Expr, Instruction, MemArg, Op};
pub use module::{
    CodeEntry, CustomSection, Data, DataMode, Element, ElementInit, ElementMode, Export,
    ExportKind, Global, Import, ImportDesc, Module,
};
