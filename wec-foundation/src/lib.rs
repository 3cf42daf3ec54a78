// WEC - wec-foundation
// Module: Core type model
//
// SPDX-License-Identifier: MIT

#![forbid(unsafe_code)]
#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]

//! Core type model for the WEC engine core.
//!
//! This crate holds the abstract syntax the binary decoder produces and
//! the form checker consumes: value and reference types (including the
//! GC proposal's heap, storage, struct, array, sub, and recursive
//! types), limits, and the memory/table/global type wrappers. It also
//! carries the [`Config`] of enabled proposals shared by the decoder
//! and the validator, and the [`AstNodeAttr`] tags attached to
//! diagnostics.
//!
//! Values here are materialized once by the decoder and never mutated
//! afterwards; defined types reference each other by index into the
//! module's type vector, never by pointer, so recursive type graphs
//! need no shared ownership.

extern crate alloc;

pub mod ast_node;
pub mod composite;
pub mod config;
pub mod limits;
pub mod types;

pub use ast_node::AstNodeAttr;
pub use composite::{ArrayType, CompositeType, DefinedType, FieldType, FunctionType, StructType, SubType};
pub use config::{Config, Proposal};
pub use limits::{GlobalType, Limits, MemoryType, TableType};
pub use types::{FullRefType, FullValType, HeapType, StorageType, ValMut};
