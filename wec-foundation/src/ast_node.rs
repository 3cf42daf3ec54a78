//! AST node attributes attached to diagnostics.

use core::fmt;

/// The kind of AST node being processed when an error was produced.
///
/// Reported alongside the error code and byte offset so callers can
/// render "at byte X while reading Y" uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstNodeAttr {
    /// The module header or top-level structure
    Module,
    /// A section header or frame
    Section,
    /// A limits encoding
    TypeLimit,
    /// A function/struct/array/sub/rec type-section entry
    TypeFunction,
    /// A memory type
    TypeMemory,
    /// A table type
    TypeTable,
    /// A global type
    TypeGlobal,
    /// An element or data segment
    Segment,
    /// A constant or body expression
    Expression,
    /// An instruction
    Instruction,
}

impl fmt::Display for AstNodeAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Module => "module",
            Self::Section => "section",
            Self::TypeLimit => "limit type",
            Self::TypeFunction => "type entry",
            Self::TypeMemory => "memory type",
            Self::TypeTable => "table type",
            Self::TypeGlobal => "global type",
            Self::Segment => "segment",
            Self::Expression => "expression",
            Self::Instruction => "instruction",
        };
        f.write_str(name)
    }
}
