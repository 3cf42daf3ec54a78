//! The owned module AST.
//!
//! A [`Module`] is the immutable product of a successful load: every
//! section decoded into owned values, ready for validation. No decoding
//! state survives in it.

use alloc::string::String;
use alloc::vec::Vec;

use wec_foundation::{DefinedType, FullRefType, FullValType, GlobalType, MemoryType, TableType};

use crate::instructions::Expr;

/// A custom section, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
    /// Section name
    pub name: String,
    /// Uninterpreted payload
    pub data: Vec<u8>,
}

/// What an import provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportDesc {
    /// A function, by type index
    Func(u32),
    /// A table
    Table(TableType),
    /// A memory
    Memory(MemoryType),
    /// A global
    Global(GlobalType),
}

/// One import-section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Module namespace
    pub module: String,
    /// Import name
    pub name: String,
    /// The imported entity
    pub desc: ImportDesc,
}

/// The kind of an exported entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// A function export (0x00)
    Func,
    /// A table export (0x01)
    Table,
    /// A memory export (0x02)
    Memory,
    /// A global export (0x03)
    Global,
}

impl ExportKind {
    /// Decode an export-kind byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Func),
            0x01 => Some(Self::Table),
            0x02 => Some(Self::Memory),
            0x03 => Some(Self::Global),
            _ => None,
        }
    }
}

/// One export-section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    /// Export name, unique within the module
    pub name: String,
    /// Kind of the exported entity
    pub kind: ExportKind,
    /// Index into the corresponding index space
    pub index: u32,
}

/// One global-section entry: type plus initializer expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// The global's type
    pub global_type: GlobalType,
    /// Constant initializer
    pub init: Expr,
}

/// Placement of an element segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementMode {
    /// Copied into a table at instantiation
    Active {
        /// Target table
        table_idx: u32,
        /// Constant offset expression
        offset: Expr,
    },
    /// Available to `table.init`
    Passive,
    /// Only declares function references
    Declarative,
}

/// Initializer list of an element segment. The compact encodings list
/// function indices; the general ones carry full constant expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementInit {
    /// Function indices (encodings 0-3)
    FuncIndices(Vec<u32>),
    /// Constant expressions (encodings 4-7)
    Exprs(Vec<Expr>),
}

/// One element-section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Placement
    pub mode: ElementMode,
    /// Element reference type
    pub ref_type: FullRefType,
    /// Initializers
    pub init: ElementInit,
}

/// Placement of a data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataMode {
    /// Copied into a memory at instantiation
    Active {
        /// Target memory
        memory_idx: u32,
        /// Constant offset expression
        offset: Expr,
    },
    /// Available to `memory.init`
    Passive,
}

/// One data-section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    /// Placement
    pub mode: DataMode,
    /// Segment bytes
    pub init: Vec<u8>,
}

/// One code-section entry: compressed local declarations plus the body
/// expression. Locals stay in their (count, type) run-length form; the
/// validator expands them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeEntry {
    /// Local declarations as (count, type) runs
    pub locals: Vec<(u32, FullValType)>,
    /// The body, including its terminal `end`
    pub body: Expr,
}

/// A decoded module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    /// Type section: defined types (possibly recursion groups)
    pub types: Vec<DefinedType>,
    /// Import section
    pub imports: Vec<Import>,
    /// Function section: type index per module-defined function
    pub funcs: Vec<u32>,
    /// Table section
    pub tables: Vec<TableType>,
    /// Memory section
    pub memories: Vec<MemoryType>,
    /// Global section
    pub globals: Vec<Global>,
    /// Export section
    pub exports: Vec<Export>,
    /// Start section: function index
    pub start: Option<u32>,
    /// Element section
    pub elements: Vec<Element>,
    /// Code section, parallel to `funcs`
    pub code: Vec<CodeEntry>,
    /// Data section
    pub datas: Vec<Data>,
    /// Data-count section
    pub data_count: Option<u32>,
    /// Custom sections, in order of appearance
    pub customs: Vec<CustomSection>,
}

impl Module {
    /// An empty module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of type indices, counting every member of every
    /// recursion group.
    pub fn type_index_count(&self) -> usize {
        self.types.iter().map(DefinedType::group_len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use wec_foundation::{CompositeType, FunctionType, SubType};

    #[test]
    fn type_index_count_spans_rec_groups() {
        let unit = FunctionType::default();
        let module = Module {
            types: vec![
                DefinedType::Func(unit.clone()),
                DefinedType::Rec(vec![
                    SubType::final_type(CompositeType::Func(unit.clone())),
                    SubType::final_type(CompositeType::Func(unit)),
                ]),
            ],
            ..Module::default()
        };
        assert_eq!(module.type_index_count(), 3);
    }
}
