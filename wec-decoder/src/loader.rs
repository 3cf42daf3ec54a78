//! Per-entity load operations.
//!
//! A [`Loader`] couples a [`FileReader`] with the engine [`Config`]
//! and decodes the type grammar: limits, function/struct/array types,
//! explicit sub types and recursion groups, and the memory/table/
//! global wrappers. Errors name the AST node being read and the byte
//! offset the reader last consumed; no recovery is attempted.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use wec_error::{codes, kinds, Error, Result};
use wec_format::binary;
use wec_foundation::{
    ArrayType, AstNodeAttr, CompositeType, Config, DefinedType, FieldType, FullRefType,
    FullValType, FunctionType, GlobalType, HeapType, Limits, MemoryType, Proposal, StorageType,
    StructType, SubType, TableType, ValMut,
};

use crate::reader::FileReader;

/// Decodes module entities from a byte stream under a proposal
/// configuration.
pub struct Loader<'a, 'cfg> {
    reader: FileReader<'a>,
    config: &'cfg Config,
}

impl<'a, 'cfg> Loader<'a, 'cfg> {
    /// A loader over `data` with the given configuration.
    pub fn new(data: &'a [u8], config: &'cfg Config) -> Self {
        Self {
            reader: FileReader::new(data),
            config,
        }
    }

    /// The underlying reader.
    pub fn reader(&mut self) -> &mut FileReader<'a> {
        &mut self.reader
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        self.config
    }

    /// Build a load error at the reader's last offset, tagged with the
    /// node being read.
    pub(crate) fn err(&self, code: u16, node: AstNodeAttr, message: &str) -> Error {
        kinds::load_error(
            code,
            self.reader.last_offset(),
            format!("{message} (while loading {node})"),
        )
    }

    /// Build an error for a production that requires a disabled
    /// proposal.
    pub(crate) fn need_proposal(
        &self,
        code: u16,
        proposal: Proposal,
        node: AstNodeAttr,
        message: &str,
    ) -> Error {
        kinds::load_error(
            code,
            self.reader.last_offset(),
            format!("{message}: requires the {proposal} proposal (while loading {node})"),
        )
    }

    fn annotate(&self, err: Error, node: AstNodeAttr) -> Error {
        let mut err = err.with_offset(self.reader.last_offset());
        if !err.message.contains("while loading") {
            err.message = format!("{} (while loading {node})", err.message);
        }
        err
    }

    fn read_byte_in(&mut self, node: AstNodeAttr) -> Result<u8> {
        self.reader.read_byte().map_err(|e| self.annotate(e, node))
    }

    fn read_u32_in(&mut self, node: AstNodeAttr) -> Result<u32> {
        self.reader.read_u32().map_err(|e| self.annotate(e, node))
    }

    /// Read a length-prefixed name, tagging failures with `node`.
    pub(crate) fn read_name_in(&mut self, node: AstNodeAttr) -> Result<String> {
        self.reader.read_name().map_err(|e| self.annotate(e, node))
    }

    /// Load a limits encoding.
    ///
    /// Kind bytes: 0x00 min only, 0x01 min and max, 0x03 shared with
    /// max. 0x02 (shared without max) is never well-formed: with the
    /// threads proposal enabled the error says so specifically, without
    /// it the byte is just an out-of-range kind. 0x80/0x81 are the
    /// overlong-LEB128 spellings of 0x00/0x01 and are reported as such.
    pub fn load_limits(&mut self) -> Result<Limits> {
        let kind = self.read_byte_in(AstNodeAttr::TypeLimit)?;
        let (has_max, shared) = match kind {
            binary::LIMIT_HAS_MIN => (false, false),
            binary::LIMIT_HAS_MIN_MAX => (true, false),
            binary::LIMIT_SHARED_NO_MAX => {
                let code = if self.config.has_proposal(Proposal::Threads) {
                    codes::SHARED_MEMORY_NO_MAX
                } else {
                    codes::INTEGER_TOO_LARGE
                };
                return Err(self.err(code, AstNodeAttr::TypeLimit, "malformed limit kind"));
            }
            binary::LIMIT_SHARED => (true, true),
            0x80 | 0x81 => {
                return Err(self.err(
                    codes::INTEGER_TOO_LONG,
                    AstNodeAttr::TypeLimit,
                    "malformed limit kind",
                ));
            }
            _ => {
                return Err(self.err(
                    codes::INTEGER_TOO_LARGE,
                    AstNodeAttr::TypeLimit,
                    "malformed limit kind",
                ));
            }
        };
        let min = self.read_u32_in(AstNodeAttr::TypeLimit)?;
        let max = if has_max {
            Some(self.read_u32_in(AstNodeAttr::TypeLimit)?)
        } else {
            None
        };
        Ok(Limits { min, max, shared })
    }

    /// Decode a value type starting from an already-read byte.
    ///
    /// Typed-reference prefixes continue reading their heap-type
    /// payload from the stream.
    pub(crate) fn val_type_from_byte(&mut self, byte: u8, node: AstNodeAttr) -> Result<FullValType> {
        match byte {
            binary::I32_TYPE => Ok(FullValType::I32),
            binary::I64_TYPE => Ok(FullValType::I64),
            binary::F32_TYPE => Ok(FullValType::F32),
            binary::F64_TYPE => Ok(FullValType::F64),
            binary::V128_TYPE => {
                if !self.config.has_proposal(Proposal::Simd) {
                    return Err(self.need_proposal(
                        codes::MALFORMED_VALTYPE,
                        Proposal::Simd,
                        node,
                        "v128 value type",
                    ));
                }
                Ok(FullValType::V128)
            }
            binary::FUNCREF_TYPE => {
                self.check_ref_types_enabled(node, "funcref value type")?;
                Ok(FullValType::FUNCREF)
            }
            binary::EXTERNREF_TYPE => {
                self.check_ref_types_enabled(node, "externref value type")?;
                Ok(FullValType::EXTERNREF)
            }
            binary::REF_NULL_PREFIX | binary::REF_PREFIX => {
                if !self.config.has_proposal(Proposal::FunctionReferences) {
                    return Err(self.need_proposal(
                        codes::MALFORMED_VALTYPE,
                        Proposal::FunctionReferences,
                        node,
                        "typed reference",
                    ));
                }
                let heap = self.load_heap_type(node)?;
                let nullable = byte == binary::REF_NULL_PREFIX;
                Ok(FullValType::Ref(FullRefType { nullable, heap }))
            }
            _ => Err(self.err(codes::MALFORMED_VALTYPE, node, "malformed value type")),
        }
    }

    fn check_ref_types_enabled(&self, node: AstNodeAttr, what: &str) -> Result<()> {
        if self.config.has_proposal(Proposal::ReferenceTypes) {
            Ok(())
        } else {
            Err(self.need_proposal(
                codes::MALFORMED_VALTYPE,
                Proposal::ReferenceTypes,
                node,
                what,
            ))
        }
    }

    /// Load a value type.
    pub fn load_val_type(&mut self, node: AstNodeAttr) -> Result<FullValType> {
        let byte = self.read_byte_in(node)?;
        self.val_type_from_byte(byte, node)
    }

    /// Load a heap type: a negative s33 selects a builtin, a
    /// non-negative one names a defined type by index.
    pub fn load_heap_type(&mut self, node: AstNodeAttr) -> Result<HeapType> {
        let value = self
            .reader
            .read_s33()
            .map_err(|e| self.annotate(e, node))?;
        if value >= 0 {
            if u32::try_from(value).is_err() {
                return Err(self.err(codes::INTEGER_TOO_LARGE, node, "type index out of range"));
            }
            return Ok(HeapType::Defined(value as u32));
        }
        let byte = (value & 0x7F) as u8;
        let heap = HeapType::builtin_from_byte(byte)
            .ok_or_else(|| self.err(codes::MALFORMED_VALTYPE, node, "malformed heap type"))?;
        match heap {
            HeapType::Func | HeapType::Extern => Ok(heap),
            _ if self.config.has_proposal(Proposal::Gc) => Ok(heap),
            _ => Err(self.need_proposal(
                codes::MALFORMED_VALTYPE,
                Proposal::Gc,
                node,
                "heap type",
            )),
        }
    }

    /// Load a table element type: one of the reference shorthands or a
    /// typed reference. `funcref` needs no proposal; it is the only
    /// element type of the base specification.
    pub fn load_ref_type(&mut self, node: AstNodeAttr) -> Result<FullRefType> {
        let byte = self.read_byte_in(node)?;
        match byte {
            binary::FUNCREF_TYPE => Ok(FullRefType::FUNCREF),
            binary::EXTERNREF_TYPE => {
                if !self.config.has_proposal(Proposal::ReferenceTypes) {
                    return Err(self.need_proposal(
                        codes::MALFORMED_VALTYPE,
                        Proposal::ReferenceTypes,
                        node,
                        "externref element type",
                    ));
                }
                Ok(FullRefType::EXTERNREF)
            }
            binary::REF_NULL_PREFIX | binary::REF_PREFIX => {
                if !self.config.has_proposal(Proposal::FunctionReferences) {
                    return Err(self.need_proposal(
                        codes::MALFORMED_VALTYPE,
                        Proposal::FunctionReferences,
                        node,
                        "typed reference",
                    ));
                }
                let heap = self.load_heap_type(node)?;
                Ok(FullRefType {
                    nullable: byte == binary::REF_NULL_PREFIX,
                    heap,
                })
            }
            _ => Err(self.err(codes::MALFORMED_VALTYPE, node, "malformed reference type")),
        }
    }

    /// Load a function type body (the 0x60 tag already consumed).
    ///
    /// More than one result is only admitted under the multi-value
    /// proposal; the error points at the result count.
    pub fn load_function_type(&mut self) -> Result<FunctionType> {
        let node = AstNodeAttr::TypeFunction;
        let param_count = self.read_u32_in(node)?;
        let mut params = Vec::with_capacity(param_count.min(1024) as usize);
        for _ in 0..param_count {
            params.push(self.load_val_type(node)?);
        }
        let result_count = self.read_u32_in(node)?;
        if result_count > 1 && !self.config.has_proposal(Proposal::MultiValue) {
            return Err(self.need_proposal(
                codes::MALFORMED_VALTYPE,
                Proposal::MultiValue,
                node,
                "multiple results",
            ));
        }
        let mut results = Vec::with_capacity(result_count.min(1024) as usize);
        for _ in 0..result_count {
            results.push(self.load_val_type(node)?);
        }
        Ok(FunctionType::new(params, results))
    }

    /// Load a field type: mutability byte, then storage type.
    pub fn load_field_type(&mut self) -> Result<FieldType> {
        let node = AstNodeAttr::TypeFunction;
        let mut_byte = self.read_byte_in(node)?;
        let mutability = ValMut::from_byte(mut_byte)
            .ok_or_else(|| self.err(codes::INVALID_MUT, node, "malformed mutability"))?;
        let storage = self.load_storage_type(node)?;
        Ok(FieldType {
            mutability,
            storage,
        })
    }

    fn load_storage_type(&mut self, node: AstNodeAttr) -> Result<StorageType> {
        let byte = self.read_byte_in(node)?;
        match byte {
            binary::I8_STORAGE_TYPE => Ok(StorageType::I8),
            binary::I16_STORAGE_TYPE => Ok(StorageType::I16),
            _ => Ok(StorageType::Val(self.val_type_from_byte(byte, node)?)),
        }
    }

    /// Load a struct type body (the 0x5F tag already consumed).
    pub fn load_struct_type(&mut self) -> Result<StructType> {
        let count = self.read_u32_in(AstNodeAttr::TypeFunction)?;
        let mut fields = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            fields.push(self.load_field_type()?);
        }
        Ok(StructType { fields })
    }

    /// Load an array type body (the 0x5E tag already consumed).
    pub fn load_array_type(&mut self) -> Result<ArrayType> {
        Ok(ArrayType {
            field: self.load_field_type()?,
        })
    }

    /// Load a sub type: parent count, parent indices (one byte each),
    /// then a structural body.
    pub fn load_sub_type(&mut self) -> Result<SubType> {
        let node = AstNodeAttr::TypeFunction;
        let count = self.read_u32_in(node)?;
        let mut parents = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            parents.push(u32::from(self.read_byte_in(node)?));
        }
        let composite = self.load_composite_type()?;
        Ok(SubType { parents, composite })
    }

    /// Load a structural body discriminated by its tag byte.
    pub fn load_composite_type(&mut self) -> Result<CompositeType> {
        let node = AstNodeAttr::TypeFunction;
        let tag = self.read_byte_in(node)?;
        match tag {
            binary::FUNC_TYPE_TAG => Ok(CompositeType::Func(self.load_function_type()?)),
            binary::STRUCT_TYPE_TAG => Ok(CompositeType::Struct(self.load_struct_type()?)),
            binary::ARRAY_TYPE_TAG => Ok(CompositeType::Array(self.load_array_type()?)),
            _ => Err(self.err(
                codes::INTEGER_TOO_LONG,
                node,
                "malformed structural type tag",
            )),
        }
    }

    /// Load one type-section entry.
    ///
    /// Legacy bodies keep their bare encodings; 0x50 wraps a single sub
    /// type, 0x4F opens a recursion group whose members are encoded
    /// without individual tags. All non-function encodings require the
    /// GC proposal. Unknown tags are reported the way an overlong
    /// LEB128 in the tag slot would be.
    pub fn load_defined_type(&mut self) -> Result<DefinedType> {
        let node = AstNodeAttr::TypeFunction;
        let tag = self.read_byte_in(node)?;
        match tag {
            binary::FUNC_TYPE_TAG => Ok(DefinedType::Func(self.load_function_type()?)),
            binary::STRUCT_TYPE_TAG => {
                self.check_gc_enabled(node, "struct type")?;
                Ok(DefinedType::Struct(self.load_struct_type()?))
            }
            binary::ARRAY_TYPE_TAG => {
                self.check_gc_enabled(node, "array type")?;
                Ok(DefinedType::Array(self.load_array_type()?))
            }
            binary::SUB_TYPE_TAG => {
                self.check_gc_enabled(node, "sub type")?;
                Ok(DefinedType::Sub(self.load_sub_type()?))
            }
            binary::REC_TYPE_TAG => {
                self.check_gc_enabled(node, "recursion group")?;
                let count = self.read_u32_in(node)?;
                let mut group = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    group.push(self.load_sub_type()?);
                }
                Ok(DefinedType::Rec(group))
            }
            _ => Err(self.err(codes::INTEGER_TOO_LONG, node, "malformed type entry tag")),
        }
    }

    fn check_gc_enabled(&self, node: AstNodeAttr, what: &str) -> Result<()> {
        if self.config.has_proposal(Proposal::Gc) {
            Ok(())
        } else {
            Err(self.need_proposal(codes::MALFORMED_VALTYPE, Proposal::Gc, node, what))
        }
    }

    /// Load a memory type: its limits.
    pub fn load_memory_type(&mut self) -> Result<MemoryType> {
        let limits = self
            .load_limits()
            .map_err(|e| self.annotate(e, AstNodeAttr::TypeMemory))?;
        Ok(MemoryType { limits })
    }

    /// Load a table type: element reference type, then limits.
    pub fn load_table_type(&mut self) -> Result<TableType> {
        let ref_type = self.load_ref_type(AstNodeAttr::TypeTable)?;
        let limits = self
            .load_limits()
            .map_err(|e| self.annotate(e, AstNodeAttr::TypeTable))?;
        Ok(TableType { ref_type, limits })
    }

    /// Load a global type: value type, then mutability.
    pub fn load_global_type(&mut self) -> Result<GlobalType> {
        let node = AstNodeAttr::TypeGlobal;
        let val_type = self.load_val_type(node)?;
        let mut_byte = self.read_byte_in(node)?;
        let mutability = ValMut::from_byte(mut_byte)
            .ok_or_else(|| self.err(codes::INVALID_MUT, node, "malformed mutability"))?;
        Ok(GlobalType {
            val_type,
            mutability,
        })
    }
}
