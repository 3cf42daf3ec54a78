//! Whole-module loading: header, section framing, section bodies.

use alloc::vec::Vec;

use wec_error::{codes, Result};
use wec_format::binary;
use wec_format::module::{
    CodeEntry, CustomSection, Data, DataMode, Element, ElementInit, ElementMode, Export,
    ExportKind, Global, Import, ImportDesc, Module,
};
use wec_foundation::{AstNodeAttr, Config, FullRefType, Proposal};

use crate::loader::Loader;

/// Decode a module from its binary encoding.
///
/// The returned [`Module`] is immutable and owns all of its contents;
/// on failure no partial module is delivered.
pub fn load_module(data: &[u8], config: &Config) -> Result<Module> {
    Loader::new(data, config).load_module()
}

/// Decode a module from a file on disk.
#[cfg(feature = "std")]
pub fn load_module_from_file<P: AsRef<std::path::Path>>(
    path: P,
    config: &Config,
) -> Result<Module> {
    let data = std::fs::read(path).map_err(|io| {
        wec_error::Error::new(
            wec_error::ErrorCategory::Load,
            codes::UNEXPECTED_END,
            std::format!("failed to read module file: {io}"),
        )
    })?;
    load_module(&data, config)
}

impl<'a, 'cfg> Loader<'a, 'cfg> {
    /// Decode the whole module this loader was constructed over.
    pub fn load_module(mut self) -> Result<Module> {
        self.load_header()?;

        let mut module = Module::new();
        let mut last_section_id: Option<u8> = None;
        while !self.reader().is_at_end() {
            self.load_section(&mut module, &mut last_section_id)?;
        }

        if module.funcs.len() != module.code.len() {
            return Err(self.err(
                codes::MALFORMED_SECTION,
                AstNodeAttr::Module,
                "function and code section lengths disagree",
            ));
        }
        if let Some(count) = module.data_count {
            if count as usize != module.datas.len() {
                return Err(self.err(
                    codes::MALFORMED_SECTION,
                    AstNodeAttr::Module,
                    "data count and data section lengths disagree",
                ));
            }
        }
        Ok(module)
    }

    fn load_header(&mut self) -> Result<()> {
        let magic = self.reader().read_bytes(4).map_err(|e| {
            e.with_offset(0)
        })?;
        if magic != binary::WASM_MAGIC {
            return Err(self.err(
                codes::MALFORMED_MAGIC,
                AstNodeAttr::Module,
                "magic header not detected",
            ));
        }
        let version = self.reader().read_bytes(4)?;
        if version != binary::WASM_VERSION {
            return Err(self.err(
                codes::MALFORMED_VERSION,
                AstNodeAttr::Module,
                "unknown binary version",
            ));
        }
        Ok(())
    }

    fn load_section(
        &mut self,
        module: &mut Module,
        last_section_id: &mut Option<u8>,
    ) -> Result<()> {
        let node = AstNodeAttr::Section;
        let id = self.reader().read_byte()?;
        if id > binary::DATA_COUNT_SECTION_ID {
            return Err(self.err(codes::MALFORMED_SECTION, node, "malformed section id"));
        }
        if id != binary::CUSTOM_SECTION_ID {
            // The data count section is ordered between the element
            // and code sections despite its higher ID.
            let rank = |id: u8| match id {
                binary::DATA_COUNT_SECTION_ID => 10,
                binary::CODE_SECTION_ID => 11,
                binary::DATA_SECTION_ID => 12,
                other => other,
            };
            if last_section_id.map_or(false, |last| rank(id) <= rank(last)) {
                return Err(self.err(
                    codes::MALFORMED_SECTION,
                    node,
                    "unexpected section ordering",
                ));
            }
            *last_section_id = Some(id);
        }

        let size = self.reader().read_u32()? as usize;
        if size > self.reader().remaining() {
            return Err(self.err(
                codes::MALFORMED_SECTION,
                node,
                "section size exceeds remaining input",
            ));
        }
        let body_start = self.reader().position();

        match id {
            binary::CUSTOM_SECTION_ID => self.load_custom_section(module, body_start, size)?,
            binary::TYPE_SECTION_ID => self.load_type_section(module)?,
            binary::IMPORT_SECTION_ID => self.load_import_section(module)?,
            binary::FUNCTION_SECTION_ID => self.load_function_section(module)?,
            binary::TABLE_SECTION_ID => self.load_table_section(module)?,
            binary::MEMORY_SECTION_ID => self.load_memory_section(module)?,
            binary::GLOBAL_SECTION_ID => self.load_global_section(module)?,
            binary::EXPORT_SECTION_ID => self.load_export_section(module)?,
            binary::START_SECTION_ID => {
                module.start = Some(self.reader().read_u32()?);
            }
            binary::ELEMENT_SECTION_ID => self.load_element_section(module)?,
            binary::CODE_SECTION_ID => self.load_code_section(module)?,
            binary::DATA_SECTION_ID => self.load_data_section(module)?,
            binary::DATA_COUNT_SECTION_ID => {
                if !self.config().has_proposal(Proposal::BulkMemoryOperations) {
                    return Err(self.need_proposal(
                        codes::MALFORMED_SECTION,
                        Proposal::BulkMemoryOperations,
                        node,
                        "data count section",
                    ));
                }
                module.data_count = Some(self.reader().read_u32()?);
            }
            _ => unreachable!("section id bounded above"),
        }

        if self.reader().position() != body_start + size {
            return Err(self.err(
                codes::MALFORMED_SECTION,
                node,
                "section size mismatch",
            ));
        }
        Ok(())
    }

    fn load_custom_section(
        &mut self,
        module: &mut Module,
        body_start: usize,
        size: usize,
    ) -> Result<()> {
        let name = self.read_name_in(AstNodeAttr::Section)?;
        let consumed = self.reader().position() - body_start;
        let payload_len = size.checked_sub(consumed).ok_or_else(|| {
            self.err(
                codes::MALFORMED_SECTION,
                AstNodeAttr::Section,
                "custom section name exceeds section size",
            )
        })?;
        let data = self.reader().read_bytes(payload_len)?.to_vec();
        module.customs.push(CustomSection { name, data });
        Ok(())
    }

    fn load_type_section(&mut self, module: &mut Module) -> Result<()> {
        let count = self.reader().read_u32()?;
        module.types.reserve(count.min(1024) as usize);
        for _ in 0..count {
            let defined = self.load_defined_type()?;
            module.types.push(defined);
        }
        Ok(())
    }

    fn load_import_section(&mut self, module: &mut Module) -> Result<()> {
        let node = AstNodeAttr::Section;
        let count = self.reader().read_u32()?;
        module.imports.reserve(count.min(1024) as usize);
        for _ in 0..count {
            let module_name = self.read_name_in(node)?;
            let name = self.read_name_in(node)?;
            let kind = self.reader().read_byte()?;
            let desc = match kind {
                0x00 => ImportDesc::Func(self.reader().read_u32()?),
                0x01 => ImportDesc::Table(self.load_table_type()?),
                0x02 => ImportDesc::Memory(self.load_memory_type()?),
                0x03 => ImportDesc::Global(self.load_global_type()?),
                _ => {
                    return Err(self.err(
                        codes::MALFORMED_SECTION,
                        node,
                        "malformed import kind",
                    ));
                }
            };
            module.imports.push(Import {
                module: module_name,
                name,
                desc,
            });
        }
        Ok(())
    }

    fn load_function_section(&mut self, module: &mut Module) -> Result<()> {
        let count = self.reader().read_u32()?;
        module.funcs.reserve(count.min(1024) as usize);
        for _ in 0..count {
            module.funcs.push(self.reader().read_u32()?);
        }
        Ok(())
    }

    fn load_table_section(&mut self, module: &mut Module) -> Result<()> {
        let count = self.reader().read_u32()?;
        module.tables.reserve(count.min(1024) as usize);
        for _ in 0..count {
            let table = self.load_table_type()?;
            module.tables.push(table);
        }
        Ok(())
    }

    fn load_memory_section(&mut self, module: &mut Module) -> Result<()> {
        let count = self.reader().read_u32()?;
        module.memories.reserve(count.min(1024) as usize);
        for _ in 0..count {
            let memory = self.load_memory_type()?;
            module.memories.push(memory);
        }
        Ok(())
    }

    fn load_global_section(&mut self, module: &mut Module) -> Result<()> {
        let count = self.reader().read_u32()?;
        module.globals.reserve(count.min(1024) as usize);
        for _ in 0..count {
            let global_type = self.load_global_type()?;
            let init = self.load_expr()?;
            module.globals.push(Global { global_type, init });
        }
        Ok(())
    }

    fn load_export_section(&mut self, module: &mut Module) -> Result<()> {
        let node = AstNodeAttr::Section;
        let count = self.reader().read_u32()?;
        module.exports.reserve(count.min(1024) as usize);
        for _ in 0..count {
            let name = self.read_name_in(node)?;
            let kind_byte = self.reader().read_byte()?;
            let kind = ExportKind::from_byte(kind_byte).ok_or_else(|| {
                self.err(codes::MALFORMED_SECTION, node, "malformed export kind")
            })?;
            let index = self.reader().read_u32()?;
            module.exports.push(Export { name, kind, index });
        }
        Ok(())
    }

    fn load_element_section(&mut self, module: &mut Module) -> Result<()> {
        let node = AstNodeAttr::Segment;
        let count = self.reader().read_u32()?;
        module.elements.reserve(count.min(1024) as usize);
        for _ in 0..count {
            let flags = self.reader().read_u32()?;
            if flags > 7 {
                return Err(self.err(
                    codes::MALFORMED_SECTION,
                    node,
                    "malformed element segment kind",
                ));
            }
            if flags != 0
                && !self.config().has_proposal(Proposal::BulkMemoryOperations)
                && !self.config().has_proposal(Proposal::ReferenceTypes)
            {
                return Err(self.need_proposal(
                    codes::MALFORMED_SECTION,
                    Proposal::BulkMemoryOperations,
                    node,
                    "element segment encoding",
                ));
            }

            let mode = match flags {
                0 | 4 => ElementMode::Active {
                    table_idx: 0,
                    offset: self.load_expr()?,
                },
                2 | 6 => {
                    let table_idx = self.reader().read_u32()?;
                    ElementMode::Active {
                        table_idx,
                        offset: self.load_expr()?,
                    }
                }
                1 | 5 => ElementMode::Passive,
                // flags 3 and 7, by the range check above
                _ => ElementMode::Declarative,
            };

            // Compact encodings carry an element-kind byte and function
            // indices; the general ones a reference type and constant
            // expressions.
            let (ref_type, init) = if flags & 0x04 == 0 {
                if flags != 0 {
                    let elem_kind = self.reader().read_byte()?;
                    if elem_kind != 0x00 {
                        return Err(self.err(
                            codes::MALFORMED_SECTION,
                            node,
                            "malformed element kind",
                        ));
                    }
                }
                let func_count = self.reader().read_u32()?;
                let mut indices = Vec::with_capacity(func_count.min(1024) as usize);
                for _ in 0..func_count {
                    indices.push(self.reader().read_u32()?);
                }
                (FullRefType::FUNCREF, ElementInit::FuncIndices(indices))
            } else {
                let ref_type = if flags != 4 {
                    self.load_ref_type(node)?
                } else {
                    FullRefType::FUNCREF
                };
                let expr_count = self.reader().read_u32()?;
                let mut exprs = Vec::with_capacity(expr_count.min(1024) as usize);
                for _ in 0..expr_count {
                    exprs.push(self.load_expr()?);
                }
                (ref_type, ElementInit::Exprs(exprs))
            };

            module.elements.push(Element {
                mode,
                ref_type,
                init,
            });
        }
        Ok(())
    }

    fn load_code_section(&mut self, module: &mut Module) -> Result<()> {
        let node = AstNodeAttr::Expression;
        let count = self.reader().read_u32()?;
        module.code.reserve(count.min(1024) as usize);
        for _ in 0..count {
            let body_size = self.reader().read_u32()? as usize;
            let body_start = self.reader().position();

            let local_runs = self.reader().read_u32()?;
            let mut locals = Vec::with_capacity(local_runs.min(1024) as usize);
            for _ in 0..local_runs {
                let run = self.reader().read_u32()?;
                let val_type = self.load_val_type(node)?;
                locals.push((run, val_type));
            }
            let body = self.load_expr()?;

            if self.reader().position() != body_start + body_size {
                return Err(self.err(
                    codes::MALFORMED_SECTION,
                    node,
                    "code entry size mismatch",
                ));
            }
            module.code.push(CodeEntry { locals, body });
        }
        Ok(())
    }

    fn load_data_section(&mut self, module: &mut Module) -> Result<()> {
        let node = AstNodeAttr::Segment;
        let count = self.reader().read_u32()?;
        module.datas.reserve(count.min(1024) as usize);
        for _ in 0..count {
            let flags = self.reader().read_u32()?;
            let mode = match flags {
                0 => DataMode::Active {
                    memory_idx: 0,
                    offset: self.load_expr()?,
                },
                1 => {
                    if !self.config().has_proposal(Proposal::BulkMemoryOperations) {
                        return Err(self.need_proposal(
                            codes::MALFORMED_SECTION,
                            Proposal::BulkMemoryOperations,
                            node,
                            "passive data segment",
                        ));
                    }
                    DataMode::Passive
                }
                2 => {
                    let memory_idx = self.reader().read_u32()?;
                    DataMode::Active {
                        memory_idx,
                        offset: self.load_expr()?,
                    }
                }
                _ => {
                    return Err(self.err(
                        codes::MALFORMED_SECTION,
                        node,
                        "malformed data segment kind",
                    ));
                }
            };
            let len = self.reader().read_u32()? as usize;
            let init = self.reader().read_bytes(len)?.to_vec();
            module.datas.push(Data { mode, init });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wec_foundation::FullValType;

    #[test]
    fn empty_module() {
        let config = Config::default();
        let bytes = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        let module = load_module(&bytes, &config).unwrap();
        assert!(module.types.is_empty());
        assert!(module.funcs.is_empty());
    }

    #[test]
    fn bad_magic_and_version() {
        let config = Config::default();
        let err = load_module(&[0x00, 0x61, 0x73, 0x00, 0x01, 0x00, 0x00, 0x00], &config)
            .unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_MAGIC);

        let err = load_module(&[0x00, 0x61, 0x73, 0x6D, 0x02, 0x00, 0x00, 0x00], &config)
            .unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_VERSION);
    }

    #[test]
    fn truncated_header() {
        let config = Config::default();
        let err = load_module(&[0x00, 0x61], &config).unwrap_err();
        assert_eq!(err.code, codes::UNEXPECTED_END);
    }

    #[test]
    fn section_size_mismatch() {
        let config = Config::default();
        // type section claiming 3 bytes but containing a 4-byte entry
        let bytes = [
            0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
            0x01, 0x03, 0x01, 0x60, 0x00, 0x00, // type section, bad size
        ];
        let err = load_module(&bytes, &config).unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_SECTION);
    }

    #[test]
    fn section_ordering_is_enforced() {
        let config = Config::default();
        // function section before type section
        let bytes = [
            0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
            0x03, 0x02, 0x01, 0x00, // function section
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section
        ];
        let err = load_module(&bytes, &config).unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_SECTION);
        assert!(err.message.contains("ordering"));
    }

    #[test]
    fn decodes_wat_produced_module() {
        let config = Config::default();
        let bytes = wat::parse_str(
            r#"(module
                 (type (func (param i32 i32) (result i32)))
                 (func (type 0) local.get 0 local.get 1 i32.add)
                 (export "add" (func 0)))"#,
        )
        .unwrap();
        let module = load_module(&bytes, &config).unwrap();
        assert_eq!(module.types.len(), 1);
        assert_eq!(module.funcs, [0]);
        assert_eq!(module.exports.len(), 1);
        assert_eq!(module.exports[0].name, "add");
        let sub_types = module.types[0].sub_types();
        let func = sub_types[0].composite.as_func().unwrap();
        assert_eq!(func.params, [FullValType::I32, FullValType::I32]);
        assert_eq!(func.results, [FullValType::I32]);
    }

    #[test]
    fn function_and_code_counts_must_agree() {
        let config = Config::default();
        let bytes = [
            0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00, // header
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section
            0x03, 0x02, 0x01, 0x00, // function section: one entry
        ];
        let err = load_module(&bytes, &config).unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_SECTION);
        assert!(err.message.contains("lengths disagree"));
    }
}
