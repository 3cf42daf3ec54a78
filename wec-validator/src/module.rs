//! Whole-module validation.

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::String;

use wec_error::{codes, kinds, Result};
use wec_format::instructions::{Expr, Op};
use wec_format::module::{
    DataMode, Element, ElementInit, ElementMode, ExportKind, ImportDesc, Module,
};
use wec_foundation::types::is_ref_sub_type;
use wec_foundation::{
    CompositeType, Config, FullRefType, FullValType, HeapType, Limits, MemoryType, Proposal,
    StorageType, SubType, TableType, ValMut,
};

use crate::checker::FormChecker;

/// The highest number of memory pages addressable with 32-bit offsets.
const MAX_MEMORY_PAGES: u32 = 65536;

/// Upper bound on locals per function.
const MAX_FUNCTION_LOCALS: u32 = 50_000;

/// Validates a decoded module: index references, section constraints,
/// constant expressions, and every function body.
#[derive(Debug)]
pub struct Validator<'cfg> {
    config: &'cfg Config,
    checker: FormChecker,
}

impl<'cfg> Validator<'cfg> {
    /// A validator using the given configuration.
    pub fn new(config: &'cfg Config) -> Self {
        Self {
            config,
            checker: FormChecker::new(),
        }
    }

    /// Validate `module` in full. On success the module satisfies the
    /// stack type discipline and every index reference is in range.
    pub fn validate(&mut self, module: &Module) -> Result<()> {
        self.checker.reset(true);
        self.checker
            .allow_extended_const(self.config.has_proposal(Proposal::ExtendedConst));

        self.register_types(module)?;
        self.register_imports(module)?;
        self.register_functions(module)?;
        self.register_tables(module)?;
        self.register_memories(module)?;
        self.register_globals(module)?;
        self.register_elements(module)?;
        self.register_datas(module)?;
        self.register_exports(module)?;
        self.check_start(module)?;
        self.check_code(module)
    }

    fn register_types(&mut self, module: &Module) -> Result<()> {
        let total = module.type_index_count() as u32;
        for defined in &module.types {
            for sub_type in defined.sub_types() {
                self.check_sub_type(&sub_type, total)?;
                self.checker.add_type(sub_type);
            }
        }
        // Parent kinds can only be checked once the whole section is
        // registered: recursion groups may reference later members.
        for idx in 0..self.checker.types.len() {
            let parents = self.checker.types[idx].parents.clone();
            for parent in parents {
                let child_kind = composite_kind(&self.checker.types[idx].composite);
                let parent_kind = composite_kind(&self.checker.types[parent as usize].composite);
                if child_kind != parent_kind {
                    return Err(kinds::type_check_failed(format!(
                        "sub type {idx} does not match the kind of its parent {parent}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_sub_type(&self, sub_type: &SubType, total: u32) -> Result<()> {
        for parent in &sub_type.parents {
            self.check_type_idx(*parent, total)?;
        }
        match &sub_type.composite {
            CompositeType::Func(ft) => {
                for t in ft.params.iter().chain(&ft.results) {
                    self.check_val_type_idx(*t, total)?;
                }
            }
            CompositeType::Struct(st) => {
                for field in &st.fields {
                    self.check_storage_type_idx(field.storage, total)?;
                }
            }
            CompositeType::Array(at) => {
                self.check_storage_type_idx(at.field.storage, total)?;
            }
        }
        Ok(())
    }

    fn check_type_idx(&self, idx: u32, total: u32) -> Result<()> {
        if idx >= total {
            return Err(kinds::validation_error(
                codes::INVALID_TYPE_IDX,
                format!("type index {idx} out of range"),
            ));
        }
        Ok(())
    }

    fn check_val_type_idx(&self, val_type: FullValType, total: u32) -> Result<()> {
        if let FullValType::Ref(FullRefType {
            heap: HeapType::Defined(idx),
            ..
        }) = val_type
        {
            self.check_type_idx(idx, total)?;
        }
        Ok(())
    }

    fn check_storage_type_idx(&self, storage: StorageType, total: u32) -> Result<()> {
        match storage {
            StorageType::I8 | StorageType::I16 => Ok(()),
            StorageType::Val(t) => self.check_val_type_idx(t, total),
        }
    }

    fn register_imports(&mut self, module: &Module) -> Result<()> {
        let total_types = self.checker.types.len() as u32;
        for import in &module.imports {
            match import.desc {
                ImportDesc::Func(type_idx) => {
                    self.check_func_type_idx(type_idx, total_types)?;
                    self.checker.add_func(type_idx, true);
                }
                ImportDesc::Table(table) => {
                    self.check_table_type(&table)?;
                    self.checker.add_table(&table);
                }
                ImportDesc::Memory(memory) => {
                    self.check_memory_type(&memory)?;
                    self.checker.add_memory(&memory);
                }
                ImportDesc::Global(global) => {
                    if global.mutability == ValMut::Var
                        && !self.config.has_proposal(Proposal::ImportExportMutGlobals)
                    {
                        return Err(kinds::validation_error(
                            codes::IMMUTABLE_GLOBAL,
                            "importing a mutable global requires the mutable-globals proposal",
                        ));
                    }
                    self.check_val_type_idx(global.val_type, self.checker.types.len() as u32)?;
                    self.checker.add_global(global, true);
                }
            }
        }
        Ok(())
    }

    fn check_func_type_idx(&self, type_idx: u32, total: u32) -> Result<()> {
        self.check_type_idx(type_idx, total)?;
        if self.checker.types[type_idx as usize].composite.as_func().is_none() {
            return Err(kinds::validation_error(
                codes::INVALID_TYPE_IDX,
                format!("type index {type_idx} does not name a function type"),
            ));
        }
        Ok(())
    }

    fn register_functions(&mut self, module: &Module) -> Result<()> {
        let total_types = self.checker.types.len() as u32;
        for type_idx in &module.funcs {
            self.check_func_type_idx(*type_idx, total_types)?;
            self.checker.add_func(*type_idx, false);
        }
        Ok(())
    }

    fn check_limits(&self, limits: &Limits) -> Result<()> {
        if !limits.is_well_formed() {
            return Err(kinds::validation_error(
                codes::INVALID_LIMIT,
                "size minimum must not be greater than maximum",
            ));
        }
        Ok(())
    }

    fn check_table_type(&self, table: &TableType) -> Result<()> {
        self.check_limits(&table.limits)?;
        if table.limits.shared {
            return Err(kinds::validation_error(
                codes::INVALID_LIMIT,
                "tables cannot be shared",
            ));
        }
        if let HeapType::Defined(idx) = table.ref_type.heap {
            self.check_type_idx(idx, self.checker.types.len() as u32)?;
        }
        Ok(())
    }

    fn check_memory_type(&self, memory: &MemoryType) -> Result<()> {
        self.check_limits(&memory.limits)?;
        let max = memory.limits.max.unwrap_or(memory.limits.min);
        if memory.limits.min > MAX_MEMORY_PAGES || max > MAX_MEMORY_PAGES {
            return Err(kinds::validation_error(
                codes::INVALID_LIMIT,
                format!("memory size must be at most {MAX_MEMORY_PAGES} pages"),
            ));
        }
        if memory.limits.shared && !self.config.has_proposal(Proposal::Threads) {
            return Err(kinds::validation_error(
                codes::INVALID_LIMIT,
                "shared memories require the threads proposal",
            ));
        }
        Ok(())
    }

    fn register_tables(&mut self, module: &Module) -> Result<()> {
        for table in &module.tables {
            self.check_table_type(table)?;
            self.checker.add_table(table);
        }
        if self.checker.tables.len() > 1 && !self.config.has_proposal(Proposal::ReferenceTypes) {
            return Err(kinds::validation_error(
                codes::INVALID_TABLE_IDX,
                "multiple tables require the reference-types proposal",
            ));
        }
        Ok(())
    }

    fn register_memories(&mut self, module: &Module) -> Result<()> {
        for memory in &module.memories {
            self.check_memory_type(memory)?;
            self.checker.add_memory(memory);
        }
        if self.checker.mems > 1 {
            return Err(kinds::validation_error(
                codes::INVALID_MEMORY_IDX,
                "at most one memory is supported",
            ));
        }
        Ok(())
    }

    fn register_globals(&mut self, module: &Module) -> Result<()> {
        for global in &module.globals {
            self.check_val_type_idx(
                global.global_type.val_type,
                self.checker.types.len() as u32,
            )?;
            self.collect_refs(&global.init);
            self.checker
                .validate_const(&global.init, &[global.global_type.val_type])?;
            self.checker.add_global(global.global_type, false);
        }
        Ok(())
    }

    /// Record every function index a constant expression makes
    /// referenceable.
    fn collect_refs(&mut self, expr: &Expr) {
        for instr in expr {
            if let Op::RefFunc(idx) = instr.op {
                self.checker.add_ref(idx);
            }
        }
    }

    fn register_elements(&mut self, module: &Module) -> Result<()> {
        for element in &module.elements {
            self.check_element(element)?;
        }
        Ok(())
    }

    fn check_element(&mut self, element: &Element) -> Result<()> {
        if let HeapType::Defined(idx) = element.ref_type.heap {
            self.check_type_idx(idx, self.checker.types.len() as u32)?;
        }

        match &element.init {
            ElementInit::FuncIndices(indices) => {
                for func_idx in indices {
                    if *func_idx >= self.checker.num_funcs() {
                        return Err(kinds::validation_error(
                            codes::INVALID_FUNC_IDX,
                            format!("function index {func_idx} out of range"),
                        ));
                    }
                    self.checker.add_ref(*func_idx);
                }
            }
            ElementInit::Exprs(exprs) => {
                for expr in exprs {
                    self.collect_refs(expr);
                    self.checker
                        .validate_const(expr, &[FullValType::Ref(element.ref_type)])?;
                }
            }
        }

        if let ElementMode::Active { table_idx, offset } = &element.mode {
            let table = self
                .checker
                .tables
                .get(*table_idx as usize)
                .copied()
                .ok_or_else(|| {
                    kinds::validation_error(
                        codes::INVALID_TABLE_IDX,
                        format!("table index {table_idx} out of range"),
                    )
                })?;
            if !is_ref_sub_type(element.ref_type, table, &self.checker.types) {
                return Err(kinds::type_check_failed(
                    "element type does not match the table",
                ));
            }
            self.checker.validate_const(offset, &[FullValType::I32])?;
        }

        self.checker.add_elem(element.ref_type);
        Ok(())
    }

    fn register_datas(&mut self, module: &Module) -> Result<()> {
        if module.data_count.is_some() {
            self.checker.set_data_count_present();
        }
        for data in &module.datas {
            if let DataMode::Active { memory_idx, offset } = &data.mode {
                if *memory_idx >= self.checker.mems {
                    return Err(kinds::validation_error(
                        codes::INVALID_MEMORY_IDX,
                        format!("memory index {memory_idx} out of range"),
                    ));
                }
                self.checker.validate_const(offset, &[FullValType::I32])?;
            }
            self.checker.add_data();
        }
        Ok(())
    }

    fn register_exports(&mut self, module: &Module) -> Result<()> {
        let mut seen: BTreeSet<&String> = BTreeSet::new();
        for export in &module.exports {
            if !seen.insert(&export.name) {
                return Err(kinds::validation_error(
                    codes::DUPLICATE_EXPORT_NAME,
                    format!("duplicate export name: {}", export.name),
                ));
            }
            match export.kind {
                ExportKind::Func => {
                    if export.index >= self.checker.num_funcs() {
                        return Err(kinds::validation_error(
                            codes::INVALID_FUNC_IDX,
                            format!("exported function {} out of range", export.index),
                        ));
                    }
                    self.checker.add_ref(export.index);
                }
                ExportKind::Table => {
                    if export.index as usize >= self.checker.tables.len() {
                        return Err(kinds::validation_error(
                            codes::INVALID_TABLE_IDX,
                            format!("exported table {} out of range", export.index),
                        ));
                    }
                }
                ExportKind::Memory => {
                    if export.index >= self.checker.mems {
                        return Err(kinds::validation_error(
                            codes::INVALID_MEMORY_IDX,
                            format!("exported memory {} out of range", export.index),
                        ));
                    }
                }
                ExportKind::Global => {
                    let (_, mutability) =
                        self.checker.globals.get(export.index as usize).copied().ok_or_else(
                            || {
                                kinds::validation_error(
                                    codes::INVALID_GLOBAL_IDX,
                                    format!("exported global {} out of range", export.index),
                                )
                            },
                        )?;
                    if mutability == ValMut::Var
                        && !self.config.has_proposal(Proposal::ImportExportMutGlobals)
                    {
                        return Err(kinds::validation_error(
                            codes::IMMUTABLE_GLOBAL,
                            "exporting a mutable global requires the mutable-globals proposal",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_start(&mut self, module: &Module) -> Result<()> {
        let Some(func_idx) = module.start else {
            return Ok(());
        };
        let type_idx = self
            .checker
            .funcs
            .get(func_idx as usize)
            .copied()
            .ok_or_else(|| {
                kinds::validation_error(
                    codes::INVALID_FUNC_IDX,
                    format!("start function {func_idx} out of range"),
                )
            })?;
        let ft = self.checker.types[type_idx as usize]
            .composite
            .as_func()
            .ok_or_else(|| {
                kinds::validation_error(codes::INVALID_TYPE_IDX, "start function type invalid")
            })?;
        if !ft.params.is_empty() || !ft.results.is_empty() {
            return Err(kinds::validation_error(
                codes::INVALID_START_FUNC,
                "start function must take no parameters and return nothing",
            ));
        }
        Ok(())
    }

    fn check_code(&mut self, module: &Module) -> Result<()> {
        for (idx, entry) in module.code.iter().enumerate() {
            let func_idx = self.checker.num_import_funcs as usize + idx;
            let type_idx = self.checker.funcs[func_idx];
            let ft = self.checker.types[type_idx as usize]
                .composite
                .as_func()
                .cloned()
                .ok_or_else(|| {
                    kinds::validation_error(
                        codes::INVALID_TYPE_IDX,
                        format!("type index {type_idx} does not name a function type"),
                    )
                })?;

            self.checker.reset(false);
            for param in &ft.params {
                self.checker.add_local(*param, true);
            }
            let mut total: u32 = ft.params.len() as u32;
            for (count, val_type) in &entry.locals {
                total = total.checked_add(*count).unwrap_or(u32::MAX);
                if total > MAX_FUNCTION_LOCALS {
                    return Err(kinds::validation_error(
                        codes::INVALID_LOCAL_IDX,
                        "too many locals",
                    ));
                }
                self.check_val_type_idx(*val_type, self.checker.types.len() as u32)?;
                for _ in 0..*count {
                    self.checker.add_local(*val_type, false);
                }
            }

            self.checker.validate(&entry.body, &ft.results)?;
        }
        Ok(())
    }
}

fn composite_kind(composite: &CompositeType) -> u8 {
    match composite {
        CompositeType::Func(_) => 0,
        CompositeType::Struct(_) => 1,
        CompositeType::Array(_) => 2,
    }
}
