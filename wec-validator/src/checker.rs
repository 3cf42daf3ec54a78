//! The stack-based form checker.

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::vec::Vec;

use wec_error::{codes, kinds, Error, Result};
use wec_format::instructions::{BlockType, Instruction, MemArg, Op};
use wec_foundation::types::{is_ref_sub_type, is_val_sub_type};
use wec_foundation::{
    FullRefType, FullValType, FunctionType, GlobalType, HeapType, MemoryType, SubType, TableType,
    ValMut,
};

const I32: FullValType = FullValType::I32;
const I64: FullValType = FullValType::I64;
const F32: FullValType = FullValType::F32;
const F64: FullValType = FullValType::F64;

/// One slot of the abstract value stack.
///
/// `Bottom` is the polymorphic element pushed after unreachable code:
/// it satisfies any type demand without committing to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSlot {
    /// The polymorphic bottom element
    Bottom,
    /// A concrete value type
    Known(FullValType),
}

impl StackSlot {
    fn satisfies(self, expected: FullValType, types: &[SubType]) -> bool {
        match self {
            Self::Bottom => true,
            Self::Known(actual) => is_val_sub_type(actual, expected, types),
        }
    }

    fn is_ref(self) -> bool {
        match self {
            Self::Bottom => true,
            Self::Known(t) => t.is_ref_type(),
        }
    }
}

/// The opcode family that opened a control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The implicit frame around a whole expression
    Expr,
    /// A `block` frame
    Block,
    /// A `loop` frame
    Loop,
    /// An `if` frame before its `else`
    If,
    /// An `if` frame after its `else`
    Else,
}

/// One frame of the control stack.
#[derive(Debug, Clone)]
pub struct CtrlFrame {
    /// Types the frame's body starts with
    pub start_types: Vec<FullValType>,
    /// Types the frame must end with
    pub end_types: Vec<FullValType>,
    /// Byte offset of the instruction that opened the frame
    pub jump: Option<u64>,
    /// Value-stack height at frame entry
    pub height: usize,
    /// Whether the rest of the frame is unreachable
    pub is_unreachable: bool,
    /// The opcode family that opened the frame
    pub kind: FrameKind,
}

impl CtrlFrame {
    /// The types a branch to this frame expects on the stack: a loop
    /// re-enters with its parameters, every other frame exits with its
    /// results.
    pub fn label_types(&self) -> &[FullValType] {
        match self.kind {
            FrameKind::Loop => &self.start_types,
            _ => &self.end_types,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LocalEntry {
    val_type: FullValType,
    is_set: bool,
}

/// Validates instruction sequences against the stack type discipline.
///
/// The module context is populated through the `add_*` operations
/// before any body is checked; per-function state (locals, returns,
/// both stacks) is cleared by [`reset`](Self::reset) between bodies.
#[derive(Debug, Default)]
pub struct FormChecker {
    // Module context
    pub(crate) types: Vec<SubType>,
    pub(crate) funcs: Vec<u32>,
    pub(crate) tables: Vec<FullRefType>,
    pub(crate) mems: u32,
    pub(crate) globals: Vec<(FullValType, ValMut)>,
    pub(crate) elems: Vec<FullRefType>,
    pub(crate) datas: u32,
    pub(crate) has_data_count: bool,
    pub(crate) refs: BTreeSet<u32>,
    pub(crate) num_import_funcs: u32,
    pub(crate) num_import_globals: u32,
    extended_const: bool,

    // Per-function context
    locals: Vec<LocalEntry>,
    returns: Vec<FullValType>,

    // Running state
    val_stack: Vec<StackSlot>,
    ctrl_stack: Vec<CtrlFrame>,
    const_mode: bool,
}

impl FormChecker {
    /// A checker with an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the per-function state; with `clean_global` also the
    /// module context.
    pub fn reset(&mut self, clean_global: bool) {
        self.locals.clear();
        self.returns.clear();
        self.val_stack.clear();
        self.ctrl_stack.clear();
        self.const_mode = false;
        if clean_global {
            self.types.clear();
            self.funcs.clear();
            self.tables.clear();
            self.mems = 0;
            self.globals.clear();
            self.elems.clear();
            self.datas = 0;
            self.has_data_count = false;
            self.refs.clear();
            self.num_import_funcs = 0;
            self.num_import_globals = 0;
            self.extended_const = false;
        }
    }

    // Context adders

    /// Register one defined type (a flattened recursion-group member).
    pub fn add_type(&mut self, sub_type: SubType) {
        self.types.push(sub_type);
    }

    /// Register a function by type index.
    pub fn add_func(&mut self, type_idx: u32, is_import: bool) {
        self.funcs.push(type_idx);
        if is_import {
            self.num_import_funcs += 1;
        }
    }

    /// Register a table.
    pub fn add_table(&mut self, table: &TableType) {
        self.tables.push(table.ref_type);
    }

    /// Register a memory.
    pub fn add_memory(&mut self, _memory: &MemoryType) {
        self.mems += 1;
    }

    /// Register a global.
    pub fn add_global(&mut self, global: GlobalType, is_import: bool) {
        self.globals.push((global.val_type, global.mutability));
        if is_import {
            self.num_import_globals += 1;
        }
    }

    /// Register an element segment by its element type.
    pub fn add_elem(&mut self, ref_type: FullRefType) {
        self.elems.push(ref_type);
    }

    /// Register a data segment.
    pub fn add_data(&mut self) {
        self.datas += 1;
    }

    /// Record that the module declared a data count.
    pub fn set_data_count_present(&mut self) {
        self.has_data_count = true;
    }

    /// Admit extended-const arithmetic in constant expressions.
    pub fn allow_extended_const(&mut self, enabled: bool) {
        self.extended_const = enabled;
    }

    /// Mark a function index as referenceable by `ref.func`.
    pub fn add_ref(&mut self, func_idx: u32) {
        self.refs.insert(func_idx);
    }

    /// Append a local. Parameters are always initialized; other locals
    /// start initialized only if their type has a default value.
    pub fn add_local(&mut self, val_type: FullValType, is_param: bool) {
        self.locals.push(LocalEntry {
            val_type,
            is_set: is_param || val_type.is_defaultable(),
        });
    }

    /// The number of functions in the context.
    pub fn num_funcs(&self) -> u32 {
        self.funcs.len() as u32
    }

    /// The number of globals in the context.
    pub fn num_globals(&self) -> u32 {
        self.globals.len() as u32
    }

    /// A snapshot of the value stack, for result inspection in tests
    /// and diagnostics.
    pub fn result(&self) -> &[StackSlot] {
        &self.val_stack
    }

    // Validation entry points

    /// Validate an instruction sequence that must leave `ret_vals` on
    /// the stack.
    ///
    /// Seeds the control stack with a single frame expecting
    /// `ret_vals`; the terminal `end` pops it. Afterwards the value
    /// stack matches `ret_vals` exactly, in order and length.
    pub fn validate(&mut self, instrs: &[Instruction], ret_vals: &[FullValType]) -> Result<()> {
        self.val_stack.clear();
        self.ctrl_stack.clear();
        self.returns = ret_vals.to_vec();
        self.ctrl_stack.push(CtrlFrame {
            start_types: Vec::new(),
            end_types: ret_vals.to_vec(),
            jump: None,
            height: 0,
            is_unreachable: false,
            kind: FrameKind::Expr,
        });

        for instr in instrs {
            if self.ctrl_stack.is_empty() {
                return Err(kinds::validation_error_at(
                    codes::TYPE_CHECK_FAILED,
                    instr.offset,
                    "instruction after the terminal end",
                ));
            }
            self.check_instr(instr)?;
        }
        if !self.ctrl_stack.is_empty() {
            return Err(kinds::type_check_failed("expression is missing its end"));
        }

        let matches = self.val_stack.len() == ret_vals.len()
            && self
                .val_stack
                .iter()
                .zip(ret_vals)
                .all(|(slot, expected)| slot.satisfies(*expected, &self.types));
        if !matches {
            return Err(kinds::type_check_failed(
                "final stack does not match the expected results",
            ));
        }
        Ok(())
    }

    /// Validate a constant expression: the restricted instruction
    /// subset shared by global initializers and segment offsets.
    pub fn validate_const(
        &mut self,
        instrs: &[Instruction],
        ret_vals: &[FullValType],
    ) -> Result<()> {
        self.const_mode = true;
        let result = self.validate(instrs, ret_vals);
        self.const_mode = false;
        result
    }

    // Stack primitives

    fn push_type(&mut self, slot: StackSlot) {
        self.val_stack.push(slot);
    }

    fn push_types(&mut self, types: &[FullValType]) {
        self.val_stack
            .extend(types.iter().map(|t| StackSlot::Known(*t)));
    }

    fn pop_any(&mut self) -> Result<StackSlot> {
        let frame = self
            .ctrl_stack
            .last()
            .ok_or_else(|| kinds::type_check_failed("value popped outside any frame"))?;
        if self.val_stack.len() == frame.height {
            if frame.is_unreachable {
                return Ok(StackSlot::Bottom);
            }
            return Err(kinds::type_check_failed("stack underflow"));
        }
        // The frame height is a lower bound for the stack while the
        // frame is live, so the pop cannot cross it.
        Ok(self.val_stack.pop().unwrap_or(StackSlot::Bottom))
    }

    fn pop_expect(&mut self, expected: FullValType) -> Result<StackSlot> {
        let slot = self.pop_any()?;
        if !slot.satisfies(expected, &self.types) {
            return Err(kinds::type_check_failed(format!(
                "type mismatch: expected {expected}"
            )));
        }
        Ok(slot)
    }

    fn pop_types(&mut self, types: &[FullValType]) -> Result<()> {
        for expected in types.iter().rev() {
            self.pop_expect(*expected)?;
        }
        Ok(())
    }

    fn stack_trans(&mut self, take: &[FullValType], put: &[FullValType]) -> Result<()> {
        self.pop_types(take)?;
        self.push_types(put);
        Ok(())
    }

    // Control primitives

    /// Open a frame at the current stack height and make its
    /// parameters visible inside. The caller pops the parameters off
    /// the enclosing frame first where the encoding demands them
    /// (`block`/`loop`/`if`); `else` re-opens its frame with the
    /// stack already rewound, so no pop belongs here.
    fn push_ctrl(
        &mut self,
        start_types: Vec<FullValType>,
        end_types: Vec<FullValType>,
        jump: Option<u64>,
        kind: FrameKind,
    ) {
        let height = self.val_stack.len();
        self.push_types(&start_types);
        self.ctrl_stack.push(CtrlFrame {
            start_types,
            end_types,
            jump,
            height,
            is_unreachable: false,
            kind,
        });
    }

    fn pop_ctrl(&mut self) -> Result<CtrlFrame> {
        let frame = self
            .ctrl_stack
            .last()
            .cloned()
            .ok_or_else(|| kinds::type_check_failed("end outside any frame"))?;
        self.pop_types(&frame.end_types)?;
        if self.val_stack.len() != frame.height {
            return Err(kinds::type_check_failed(
                "values remain on the stack at the end of the frame",
            ));
        }
        self.ctrl_stack.pop();
        Ok(frame)
    }

    fn frame_at(&self, depth: u32) -> Result<&CtrlFrame> {
        let len = self.ctrl_stack.len();
        (depth as usize)
            .checked_add(1)
            .and_then(|d| len.checked_sub(d))
            .and_then(|idx| self.ctrl_stack.get(idx))
            .ok_or_else(|| {
                kinds::validation_error(codes::INVALID_LABEL_IDX, "branch depth out of range")
            })
    }

    fn set_unreachable(&mut self) -> Result<()> {
        let frame = self
            .ctrl_stack
            .last_mut()
            .ok_or_else(|| kinds::type_check_failed("unreachable outside any frame"))?;
        self.val_stack.truncate(frame.height);
        frame.is_unreachable = true;
        Ok(())
    }

    // Context lookups

    fn func_type(&self, type_idx: u32) -> Result<&FunctionType> {
        self.types
            .get(type_idx as usize)
            .and_then(|st| st.composite.as_func())
            .ok_or_else(|| {
                kinds::validation_error(
                    codes::INVALID_TYPE_IDX,
                    format!("type index {type_idx} does not name a function type"),
                )
            })
    }

    fn block_signature(&self, block_type: BlockType) -> Result<(Vec<FullValType>, Vec<FullValType>)> {
        match block_type {
            BlockType::Empty => Ok((Vec::new(), Vec::new())),
            BlockType::Value(t) => Ok((Vec::new(), Vec::from([t]))),
            BlockType::FuncType(idx) => {
                let ft = self.func_type(idx)?;
                Ok((ft.params.clone(), ft.results.clone()))
            }
        }
    }

    fn table_type(&self, table_idx: u32) -> Result<FullRefType> {
        self.tables.get(table_idx as usize).copied().ok_or_else(|| {
            kinds::validation_error(
                codes::INVALID_TABLE_IDX,
                format!("table index {table_idx} out of range"),
            )
        })
    }

    fn check_memory(&self) -> Result<()> {
        if self.mems == 0 {
            return Err(kinds::validation_error(
                codes::INVALID_MEMORY_IDX,
                "no memory is defined",
            ));
        }
        Ok(())
    }

    fn check_elem_idx(&self, elem_idx: u32) -> Result<FullRefType> {
        self.elems.get(elem_idx as usize).copied().ok_or_else(|| {
            kinds::validation_error(
                codes::INVALID_ELEM_IDX,
                format!("element segment {elem_idx} out of range"),
            )
        })
    }

    fn check_data_idx(&self, data_idx: u32) -> Result<()> {
        if !self.has_data_count {
            return Err(kinds::validation_error(
                codes::DATA_COUNT_REQUIRED,
                "instruction requires a data count section",
            ));
        }
        if data_idx >= self.datas {
            return Err(kinds::validation_error(
                codes::INVALID_DATA_IDX,
                format!("data segment {data_idx} out of range"),
            ));
        }
        Ok(())
    }

    fn check_align(&self, memarg: MemArg, natural: u32) -> Result<()> {
        if memarg.align > natural {
            return Err(kinds::type_check_failed(
                "alignment must not be larger than natural",
            ));
        }
        Ok(())
    }

    fn check_const_op(&self, op: &Op) -> Result<()> {
        if !self.const_mode {
            return Ok(());
        }
        let extended = self.extended_const
            && matches!(
                op,
                Op::I32Add | Op::I32Sub | Op::I32Mul | Op::I64Add | Op::I64Sub | Op::I64Mul
            );
        let allowed = matches!(
            op,
            Op::I32Const(_)
                | Op::I64Const(_)
                | Op::F32Const(_)
                | Op::F64Const(_)
                | Op::RefNull(_)
                | Op::RefFunc(_)
                | Op::GlobalGet(_)
                | Op::End
        ) || extended;
        if !allowed {
            return Err(kinds::validation_error(
                codes::CONST_EXPR_REQUIRED,
                "instruction is not allowed in a constant expression",
            ));
        }
        Ok(())
    }

    // Instruction iteration

    fn check_instr(&mut self, instr: &Instruction) -> Result<()> {
        self.check_op(&instr.op, instr.offset)
            .map_err(|e: Error| e.with_offset(instr.offset))
    }

    #[allow(clippy::too_many_lines)]
    fn check_op(&mut self, op: &Op, offset: u64) -> Result<()> {
        self.check_const_op(op)?;
        match op {
            // Control
            Op::Unreachable => self.set_unreachable(),
            Op::Nop => Ok(()),
            Op::Block(bt) => {
                let (start, end) = self.block_signature(*bt)?;
                self.pop_types(&start)?;
                self.push_ctrl(start, end, Some(offset), FrameKind::Block);
                Ok(())
            }
            Op::Loop(bt) => {
                let (start, end) = self.block_signature(*bt)?;
                self.pop_types(&start)?;
                self.push_ctrl(start, end, Some(offset), FrameKind::Loop);
                Ok(())
            }
            Op::If(bt) => {
                self.pop_expect(I32)?;
                let (start, end) = self.block_signature(*bt)?;
                self.pop_types(&start)?;
                self.push_ctrl(start, end, Some(offset), FrameKind::If);
                Ok(())
            }
            Op::Else => {
                let frame = self.pop_ctrl()?;
                if frame.kind != FrameKind::If {
                    return Err(kinds::type_check_failed("else without a matching if"));
                }
                // pop_ctrl rewound the stack to the frame's height, so
                // the parameters are re-established by pushing alone.
                self.push_ctrl(
                    frame.start_types,
                    frame.end_types,
                    frame.jump,
                    FrameKind::Else,
                );
                Ok(())
            }
            Op::End => {
                let frame = self.pop_ctrl()?;
                // An if without an else validates as if its else were
                // empty, which requires the arm types to be identity.
                if frame.kind == FrameKind::If && frame.start_types != frame.end_types {
                    return Err(kinds::type_check_failed(
                        "if without else must have matching parameter and result types",
                    ));
                }
                self.push_types(&frame.end_types);
                Ok(())
            }
            Op::Br(depth) => {
                let label = self.frame_at(*depth)?.label_types().to_vec();
                self.pop_types(&label)?;
                self.set_unreachable()
            }
            Op::BrIf(depth) => {
                self.pop_expect(I32)?;
                let label = self.frame_at(*depth)?.label_types().to_vec();
                self.pop_types(&label)?;
                self.push_types(&label);
                Ok(())
            }
            Op::BrTable { targets, default } => {
                self.pop_expect(I32)?;
                let default_label = self.frame_at(*default)?.label_types().to_vec();
                for target in targets {
                    let label = self.frame_at(*target)?.label_types().to_vec();
                    if label.len() != default_label.len() {
                        return Err(kinds::type_check_failed(
                            "br_table targets have inconsistent arities",
                        ));
                    }
                    // Every target must match the current stack; the
                    // probe pops are rolled back.
                    let snapshot = self.val_stack.clone();
                    self.pop_types(&label)?;
                    self.val_stack = snapshot;
                }
                self.pop_types(&default_label)?;
                self.set_unreachable()
            }
            Op::Return => {
                let returns = self.returns.clone();
                self.pop_types(&returns)?;
                self.set_unreachable()
            }
            Op::Call(func_idx) => {
                let type_idx = self.func_type_idx(*func_idx)?;
                let ft = self.func_type(type_idx)?;
                let (params, results) = (ft.params.clone(), ft.results.clone());
                self.stack_trans(&params, &results)
            }
            Op::CallIndirect {
                type_idx,
                table_idx,
            } => {
                let table = self.table_type(*table_idx)?;
                if !is_ref_sub_type(table, FullRefType::FUNCREF, &self.types) {
                    return Err(kinds::type_check_failed(
                        "call_indirect requires a funcref table",
                    ));
                }
                let ft = self.func_type(*type_idx)?;
                let (params, results) = (ft.params.clone(), ft.results.clone());
                self.pop_expect(I32)?;
                self.stack_trans(&params, &results)
            }
            Op::ReturnCall(func_idx) => {
                let type_idx = self.func_type_idx(*func_idx)?;
                let ft = self.func_type(type_idx)?;
                if ft.results != self.returns {
                    return Err(kinds::type_check_failed(
                        "tail callee results must match the caller's",
                    ));
                }
                let params = ft.params.clone();
                self.pop_types(&params)?;
                self.set_unreachable()
            }
            Op::ReturnCallIndirect {
                type_idx,
                table_idx,
            } => {
                let table = self.table_type(*table_idx)?;
                if !is_ref_sub_type(table, FullRefType::FUNCREF, &self.types) {
                    return Err(kinds::type_check_failed(
                        "return_call_indirect requires a funcref table",
                    ));
                }
                let ft = self.func_type(*type_idx)?;
                if ft.results != self.returns {
                    return Err(kinds::type_check_failed(
                        "tail callee results must match the caller's",
                    ));
                }
                let params = ft.params.clone();
                self.pop_expect(I32)?;
                self.pop_types(&params)?;
                self.set_unreachable()
            }

            // Reference
            Op::RefNull(heap) => {
                if let HeapType::Defined(idx) = heap {
                    if *idx as usize >= self.types.len() {
                        return Err(kinds::validation_error(
                            codes::INVALID_TYPE_IDX,
                            format!("type index {idx} out of range"),
                        ));
                    }
                }
                self.push_type(StackSlot::Known(FullValType::Ref(FullRefType::nullable(
                    *heap,
                ))));
                Ok(())
            }
            Op::RefIsNull => {
                let slot = self.pop_any()?;
                if !slot.is_ref() {
                    return Err(kinds::type_check_failed(
                        "ref.is_null expects a reference",
                    ));
                }
                self.push_types(&[I32]);
                Ok(())
            }
            Op::RefFunc(func_idx) => {
                if *func_idx >= self.num_funcs() {
                    return Err(kinds::validation_error(
                        codes::INVALID_FUNC_IDX,
                        format!("function index {func_idx} out of range"),
                    ));
                }
                if !self.const_mode && !self.refs.contains(func_idx) {
                    return Err(kinds::validation_error(
                        codes::INVALID_REF_IDX,
                        format!("function {func_idx} is not declared referenceable"),
                    ));
                }
                // ref.func never produces null.
                self.push_type(StackSlot::Known(FullValType::Ref(
                    FullRefType::non_nullable(HeapType::Func),
                )));
                Ok(())
            }

            // Parametric
            Op::Drop => self.pop_any().map(|_| ()),
            Op::Select => {
                self.pop_expect(I32)?;
                let first = self.pop_any()?;
                let second = self.pop_any()?;
                let known_ref =
                    |slot: StackSlot| matches!(slot, StackSlot::Known(t) if t.is_ref_type());
                if known_ref(first) || known_ref(second) {
                    return Err(kinds::type_check_failed(
                        "untyped select cannot pick reference types",
                    ));
                }
                let result = match (first, second) {
                    (StackSlot::Bottom, other) | (other, StackSlot::Bottom) => other,
                    (StackSlot::Known(a), StackSlot::Known(b)) => {
                        if a != b {
                            return Err(kinds::type_check_failed(
                                "select arms must have the same type",
                            ));
                        }
                        StackSlot::Known(a)
                    }
                };
                self.push_type(result);
                Ok(())
            }
            Op::SelectT(types) => {
                if types.len() != 1 {
                    return Err(kinds::type_check_failed(
                        "typed select takes exactly one type annotation",
                    ));
                }
                let t = types[0];
                self.pop_expect(I32)?;
                self.pop_expect(t)?;
                self.pop_expect(t)?;
                self.push_types(&[t]);
                Ok(())
            }

            // Variable
            Op::LocalGet(idx) => {
                let local = self.local(*idx)?;
                if !local.is_set {
                    return Err(kinds::type_check_failed(
                        "local read before initialization",
                    ));
                }
                let t = local.val_type;
                self.push_type(StackSlot::Known(t));
                Ok(())
            }
            Op::LocalSet(idx) => {
                let t = self.local(*idx)?.val_type;
                self.pop_expect(t)?;
                self.locals[*idx as usize].is_set = true;
                Ok(())
            }
            Op::LocalTee(idx) => {
                let t = self.local(*idx)?.val_type;
                self.pop_expect(t)?;
                self.locals[*idx as usize].is_set = true;
                self.push_type(StackSlot::Known(t));
                Ok(())
            }
            Op::GlobalGet(idx) => {
                let (t, mutability) = self.global(*idx)?;
                if self.const_mode {
                    // Initializers may only read prior imported
                    // immutable globals.
                    if *idx >= self.num_import_globals {
                        return Err(kinds::validation_error(
                            codes::INVALID_GLOBAL_IDX,
                            "initializers may only read imported globals",
                        ));
                    }
                    if mutability != ValMut::Const {
                        return Err(kinds::validation_error(
                            codes::CONST_EXPR_REQUIRED,
                            "initializers may only read immutable globals",
                        ));
                    }
                }
                self.push_type(StackSlot::Known(t));
                Ok(())
            }
            Op::GlobalSet(idx) => {
                let (t, mutability) = self.global(*idx)?;
                if mutability != ValMut::Var {
                    return Err(kinds::validation_error(
                        codes::IMMUTABLE_GLOBAL,
                        format!("global {idx} is immutable"),
                    ));
                }
                self.pop_expect(t)?;
                Ok(())
            }

            // Table
            Op::TableGet(table_idx) => {
                let rt = self.table_type(*table_idx)?;
                self.pop_expect(I32)?;
                self.push_type(StackSlot::Known(FullValType::Ref(rt)));
                Ok(())
            }
            Op::TableSet(table_idx) => {
                let rt = self.table_type(*table_idx)?;
                self.stack_trans(&[I32, FullValType::Ref(rt)], &[])
            }
            Op::TableInit {
                elem_idx,
                table_idx,
            } => {
                let table = self.table_type(*table_idx)?;
                let elem = self.check_elem_idx(*elem_idx)?;
                if !is_ref_sub_type(elem, table, &self.types) {
                    return Err(kinds::type_check_failed(
                        "element type does not match the table",
                    ));
                }
                self.stack_trans(&[I32, I32, I32], &[])
            }
            Op::ElemDrop(elem_idx) => self.check_elem_idx(*elem_idx).map(|_| ()),
            Op::TableCopy {
                dst_table,
                src_table,
            } => {
                let dst = self.table_type(*dst_table)?;
                let src = self.table_type(*src_table)?;
                if !is_ref_sub_type(src, dst, &self.types) {
                    return Err(kinds::type_check_failed(
                        "source table type does not match the destination",
                    ));
                }
                self.stack_trans(&[I32, I32, I32], &[])
            }
            Op::TableGrow(table_idx) => {
                let rt = self.table_type(*table_idx)?;
                self.stack_trans(&[FullValType::Ref(rt), I32], &[I32])
            }
            Op::TableSize(table_idx) => {
                self.table_type(*table_idx)?;
                self.push_types(&[I32]);
                Ok(())
            }
            Op::TableFill(table_idx) => {
                let rt = self.table_type(*table_idx)?;
                self.stack_trans(&[I32, FullValType::Ref(rt), I32], &[])
            }

            // Memory
            Op::I32Load(m) => self.mem_load(*m, I32, 2),
            Op::I64Load(m) => self.mem_load(*m, I64, 3),
            Op::F32Load(m) => self.mem_load(*m, F32, 2),
            Op::F64Load(m) => self.mem_load(*m, F64, 3),
            Op::I32Load8S(m) | Op::I32Load8U(m) => self.mem_load(*m, I32, 0),
            Op::I32Load16S(m) | Op::I32Load16U(m) => self.mem_load(*m, I32, 1),
            Op::I64Load8S(m) | Op::I64Load8U(m) => self.mem_load(*m, I64, 0),
            Op::I64Load16S(m) | Op::I64Load16U(m) => self.mem_load(*m, I64, 1),
            Op::I64Load32S(m) | Op::I64Load32U(m) => self.mem_load(*m, I64, 2),
            Op::I32Store(m) => self.mem_store(*m, I32, 2),
            Op::I64Store(m) => self.mem_store(*m, I64, 3),
            Op::F32Store(m) => self.mem_store(*m, F32, 2),
            Op::F64Store(m) => self.mem_store(*m, F64, 3),
            Op::I32Store8(m) => self.mem_store(*m, I32, 0),
            Op::I32Store16(m) => self.mem_store(*m, I32, 1),
            Op::I64Store8(m) => self.mem_store(*m, I64, 0),
            Op::I64Store16(m) => self.mem_store(*m, I64, 1),
            Op::I64Store32(m) => self.mem_store(*m, I64, 2),
            Op::MemorySize => {
                self.check_memory()?;
                self.push_types(&[I32]);
                Ok(())
            }
            Op::MemoryGrow => {
                self.check_memory()?;
                self.stack_trans(&[I32], &[I32])
            }
            Op::MemoryInit(data_idx) => {
                self.check_memory()?;
                self.check_data_idx(*data_idx)?;
                self.stack_trans(&[I32, I32, I32], &[])
            }
            Op::DataDrop(data_idx) => self.check_data_idx(*data_idx),
            Op::MemoryCopy | Op::MemoryFill => {
                self.check_memory()?;
                self.stack_trans(&[I32, I32, I32], &[])
            }

            // Numeric constants
            Op::I32Const(_) => self.stack_trans(&[], &[I32]),
            Op::I64Const(_) => self.stack_trans(&[], &[I64]),
            Op::F32Const(_) => self.stack_trans(&[], &[F32]),
            Op::F64Const(_) => self.stack_trans(&[], &[F64]),

            // Numeric tests and comparisons
            Op::I32Eqz => self.stack_trans(&[I32], &[I32]),
            Op::I64Eqz => self.stack_trans(&[I64], &[I32]),
            Op::I32Eq
            | Op::I32Ne
            | Op::I32LtS
            | Op::I32LtU
            | Op::I32GtS
            | Op::I32GtU
            | Op::I32LeS
            | Op::I32LeU
            | Op::I32GeS
            | Op::I32GeU => self.stack_trans(&[I32, I32], &[I32]),
            Op::I64Eq
            | Op::I64Ne
            | Op::I64LtS
            | Op::I64LtU
            | Op::I64GtS
            | Op::I64GtU
            | Op::I64LeS
            | Op::I64LeU
            | Op::I64GeS
            | Op::I64GeU => self.stack_trans(&[I64, I64], &[I32]),
            Op::F32Eq | Op::F32Ne | Op::F32Lt | Op::F32Gt | Op::F32Le | Op::F32Ge => {
                self.stack_trans(&[F32, F32], &[I32])
            }
            Op::F64Eq | Op::F64Ne | Op::F64Lt | Op::F64Gt | Op::F64Le | Op::F64Ge => {
                self.stack_trans(&[F64, F64], &[I32])
            }

            // Numeric arithmetic
            Op::I32Clz | Op::I32Ctz | Op::I32Popcnt => self.stack_trans(&[I32], &[I32]),
            Op::I32Add
            | Op::I32Sub
            | Op::I32Mul
            | Op::I32DivS
            | Op::I32DivU
            | Op::I32RemS
            | Op::I32RemU
            | Op::I32And
            | Op::I32Or
            | Op::I32Xor
            | Op::I32Shl
            | Op::I32ShrS
            | Op::I32ShrU
            | Op::I32Rotl
            | Op::I32Rotr => self.stack_trans(&[I32, I32], &[I32]),
            Op::I64Clz | Op::I64Ctz | Op::I64Popcnt => self.stack_trans(&[I64], &[I64]),
            Op::I64Add
            | Op::I64Sub
            | Op::I64Mul
            | Op::I64DivS
            | Op::I64DivU
            | Op::I64RemS
            | Op::I64RemU
            | Op::I64And
            | Op::I64Or
            | Op::I64Xor
            | Op::I64Shl
            | Op::I64ShrS
            | Op::I64ShrU
            | Op::I64Rotl
            | Op::I64Rotr => self.stack_trans(&[I64, I64], &[I64]),
            Op::F32Abs
            | Op::F32Neg
            | Op::F32Ceil
            | Op::F32Floor
            | Op::F32Trunc
            | Op::F32Nearest
            | Op::F32Sqrt => self.stack_trans(&[F32], &[F32]),
            Op::F32Add
            | Op::F32Sub
            | Op::F32Mul
            | Op::F32Div
            | Op::F32Min
            | Op::F32Max
            | Op::F32Copysign => self.stack_trans(&[F32, F32], &[F32]),
            Op::F64Abs
            | Op::F64Neg
            | Op::F64Ceil
            | Op::F64Floor
            | Op::F64Trunc
            | Op::F64Nearest
            | Op::F64Sqrt => self.stack_trans(&[F64], &[F64]),
            Op::F64Add
            | Op::F64Sub
            | Op::F64Mul
            | Op::F64Div
            | Op::F64Min
            | Op::F64Max
            | Op::F64Copysign => self.stack_trans(&[F64, F64], &[F64]),

            // Conversions
            Op::I32WrapI64 => self.stack_trans(&[I64], &[I32]),
            Op::I32TruncF32S | Op::I32TruncF32U | Op::I32ReinterpretF32 => {
                self.stack_trans(&[F32], &[I32])
            }
            Op::I32TruncF64S | Op::I32TruncF64U => self.stack_trans(&[F64], &[I32]),
            Op::I64ExtendI32S | Op::I64ExtendI32U => self.stack_trans(&[I32], &[I64]),
            Op::I64TruncF32S | Op::I64TruncF32U => self.stack_trans(&[F32], &[I64]),
            Op::I64TruncF64S | Op::I64TruncF64U | Op::I64ReinterpretF64 => {
                self.stack_trans(&[F64], &[I64])
            }
            Op::F32ConvertI32S | Op::F32ConvertI32U | Op::F32ReinterpretI32 => {
                self.stack_trans(&[I32], &[F32])
            }
            Op::F32ConvertI64S | Op::F32ConvertI64U => self.stack_trans(&[I64], &[F32]),
            Op::F32DemoteF64 => self.stack_trans(&[F64], &[F32]),
            Op::F64ConvertI32S | Op::F64ConvertI32U => self.stack_trans(&[I32], &[F64]),
            Op::F64ConvertI64S | Op::F64ConvertI64U | Op::F64ReinterpretI64 => {
                self.stack_trans(&[I64], &[F64])
            }
            Op::F64PromoteF32 => self.stack_trans(&[F32], &[F64]),

            // Sign extensions
            Op::I32Extend8S | Op::I32Extend16S => self.stack_trans(&[I32], &[I32]),
            Op::I64Extend8S | Op::I64Extend16S | Op::I64Extend32S => {
                self.stack_trans(&[I64], &[I64])
            }

            // Saturating truncations
            Op::I32TruncSatF32S | Op::I32TruncSatF32U => self.stack_trans(&[F32], &[I32]),
            Op::I32TruncSatF64S | Op::I32TruncSatF64U => self.stack_trans(&[F64], &[I32]),
            Op::I64TruncSatF32S | Op::I64TruncSatF32U => self.stack_trans(&[F32], &[I64]),
            Op::I64TruncSatF64S | Op::I64TruncSatF64U => self.stack_trans(&[F64], &[I64]),
        }
    }

    fn mem_load(&mut self, memarg: MemArg, result: FullValType, natural: u32) -> Result<()> {
        self.check_memory()?;
        self.check_align(memarg, natural)?;
        self.stack_trans(&[I32], &[result])
    }

    fn mem_store(&mut self, memarg: MemArg, value: FullValType, natural: u32) -> Result<()> {
        self.check_memory()?;
        self.check_align(memarg, natural)?;
        self.stack_trans(&[I32, value], &[])
    }

    fn local(&self, idx: u32) -> Result<LocalEntry> {
        self.locals.get(idx as usize).copied().ok_or_else(|| {
            kinds::validation_error(
                codes::INVALID_LOCAL_IDX,
                format!("local index {idx} out of range"),
            )
        })
    }

    fn global(&self, idx: u32) -> Result<(FullValType, ValMut)> {
        self.globals.get(idx as usize).copied().ok_or_else(|| {
            kinds::validation_error(
                codes::INVALID_GLOBAL_IDX,
                format!("global index {idx} out of range"),
            )
        })
    }

    fn func_type_idx(&self, func_idx: u32) -> Result<u32> {
        self.funcs.get(func_idx as usize).copied().ok_or_else(|| {
            kinds::validation_error(
                codes::INVALID_FUNC_IDX,
                format!("function index {func_idx} out of range"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use wec_foundation::CompositeType;

    fn instrs(ops: Vec<Op>) -> Vec<Instruction> {
        ops.into_iter()
            .enumerate()
            .map(|(i, op)| Instruction::new(op, i as u64))
            .collect()
    }

    #[test]
    fn empty_function_no_results() {
        let mut checker = FormChecker::new();
        checker.validate(&instrs(vec![Op::End]), &[]).unwrap();
        assert!(checker.result().is_empty());
    }

    #[test]
    fn identity_i32() {
        let mut checker = FormChecker::new();
        checker.add_local(I32, true);
        checker
            .validate(&instrs(vec![Op::LocalGet(0), Op::End]), &[I32])
            .unwrap();
        assert_eq!(checker.result(), [StackSlot::Known(I32)]);
    }

    #[test]
    fn stack_underflow_on_missing_result() {
        let mut checker = FormChecker::new();
        let err = checker.validate(&instrs(vec![Op::End]), &[I32]).unwrap_err();
        assert_eq!(err.code, codes::TYPE_CHECK_FAILED);
    }

    #[test]
    fn polymorphic_after_unreachable() {
        let mut checker = FormChecker::new();
        checker
            .validate(
                &instrs(vec![Op::Unreachable, Op::I32Const(0), Op::Drop, Op::End]),
                &[],
            )
            .unwrap();
    }

    #[test]
    fn loop_branch_uses_start_types() {
        // loop (param i32) (result i32): br 0 re-enters with an i32.
        let mut checker = FormChecker::new();
        checker.add_type(SubType::final_type(CompositeType::Func(FunctionType::new(
            vec![I32],
            vec![I32],
        ))));
        checker
            .validate(
                &instrs(vec![
                    Op::I32Const(1),
                    Op::Loop(BlockType::FuncType(0)),
                    Op::Br(0),
                    Op::End,
                    Op::End,
                ]),
                &[I32],
            )
            .unwrap();
    }

    #[test]
    fn immutable_global_set_is_rejected() {
        let mut checker = FormChecker::new();
        checker.add_global(
            GlobalType {
                val_type: I32,
                mutability: ValMut::Const,
            },
            false,
        );
        let err = checker
            .validate(
                &instrs(vec![Op::I32Const(5), Op::GlobalSet(0), Op::End]),
                &[],
            )
            .unwrap_err();
        assert_eq!(err.code, codes::IMMUTABLE_GLOBAL);
        assert_eq!(err.offset, Some(1));
    }

    #[test]
    fn unreachable_truncates_to_frame_height() {
        let mut checker = FormChecker::new();
        checker
            .validate(
                &instrs(vec![
                    Op::I32Const(1),
                    Op::Block(BlockType::Empty),
                    Op::Unreachable,
                    Op::End,
                    Op::Drop,
                    Op::End,
                ]),
                &[],
            )
            .unwrap();
    }

    #[test]
    fn bottom_never_leaks_below_frame_height() {
        // Inside the unreachable block, pops succeed with bottom but
        // the i32 pushed outside the block must survive untouched.
        let mut checker = FormChecker::new();
        checker
            .validate(
                &instrs(vec![
                    Op::I32Const(7),
                    Op::Block(BlockType::Empty),
                    Op::Unreachable,
                    Op::Drop,
                    Op::Drop,
                    Op::End,
                    Op::Drop,
                    Op::End,
                ]),
                &[],
            )
            .unwrap();
    }

    #[test]
    fn if_without_else_needs_identity_types() {
        let mut checker = FormChecker::new();
        let err = checker
            .validate(
                &instrs(vec![
                    Op::I32Const(1),
                    Op::If(BlockType::Value(I32)),
                    Op::I32Const(2),
                    Op::End,
                    Op::Drop,
                    Op::End,
                ]),
                &[],
            )
            .unwrap_err();
        assert_eq!(err.code, codes::TYPE_CHECK_FAILED);
    }

    #[test]
    fn if_else_produces_results() {
        let mut checker = FormChecker::new();
        checker
            .validate(
                &instrs(vec![
                    Op::I32Const(1),
                    Op::If(BlockType::Value(I32)),
                    Op::I32Const(2),
                    Op::Else,
                    Op::I32Const(3),
                    Op::End,
                    Op::End,
                ]),
                &[I32],
            )
            .unwrap();
    }

    #[test]
    fn if_else_with_parameters_reuses_the_stack() {
        // if (param i32) (result i32): the parameter is consumed when
        // the frame opens and must be visible again in both arms.
        let mut checker = FormChecker::new();
        checker.add_type(SubType::final_type(CompositeType::Func(FunctionType::new(
            vec![I32],
            vec![I32],
        ))));
        checker
            .validate(
                &instrs(vec![
                    Op::I32Const(2),
                    Op::I32Const(1),
                    Op::If(BlockType::FuncType(0)),
                    Op::I32Const(1),
                    Op::I32Add,
                    Op::Else,
                    Op::I32Const(10),
                    Op::I32Add,
                    Op::End,
                    Op::End,
                ]),
                &[I32],
            )
            .unwrap();
    }

    #[test]
    fn block_parameters_are_popped_from_the_enclosing_frame() {
        let mut checker = FormChecker::new();
        checker.add_type(SubType::final_type(CompositeType::Func(FunctionType::new(
            vec![I32],
            vec![I32],
        ))));
        // The parameter must already be on the stack when the block
        // opens.
        let err = checker
            .validate(
                &instrs(vec![
                    Op::Block(BlockType::FuncType(0)),
                    Op::End,
                    Op::Drop,
                    Op::End,
                ]),
                &[],
            )
            .unwrap_err();
        assert_eq!(err.code, codes::TYPE_CHECK_FAILED);
    }

    #[test]
    fn br_table_arity_must_agree() {
        let mut checker = FormChecker::new();
        let err = checker
            .validate(
                &instrs(vec![
                    Op::Block(BlockType::Value(I32)),
                    Op::I32Const(0),
                    Op::I32Const(0),
                    Op::BrTable {
                        targets: vec![1],
                        default: 0,
                    },
                    Op::End,
                    Op::Drop,
                    Op::End,
                ]),
                &[],
            )
            .unwrap_err();
        assert_eq!(err.code, codes::TYPE_CHECK_FAILED);
    }

    #[test]
    fn local_get_of_unset_non_defaultable_local() {
        let mut checker = FormChecker::new();
        let non_null = FullValType::Ref(FullRefType::non_nullable(HeapType::Func));
        checker.add_local(non_null, false);
        let err = checker
            .validate(&instrs(vec![Op::LocalGet(0), Op::Drop, Op::End]), &[])
            .unwrap_err();
        assert_eq!(err.code, codes::TYPE_CHECK_FAILED);

        // After a set, the same read is fine.
        let mut checker = FormChecker::new();
        checker.add_func(0, false);
        checker.add_type(SubType::final_type(CompositeType::Func(
            FunctionType::default(),
        )));
        checker.add_ref(0);
        checker.add_local(non_null, false);
        checker
            .validate(
                &instrs(vec![
                    Op::RefFunc(0),
                    Op::LocalSet(0),
                    Op::LocalGet(0),
                    Op::Drop,
                    Op::End,
                ]),
                &[],
            )
            .unwrap();
    }

    #[test]
    fn ref_func_requires_declaration() {
        let mut checker = FormChecker::new();
        checker.add_type(SubType::final_type(CompositeType::Func(
            FunctionType::default(),
        )));
        checker.add_func(0, false);
        let err = checker
            .validate(&instrs(vec![Op::RefFunc(0), Op::Drop, Op::End]), &[])
            .unwrap_err();
        assert_eq!(err.code, codes::INVALID_REF_IDX);
    }

    #[test]
    fn untyped_select_rejects_references() {
        let mut checker = FormChecker::new();
        let err = checker
            .validate(
                &instrs(vec![
                    Op::RefNull(HeapType::Func),
                    Op::RefNull(HeapType::Func),
                    Op::I32Const(1),
                    Op::Select,
                    Op::Drop,
                    Op::End,
                ]),
                &[],
            )
            .unwrap_err();
        assert_eq!(err.code, codes::TYPE_CHECK_FAILED);
    }

    #[test]
    fn branch_depth_out_of_range() {
        let mut checker = FormChecker::new();
        let err = checker
            .validate(&instrs(vec![Op::Br(3), Op::End]), &[])
            .unwrap_err();
        assert_eq!(err.code, codes::INVALID_LABEL_IDX);
    }

    #[test]
    fn const_mode_rejects_general_instructions() {
        let mut checker = FormChecker::new();
        let err = checker
            .validate_const(
                &instrs(vec![Op::I32Const(1), Op::I32Eqz, Op::End]),
                &[I32],
            )
            .unwrap_err();
        assert_eq!(err.code, codes::CONST_EXPR_REQUIRED);

        checker
            .validate_const(&instrs(vec![Op::I32Const(1), Op::End]), &[I32])
            .unwrap();
    }

    #[test]
    fn extended_const_arithmetic_is_gated() {
        let mut checker = FormChecker::new();
        let body = instrs(vec![Op::I32Const(1), Op::I32Const(2), Op::I32Add, Op::End]);
        let err = checker.validate_const(&body, &[I32]).unwrap_err();
        assert_eq!(err.code, codes::CONST_EXPR_REQUIRED);

        checker.allow_extended_const(true);
        checker.validate_const(&body, &[I32]).unwrap();
    }

    #[test]
    fn validation_is_idempotent() {
        let body = instrs(vec![Op::I32Const(2), Op::I32Const(3), Op::I32Add, Op::End]);
        let mut checker = FormChecker::new();
        checker.validate(&body, &[I32]).unwrap();
        checker.reset(false);
        checker.validate(&body, &[I32]).unwrap();
    }
}
