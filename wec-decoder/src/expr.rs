//! Expression and instruction decoding.
//!
//! Function bodies and constant expressions share one decoder: a loop
//! that reads opcodes until the `end` closing the outermost frame,
//! stamping every instruction with its byte offset. Opcodes belonging
//! to disabled proposals fail with an error naming the proposal; the
//! SIMD (0xFD) and atomics (0xFE) opcode spaces are recognized but not
//! modeled.

use alloc::vec::Vec;

use wec_error::{codes, Result};
use wec_format::binary;
use wec_format::instructions::{BlockType, Expr, Instruction, MemArg, Op};
use wec_foundation::{AstNodeAttr, Proposal};

use crate::loader::Loader;

const NODE: AstNodeAttr = AstNodeAttr::Instruction;

impl<'a, 'cfg> Loader<'a, 'cfg> {
    /// Decode an expression: instructions up to and including the
    /// `end` that closes the outermost frame.
    pub fn load_expr(&mut self) -> Result<Expr> {
        let mut instrs = Vec::new();
        let mut depth = 0usize;
        loop {
            let offset = self.reader().position() as u64;
            let op = self.load_op()?;
            match op {
                Op::Block(_) | Op::Loop(_) | Op::If(_) => depth += 1,
                Op::End if depth == 0 => {
                    instrs.push(Instruction::new(op, offset));
                    return Ok(instrs);
                }
                Op::End => depth -= 1,
                _ => {}
            }
            instrs.push(Instruction::new(op, offset));
        }
    }

    fn load_block_type(&mut self) -> Result<BlockType> {
        let peek = self.reader().peek_byte()?;
        match peek {
            binary::BLOCK_TYPE_EMPTY => {
                self.reader().read_byte()?;
                Ok(BlockType::Empty)
            }
            // Value-type bytes, including the typed-reference prefixes.
            0x7B..=0x7F | 0x70 | 0x6F | 0x63 | 0x64 => {
                let byte = self.reader().read_byte()?;
                Ok(BlockType::Value(self.val_type_from_byte(byte, NODE)?))
            }
            _ => {
                let value = self.reader().read_s33()?;
                if value < 0 {
                    return Err(self.err(codes::MALFORMED_VALTYPE, NODE, "malformed block type"));
                }
                if !self.config().has_proposal(Proposal::MultiValue) {
                    return Err(self.need_proposal(
                        codes::MALFORMED_VALTYPE,
                        Proposal::MultiValue,
                        NODE,
                        "block type with function signature",
                    ));
                }
                Ok(BlockType::FuncType(value as u32))
            }
        }
    }

    fn load_memarg(&mut self) -> Result<MemArg> {
        let align = self.reader().read_u32()?;
        let offset = if self.config().has_proposal(Proposal::Memory64) {
            self.reader().read_u64()?
        } else {
            u64::from(self.reader().read_u32()?)
        };
        Ok(MemArg { align, offset })
    }

    fn load_zero_byte(&mut self) -> Result<()> {
        let idx = self.reader().read_u32()?;
        if idx != 0 {
            return Err(self.err(codes::MALFORMED_OPCODE, NODE, "zero byte expected"));
        }
        Ok(())
    }

    fn check_opcode_proposal(&self, proposal: Proposal, what: &str) -> Result<()> {
        if self.config().has_proposal(proposal) {
            Ok(())
        } else {
            Err(self.need_proposal(codes::MALFORMED_OPCODE, proposal, NODE, what))
        }
    }

    fn load_op(&mut self) -> Result<Op> {
        let opcode = self.reader().read_byte()?;
        let op = match opcode {
            0x00 => Op::Unreachable,
            0x01 => Op::Nop,
            0x02 => Op::Block(self.load_block_type()?),
            0x03 => Op::Loop(self.load_block_type()?),
            0x04 => Op::If(self.load_block_type()?),
            binary::ELSE_OPCODE => Op::Else,
            binary::END_OPCODE => Op::End,
            0x0C => Op::Br(self.reader().read_u32()?),
            0x0D => Op::BrIf(self.reader().read_u32()?),
            0x0E => {
                let count = self.reader().read_u32()?;
                let mut targets = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    targets.push(self.reader().read_u32()?);
                }
                let default = self.reader().read_u32()?;
                Op::BrTable { targets, default }
            }
            0x0F => Op::Return,
            0x10 => Op::Call(self.reader().read_u32()?),
            0x11 => {
                let type_idx = self.reader().read_u32()?;
                let table_idx = self.reader().read_u32()?;
                if table_idx != 0 && !self.config().has_proposal(Proposal::ReferenceTypes) {
                    return Err(self.err(codes::MALFORMED_OPCODE, NODE, "zero byte expected"));
                }
                Op::CallIndirect {
                    type_idx,
                    table_idx,
                }
            }
            0x12 => {
                self.check_opcode_proposal(Proposal::TailCall, "return_call")?;
                Op::ReturnCall(self.reader().read_u32()?)
            }
            0x13 => {
                self.check_opcode_proposal(Proposal::TailCall, "return_call_indirect")?;
                let type_idx = self.reader().read_u32()?;
                let table_idx = self.reader().read_u32()?;
                Op::ReturnCallIndirect {
                    type_idx,
                    table_idx,
                }
            }

            0x1A => Op::Drop,
            0x1B => Op::Select,
            0x1C => {
                self.check_opcode_proposal(Proposal::ReferenceTypes, "typed select")?;
                let count = self.reader().read_u32()?;
                let mut types = Vec::with_capacity(count.min(64) as usize);
                for _ in 0..count {
                    types.push(self.load_val_type(NODE)?);
                }
                Op::SelectT(types)
            }

            0x20 => Op::LocalGet(self.reader().read_u32()?),
            0x21 => Op::LocalSet(self.reader().read_u32()?),
            0x22 => Op::LocalTee(self.reader().read_u32()?),
            0x23 => Op::GlobalGet(self.reader().read_u32()?),
            0x24 => Op::GlobalSet(self.reader().read_u32()?),

            0x25 => {
                self.check_opcode_proposal(Proposal::ReferenceTypes, "table.get")?;
                Op::TableGet(self.reader().read_u32()?)
            }
            0x26 => {
                self.check_opcode_proposal(Proposal::ReferenceTypes, "table.set")?;
                Op::TableSet(self.reader().read_u32()?)
            }

            0x28 => Op::I32Load(self.load_memarg()?),
            0x29 => Op::I64Load(self.load_memarg()?),
            0x2A => Op::F32Load(self.load_memarg()?),
            0x2B => Op::F64Load(self.load_memarg()?),
            0x2C => Op::I32Load8S(self.load_memarg()?),
            0x2D => Op::I32Load8U(self.load_memarg()?),
            0x2E => Op::I32Load16S(self.load_memarg()?),
            0x2F => Op::I32Load16U(self.load_memarg()?),
            0x30 => Op::I64Load8S(self.load_memarg()?),
            0x31 => Op::I64Load8U(self.load_memarg()?),
            0x32 => Op::I64Load16S(self.load_memarg()?),
            0x33 => Op::I64Load16U(self.load_memarg()?),
            0x34 => Op::I64Load32S(self.load_memarg()?),
            0x35 => Op::I64Load32U(self.load_memarg()?),
            0x36 => Op::I32Store(self.load_memarg()?),
            0x37 => Op::I64Store(self.load_memarg()?),
            0x38 => Op::F32Store(self.load_memarg()?),
            0x39 => Op::F64Store(self.load_memarg()?),
            0x3A => Op::I32Store8(self.load_memarg()?),
            0x3B => Op::I32Store16(self.load_memarg()?),
            0x3C => Op::I64Store8(self.load_memarg()?),
            0x3D => Op::I64Store16(self.load_memarg()?),
            0x3E => Op::I64Store32(self.load_memarg()?),
            0x3F => {
                self.load_zero_byte()?;
                Op::MemorySize
            }
            0x40 => {
                self.load_zero_byte()?;
                Op::MemoryGrow
            }

            0x41 => Op::I32Const(self.reader().read_s32()?),
            0x42 => Op::I64Const(self.reader().read_s64()?),
            0x43 => Op::F32Const(self.reader().read_f32_bits()?),
            0x44 => Op::F64Const(self.reader().read_f64_bits()?),

            0x45 => Op::I32Eqz,
            0x46 => Op::I32Eq,
            0x47 => Op::I32Ne,
            0x48 => Op::I32LtS,
            0x49 => Op::I32LtU,
            0x4A => Op::I32GtS,
            0x4B => Op::I32GtU,
            0x4C => Op::I32LeS,
            0x4D => Op::I32LeU,
            0x4E => Op::I32GeS,
            0x4F => Op::I32GeU,
            0x50 => Op::I64Eqz,
            0x51 => Op::I64Eq,
            0x52 => Op::I64Ne,
            0x53 => Op::I64LtS,
            0x54 => Op::I64LtU,
            0x55 => Op::I64GtS,
            0x56 => Op::I64GtU,
            0x57 => Op::I64LeS,
            0x58 => Op::I64LeU,
            0x59 => Op::I64GeS,
            0x5A => Op::I64GeU,
            0x5B => Op::F32Eq,
            0x5C => Op::F32Ne,
            0x5D => Op::F32Lt,
            0x5E => Op::F32Gt,
            0x5F => Op::F32Le,
            0x60 => Op::F32Ge,
            0x61 => Op::F64Eq,
            0x62 => Op::F64Ne,
            0x63 => Op::F64Lt,
            0x64 => Op::F64Gt,
            0x65 => Op::F64Le,
            0x66 => Op::F64Ge,

            0x67 => Op::I32Clz,
            0x68 => Op::I32Ctz,
            0x69 => Op::I32Popcnt,
            0x6A => Op::I32Add,
            0x6B => Op::I32Sub,
            0x6C => Op::I32Mul,
            0x6D => Op::I32DivS,
            0x6E => Op::I32DivU,
            0x6F => Op::I32RemS,
            0x70 => Op::I32RemU,
            0x71 => Op::I32And,
            0x72 => Op::I32Or,
            0x73 => Op::I32Xor,
            0x74 => Op::I32Shl,
            0x75 => Op::I32ShrS,
            0x76 => Op::I32ShrU,
            0x77 => Op::I32Rotl,
            0x78 => Op::I32Rotr,
            0x79 => Op::I64Clz,
            0x7A => Op::I64Ctz,
            0x7B => Op::I64Popcnt,
            0x7C => Op::I64Add,
            0x7D => Op::I64Sub,
            0x7E => Op::I64Mul,
            0x7F => Op::I64DivS,
            0x80 => Op::I64DivU,
            0x81 => Op::I64RemS,
            0x82 => Op::I64RemU,
            0x83 => Op::I64And,
            0x84 => Op::I64Or,
            0x85 => Op::I64Xor,
            0x86 => Op::I64Shl,
            0x87 => Op::I64ShrS,
            0x88 => Op::I64ShrU,
            0x89 => Op::I64Rotl,
            0x8A => Op::I64Rotr,

            0x8B => Op::F32Abs,
            0x8C => Op::F32Neg,
            0x8D => Op::F32Ceil,
            0x8E => Op::F32Floor,
            0x8F => Op::F32Trunc,
            0x90 => Op::F32Nearest,
            0x91 => Op::F32Sqrt,
            0x92 => Op::F32Add,
            0x93 => Op::F32Sub,
            0x94 => Op::F32Mul,
            0x95 => Op::F32Div,
            0x96 => Op::F32Min,
            0x97 => Op::F32Max,
            0x98 => Op::F32Copysign,
            0x99 => Op::F64Abs,
            0x9A => Op::F64Neg,
            0x9B => Op::F64Ceil,
            0x9C => Op::F64Floor,
            0x9D => Op::F64Trunc,
            0x9E => Op::F64Nearest,
            0x9F => Op::F64Sqrt,
            0xA0 => Op::F64Add,
            0xA1 => Op::F64Sub,
            0xA2 => Op::F64Mul,
            0xA3 => Op::F64Div,
            0xA4 => Op::F64Min,
            0xA5 => Op::F64Max,
            0xA6 => Op::F64Copysign,

            0xA7 => Op::I32WrapI64,
            0xA8 => Op::I32TruncF32S,
            0xA9 => Op::I32TruncF32U,
            0xAA => Op::I32TruncF64S,
            0xAB => Op::I32TruncF64U,
            0xAC => Op::I64ExtendI32S,
            0xAD => Op::I64ExtendI32U,
            0xAE => Op::I64TruncF32S,
            0xAF => Op::I64TruncF32U,
            0xB0 => Op::I64TruncF64S,
            0xB1 => Op::I64TruncF64U,
            0xB2 => Op::F32ConvertI32S,
            0xB3 => Op::F32ConvertI32U,
            0xB4 => Op::F32ConvertI64S,
            0xB5 => Op::F32ConvertI64U,
            0xB6 => Op::F32DemoteF64,
            0xB7 => Op::F64ConvertI32S,
            0xB8 => Op::F64ConvertI32U,
            0xB9 => Op::F64ConvertI64S,
            0xBA => Op::F64ConvertI64U,
            0xBB => Op::F64PromoteF32,
            0xBC => Op::I32ReinterpretF32,
            0xBD => Op::I64ReinterpretF64,
            0xBE => Op::F32ReinterpretI32,
            0xBF => Op::F64ReinterpretI64,

            0xC0 => {
                self.check_opcode_proposal(Proposal::SignExtensionOperators, "i32.extend8_s")?;
                Op::I32Extend8S
            }
            0xC1 => {
                self.check_opcode_proposal(Proposal::SignExtensionOperators, "i32.extend16_s")?;
                Op::I32Extend16S
            }
            0xC2 => {
                self.check_opcode_proposal(Proposal::SignExtensionOperators, "i64.extend8_s")?;
                Op::I64Extend8S
            }
            0xC3 => {
                self.check_opcode_proposal(Proposal::SignExtensionOperators, "i64.extend16_s")?;
                Op::I64Extend16S
            }
            0xC4 => {
                self.check_opcode_proposal(Proposal::SignExtensionOperators, "i64.extend32_s")?;
                Op::I64Extend32S
            }

            0xD0 => {
                self.check_opcode_proposal(Proposal::ReferenceTypes, "ref.null")?;
                Op::RefNull(self.load_heap_type(NODE)?)
            }
            0xD1 => {
                self.check_opcode_proposal(Proposal::ReferenceTypes, "ref.is_null")?;
                Op::RefIsNull
            }
            0xD2 => {
                self.check_opcode_proposal(Proposal::ReferenceTypes, "ref.func")?;
                Op::RefFunc(self.reader().read_u32()?)
            }

            binary::MISC_PREFIX => self.load_misc_op()?,
            binary::SIMD_PREFIX => {
                return Err(self.need_proposal(
                    codes::MALFORMED_OPCODE,
                    Proposal::Simd,
                    NODE,
                    "vector instructions are not modeled",
                ));
            }
            binary::ATOMIC_PREFIX => {
                return Err(self.need_proposal(
                    codes::MALFORMED_OPCODE,
                    Proposal::Threads,
                    NODE,
                    "atomic instructions are not modeled",
                ));
            }

            _ => return Err(self.err(codes::MALFORMED_OPCODE, NODE, "malformed opcode")),
        };
        Ok(op)
    }

    fn load_misc_op(&mut self) -> Result<Op> {
        let sub = self.reader().read_u32()?;
        let op = match sub {
            0..=7 => {
                self.check_opcode_proposal(
                    Proposal::NonTrapFloatToInt,
                    "saturating truncation",
                )?;
                match sub {
                    0 => Op::I32TruncSatF32S,
                    1 => Op::I32TruncSatF32U,
                    2 => Op::I32TruncSatF64S,
                    3 => Op::I32TruncSatF64U,
                    4 => Op::I64TruncSatF32S,
                    5 => Op::I64TruncSatF32U,
                    6 => Op::I64TruncSatF64S,
                    // sub == 7, by the outer match arm
                    _ => Op::I64TruncSatF64U,
                }
            }
            8 => {
                self.check_opcode_proposal(Proposal::BulkMemoryOperations, "memory.init")?;
                let data_idx = self.reader().read_u32()?;
                self.load_zero_byte()?;
                Op::MemoryInit(data_idx)
            }
            9 => {
                self.check_opcode_proposal(Proposal::BulkMemoryOperations, "data.drop")?;
                Op::DataDrop(self.reader().read_u32()?)
            }
            10 => {
                self.check_opcode_proposal(Proposal::BulkMemoryOperations, "memory.copy")?;
                self.load_zero_byte()?;
                self.load_zero_byte()?;
                Op::MemoryCopy
            }
            11 => {
                self.check_opcode_proposal(Proposal::BulkMemoryOperations, "memory.fill")?;
                self.load_zero_byte()?;
                Op::MemoryFill
            }
            12 => {
                self.check_opcode_proposal(Proposal::BulkMemoryOperations, "table.init")?;
                let elem_idx = self.reader().read_u32()?;
                let table_idx = self.reader().read_u32()?;
                Op::TableInit {
                    elem_idx,
                    table_idx,
                }
            }
            13 => {
                self.check_opcode_proposal(Proposal::BulkMemoryOperations, "elem.drop")?;
                Op::ElemDrop(self.reader().read_u32()?)
            }
            14 => {
                self.check_opcode_proposal(Proposal::BulkMemoryOperations, "table.copy")?;
                let dst_table = self.reader().read_u32()?;
                let src_table = self.reader().read_u32()?;
                Op::TableCopy {
                    dst_table,
                    src_table,
                }
            }
            15 => {
                self.check_opcode_proposal(Proposal::ReferenceTypes, "table.grow")?;
                Op::TableGrow(self.reader().read_u32()?)
            }
            16 => {
                self.check_opcode_proposal(Proposal::ReferenceTypes, "table.size")?;
                Op::TableSize(self.reader().read_u32()?)
            }
            17 => {
                self.check_opcode_proposal(Proposal::ReferenceTypes, "table.fill")?;
                Op::TableFill(self.reader().read_u32()?)
            }
            _ => return Err(self.err(codes::MALFORMED_OPCODE, NODE, "malformed opcode")),
        };
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wec_foundation::Config;

    fn decode(bytes: &[u8], config: &Config) -> Result<Expr> {
        let mut loader = Loader::new(bytes, config);
        loader.load_expr()
    }

    #[test]
    fn nested_blocks_terminate_at_outer_end() {
        let config = Config::default();
        // block (empty) end, i32.const 1, end
        let bytes = [0x02, 0x40, 0x0B, 0x41, 0x01, 0x0B];
        let expr = decode(&bytes, &config).unwrap();
        assert_eq!(expr.len(), 4);
        assert_eq!(expr[0].op, Op::Block(BlockType::Empty));
        assert_eq!(expr[2].op, Op::I32Const(1));
        assert_eq!(expr[3].op, Op::End);
        assert_eq!(expr[3].offset, 5);
    }

    #[test]
    fn br_table_immediates() {
        let config = Config::default();
        let bytes = [0x0E, 0x02, 0x00, 0x01, 0x02, 0x0B];
        let expr = decode(&bytes, &config).unwrap();
        assert_eq!(
            expr[0].op,
            Op::BrTable {
                targets: alloc::vec![0, 1],
                default: 2
            }
        );
    }

    #[test]
    fn sign_extension_needs_proposal() {
        let config = Config::default().disable(Proposal::SignExtensionOperators);
        let err = decode(&[0xC0, 0x0B], &config).unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_OPCODE);
        assert!(err.message.contains("sign-extension"));
    }

    #[test]
    fn saturating_truncation_gating() {
        let enabled = Config::default();
        let expr = decode(&[0xFC, 0x00, 0x0B], &enabled).unwrap();
        assert_eq!(expr[0].op, Op::I32TruncSatF32S);

        let disabled = Config::default().disable(Proposal::NonTrapFloatToInt);
        let err = decode(&[0xFC, 0x00, 0x0B], &disabled).unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_OPCODE);
    }

    #[test]
    fn simd_space_is_rejected() {
        let config = Config::default();
        let err = decode(&[0xFD, 0x00, 0x0B], &config).unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_OPCODE);
    }

    #[test]
    fn unknown_opcode() {
        let config = Config::default();
        let err = decode(&[0xD5, 0x0B], &config).unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_OPCODE);
        assert_eq!(err.offset, Some(0));
    }

    #[test]
    fn memarg_and_zero_bytes() {
        let config = Config::default();
        // i32.load align=2 offset=16, memory.size, end
        let bytes = [0x28, 0x02, 0x10, 0x3F, 0x00, 0x0B];
        let expr = decode(&bytes, &config).unwrap();
        assert_eq!(
            expr[0].op,
            Op::I32Load(MemArg {
                align: 2,
                offset: 16
            })
        );
        assert_eq!(expr[1].op, Op::MemorySize);

        // memory.size with a non-zero memory index
        let err = decode(&[0x3F, 0x01, 0x0B], &config).unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_OPCODE);
    }

    #[test]
    fn block_type_with_signature_needs_multi_value() {
        let with = Config::default();
        let expr = decode(&[0x02, 0x00, 0x0B, 0x0B], &with).unwrap();
        assert_eq!(expr[0].op, Op::Block(BlockType::FuncType(0)));

        let without = Config::default().disable(Proposal::MultiValue);
        let err = decode(&[0x02, 0x00, 0x0B, 0x0B], &without).unwrap_err();
        assert_eq!(err.code, codes::MALFORMED_VALTYPE);
    }
}
