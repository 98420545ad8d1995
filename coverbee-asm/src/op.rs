//! Constructor shorthands for the instruction shapes rewriters emit.

use crate::instruction::Instruction;
use crate::opcode::consts::*;
use crate::opcode::Opcode;
use crate::types::RegisterId;

/// `dst = imm`, 64-bit move of an immediate.
pub fn movi(dst: RegisterId, imm: i32) -> Instruction {
    Instruction::new(Opcode::new(OP_MOV64_IMM), dst, 0, 0, imm.into())
}

/// `dst = src`, 64-bit register move.
pub fn mov(dst: RegisterId, src: RegisterId) -> Instruction {
    Instruction::new(Opcode::new(OP_MOV64_REG), dst, src, 0, 0)
}

/// `dst += imm`, 64-bit.
pub fn addi(dst: RegisterId, imm: i32) -> Instruction {
    Instruction::new(Opcode::new(OP_ADD64_IMM), dst, 0, 0, imm.into())
}

/// `dst = *(u64 *)(src + off)`.
pub fn ldxdw(dst: RegisterId, src: RegisterId, off: i16) -> Instruction {
    Instruction::new(Opcode::new(OP_LDXDW), dst, src, off, 0)
}

/// `dst = *(u16 *)(src + off)`.
pub fn ldxh(dst: RegisterId, src: RegisterId, off: i16) -> Instruction {
    Instruction::new(Opcode::new(OP_LDXH), dst, src, off, 0)
}

/// `*(u64 *)(dst + off) = src`.
pub fn stxdw(dst: RegisterId, off: i16, src: RegisterId) -> Instruction {
    Instruction::new(Opcode::new(OP_STXDW), dst, src, off, 0)
}

/// `*(u16 *)(dst + off) = src`.
pub fn stxh(dst: RegisterId, off: i16, src: RegisterId) -> Instruction {
    Instruction::new(Opcode::new(OP_STXH), dst, src, off, 0)
}

/// `*(u32 *)(dst + off) = imm`.
pub fn stw_imm(dst: RegisterId, off: i16, imm: i32) -> Instruction {
    Instruction::new(Opcode::new(OP_STW_IMM), dst, 0, off, imm.into())
}

/// Double-word load of a map pointer, resolved by the loader through the
/// given symbol.
pub fn lddw_map(dst: RegisterId, map: impl Into<String>) -> Instruction {
    Instruction::new(Opcode::new(OP_LDDW), dst, PSEUDO_MAP_FD, 0, 0).with_reference(map)
}

/// Call the helper with the given id.
pub fn call_helper(helper: i32) -> Instruction {
    Instruction::new(Opcode::new(OP_CALL), 0, 0, 0, helper.into())
}

/// Call the byte-code function named by `callee`.
pub fn call_func(callee: impl Into<String>) -> Instruction {
    Instruction::new(Opcode::new(OP_CALL), 0, PSEUDO_CALL, 0, -1).with_reference(callee)
}

/// `goto off`.
pub fn ja(off: i16) -> Instruction {
    Instruction::new(Opcode::new(OP_JA), 0, 0, off, 0)
}

/// `if dst == imm goto off`.
pub fn jeq_imm(dst: RegisterId, imm: i32, off: i16) -> Instruction {
    Instruction::new(Opcode::new(OP_JEQ_IMM), dst, 0, off, imm.into())
}

/// `if dst != imm goto off`.
pub fn jne_imm(dst: RegisterId, imm: i32, off: i16) -> Instruction {
    Instruction::new(Opcode::new(OP_JNE_IMM), dst, 0, off, imm.into())
}

/// Return from the current function.
pub fn exit() -> Instruction {
    Instruction::new(Opcode::new(OP_EXIT), 0, 0, 0, 0)
}
