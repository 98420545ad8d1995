//! Bit-level layout of the opcode byte.

/// Mask selecting the instruction class.
pub const CLASS_MASK: u8 = 0x07;

/// Immediate/packet load class.
pub const CLASS_LD: u8 = 0x00;
/// Register-indirect load class.
pub const CLASS_LDX: u8 = 0x01;
/// Immediate store class.
pub const CLASS_ST: u8 = 0x02;
/// Register store class.
pub const CLASS_STX: u8 = 0x03;
/// 32-bit arithmetic class.
pub const CLASS_ALU: u8 = 0x04;
/// 64-bit jump class.
pub const CLASS_JMP: u8 = 0x05;
/// 32-bit jump class.
pub const CLASS_JMP32: u8 = 0x06;
/// 64-bit arithmetic class.
pub const CLASS_ALU64: u8 = 0x07;

/// Mask selecting the memory access width.
pub const SIZE_MASK: u8 = 0x18;

/// 32-bit access.
pub const SIZE_W: u8 = 0x00;
/// 16-bit access.
pub const SIZE_H: u8 = 0x08;
/// 8-bit access.
pub const SIZE_B: u8 = 0x10;
/// 64-bit access.
pub const SIZE_DW: u8 = 0x18;

/// Mask selecting the memory access mode.
pub const MODE_MASK: u8 = 0xe0;

/// Immediate operand mode.
pub const MODE_IMM: u8 = 0x00;
/// Absolute packet access mode.
pub const MODE_ABS: u8 = 0x20;
/// Indirect packet access mode.
pub const MODE_IND: u8 = 0x40;
/// Regular memory access mode.
pub const MODE_MEM: u8 = 0x60;
/// Atomic read-modify-write mode.
pub const MODE_ATOMIC: u8 = 0xc0;

/// Mask selecting the ALU/JMP operation.
pub const OP_MASK: u8 = 0xf0;

/// Mask selecting the source operand kind.
pub const SRC_MASK: u8 = 0x08;

/// Immediate source operand.
pub const SRC_K: u8 = 0x00;
/// Register source operand.
pub const SRC_X: u8 = 0x08;

// ALU operations.

/// Addition.
pub const ALU_ADD: u8 = 0x00;
/// Subtraction.
pub const ALU_SUB: u8 = 0x10;
/// Multiplication.
pub const ALU_MUL: u8 = 0x20;
/// Division.
pub const ALU_DIV: u8 = 0x30;
/// Bitwise or.
pub const ALU_OR: u8 = 0x40;
/// Bitwise and.
pub const ALU_AND: u8 = 0x50;
/// Left shift.
pub const ALU_LSH: u8 = 0x60;
/// Logical right shift.
pub const ALU_RSH: u8 = 0x70;
/// Negation.
pub const ALU_NEG: u8 = 0x80;
/// Modulo.
pub const ALU_MOD: u8 = 0x90;
/// Bitwise exclusive or.
pub const ALU_XOR: u8 = 0xa0;
/// Move.
pub const ALU_MOV: u8 = 0xb0;
/// Arithmetic right shift.
pub const ALU_ARSH: u8 = 0xc0;
/// Endianness conversion.
pub const ALU_END: u8 = 0xd0;

// Jump operations.

/// Unconditional jump.
pub const JMP_JA: u8 = 0x00;
/// Jump if equal.
pub const JMP_JEQ: u8 = 0x10;
/// Jump if greater, unsigned.
pub const JMP_JGT: u8 = 0x20;
/// Jump if greater or equal, unsigned.
pub const JMP_JGE: u8 = 0x30;
/// Jump if masked bits set.
pub const JMP_JSET: u8 = 0x40;
/// Jump if not equal.
pub const JMP_JNE: u8 = 0x50;
/// Jump if greater, signed.
pub const JMP_JSGT: u8 = 0x60;
/// Jump if greater or equal, signed.
pub const JMP_JSGE: u8 = 0x70;
/// Function call.
pub const JMP_CALL: u8 = 0x80;
/// Function return.
pub const JMP_EXIT: u8 = 0x90;
/// Jump if lower, unsigned.
pub const JMP_JLT: u8 = 0xa0;
/// Jump if lower or equal, unsigned.
pub const JMP_JLE: u8 = 0xb0;
/// Jump if lower, signed.
pub const JMP_JSLT: u8 = 0xc0;
/// Jump if lower or equal, signed.
pub const JMP_JSLE: u8 = 0xd0;

// Composed opcode bytes for the shapes rewriters emit.

/// `dst = imm`, 64-bit.
pub const OP_MOV64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_MOV;
/// `dst = src`, 64-bit.
pub const OP_MOV64_REG: u8 = CLASS_ALU64 | SRC_X | ALU_MOV;
/// `dst += imm`, 64-bit.
pub const OP_ADD64_IMM: u8 = CLASS_ALU64 | SRC_K | ALU_ADD;
/// Double-word immediate load; occupies two raw slots.
pub const OP_LDDW: u8 = CLASS_LD | MODE_IMM | SIZE_DW;
/// `dst = *(u64 *)(src + off)`.
pub const OP_LDXDW: u8 = CLASS_LDX | MODE_MEM | SIZE_DW;
/// `dst = *(u16 *)(src + off)`.
pub const OP_LDXH: u8 = CLASS_LDX | MODE_MEM | SIZE_H;
/// `*(u64 *)(dst + off) = src`.
pub const OP_STXDW: u8 = CLASS_STX | MODE_MEM | SIZE_DW;
/// `*(u16 *)(dst + off) = src`.
pub const OP_STXH: u8 = CLASS_STX | MODE_MEM | SIZE_H;
/// `*(u32 *)(dst + off) = imm`.
pub const OP_STW_IMM: u8 = CLASS_ST | MODE_MEM | SIZE_W;
/// `goto off`.
pub const OP_JA: u8 = CLASS_JMP | SRC_K | JMP_JA;
/// `if dst == imm goto off`.
pub const OP_JEQ_IMM: u8 = CLASS_JMP | SRC_K | JMP_JEQ;
/// `if dst != imm goto off`.
pub const OP_JNE_IMM: u8 = CLASS_JMP | SRC_K | JMP_JNE;
/// Helper or byte-code function call.
pub const OP_CALL: u8 = CLASS_JMP | SRC_K | JMP_CALL;
/// Function return.
pub const OP_EXIT: u8 = CLASS_JMP | SRC_K | JMP_EXIT;

/// Source-register value marking a double-word load as a map reference to
/// be resolved by the loader.
pub const PSEUDO_MAP_FD: u8 = 1;

/// Source-register value marking a call as byte-code-to-byte-code rather
/// than a helper call.
pub const PSEUDO_CALL: u8 = 1;
