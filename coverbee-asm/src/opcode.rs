use consts::*;

use core::fmt;

pub mod consts;

/// A single byte identifying a byte-code operation.
///
/// The byte packs an instruction class in its low three bits and, depending
/// on the class, a size/mode (memory classes) or an operation/source
/// selector (arithmetic and jump classes). Consumers are expected to rely on
/// [`Opcode::class`] rather than on raw byte values.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Opcode(u8);

/// Coarse classification of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeClass {
    /// Control transfer, further classified by [`JumpKind`].
    Jump(JumpKind),
    /// The double-word immediate load; occupies two raw instruction slots.
    LoadImmDw,
    /// Any other memory load.
    Load,
    /// Memory store, immediate or register source.
    Store,
    /// Arithmetic or bitwise operation.
    Arithmetic,
    /// Register/immediate move.
    Move,
    /// Anything this classifier does not distinguish.
    Other,
}

/// The kind of a control-transfer opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    /// `goto` without a condition.
    Unconditional,
    /// A compare-and-branch.
    Conditional,
    /// Helper or byte-code function call.
    Call,
    /// Return from the current function.
    Exit,
}

impl Opcode {
    /// Wrap a raw opcode byte.
    pub const fn new(byte: u8) -> Self {
        Self(byte)
    }

    /// The raw opcode byte.
    pub const fn to_u8(self) -> u8 {
        self.0
    }

    /// Instruction class bits.
    pub const fn class_bits(self) -> u8 {
        self.0 & CLASS_MASK
    }

    /// `true` when the source operand is a register rather than an
    /// immediate. Meaningful for arithmetic and conditional-jump opcodes.
    pub const fn src_is_reg(self) -> bool {
        self.0 & SRC_MASK == SRC_X
    }

    /// Memory access width in bits. Meaningful for load/store classes.
    pub const fn access_bits(self) -> u8 {
        match self.0 & SIZE_MASK {
            SIZE_B => 8,
            SIZE_H => 16,
            SIZE_W => 32,
            _ => 64,
        }
    }

    /// `true` for the double-word immediate load, which occupies two raw
    /// instruction slots.
    pub const fn is_wide(self) -> bool {
        self.0 == OP_LDDW
    }

    /// Classify the opcode.
    pub fn class(self) -> OpcodeClass {
        match self.class_bits() {
            CLASS_JMP | CLASS_JMP32 => match self.jump_kind() {
                Some(kind) => OpcodeClass::Jump(kind),
                None => OpcodeClass::Other,
            },
            CLASS_LD if self.is_wide() => OpcodeClass::LoadImmDw,
            CLASS_LD | CLASS_LDX => OpcodeClass::Load,
            CLASS_ST | CLASS_STX => OpcodeClass::Store,
            CLASS_ALU | CLASS_ALU64 => {
                if self.0 & OP_MASK == ALU_MOV {
                    OpcodeClass::Move
                } else {
                    OpcodeClass::Arithmetic
                }
            }
            _ => OpcodeClass::Other,
        }
    }

    /// The jump kind, or `None` for non-jump opcodes.
    pub fn jump_kind(self) -> Option<JumpKind> {
        let class = self.class_bits();
        if class != CLASS_JMP && class != CLASS_JMP32 {
            return None;
        }

        // CALL and EXIT exist only in the 64-bit jump class; the same bits
        // in the 32-bit class belong to conditional encodings.
        let kind = match self.0 & OP_MASK {
            JMP_CALL if class == CLASS_JMP => JumpKind::Call,
            JMP_EXIT if class == CLASS_JMP => JumpKind::Exit,
            JMP_JA => JumpKind::Unconditional,
            _ => JumpKind::Conditional,
        };

        Some(kind)
    }

    /// `true` for any control-transfer opcode, calls and exits included.
    pub fn is_jump(self) -> bool {
        self.jump_kind().is_some()
    }

    /// Comparison mnemonic for conditional jumps, `None` otherwise.
    pub fn branch_op(self) -> Option<&'static str> {
        if self.jump_kind() != Some(JumpKind::Conditional) {
            return None;
        }

        let op = match self.0 & OP_MASK {
            JMP_JEQ => "==",
            JMP_JGT => ">",
            JMP_JGE => ">=",
            JMP_JSET => "&",
            JMP_JNE => "!=",
            JMP_JSGT => "s>",
            JMP_JSGE => "s>=",
            JMP_JLT => "<",
            JMP_JLE => "<=",
            JMP_JSLT => "s<",
            JMP_JSLE => "s<=",
            _ => return None,
        };

        Some(op)
    }

    /// Arithmetic mnemonic for ALU opcodes, `None` otherwise.
    pub fn alu_op(self) -> Option<&'static str> {
        let class = self.class_bits();
        if class != CLASS_ALU && class != CLASS_ALU64 {
            return None;
        }

        let op = match self.0 & OP_MASK {
            ALU_ADD => "+=",
            ALU_SUB => "-=",
            ALU_MUL => "*=",
            ALU_DIV => "/=",
            ALU_OR => "|=",
            ALU_AND => "&=",
            ALU_LSH => "<<=",
            ALU_RSH => ">>=",
            ALU_NEG => "= -",
            ALU_MOD => "%=",
            ALU_XOR => "^=",
            ALU_MOV => "=",
            ALU_ARSH => "s>>=",
            _ => return None,
        };

        Some(op)
    }
}

impl From<u8> for Opcode {
    fn from(byte: u8) -> Self {
        Self(byte)
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op.0
    }
}

impl fmt::LowerHex for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
