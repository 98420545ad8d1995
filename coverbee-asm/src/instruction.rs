use crate::opcode::{consts, JumpKind, Opcode, OpcodeClass};
use crate::types::{RawInstruction, RegisterId};

use core::fmt;

/// A single byte-code instruction together with its symbolic metadata.
///
/// `symbol` names this instruction as a jump target or function entry;
/// `reference` names a symbol this instruction jumps or calls to. When a
/// `reference` is set the numeric `offset` of a jump is meaningless (kept at
/// `-1`) and is recomputed from symbol positions at emission time.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    opcode: Opcode,
    dst: RegisterId,
    src: RegisterId,
    offset: i16,
    imm: i64,
    symbol: Option<String>,
    reference: Option<String>,
}

impl Instruction {
    /// Size of a raw instruction slot in bytes.
    pub const SLOT_LEN: usize = 8;

    /// Construct an instruction from its operand fields.
    pub fn new(opcode: Opcode, dst: RegisterId, src: RegisterId, offset: i16, imm: i64) -> Self {
        Self {
            opcode,
            dst,
            src,
            offset,
            imm,
            symbol: None,
            reference: None,
        }
    }

    /// Opcode byte.
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Destination register.
    pub const fn dst(&self) -> RegisterId {
        self.dst
    }

    /// Source register.
    pub const fn src(&self) -> RegisterId {
        self.src
    }

    /// Signed 16-bit offset operand.
    pub const fn offset(&self) -> i16 {
        self.offset
    }

    /// Immediate operand; 64 bits wide only for the double-word load.
    pub const fn imm(&self) -> i64 {
        self.imm
    }

    /// Symbol naming this instruction as a jump target or function entry.
    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    /// Symbol this instruction jumps or calls to.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Attach a symbol, replacing any previous one.
    pub fn set_symbol(&mut self, symbol: impl Into<String>) {
        self.symbol = Some(symbol.into());
    }

    /// Detach the symbol, if any.
    pub fn take_symbol(&mut self) -> Option<String> {
        self.symbol.take()
    }

    /// Builder-style [`Instruction::set_symbol`].
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.set_symbol(symbol);
        self
    }

    /// Attach a reference, replacing any previous one.
    pub fn set_reference(&mut self, reference: impl Into<String>) {
        self.reference = Some(reference.into());
    }

    /// Builder-style [`Instruction::set_reference`].
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.set_reference(reference);
        self
    }

    /// Rewrite the numeric jump offset. Used by the offset fixup pass once
    /// symbol positions are final.
    pub fn set_offset(&mut self, offset: i16) {
        self.offset = offset;
    }

    /// Rewrite the immediate operand. Used by the offset fixup pass for
    /// byte-code-to-byte-code calls.
    pub fn set_imm(&mut self, imm: i64) {
        self.imm = imm;
    }

    /// Number of raw instruction slots this instruction occupies: two for
    /// the double-word immediate load, one otherwise.
    pub fn raw_slots(&self) -> usize {
        if self.opcode.is_wide() {
            2
        } else {
            1
        }
    }

    /// Encode into raw wire slots. The second slot is present only for the
    /// double-word immediate load and carries the high half of `imm`.
    pub fn to_raw(&self) -> (RawInstruction, Option<RawInstruction>) {
        let regs = (self.src << 4) | (self.dst & 0x0f);
        let low = u64::from(self.opcode.to_u8())
            | u64::from(regs) << 8
            | u64::from(self.offset as u16) << 16
            | u64::from(self.imm as u32) << 32;

        if self.opcode.is_wide() {
            let high = u64::from((self.imm as u64 >> 32) as u32) << 32;
            (low, Some(high))
        } else {
            (low, None)
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode;

        match op.class() {
            OpcodeClass::Move => {
                if op.src_is_reg() {
                    write!(f, "r{} = r{}", self.dst, self.src)
                } else {
                    write!(f, "r{} = {}", self.dst, self.imm)
                }
            }
            OpcodeClass::Arithmetic => {
                let mnemonic = op.alu_op().unwrap_or("?=");
                if op.src_is_reg() {
                    write!(f, "r{} {} r{}", self.dst, mnemonic, self.src)
                } else {
                    write!(f, "r{} {} {}", self.dst, mnemonic, self.imm)
                }
            }
            OpcodeClass::LoadImmDw => match &self.reference {
                Some(map) => write!(f, "r{} = <{}> ll", self.dst, map),
                None => write!(f, "r{} = {} ll", self.dst, self.imm),
            },
            OpcodeClass::Load => write!(
                f,
                "r{} = *(u{} *)(r{} {:+})",
                self.dst,
                op.access_bits(),
                self.src,
                self.offset
            ),
            OpcodeClass::Store => {
                write!(
                    f,
                    "*(u{} *)(r{} {:+}) = ",
                    op.access_bits(),
                    self.dst,
                    self.offset
                )?;
                if op.class_bits() == consts::CLASS_STX {
                    write!(f, "r{}", self.src)
                } else {
                    write!(f, "{}", self.imm)
                }
            }
            OpcodeClass::Jump(kind) => self.fmt_jump(f, kind),
            OpcodeClass::Other => write!(f, "(op {:#04x})", op.to_u8()),
        }
    }
}

impl Instruction {
    fn fmt_jump(&self, f: &mut fmt::Formatter<'_>, kind: JumpKind) -> fmt::Result {
        match kind {
            JumpKind::Exit => write!(f, "exit"),
            JumpKind::Call => match &self.reference {
                Some(callee) => write!(f, "call {}", callee),
                None => write!(f, "call {}", self.imm),
            },
            JumpKind::Unconditional => match &self.reference {
                Some(label) => write!(f, "goto {}", label),
                None => write!(f, "goto {:+}", self.offset),
            },
            JumpKind::Conditional => {
                let cmp = self.opcode.branch_op().unwrap_or("?");
                write!(f, "if r{} {} ", self.dst, cmp)?;
                if self.opcode.src_is_reg() {
                    write!(f, "r{}", self.src)?;
                } else {
                    write!(f, "{}", self.imm)?;
                }
                match &self.reference {
                    Some(label) => write!(f, " goto {}", label),
                    None => write!(f, " goto {:+}", self.offset),
                }
            }
        }
    }
}
