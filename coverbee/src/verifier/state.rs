//! Verifier state snapshots: a `frameN:` prefix plus ordered
//! register/stack entries.

use crate::verifier::value::RegisterValue;

use coverbee_asm::RegisterId;
use core::fmt;

/// Observed liveness of a register or stack slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Liveness {
    /// No annotation.
    #[default]
    None,
    /// Read on some path.
    Read,
    /// Written on some path.
    Written,
    /// Read and written.
    ReadWritten,
    /// Fully resolved, no longer tracked.
    Done,
}

impl Liveness {
    /// The `_r`/`_w`/`_rw`/`_D` suffix, empty for [`Liveness::None`].
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Read => "_r",
            Self::Written => "_w",
            Self::ReadWritten => "_rw",
            Self::Done => "_D",
        }
    }

    /// Strip a liveness suffix off a state key.
    pub(crate) fn strip(key: &str) -> (&str, Self) {
        for liveness in [Self::ReadWritten, Self::Read, Self::Written, Self::Done] {
            if let Some(stripped) = key.strip_suffix(liveness.suffix()) {
                return (stripped, liveness);
            }
        }
        (key, Self::None)
    }
}

/// Annotation of a single stack-slot byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SlotByte {
    /// Never written.
    #[default]
    Invalid,
    /// Part of a spilled register.
    Spill,
    /// Written with untracked data.
    Misc,
    /// Known zero.
    Zero,
}

impl SlotByte {
    pub(crate) fn from_char(c: char) -> Option<Self> {
        match c {
            '?' => Some(Self::Invalid),
            'r' => Some(Self::Spill),
            'm' => Some(Self::Misc),
            '0' => Some(Self::Zero),
            _ => None,
        }
    }

    pub(crate) const fn to_char(self) -> char {
        match self {
            Self::Invalid => '?',
            Self::Spill => 'r',
            Self::Misc => 'm',
            Self::Zero => '0',
        }
    }
}

/// Value held by one 8-byte stack slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    /// A typed value spilled to the stack.
    Spill(RegisterValue),
    /// Raw bytes, each annotated independently.
    Bytes([SlotByte; 8]),
    /// The slot was mentioned without a value (back-tracking mark lists).
    None,
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spill(value) => value.fmt(f),
            Self::Bytes(bytes) => {
                for byte in bytes {
                    write!(f, "{}", byte.to_char())?;
                }
                Ok(())
            }
            Self::None => Ok(()),
        }
    }
}

/// A register entry of a state line, e.g. `R1_w=inv0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterEntry {
    /// The register.
    pub reg: RegisterId,
    /// Liveness suffix on the key.
    pub liveness: Liveness,
    /// The value; absent in mark lists.
    pub value: Option<RegisterValue>,
}

/// A stack entry of a state line, e.g. `fp-8=mmmmmmmm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    /// Signed frame offset; `-8` for `fp-8`.
    pub offset: i32,
    /// Liveness suffix on the key.
    pub liveness: Liveness,
    /// The slot value.
    pub value: SlotValue,
}

/// One token of a state line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEntry {
    /// A register entry.
    Register(RegisterEntry),
    /// A stack entry.
    Stack(StackEntry),
    /// A token the grammar does not cover, preserved verbatim.
    Opaque(String),
}

impl fmt::Display for StateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(entry) => {
                write!(f, "R{}{}", entry.reg, entry.liveness.suffix())?;
                if let Some(value) = &entry.value {
                    write!(f, "={}", value)?;
                }
                Ok(())
            }
            Self::Stack(entry) => {
                write!(f, "fp{}{}", entry.offset, entry.liveness.suffix())?;
                if !matches!(entry.value, SlotValue::None) {
                    write!(f, "={}", entry.value)?;
                }
                Ok(())
            }
            Self::Opaque(raw) => f.write_str(raw),
        }
    }
}

/// A verifier state snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifierState {
    /// The `frameN:` prefix, when present.
    pub frame: Option<u32>,
    /// Entries in input order.
    pub entries: Vec<StateEntry>,
}

impl VerifierState {
    /// Iterate over register entries.
    pub fn registers(&self) -> impl Iterator<Item = &RegisterEntry> {
        self.entries.iter().filter_map(|entry| match entry {
            StateEntry::Register(reg) => Some(reg),
            _ => None,
        })
    }

    /// Iterate over stack entries.
    pub fn stack(&self) -> impl Iterator<Item = &StackEntry> {
        self.entries.iter().filter_map(|entry| match entry {
            StateEntry::Stack(slot) => Some(slot),
            _ => None,
        })
    }

    /// Look up a register entry.
    pub fn register(&self, reg: RegisterId) -> Option<&RegisterEntry> {
        self.registers().find(|entry| entry.reg == reg)
    }
}

impl fmt::Display for VerifierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(frame) = self.frame {
            write!(f, "frame{}:", frame)?;
            if !self.entries.is_empty() {
                f.write_str(" ")?;
            }
        }
        let mut first = true;
        for entry in &self.entries {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            entry.fmt(f)?;
        }
        Ok(())
    }
}
