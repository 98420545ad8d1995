//! The statement stream produced from a verifier diagnostic.

use crate::verifier::state::VerifierState;

use coverbee_asm::{Opcode, RegisterId};
use core::fmt;

/// An instruction as printed in the diagnostic: index, opcode byte, and the
/// assembly text kept verbatim for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedInstruction {
    /// Raw instruction index.
    pub index: usize,
    /// Opcode byte from the parenthesized hex pair.
    pub opcode: Opcode,
    /// Assembly text after the opcode.
    pub text: String,
}

impl fmt::Display for LoggedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ({:02x}) {}", self.index, self.opcode, self.text)
    }
}

/// Target of a precision-propagation line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionTarget {
    /// A register, `propagating r6`.
    Register(RegisterId),
    /// A stack slot, `propagating fp-16`.
    Stack(i32),
}

impl fmt::Display for PrecisionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(reg) => write!(f, "r{}", reg),
            Self::Stack(offset) => write!(f, "fp{}", offset),
        }
    }
}

/// A back-tracked instruction line with its register and stack bitmaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackTrack {
    /// Register bitmap, big-endian bytes of the printed hex.
    pub regs: Vec<u8>,
    /// Stack bitmap.
    pub stack: u64,
    /// The instruction being back-tracked over.
    pub instruction: LoggedInstruction,
}

/// Counters of the final summary line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierStats {
    /// Instructions processed.
    pub processed: u64,
    /// Processing limit.
    pub limit: u64,
    /// Remaining counters, preserved verbatim.
    pub detail: String,
}

/// One statement of the diagnostic.
///
/// Malformed lines become [`Statement::Unknown`]; lines that matched a shape
/// but failed mid-parse become [`Statement::Error`]. Parsing never aborts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// A source-line echo, leading `;`.
    Comment(String),
    /// `func#N @M`: a sub-program and its start instruction.
    SubProgLocation {
        /// Sub-program id.
        id: u32,
        /// First raw instruction index.
        start: usize,
    },
    /// `propagating rN` / `propagating fp-N`.
    PropagatePrecision(PrecisionTarget),
    /// `last_idx N first_idx M`: bounds of a back-tracking walk.
    BackTrackingHeader {
        /// Last instruction index of the walk.
        last_idx: usize,
        /// First instruction index of the walk.
        first_idx: usize,
    },
    /// `regs=HEX stack=HEX before N: (XX) …`.
    BackTrackInstruction(BackTrack),
    /// `parent (didn't have|already had) regs=… stack=… marks …`.
    BackTrackingTrailer {
        /// `true` for `already had`.
        parent_matched: bool,
        /// Register bitmap.
        regs: Vec<u8>,
        /// Stack bitmap.
        stack: u64,
        /// The propagated marks.
        marks: VerifierState,
    },
    /// The two-state block following a byte-code function call.
    FunctionCall {
        /// Caller state at the call site.
        caller: VerifierState,
        /// Callee state at entry.
        callee: VerifierState,
    },
    /// The block emitted when returning from a byte-code function.
    ReturnFunctionCall {
        /// Callee state at the return.
        callee: VerifierState,
        /// Call-site instruction index.
        call_site: usize,
        /// Caller state after the return.
        caller: VerifierState,
    },
    /// `N: safe` or `from N to M: safe`: the explored state was pruned.
    StatePruned {
        /// Start of the pruned range.
        from: usize,
        /// End of the pruned range.
        to: usize,
    },
    /// `from N to M: <state>`: the verifier switched to another branch.
    BranchEvaluation {
        /// Branch source index.
        from: usize,
        /// Branch target index.
        to: usize,
        /// State at the target.
        state: VerifierState,
    },
    /// An instruction line with a trailing state.
    InstructionState {
        /// The instruction.
        instruction: LoggedInstruction,
        /// The state diff after it.
        state: VerifierState,
    },
    /// An instruction line without state.
    Instruction(LoggedInstruction),
    /// `N: <state>`: a state recap without an instruction.
    RecapState {
        /// Instruction index.
        index: usize,
        /// Recapped entries; only changed keys are present.
        state: VerifierState,
    },
    /// `processed N insns (limit …)`.
    VerifierDone(VerifierStats),
    /// A line that matched a shape but failed mid-parse.
    Error {
        /// The offending line.
        line: String,
        /// What went wrong.
        reason: String,
    },
    /// Anything else.
    Unknown(String),
}

fn fmt_hex_bytes(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    let mut rendered = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        rendered.push_str(&format!("{:02x}", byte));
    }
    let trimmed = rendered.trim_start_matches('0');
    if trimmed.is_empty() {
        f.write_str("0")
    } else {
        f.write_str(trimmed)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comment(text) => write!(f, "; {}", text),
            Self::SubProgLocation { id, start } => write!(f, "func#{} @{}", id, start),
            Self::PropagatePrecision(target) => write!(f, "propagating {}", target),
            Self::BackTrackingHeader {
                last_idx,
                first_idx,
            } => write!(f, "last_idx {} first_idx {}", last_idx, first_idx),
            Self::BackTrackInstruction(backtrack) => {
                f.write_str("regs=")?;
                fmt_hex_bytes(f, &backtrack.regs)?;
                write!(
                    f,
                    " stack={:x} before {}",
                    backtrack.stack, backtrack.instruction
                )
            }
            Self::BackTrackingTrailer {
                parent_matched,
                regs,
                stack,
                marks,
            } => {
                let verb = if *parent_matched {
                    "already had"
                } else {
                    "didn't have"
                };
                write!(f, "parent {} regs=", verb)?;
                fmt_hex_bytes(f, regs)?;
                write!(f, " stack={:x} marks:", stack)?;
                if !marks.entries.is_empty() || marks.frame.is_some() {
                    write!(f, " {}", marks)?;
                }
                Ok(())
            }
            Self::FunctionCall { caller, callee } => {
                write!(f, "caller:\n {}\ncallee:\n {}", caller, callee)
            }
            Self::ReturnFunctionCall {
                callee,
                call_site,
                caller,
            } => write!(
                f,
                "returning from callee:\n {}\nto caller at {}:\n {}",
                callee, call_site, caller
            ),
            Self::StatePruned { from, to } => {
                if from == to {
                    write!(f, "{}: safe", from)
                } else {
                    write!(f, "from {} to {}: safe", from, to)
                }
            }
            Self::BranchEvaluation { from, to, state } => {
                write!(f, "from {} to {}: {}", from, to, state)
            }
            Self::InstructionState { instruction, state } => {
                write!(f, "{} ; {}", instruction, state)
            }
            Self::Instruction(instruction) => instruction.fmt(f),
            Self::RecapState { index, state } => write!(f, "{}: {}", index, state),
            Self::VerifierDone(stats) => {
                write!(f, "processed {} insns (limit {})", stats.processed, stats.limit)?;
                if !stats.detail.is_empty() {
                    write!(f, " {}", stats.detail)?;
                }
                Ok(())
            }
            Self::Error { line, .. } => f.write_str(line),
            Self::Unknown(line) => f.write_str(line),
        }
    }
}
