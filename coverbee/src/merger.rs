//! Folding the statement stream into per-instruction liveness observations.
//!
//! The merger is structural, not semantic: only *which* registers and stack
//! slots appear anywhere in the verifier's exploration of an instruction
//! matters, never the value details. A register absent from the merged state
//! at an index was never mentioned on any explored path and is proven dead
//! there.

use crate::verifier::{Statement, StateEntry, VerifierState};

use coverbee_asm::RegisterId;
use std::collections::BTreeSet;

/// Union of register and stack-slot keys observed at one instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedState {
    /// Registers mentioned by any snapshot.
    pub registers: BTreeSet<RegisterId>,
    /// Stack slots mentioned by any snapshot, by signed frame offset.
    pub slots: BTreeSet<i32>,
}

impl MergedState {
    /// `true` when the verifier never reported on this instruction.
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty() && self.slots.is_empty()
    }

    fn from_state(state: &VerifierState) -> Self {
        let mut merged = Self::default();
        merged.absorb(state);
        merged
    }

    fn absorb(&mut self, state: &VerifierState) {
        for entry in &state.entries {
            match entry {
                StateEntry::Register(reg) => {
                    self.registers.insert(reg.reg);
                }
                StateEntry::Stack(slot) => {
                    self.slots.insert(slot.offset);
                }
                StateEntry::Opaque(_) => {}
            }
        }
    }

    fn union(&mut self, other: &Self) {
        self.registers.extend(other.registers.iter().copied());
        self.slots.extend(other.slots.iter().copied());
    }
}

/// Fold a statement stream into the per-instruction merged state.
///
/// The walk keeps a single *current state* accumulator and publishes it
/// whenever the verifier prints an instruction:
///
/// - returning from a callee replaces the accumulator with the caller state;
/// - a branch evaluation replaces it with the state of the newly explored
///   permutation;
/// - a recap merges its (changed-keys-only) entries in;
/// - an instruction line publishes first, then merges its state diff;
/// - everything else leaves the accumulator untouched.
///
/// The output grows on demand; indices the verifier never printed stay
/// empty.
pub fn merge_statements(statements: &[Statement]) -> Vec<MergedState> {
    let mut merged: Vec<MergedState> = Vec::new();
    let mut current = MergedState::default();

    for statement in statements {
        match statement {
            Statement::ReturnFunctionCall { caller, .. } => {
                current = MergedState::from_state(caller);
            }
            Statement::BranchEvaluation { state, .. } => {
                current = MergedState::from_state(state);
            }
            Statement::RecapState { state, .. } => {
                current.absorb(state);
            }
            Statement::InstructionState { instruction, state } => {
                publish(&mut merged, instruction.index, &current);
                current.absorb(state);
            }
            Statement::Instruction(instruction) => {
                publish(&mut merged, instruction.index, &current);
            }
            _ => {}
        }
    }

    merged
}

fn publish(merged: &mut Vec<MergedState>, index: usize, current: &MergedState) {
    if merged.len() <= index {
        merged.resize_with(index + 1, MergedState::default);
    }
    merged[index].union(current);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::parse_log;

    #[test]
    fn instruction_publishes_before_absorbing() {
        let log = "\
0: R1=ctx(id=0,off=0,imm=0) R10=fp0
0: (b7) r8 = 0 ; R8_w=inv0
1: (95) exit";
        let merged = merge_statements(&parse_log(log));

        assert_eq!(merged.len(), 2);
        // The diff of instruction 0 lands on the accumulator, not on index 0.
        assert_eq!(
            merged[0].registers.iter().copied().collect::<Vec<_>>(),
            vec![1, 10]
        );
        assert_eq!(
            merged[1].registers.iter().copied().collect::<Vec<_>>(),
            vec![1, 8, 10]
        );
    }

    #[test]
    fn branch_evaluation_replaces_accumulator() {
        let log = "\
0: R1=ctx(id=0,off=0,imm=0) R10=fp0
0: (b7) r8 = 0 ; R8_w=inv0
from 0 to 4: R0=inv0 R10=fp0
4: (95) exit";
        let merged = merge_statements(&parse_log(log));

        assert_eq!(merged.len(), 5);
        assert!(merged[2].is_empty());
        assert_eq!(
            merged[4].registers.iter().copied().collect::<Vec<_>>(),
            vec![0, 10]
        );
    }

    #[test]
    fn return_restores_caller_state() {
        let log = "\
8: (85) call pc+2
returning from callee:
 frame1: R0_w=inv0 R10=fp0
to caller at 9:
 R0_w=inv0 R6=ctx(id=0,off=0,imm=0) R10=fp0
9: (95) exit";
        let merged = merge_statements(&parse_log(log));

        assert_eq!(
            merged[9].registers.iter().copied().collect::<Vec<_>>(),
            vec![0, 6, 10]
        );
    }

    #[test]
    fn stack_slots_accumulate() {
        let log = "\
3: (7b) *(u64 *)(r10 -16) = r1 ; R1_w=inv0 fp-16_w=mmmmmmmm
4: (95) exit";
        let merged = merge_statements(&parse_log(log));

        assert!(merged[3].slots.is_empty());
        assert_eq!(merged[4].slots.iter().copied().collect::<Vec<_>>(), vec![-16]);
        assert_eq!(
            merged[4].registers.iter().copied().collect::<Vec<_>>(),
            vec![1]
        );
    }

    #[test]
    fn published_sets_only_grow() {
        let log = "\
0: (b7) r8 = 0 ; R8_w=inv0
from 4 to 0: R6=ctx(id=0,off=0,imm=0) R10=fp0
0: (b7) r8 = 0 ; R8_w=inv0";
        let merged = merge_statements(&parse_log(log));

        // First visit published {}, second visit published {R6, R10}; the
        // union keeps everything ever observed.
        assert_eq!(
            merged[0].registers.iter().copied().collect::<Vec<_>>(),
            vec![6, 10]
        );
    }
}
