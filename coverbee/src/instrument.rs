//! Splicing counter updates into basic blocks.
//!
//! Every block gets a trailer that bumps the 16-bit counter at
//! `2 × block-index` of the shared coverage map value; every function entry
//! additionally gets a prologue that looks the map value up once and hoists
//! the pointer into a reserved frame slot. Only registers and stack slots
//! the verifier proved dead are touched directly; everything else is
//! spilled and restored around the update.
//!
//! The counter update is a plain load-add-store: concurrent executions on
//! other CPUs may lose increments, so collected counts are lower bounds.

use crate::cfg::Block;
use crate::consts::{
    COUNTER_LEN, HELPER_MAP_LOOKUP, MAX_FUNC_ARGS, REG_ARG_BASE, REG_FP, REG_RET,
    REG_SAVED_BASE, REG_SAVED_LAST, STACK_LEN, STACK_SLOT_LEN,
};
use crate::error::CoverageError;
use crate::merger::MergedState;

use coverbee_asm::consts::PSEUDO_CALL;
use coverbee_asm::{op, Instruction, JumpKind, RegisterId};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Frame slots reserved above the deepest offset the verifier ever saw for
/// the program, as positive depths below the frame pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Holds the looked-up map value pointer for the lifetime of a frame.
    pub cover_map: i32,
    /// First transient register-save slot; doubles as the lookup key slot.
    pub reg_save1: i32,
    /// Second transient register-save slot.
    pub reg_save2: i32,
}

impl FrameLayout {
    /// Compute the layout from the merged liveness observations.
    pub fn from_merged(merged: &[MergedState]) -> Self {
        let max_depth = merged
            .iter()
            .flat_map(|state| state.slots.iter())
            .map(|offset| -offset)
            .max()
            .unwrap_or(0)
            .max(0);

        Self {
            cover_map: max_depth + STACK_SLOT_LEN,
            reg_save1: max_depth + 2 * STACK_SLOT_LEN,
            reg_save2: max_depth + 3 * STACK_SLOT_LEN,
        }
    }

    /// Total frame bytes required, reserved slots included.
    pub fn frame_len(&self) -> i32 {
        self.reg_save2
    }
}

/// Negated depth, as the instruction offset operand.
fn fp_off(depth: i32) -> i16 {
    -(depth as i16)
}

/// Rewrite the blocks of one program and return the flattened instruction
/// stream. Jumps stay symbolic; run [`resolve_references`] once the
/// instruction positions are final.
///
/// `func_params` maps every function entry symbol, the program's own name
/// included, to its declared parameter count. A discovered entry with no
/// entry in the map fails the whole program: instrumenting it blind would
/// corrupt the frame.
pub fn instrument_program(
    blocks: &mut [Block],
    merged: &[MergedState],
    program_name: &str,
    func_params: &BTreeMap<String, usize>,
    map_symbol: &str,
) -> Result<Vec<Instruction>, CoverageError> {
    let layout = FrameLayout::from_merged(merged);
    if layout.frame_len() > STACK_LEN {
        return Err(CoverageError::StackExhausted {
            program: program_name.to_string(),
            needed: layout.frame_len(),
        });
    }

    let entries = entry_points(blocks, program_name);

    for index in 0..blocks.len() {
        let mut code = Vec::new();

        if let Some(symbol) = blocks[index].symbol() {
            if entries.contains(symbol) {
                let reg_cnt = func_params.get(symbol).copied().ok_or_else(|| {
                    CoverageError::MissingFunctionInfo(symbol.to_string())
                })?;
                if reg_cnt > MAX_FUNC_ARGS {
                    return Err(CoverageError::MissingFunctionInfo(symbol.to_string()));
                }
                code.extend(function_prologue(reg_cnt, &layout, map_symbol));
            }
        }

        let block = &mut blocks[index];
        let free = free_registers(merged.get(block.raw_start));
        code.extend(counter_trailer(block.index, &free, &layout));

        // Move the block's symbol onto the inserted code so every jump and
        // call lands before the counter update.
        if let Some(symbol) = block.instructions[0].take_symbol() {
            code[0].set_symbol(symbol);
        }
        code.append(&mut block.instructions);
        block.instructions = code;
    }

    debug!(
        program = program_name,
        blocks = blocks.len(),
        frame_len = layout.frame_len(),
        "instrumented program"
    );

    Ok(blocks
        .iter()
        .flat_map(|block| block.instructions.iter().cloned())
        .collect_vec())
}

/// Function entry symbols: the program's own entry plus the reference of
/// every byte-code-to-byte-code call.
fn entry_points(blocks: &[Block], program_name: &str) -> BTreeSet<String> {
    let mut entries = BTreeSet::new();
    entries.insert(program_name.to_string());

    for instruction in blocks.iter().flat_map(|block| &block.instructions) {
        if instruction.opcode().jump_kind() == Some(JumpKind::Call)
            && instruction.src() == PSEUDO_CALL
        {
            if let Some(callee) = instruction.reference() {
                entries.insert(callee.to_string());
            }
        }
    }

    entries
}

/// Registers proven dead at a block entry.
///
/// An empty merged state means the verifier never reported on the
/// instruction (pruned or unexplored); every register is treated as live
/// there and the trailer falls back to spilling.
fn free_registers(state: Option<&MergedState>) -> Vec<RegisterId> {
    match state {
        Some(state) if !state.is_empty() => (REG_RET..=REG_SAVED_LAST)
            .filter(|reg| !state.registers.contains(reg))
            .collect(),
        _ => Vec::new(),
    }
}

/// The per-block counter update.
fn counter_trailer(block_index: usize, free: &[RegisterId], layout: &FrameLayout) -> Vec<Instruction> {
    let mut spills: Vec<(RegisterId, i32)> = Vec::new();

    let map_val = free.first().copied().unwrap_or_else(|| {
        spills.push((8, layout.reg_save1));
        8
    });
    let counter = free.get(1).copied().unwrap_or_else(|| {
        let reg = if map_val == 8 { 9 } else { 8 };
        let slot = if spills.is_empty() {
            layout.reg_save1
        } else {
            layout.reg_save2
        };
        spills.push((reg, slot));
        reg
    });

    let counter_off = (COUNTER_LEN * block_index) as i16;
    let mut code = Vec::new();

    for (reg, slot) in &spills {
        code.push(op::stxdw(REG_FP, fp_off(*slot), *reg));
    }
    code.push(op::ldxdw(map_val, REG_FP, fp_off(layout.cover_map)));
    code.push(op::ldxh(counter, map_val, counter_off));
    code.push(op::addi(counter, 1));
    code.push(op::stxh(map_val, counter_off, counter));
    for (reg, slot) in spills.iter().rev() {
        code.push(op::ldxdw(*reg, REG_FP, fp_off(*slot)));
    }

    code
}

/// The per-function map lookup.
///
/// Arguments are parked in the callee-preserved registers across the helper
/// call; with five arguments `R5` overflows the four parking slots and goes
/// through the second save slot instead.
fn function_prologue(reg_cnt: usize, layout: &FrameLayout, map_symbol: &str) -> Vec<Instruction> {
    let mut code = Vec::new();

    // The verifier rejects spills of uninitialized registers; define every
    // register the trailers may park or spill.
    code.push(op::movi(REG_RET, 0));
    for reg in (reg_cnt as RegisterId + 1)..=REG_SAVED_LAST {
        code.push(op::movi(reg, 0));
    }

    if reg_cnt == MAX_FUNC_ARGS {
        code.push(op::stxdw(REG_FP, fp_off(layout.reg_save2), 5));
    }
    let parked = reg_cnt.min(MAX_FUNC_ARGS - 1) as RegisterId;
    for arg in 0..parked {
        code.push(op::mov(REG_SAVED_BASE + arg, REG_ARG_BASE + arg));
    }

    code.push(op::lddw_map(1, map_symbol));
    code.push(op::stw_imm(REG_FP, fp_off(layout.reg_save1), 0));
    code.push(op::mov(2, REG_FP));
    code.push(op::addi(2, -layout.reg_save1));
    code.push(op::call_helper(HELPER_MAP_LOOKUP));
    code.push(op::jne_imm(REG_RET, 0, 2));
    code.push(op::movi(REG_RET, -1));
    code.push(op::exit());
    code.push(op::stxdw(REG_FP, fp_off(layout.cover_map), REG_RET));

    for arg in 0..parked {
        code.push(op::mov(REG_ARG_BASE + arg, REG_SAVED_BASE + arg));
    }
    if reg_cnt == MAX_FUNC_ARGS {
        code.push(op::ldxdw(5, REG_FP, fp_off(layout.reg_save2)));
    }

    code
}

/// Recompute numeric jump offsets and byte-code call immediates from symbol
/// positions. Map references are left for the loader's relocation pass.
pub fn resolve_references(instructions: &mut [Instruction]) -> Result<(), CoverageError> {
    let mut raw_offsets = Vec::with_capacity(instructions.len());
    let mut offset = 0usize;
    for instruction in instructions.iter() {
        raw_offsets.push(offset);
        offset += instruction.raw_slots();
    }

    let by_symbol: BTreeMap<String, usize> = instructions
        .iter()
        .enumerate()
        .filter_map(|(position, instruction)| {
            instruction
                .symbol()
                .map(|symbol| (symbol.to_string(), raw_offsets[position]))
        })
        .collect();

    for position in 0..instructions.len() {
        let reference = match instructions[position].reference() {
            Some(reference) => reference.to_string(),
            None => continue,
        };

        let resolve = |label: &str| {
            by_symbol.get(label).copied().ok_or_else(|| {
                CoverageError::UnresolvedReference {
                    offset: raw_offsets[position],
                    label: label.to_string(),
                }
            })
        };

        match instructions[position].opcode().jump_kind() {
            Some(JumpKind::Conditional) | Some(JumpKind::Unconditional) => {
                let target = resolve(&reference)?;
                let relative = target as i64 - raw_offsets[position] as i64 - 1;
                instructions[position].set_offset(relative as i16);
            }
            Some(JumpKind::Call) if instructions[position].src() == PSEUDO_CALL => {
                let target = resolve(&reference)?;
                let relative = target as i64 - raw_offsets[position] as i64 - 1;
                instructions[position].set_imm(relative);
            }
            _ => {}
        }
    }

    Ok(())
}
