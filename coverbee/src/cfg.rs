//! Basic-block decomposition of an instruction stream.
//!
//! Jump targets are renamed to synthesized `j-<raw-offset>` labels and every
//! jump is rewritten to reference its target symbolically, so inserting
//! instructions later can never corrupt a branch: final offsets are
//! recomputed from symbol positions at emission time.
//!
//! Blocks form an arena; successor edges are indices into it, which keeps
//! loops free of ownership cycles.

use crate::error::CoverageError;

use coverbee_asm::{Instruction, JumpKind};
use std::collections::BTreeMap;

/// A basic block and its successor edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// Index of this block; doubles as its counter slot in the coverage map.
    pub index: usize,
    /// Raw offset of the first instruction in the original program.
    pub raw_start: usize,
    /// The instructions of the block. The first one always carries a symbol.
    pub instructions: Vec<Instruction>,
    /// Block executed when the last instruction falls through.
    pub fall_through: Option<usize>,
    /// Block targeted when the last instruction branches.
    pub branch: Option<usize>,
}

impl Block {
    /// The symbol of the block's first instruction.
    pub fn symbol(&self) -> Option<&str> {
        self.instructions.first().and_then(Instruction::symbol)
    }
}

/// Synthesized label for a jump target at `raw_offset`.
fn jump_label(raw_offset: usize) -> String {
    format!("j-{}", raw_offset)
}

/// Decompose `instructions` into linked basic blocks.
pub fn build_blocks(mut instructions: Vec<Instruction>) -> Result<Vec<Block>, CoverageError> {
    // Raw offsets, accounting for the two slots of a double-word load.
    let mut raw_offsets = Vec::with_capacity(instructions.len());
    let mut offset = 0usize;
    for instruction in &instructions {
        raw_offsets.push(offset);
        offset += instruction.raw_slots();
    }

    let positions: BTreeMap<usize, usize> = raw_offsets
        .iter()
        .enumerate()
        .map(|(position, raw)| (*raw, position))
        .collect();

    // Symbolize every branch: the target grows a label, the jump drops its
    // numeric offset in favor of a reference.
    for position in 0..instructions.len() {
        let kind = instructions[position].opcode().jump_kind();
        if !matches!(
            kind,
            Some(JumpKind::Unconditional) | Some(JumpKind::Conditional)
        ) {
            continue;
        }

        let raw = raw_offsets[position];
        let target_raw = raw as i64 + i64::from(instructions[position].offset()) + 1;
        let Some(target) = usize::try_from(target_raw)
            .ok()
            .and_then(|target| positions.get(&target).copied())
        else {
            return Err(CoverageError::UnresolvedReference {
                offset: raw,
                label: jump_label(target_raw.max(0) as usize),
            });
        };

        // A function entry keeps its name; jumps into it reference that name.
        let label = match instructions[target].symbol() {
            Some(existing) => existing.to_string(),
            None => {
                let label = jump_label(raw_offsets[target]);
                instructions[target].set_symbol(label.clone());
                label
            }
        };

        instructions[position].set_reference(label);
        instructions[position].set_offset(-1);
    }

    // Split into blocks at symbols and after jumps.
    let mut blocks: Vec<Block> = Vec::new();
    let mut current = Block::default();
    let mut previous_was_jump = false;

    for (position, instruction) in instructions.into_iter().enumerate() {
        let boundary = previous_was_jump || instruction.symbol().is_some();
        if boundary && !current.instructions.is_empty() {
            blocks.push(current);
            current = Block::default();
        }
        if current.instructions.is_empty() {
            current.index = blocks.len();
            current.raw_start = raw_offsets[position];
        }

        previous_was_jump = instruction.opcode().is_jump();
        current.instructions.push(instruction);
    }
    if !current.instructions.is_empty() {
        blocks.push(current);
    }

    // Fall-through starts get a synthesized label too, so every block's
    // first instruction carries a symbol.
    for block in &mut blocks {
        if block.symbol().is_none() {
            let label = jump_label(block.raw_start);
            if let Some(first) = block.instructions.first_mut() {
                first.set_symbol(label);
            }
        }
    }

    link_blocks(&mut blocks)?;

    Ok(blocks)
}

fn link_blocks(blocks: &mut [Block]) -> Result<(), CoverageError> {
    let by_symbol: BTreeMap<String, usize> = blocks
        .iter()
        .enumerate()
        .filter_map(|(index, block)| block.symbol().map(|symbol| (symbol.to_string(), index)))
        .collect();

    for index in 0..blocks.len() {
        let next = if index + 1 < blocks.len() {
            Some(index + 1)
        } else {
            None
        };

        let Some(last) = blocks[index].instructions.last() else {
            continue;
        };
        let raw_start = blocks[index].raw_start;

        let (fall_through, branch) = match last.opcode().jump_kind() {
            Some(JumpKind::Exit) => (None, None),
            Some(JumpKind::Unconditional) => (None, Some(branch_target(last, raw_start, &by_symbol)?)),
            Some(JumpKind::Conditional) => {
                (next, Some(branch_target(last, raw_start, &by_symbol)?))
            }
            // A call's reference names the callee; the return point is the
            // fall-through block.
            Some(JumpKind::Call) | None => (next, None),
        };

        blocks[index].fall_through = fall_through;
        blocks[index].branch = branch;
    }

    Ok(())
}

fn branch_target(
    jump: &Instruction,
    raw_start: usize,
    by_symbol: &BTreeMap<String, usize>,
) -> Result<usize, CoverageError> {
    let label = jump.reference().unwrap_or_default();

    by_symbol
        .get(label)
        .copied()
        .ok_or_else(|| CoverageError::UnresolvedReference {
            offset: raw_start,
            label: label.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use coverbee_asm::op;

    #[test]
    fn branch_into_loop_head_keeps_function_symbol() {
        // 0: entry, 1: jump back to the entry.
        let program = vec![
            op::movi(0, 0).with_symbol("sample"),
            op::jeq_imm(0, 0, -2),
        ];

        let blocks = build_blocks(program).expect("blocks");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].symbol(), Some("sample"));
        assert_eq!(blocks[0].branch, Some(0));
        assert_eq!(
            blocks[0].instructions.last().expect("jump").reference(),
            Some("sample")
        );
    }

    #[test]
    fn wide_load_offsets_are_raw() {
        // The jump skips over the two-slot load: raw target is 0 + 3 + 1.
        let program = vec![
            op::ja(3).with_symbol("sample"),
            op::lddw_map(1, "some_map"),
            op::movi(0, 0),
            op::exit(),
        ];

        let blocks = build_blocks(program).expect("blocks");
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].raw_start, 4);
        assert_eq!(blocks[2].symbol(), Some("j-4"));
        assert_eq!(blocks[0].branch, Some(2));
        assert_eq!(blocks[0].fall_through, None);
    }

    #[test]
    fn out_of_range_jump_is_rejected() {
        let program = vec![op::ja(7).with_symbol("sample"), op::exit()];

        match build_blocks(program) {
            Err(CoverageError::UnresolvedReference { offset, .. }) => assert_eq!(offset, 0),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
