use coverbee::cfg::build_blocks;
use coverbee_asm::op;

use std::collections::BTreeSet;

/// The three-block shape: a conditional jump over one arm into another.
fn branching_program() -> Vec<coverbee_asm::Instruction> {
    vec![
        op::movi(0, 1).with_symbol("sample"),
        op::jeq_imm(0, 1, 2),
        op::movi(1, 2),
        op::exit(),
        op::movi(1, 3),
        op::exit(),
    ]
}

#[test]
fn branching_program_splits_into_three_blocks() {
    let blocks = build_blocks(branching_program()).expect("blocks");

    assert_eq!(blocks.len(), 3);

    // The jump target carries the synthesized label.
    assert_eq!(blocks[2].symbol(), Some("j-4"));
    assert_eq!(blocks[2].raw_start, 4);

    // Block 0 branches into block 2 and falls through into block 1.
    assert_eq!(blocks[0].branch, Some(2));
    assert_eq!(blocks[0].fall_through, Some(1));

    // Both exit blocks have no successors.
    for exit_block in &blocks[1..] {
        assert_eq!(exit_block.fall_through, None);
        assert_eq!(exit_block.branch, None);
    }
}

#[test]
fn jumps_are_rewritten_symbolically() {
    let blocks = build_blocks(branching_program()).expect("blocks");

    let jump = blocks[0].instructions.last().expect("jump");
    assert_eq!(jump.reference(), Some("j-4"));
    assert_eq!(jump.offset(), -1);
}

#[test]
fn block_symbols_are_present_and_unique() {
    let blocks = build_blocks(branching_program()).expect("blocks");

    let symbols: Vec<&str> = blocks
        .iter()
        .map(|block| block.symbol().expect("every block starts with a symbol"))
        .collect();
    let unique: BTreeSet<&str> = symbols.iter().copied().collect();

    assert_eq!(symbols.len(), unique.len());
    assert_eq!(symbols[0], "sample");
}

#[test]
fn every_jump_reference_matches_a_block_symbol() {
    let blocks = build_blocks(branching_program()).expect("blocks");

    let symbols: BTreeSet<&str> = blocks.iter().filter_map(|block| block.symbol()).collect();

    for instruction in blocks.iter().flat_map(|block| &block.instructions) {
        if let Some(reference) = instruction.reference() {
            assert!(
                symbols.contains(reference),
                "reference {reference:?} resolves to a block"
            );
        }
    }
}

#[test]
fn blocks_are_never_empty_and_cover_the_program() {
    let blocks = build_blocks(branching_program()).expect("blocks");

    let total: usize = blocks.iter().map(|block| block.instructions.len()).sum();
    assert_eq!(total, 6);
    assert!(blocks.iter().all(|block| !block.instructions.is_empty()));

    // Only the first instruction of a block may bear a symbol.
    for block in &blocks {
        for instruction in &block.instructions[1..] {
            assert_eq!(instruction.symbol(), None);
        }
    }
}
