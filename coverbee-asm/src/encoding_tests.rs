use crate::op;
use crate::opcode::consts::*;
use crate::{JumpKind, Opcode, OpcodeClass};

#[test]
fn emitted_opcodes_classify() {
    assert_eq!(Opcode::new(OP_MOV64_IMM).class(), OpcodeClass::Move);
    assert_eq!(Opcode::new(OP_MOV64_REG).class(), OpcodeClass::Move);
    assert_eq!(Opcode::new(OP_ADD64_IMM).class(), OpcodeClass::Arithmetic);
    assert_eq!(Opcode::new(OP_LDDW).class(), OpcodeClass::LoadImmDw);
    assert_eq!(Opcode::new(OP_LDXDW).class(), OpcodeClass::Load);
    assert_eq!(Opcode::new(OP_LDXH).class(), OpcodeClass::Load);
    assert_eq!(Opcode::new(OP_STXDW).class(), OpcodeClass::Store);
    assert_eq!(Opcode::new(OP_STXH).class(), OpcodeClass::Store);
    assert_eq!(Opcode::new(OP_STW_IMM).class(), OpcodeClass::Store);
    assert_eq!(
        Opcode::new(OP_JA).class(),
        OpcodeClass::Jump(JumpKind::Unconditional)
    );
    assert_eq!(
        Opcode::new(OP_JEQ_IMM).class(),
        OpcodeClass::Jump(JumpKind::Conditional)
    );
    assert_eq!(
        Opcode::new(OP_CALL).class(),
        OpcodeClass::Jump(JumpKind::Call)
    );
    assert_eq!(
        Opcode::new(OP_EXIT).class(),
        OpcodeClass::Jump(JumpKind::Exit)
    );
}

#[test]
fn jump32_has_no_call_or_exit() {
    // The CALL/EXIT bit patterns in the 32-bit jump class are conditional
    // encodings, not control transfers out of the function.
    let call32 = Opcode::new(CLASS_JMP32 | JMP_CALL);
    let exit32 = Opcode::new(CLASS_JMP32 | JMP_EXIT);

    assert_eq!(call32.jump_kind(), Some(JumpKind::Conditional));
    assert_eq!(exit32.jump_kind(), Some(JumpKind::Conditional));
}

#[test]
fn raw_encoding_packs_fields() {
    let (raw, high) = op::movi(8, 0).to_raw();
    assert_eq!(raw, 0x08b7);
    assert!(high.is_none());

    let (raw, _) = op::ldxh(2, 7, 46).to_raw();
    assert_eq!(raw & 0xff, u64::from(OP_LDXH));
    assert_eq!((raw >> 8) & 0xff, 0x72); // src 7, dst 2
    assert_eq!((raw >> 16) & 0xffff, 46);

    let (raw, _) = op::addi(3, -1).to_raw();
    assert_eq!(raw >> 32, u64::from(u32::MAX));
}

#[test]
fn wide_load_occupies_two_slots() {
    let lddw = op::lddw_map(1, "covermap");
    assert_eq!(lddw.raw_slots(), 2);
    assert_eq!(lddw.src(), PSEUDO_MAP_FD);
    assert_eq!(lddw.reference(), Some("covermap"));

    let (_, high) = lddw.to_raw();
    assert_eq!(high, Some(0));

    assert_eq!(op::exit().raw_slots(), 1);
}

#[test]
fn display_matches_verifier_syntax() {
    assert_eq!(op::movi(0, -1).to_string(), "r0 = -1");
    assert_eq!(op::mov(6, 1).to_string(), "r6 = r1");
    assert_eq!(op::addi(9, 1).to_string(), "r9 += 1");
    assert_eq!(
        op::ldxh(2, 7, 46).to_string(),
        "r2 = *(u16 *)(r7 +46)"
    );
    assert_eq!(
        op::stxdw(10, -8, 0).to_string(),
        "*(u64 *)(r10 -8) = r0"
    );
    assert_eq!(op::stw_imm(10, -16, 0).to_string(), "*(u32 *)(r10 -16) = 0");
    assert_eq!(op::ja(4).to_string(), "goto +4");
    assert_eq!(
        op::jne_imm(0, 0, 2).to_string(),
        "if r0 != 0 goto +2"
    );
    assert_eq!(op::call_helper(1).to_string(), "call 1");
    assert_eq!(op::exit().to_string(), "exit");

    let jump = op::jeq_imm(0, 1, -1).with_reference("j-4");
    assert_eq!(jump.to_string(), "if r0 == 1 goto j-4");
}

#[test]
fn symbol_round_trip() {
    let mut insn = op::movi(0, 0).with_symbol("entry");
    assert_eq!(insn.symbol(), Some("entry"));
    assert_eq!(insn.take_symbol().as_deref(), Some("entry"));
    assert_eq!(insn.symbol(), None);
}
