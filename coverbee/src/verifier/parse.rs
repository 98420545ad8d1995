//! Line-oriented parsing of the verifier diagnostic.

use crate::verifier::state::{
    Liveness, SlotByte, SlotValue, StackEntry, StateEntry, RegisterEntry, VerifierState,
};
use crate::verifier::statement::{
    BackTrack, LoggedInstruction, PrecisionTarget, Statement, VerifierStats,
};
use crate::verifier::value::RegisterValue;

use coverbee_asm::Opcode;
use std::str::Lines;
use tracing::debug;

/// Parse a complete diagnostic into its statement stream.
///
/// Lines that fit no known shape come back as [`Statement::Unknown`]; lines
/// that matched a shape but broke mid-way come back as [`Statement::Error`].
/// Parsing never fails.
pub fn parse_log(text: &str) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        statements.push(parse_statement(line, &mut lines));
    }

    statements
}

fn parse_statement(line: &str, lines: &mut Lines<'_>) -> Statement {
    let trimmed = line.trim();

    if let Some(comment) = trimmed.strip_prefix(';') {
        return Statement::Comment(comment.trim().to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("func#") {
        return sub_prog_location(line, rest);
    }
    if let Some(rest) = trimmed.strip_prefix("propagating ") {
        return propagate_precision(line, rest);
    }
    if let Some(rest) = trimmed.strip_prefix("last_idx ") {
        return back_tracking_header(line, rest);
    }
    if trimmed.starts_with("regs=") {
        return back_track_instruction(line, trimmed);
    }
    if let Some(rest) = trimmed.strip_prefix("parent ") {
        return back_tracking_trailer(line, rest);
    }
    if trimmed == "caller:" {
        return function_call(line, lines);
    }
    if trimmed == "returning from callee:" {
        return return_function_call(line, lines);
    }
    if let Some(rest) = trimmed.strip_prefix("processed ") {
        return verifier_done(line, rest);
    }
    if let Some(rest) = trimmed.strip_prefix("from ") {
        return branch_evaluation(line, rest);
    }
    if let Some((index, rest)) = split_index(trimmed) {
        return indexed_line(line, index, rest);
    }

    if !trimmed.is_empty() {
        debug!(line, "unrecognized verifier line");
    }
    Statement::Unknown(line.to_string())
}

fn error(line: &str, reason: &str) -> Statement {
    Statement::Error {
        line: line.to_string(),
        reason: reason.to_string(),
    }
}

/// `N: rest` with a purely numeric index.
fn split_index(s: &str) -> Option<(usize, &str)> {
    let colon = s.find(':')?;
    let index = s[..colon].parse().ok()?;
    Some((index, s[colon + 1..].trim_start()))
}

fn indexed_line(line: &str, index: usize, rest: &str) -> Statement {
    if rest == "safe" {
        return Statement::StatePruned {
            from: index,
            to: index,
        };
    }

    if rest.starts_with('(') {
        return match parse_logged(index, rest) {
            Some((instruction, Some(state))) => Statement::InstructionState {
                instruction,
                state: parse_state(state),
            },
            Some((instruction, None)) => Statement::Instruction(instruction),
            None => error(line, "malformed instruction"),
        };
    }

    Statement::RecapState {
        index,
        state: parse_state(rest),
    }
}

/// `(XX) <asm>` with an optional ` ; <state>` tail.
fn parse_logged(index: usize, rest: &str) -> Option<(LoggedInstruction, Option<&str>)> {
    let inner = rest.strip_prefix('(')?;
    let close = inner.find(')')?;
    let opcode = u8::from_str_radix(&inner[..close], 16).ok()?;
    let after = inner[close + 1..].trim_start();

    let (text, state) = match after.find(" ; ") {
        Some(pos) => (after[..pos].trim_end(), Some(after[pos + 3..].trim_start())),
        None => (after, None),
    };

    let instruction = LoggedInstruction {
        index,
        opcode: Opcode::new(opcode),
        text: text.to_string(),
    };

    Some((instruction, state))
}

fn sub_prog_location(line: &str, rest: &str) -> Statement {
    let parsed = (|| {
        let (id, start) = rest.split_once(" @")?;
        Some(Statement::SubProgLocation {
            id: id.parse().ok()?,
            start: start.trim().parse().ok()?,
        })
    })();

    parsed.unwrap_or_else(|| error(line, "malformed sub-program location"))
}

fn propagate_precision(line: &str, rest: &str) -> Statement {
    let target = if let Some(reg) = rest.strip_prefix('r') {
        reg.parse().ok().map(PrecisionTarget::Register)
    } else if let Some(offset) = rest.strip_prefix("fp") {
        offset.parse().ok().map(PrecisionTarget::Stack)
    } else {
        None
    };

    match target {
        Some(target) => Statement::PropagatePrecision(target),
        None => error(line, "malformed precision target"),
    }
}

fn back_tracking_header(line: &str, rest: &str) -> Statement {
    let parsed = (|| {
        let (last, first) = rest.split_once(" first_idx ")?;
        Some(Statement::BackTrackingHeader {
            last_idx: last.trim().parse().ok()?,
            first_idx: first.trim().parse().ok()?,
        })
    })();

    parsed.unwrap_or_else(|| error(line, "malformed back-tracking header"))
}

fn back_track_instruction(line: &str, trimmed: &str) -> Statement {
    let parsed = (|| {
        let rest = trimmed.strip_prefix("regs=")?;
        let (regs, rest) = rest.split_once(' ')?;
        let rest = rest.strip_prefix("stack=")?;
        let (stack, rest) = rest.split_once(" before ")?;

        let (index, insn) = split_index(rest.trim_start())?;
        let (instruction, _) = parse_logged(index, insn)?;

        Some(Statement::BackTrackInstruction(BackTrack {
            regs: parse_hex_bytes(regs)?,
            stack: u64::from_str_radix(stack, 16).ok()?,
            instruction,
        }))
    })();

    parsed.unwrap_or_else(|| error(line, "malformed back-tracking instruction"))
}

fn back_tracking_trailer(line: &str, rest: &str) -> Statement {
    let parsed = (|| {
        let (parent_matched, rest) = if let Some(r) = rest.strip_prefix("didn't have ") {
            (false, r)
        } else if let Some(r) = rest.strip_prefix("already had ") {
            (true, r)
        } else {
            return None;
        };

        let rest = rest.strip_prefix("regs=")?;
        let (regs, rest) = rest.split_once(' ')?;
        let rest = rest.strip_prefix("stack=")?;
        let (stack, rest) = rest.split_once(" marks")?;
        let marks = rest.strip_prefix(':').unwrap_or(rest).trim();

        Some(Statement::BackTrackingTrailer {
            parent_matched,
            regs: parse_hex_bytes(regs)?,
            stack: u64::from_str_radix(stack, 16).ok()?,
            marks: parse_state(marks),
        })
    })();

    parsed.unwrap_or_else(|| error(line, "malformed back-tracking trailer"))
}

fn function_call(line: &str, lines: &mut Lines<'_>) -> Statement {
    let caller = match lines.next() {
        Some(state) => parse_state(state),
        None => return error(line, "truncated function-call block"),
    };

    match lines.next() {
        Some(marker) if marker.trim() == "callee:" => {}
        _ => return error(line, "function-call block without callee"),
    }

    match lines.next() {
        Some(state) => Statement::FunctionCall {
            caller,
            callee: parse_state(state),
        },
        None => error(line, "truncated function-call block"),
    }
}

fn return_function_call(line: &str, lines: &mut Lines<'_>) -> Statement {
    let callee = match lines.next() {
        Some(state) => parse_state(state),
        None => return error(line, "truncated return block"),
    };

    let call_site = match lines.next().and_then(|marker| {
        marker
            .trim()
            .strip_prefix("to caller at ")?
            .strip_suffix(':')?
            .parse()
            .ok()
    }) {
        Some(site) => site,
        None => return error(line, "return block without call site"),
    };

    match lines.next() {
        Some(state) => Statement::ReturnFunctionCall {
            callee,
            call_site,
            caller: parse_state(state),
        },
        None => error(line, "truncated return block"),
    }
}

fn verifier_done(line: &str, rest: &str) -> Statement {
    let parsed = (|| {
        let (processed, rest) = rest.split_once(" insns")?;
        let rest = rest.trim_start().strip_prefix("(limit ")?;
        let (limit, detail) = rest.split_once(')')?;

        Some(Statement::VerifierDone(VerifierStats {
            processed: processed.parse().ok()?,
            limit: limit.parse().ok()?,
            detail: detail.trim().to_string(),
        }))
    })();

    parsed.unwrap_or_else(|| error(line, "malformed summary line"))
}

fn branch_evaluation(line: &str, rest: &str) -> Statement {
    let parsed = (|| {
        let (from, rest) = rest.split_once(" to ")?;
        let (to, tail) = rest.split_once(':')?;
        let from = from.trim().parse().ok()?;
        let to = to.trim().parse().ok()?;
        let tail = tail.trim_start();

        if tail == "safe" {
            Some(Statement::StatePruned { from, to })
        } else {
            Some(Statement::BranchEvaluation {
                from,
                to,
                state: parse_state(tail),
            })
        }
    })();

    parsed.unwrap_or_else(|| error(line, "malformed branch evaluation"))
}

/// Big-endian bytes of a printed hex bitmap; odd-length input is
/// left-padded, so `100` becomes `[0x01, 0x00]`.
fn parse_hex_bytes(hex: &str) -> Option<Vec<u8>> {
    let padded;
    let hex = if hex.len() % 2 == 0 {
        hex
    } else {
        padded = format!("0{}", hex);
        &padded
    };

    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for i in (0..hex.len()).step_by(2) {
        bytes.push(u8::from_str_radix(hex.get(i..i + 2)?, 16).ok()?);
    }

    Some(bytes)
}

/// Parse a state snapshot. Tokens outside the grammar are preserved as
/// [`StateEntry::Opaque`], so this never fails.
pub fn parse_state(s: &str) -> VerifierState {
    let mut s = s.trim();
    let mut frame = None;

    if let Some(rest) = s.strip_prefix("frame") {
        if let Some((digits, tail)) = rest.split_once(':') {
            if let Ok(n) = digits.parse() {
                frame = Some(n);
                s = tail.trim_start();
            }
        }
    }

    let entries = split_state_tokens(s).into_iter().map(parse_entry).collect();

    VerifierState { frame, entries }
}

/// Split on whitespace, except inside parentheses.
fn split_state_tokens(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;

    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if c.is_whitespace() && depth == 0 {
            if let Some(from) = start.take() {
                tokens.push(&s[from..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(from) = start {
        tokens.push(&s[from..]);
    }

    tokens
}

fn parse_entry(token: &str) -> StateEntry {
    parse_register_entry(token)
        .or_else(|| parse_stack_entry(token))
        .unwrap_or_else(|| StateEntry::Opaque(token.to_string()))
}

fn parse_register_entry(token: &str) -> Option<StateEntry> {
    let (key, value) = match token.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None => (token, None),
    };

    let (key, liveness) = Liveness::strip(key);
    let reg = key.strip_prefix('R')?.parse().ok()?;

    let value = match value {
        Some(value) => Some(RegisterValue::parse(value)?),
        None => None,
    };

    Some(StateEntry::Register(RegisterEntry {
        reg,
        liveness,
        value,
    }))
}

fn parse_stack_entry(token: &str) -> Option<StateEntry> {
    let (key, value) = match token.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None => (token, None),
    };

    let (key, liveness) = Liveness::strip(key);
    let offset = key.strip_prefix("fp")?.parse().ok()?;

    let value = match value {
        Some(value) => parse_slot_value(value)?,
        None => SlotValue::None,
    };

    Some(StateEntry::Stack(StackEntry {
        offset,
        liveness,
        value,
    }))
}

fn parse_slot_value(value: &str) -> Option<SlotValue> {
    if value.len() == 8 {
        let mut bytes = [SlotByte::Invalid; 8];
        let mut all = true;
        for (slot, c) in bytes.iter_mut().zip(value.chars()) {
            match SlotByte::from_char(c) {
                Some(b) => *slot = b,
                None => {
                    all = false;
                    break;
                }
            }
        }
        if all {
            return Some(SlotValue::Bytes(bytes));
        }
    }

    RegisterValue::parse(value).map(SlotValue::Spill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::state::StateEntry;

    fn parse_one(line: &str) -> Statement {
        let mut statements = parse_log(line);
        assert_eq!(statements.len(), 1, "expected one statement for {line:?}");
        statements.remove(0)
    }

    #[test]
    fn comment_line() {
        let statement = parse_one("; if (data + 14 > data_end)");
        assert_eq!(
            statement,
            Statement::Comment("if (data + 14 > data_end)".to_string())
        );
    }

    #[test]
    fn sub_prog_location() {
        assert_eq!(
            parse_one("func#1 @8"),
            Statement::SubProgLocation { id: 1, start: 8 }
        );
    }

    #[test]
    fn precision_targets() {
        assert_eq!(
            parse_one("propagating r6"),
            Statement::PropagatePrecision(PrecisionTarget::Register(6))
        );
        assert_eq!(
            parse_one("propagating fp-16"),
            Statement::PropagatePrecision(PrecisionTarget::Stack(-16))
        );
    }

    #[test]
    fn back_tracking_walk() {
        assert_eq!(
            parse_one("last_idx 36 first_idx 20"),
            Statement::BackTrackingHeader {
                last_idx: 36,
                first_idx: 20
            }
        );

        let statement = parse_one("regs=100 stack=0 before 1: (b7) r8 = 0");
        match statement {
            Statement::BackTrackInstruction(backtrack) => {
                assert_eq!(backtrack.regs, vec![0x01, 0x00]);
                assert_eq!(backtrack.stack, 0);
                assert_eq!(backtrack.instruction.index, 1);
                assert_eq!(backtrack.instruction.opcode, Opcode::new(0xb7));
                assert_eq!(backtrack.instruction.text, "r8 = 0");
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn back_tracking_trailer_marks() {
        let statement =
            parse_one("parent didn't have regs=4 stack=0 marks: R0_rw R2_w R10=fp0");
        match statement {
            Statement::BackTrackingTrailer {
                parent_matched,
                regs,
                stack,
                marks,
            } => {
                assert!(!parent_matched);
                assert_eq!(regs, vec![0x04]);
                assert_eq!(stack, 0);
                assert_eq!(marks.entries.len(), 3);
                assert_eq!(marks.register(0).expect("R0").value, None);
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn pruned_forms() {
        assert_eq!(parse_one("25: safe"), Statement::StatePruned { from: 25, to: 25 });
        assert_eq!(
            parse_one("from 42 to 57: safe"),
            Statement::StatePruned { from: 42, to: 57 }
        );
    }

    #[test]
    fn branch_evaluation_state() {
        let statement = parse_one("from 84 to 40: frame1: R0=invP(id=0) R10=fp0");
        match statement {
            Statement::BranchEvaluation { from, to, state } => {
                assert_eq!((from, to), (84, 40));
                assert_eq!(state.frame, Some(1));

                let r0 = state.register(0).expect("R0").value.as_ref().expect("value");
                assert!(r0.is_scalar());
                assert!(r0.precise());

                let r10 = state.register(10).expect("R10").value.as_ref().expect("value");
                assert_eq!(r10.to_string(), "fp0");
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn instruction_with_state() {
        let line = "36: (69) r1 = *(u16 *)(r7 +46)        ; R1_w=inv(id=0,umax_value=65535,var_off=(0x0; 0xffff)) R7_w=map_value(id=0,off=0,ks=4,vs=100,imm=0)";
        match parse_one(line) {
            Statement::InstructionState { instruction, state } => {
                assert_eq!(instruction.index, 36);
                assert_eq!(instruction.opcode, Opcode::new(0x69));
                assert_eq!(instruction.text, "r1 = *(u16 *)(r7 +46)");

                assert_eq!(state.entries.len(), 2);
                let r1 = state.register(1).expect("R1");
                assert_eq!(r1.liveness, Liveness::Written);
                let value = r1.value.as_ref().expect("value");
                assert!(value.is_scalar());
                assert_eq!(value.int_attr("umax_value"), Some(65535));
                let tnum = value.var_off().expect("var_off");
                assert_eq!((tnum.value, tnum.mask), (0x0, 0xffff));

                let r7 = state.register(7).expect("R7").value.as_ref().expect("value");
                assert_eq!(r7.int_attr("ks"), Some(4));
                assert_eq!(r7.int_attr("vs"), Some(100));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn plain_instruction_and_recap() {
        assert_eq!(
            parse_one("3: (95) exit"),
            Statement::Instruction(LoggedInstruction {
                index: 3,
                opcode: Opcode::new(0x95),
                text: "exit".to_string(),
            })
        );

        match parse_one("9: R0=inv0 R6=ctx(id=0,off=0,imm=0)") {
            Statement::RecapState { index, state } => {
                assert_eq!(index, 9);
                assert_eq!(state.entries.len(), 2);
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn call_blocks() {
        let log = "caller:\n R6=ctx(id=0,off=0,imm=0) R10=fp0\ncallee:\n frame1: R1=ctx(id=0,off=0,imm=0) R10=fp0";
        let statements = parse_log(log);
        assert_eq!(statements.len(), 1);
        match &statements[0] {
            Statement::FunctionCall { caller, callee } => {
                assert_eq!(caller.frame, None);
                assert_eq!(callee.frame, Some(1));
            }
            other => panic!("unexpected statement {other:?}"),
        }

        let log = "returning from callee:\n frame1: R0_w=inv0 R10=fp0\nto caller at 9:\n R0_w=inv0 R10=fp0";
        let statements = parse_log(log);
        assert_eq!(statements.len(), 1);
        match &statements[0] {
            Statement::ReturnFunctionCall { call_site, callee, caller } => {
                assert_eq!(*call_site, 9);
                assert_eq!(callee.frame, Some(1));
                assert_eq!(caller.frame, None);
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn summary_line() {
        match parse_one("processed 520 insns (limit 1000000) max_states_per_insn 4 total_states 37") {
            Statement::VerifierDone(stats) => {
                assert_eq!(stats.processed, 520);
                assert_eq!(stats.limit, 1000000);
                assert_eq!(stats.detail, "max_states_per_insn 4 total_states 37");
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn stack_slots() {
        match parse_one("7: R10=fp0 fp-8=mmmm????") {
            Statement::RecapState { state, .. } => {
                let slot = state.stack().next().expect("slot");
                assert_eq!(slot.offset, -8);
                match &slot.value {
                    SlotValue::Bytes(bytes) => {
                        assert_eq!(bytes[0], SlotByte::Misc);
                        assert_eq!(bytes[7], SlotByte::Invalid);
                    }
                    other => panic!("unexpected slot value {other:?}"),
                }
            }
            other => panic!("unexpected statement {other:?}"),
        }

        match parse_one("12: fp-16=map_value(id=0,off=0,ks=4,vs=100,imm=0)") {
            Statement::RecapState { state, .. } => {
                let slot = state.stack().next().expect("slot");
                assert!(matches!(slot.value, SlotValue::Spill(_)));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn junk_degrades_to_unknown() {
        assert_eq!(
            parse_one("verification time 123 usec"),
            Statement::Unknown("verification time 123 usec".to_string())
        );

        // Opaque tokens inside an otherwise well-formed state survive.
        match parse_one("4: R1=something_new_here R10=fp0") {
            Statement::RecapState { state, .. } => {
                assert!(matches!(&state.entries[0], StateEntry::Opaque(t) if t == "R1=something_new_here"));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }
}
