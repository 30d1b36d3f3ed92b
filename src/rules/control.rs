//! Control-flow rules (spec §4.E).
//!
//! Dead code after `RETURN_VALUE` is handled by the caller in
//! [`super::run_local_rules`] (it's a truncation, not a splice). The two
//! fusions here ([`simplify_tail`]) are local, tail-matched rewrites just
//! like the folds in [`super::fold`]. Jump threading and jump-to-return
//! copying need to see another block's first instruction, so they operate
//! over a whole [`crate::block::BlockList`] instead.

use ahash::AHashSet;

use crate::argument::{Argument, LabelId};
use crate::block::BlockList;
use crate::instruction::Instruction;
use crate::opcode::Opcode;

/// Tries the two intra-block fusions against the tail of `output`.
pub fn simplify_tail(output: &mut Vec<Instruction>) -> bool {
    let replacement = try_unary_not_jump_fusion(output).or_else(|| try_compare_not_fusion(output));
    let Some((consumed, replacement)) = replacement else {
        return false;
    };
    let keep = output.len() - consumed;
    output.truncate(keep);
    output.extend(replacement);
    true
}

/// `UNARY_NOT; POP_JUMP_IF_FALSE L` -> `POP_JUMP_IF_TRUE L`, and the
/// symmetric `POP_JUMP_IF_TRUE` -> `POP_JUMP_IF_FALSE` case.
fn try_unary_not_jump_fusion(output: &[Instruction]) -> Option<(usize, Vec<Instruction>)> {
    let len = output.len();
    if len < 2 {
        return None;
    }
    let not = &output[len - 2];
    let jump = &output[len - 1];
    if not.opcode() != Opcode::UnaryNot {
        return None;
    }
    let target = jump.jump_target()?;
    let fused_op = match jump.opcode() {
        Opcode::PopJumpIfFalse => Opcode::PopJumpIfTrue,
        Opcode::PopJumpIfTrue => Opcode::PopJumpIfFalse,
        _ => return None,
    };
    Some((2, vec![Instruction::new(fused_op, Argument::Label(target), jump.lineno()).ok()?]))
}

/// `COMPARE_OP k; UNARY_NOT` -> `COMPARE_OP k'` for the four invertible
/// membership/identity comparators. Ordering comparators never match: the
/// inversion would be unsound under partial orders and for NaN.
fn try_compare_not_fusion(output: &[Instruction]) -> Option<(usize, Vec<Instruction>)> {
    let len = output.len();
    if len < 2 {
        return None;
    }
    let compare = &output[len - 2];
    let not = &output[len - 1];
    if not.opcode() != Opcode::UnaryNot || compare.opcode() != Opcode::CompareOp {
        return None;
    }
    let kind = compare.arg().as_compare()?;
    let inverted = kind.invert_for_not()?;
    Some((2, vec![Instruction::new(Opcode::CompareOp, Argument::Compare(inverted), compare.lineno()).ok()?]))
}

/// Resolves `start` through the chain of blocks whose first instruction is
/// an unconditional jump, stopping at the first block that doesn't qualify,
/// or when a cycle is detected (a chain that would thread back to an
/// already-visited label is left at that label rather than looping).
fn resolve_thread_target(blocks: &BlockList, start: LabelId) -> LabelId {
    let mut visited = AHashSet::default();
    let mut current = start;
    loop {
        if !visited.insert(current) {
            return current;
        }
        let Some(block) = blocks.get(current) else {
            return current;
        };
        let Some(first) = block.instructions().first() else {
            return current;
        };
        if !first.opcode().is_unconditional_jump() {
            return current;
        }
        let Some(next) = first.jump_target() else {
            return current;
        };
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Retargets every jump whose target block threads to another block through
/// a chain of unconditional jumps.
pub fn thread_jumps(blocks: &mut BlockList) -> bool {
    let retargets: Vec<(usize, LabelId)> = blocks
        .blocks()
        .iter()
        .enumerate()
        .filter_map(|(i, block)| {
            let term = block.terminator()?;
            let target = term.jump_target()?;
            let resolved = resolve_thread_target(blocks, target);
            (resolved != target).then_some((i, resolved))
        })
        .collect();

    let changed = !retargets.is_empty();
    for (pos, resolved) in retargets {
        let label = blocks.blocks()[pos].label();
        let block = blocks.get_mut(label).expect("position came from this block list");
        let last = block.instructions().len() - 1;
        let retargeted = block.instructions()[last].with_target(resolved);
        block.instructions_mut()[last] = retargeted;
    }
    changed
}

/// Replaces an unconditional jump targeting a block that starts with
/// `RETURN_VALUE` (optionally preceded by one `LOAD_CONST`) with a copy of
/// those instructions in place.
pub fn copy_jump_to_return(blocks: &mut BlockList) -> bool {
    let rewrites: Vec<(usize, Vec<Instruction>)> = blocks
        .blocks()
        .iter()
        .enumerate()
        .filter_map(|(i, block)| {
            let term = block.terminator()?;
            if !term.opcode().is_unconditional_jump() {
                return None;
            }
            let target = term.jump_target()?;
            let target_block = blocks.get(target)?;
            let head = return_idiom(target_block.instructions())?;
            Some((i, head))
        })
        .collect();

    let changed = !rewrites.is_empty();
    for (pos, replacement) in rewrites {
        let label = blocks.blocks()[pos].label();
        let block = blocks.get_mut(label).expect("position came from this block list");
        let last = block.instructions().len() - 1;
        let mut instrs = block.instructions().to_vec();
        instrs.splice(last..=last, replacement);
        block.set_instructions(instrs);
    }
    changed
}

/// Matches `RETURN_VALUE` or `LOAD_CONST v; RETURN_VALUE` at the start of a
/// block, returning the matched instructions to copy.
fn return_idiom(instrs: &[Instruction]) -> Option<Vec<Instruction>> {
    match instrs {
        [first, ..] if first.opcode() == Opcode::ReturnValue => Some(vec![first.clone()]),
        [first, second, ..] if first.opcode() == Opcode::LoadConst && second.opcode() == Opcode::ReturnValue => {
            Some(vec![first.clone(), second.clone()])
        }
        _ => None,
    }
}
