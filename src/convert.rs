//! Conversion between the flat, index-addressed stream a decoder produces
//! and the block-structured, label-addressed IR the rules operate over.
//!
//! This is the only place in the crate that thinks about instruction
//! *positions* rather than identities — assigning byte offsets is still the
//! emitter's job downstream, but minting block boundaries from jump targets
//! and flattening blocks back into a linear order are squarely this crate's
//! concern (spec §4.C).

use ahash::{AHashMap, AHashSet};

use crate::argument::{Argument, CompareKind, LabelId};
use crate::block::BlockList;
use crate::code_object::CodeObject;
use crate::constant::ConstantValue;
use crate::error::OptimizeError;
use crate::instruction::{Instruction, RawArgument, RawInstruction};
use crate::opcode::Opcode;

/// Builds a [`BlockList`] from a flat instruction stream.
///
/// A new block starts at index 0, at every index named by some
/// `RawArgument::Target`, and at every index immediately following a jump or
/// `RETURN_VALUE` (both the taken-branch and fall-through successors of a
/// conditional jump need their own block).
///
/// # Errors
/// Returns [`OptimizeError::DanglingLabel`] if some jump targets an index
/// outside the instruction stream, or [`OptimizeError::InvalidArgument`] if
/// an instruction's argument does not match its opcode.
pub fn flat_to_blocks(instructions: &[RawInstruction]) -> Result<BlockList, OptimizeError> {
    let mut boundaries: Vec<usize> = vec![0];
    for (idx, instr) in instructions.iter().enumerate() {
        if let Some(target) = instr.arg().as_target() {
            if target >= instructions.len() {
                return Err(OptimizeError::DanglingLabel(LabelId::new(u32::try_from(target).unwrap_or(u32::MAX))));
            }
            boundaries.push(target);
        }
        if instr.opcode().has_jump_target() || instr.opcode().kind() == crate::opcode::OpKind::Return {
            if idx + 1 < instructions.len() {
                boundaries.push(idx + 1);
            }
        }
    }
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut blocks = BlockList::new();
    let mut label_at: AHashMap<usize, LabelId> = AHashMap::default();
    for &start in &boundaries {
        label_at.insert(start, blocks.fresh_label());
    }

    for (seg_idx, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(seg_idx + 1).copied().unwrap_or(instructions.len());
        let mut converted = Vec::with_capacity(end - start);
        for raw in &instructions[start..end] {
            let arg = convert_argument(raw.arg(), &label_at)?;
            converted.push(Instruction::new(raw.opcode(), arg, raw.lineno())?);
        }
        let label = blocks.push_block(converted);
        debug_assert_eq!(Some(label), label_at.get(&start).copied());
    }
    Ok(blocks)
}

fn convert_argument(raw: &RawArgument, label_at: &AHashMap<usize, LabelId>) -> Result<Argument, OptimizeError> {
    Ok(match raw {
        RawArgument::None => Argument::None,
        RawArgument::Constant(c) => Argument::Constant(optimize_nested_constant(c.clone())),
        RawArgument::Name(n) => Argument::Name(n.clone()),
        RawArgument::Local(n) => Argument::Local(*n),
        RawArgument::Global(n) => Argument::Global(*n),
        RawArgument::Free(n) => Argument::Free(*n),
        RawArgument::SmallInt(n) => Argument::SmallInt(*n),
        RawArgument::Compare(c) => Argument::Compare(*c),
        RawArgument::Target(idx) => {
            let label = label_at
                .get(idx)
                .copied()
                .ok_or_else(|| OptimizeError::DanglingLabel(LabelId::new(u32::try_from(*idx).unwrap_or(u32::MAX))))?;
            Argument::Label(label)
        }
    })
}

/// Nested code-object constants pass through unchanged here; the driver
/// recurses into them separately once the whole program is in block form,
/// so that nested functions see the same fixed-point treatment as the
/// top-level body (spec §4.F step 4).
fn optimize_nested_constant(value: ConstantValue) -> ConstantValue {
    value
}

/// Flattens a [`BlockList`] back into a label-addressed instruction stream,
/// dropping blocks unreachable from the entry block.
///
/// Reachability is computed once and blocks are emitted in their existing
/// list order, which preserves fall-through adjacency: if a block falls
/// through rather than jumping, the next reachable block in list order is
/// exactly the block that was its fall-through successor before any
/// unreachable blocks between them were dropped.
#[must_use]
pub fn blocks_to_flat(blocks: &BlockList) -> Vec<Instruction> {
    let reachable = reachable_positions(blocks);
    blocks
        .blocks()
        .iter()
        .enumerate()
        .filter(|(i, _)| reachable.contains(i))
        .flat_map(|(_, block)| block.instructions().iter().cloned())
        .collect()
}

fn reachable_positions(blocks: &BlockList) -> AHashSet<usize> {
    let mut seen = AHashSet::default();
    if blocks.is_empty() {
        return seen;
    }
    let mut stack = vec![0usize];
    while let Some(pos) = stack.pop() {
        if !seen.insert(pos) {
            continue;
        }
        let (target, falls_through) = blocks.successors(pos);
        if let Some(label) = target {
            if let Some(target_pos) = blocks.position_of(label) {
                stack.push(target_pos);
            }
        }
        if falls_through {
            stack.push(pos + 1);
        }
        // A non-terminator instruction can still carry a jump target without
        // transferring control there itself — SETUP_LOOP records where a
        // `break` unwinds to without being a jump in its own right. That
        // target must stay reachable too, or the label it names would be
        // left dangling once this block's true CFG successors are dropped.
        for instr in blocks.blocks()[pos].instructions() {
            if let Some(label) = instr.jump_target() {
                if let Some(target_pos) = blocks.position_of(label) {
                    stack.push(target_pos);
                }
            }
        }
    }
    seen
}

/// Re-resolves every label in a flattened, label-addressed stream to the
/// instruction index its block now starts at, producing the final flat
/// [`CodeObject`] an emitter can place back into the host format.
///
/// # Errors
/// Returns [`OptimizeError::DanglingLabel`] if a jump survives flattening
/// but its target label no longer has a known start index — this would mean
/// [`blocks_to_flat`] dropped a block that was still referenced, which is a
/// bug in this crate rather than in caller-supplied input.
pub fn resolve_to_code_object(blocks: &BlockList) -> Result<CodeObject, OptimizeError> {
    let reachable = reachable_positions(blocks);
    let flat = blocks_to_flat(blocks);

    let mut start_of: AHashMap<LabelId, usize> = AHashMap::default();
    let mut idx = 0;
    for (i, block) in blocks.blocks().iter().enumerate() {
        if reachable.contains(&i) {
            start_of.insert(block.label(), idx);
            idx += block.instructions().len();
        }
    }

    let mut out = Vec::with_capacity(flat.len());
    for instr in &flat {
        let raw_arg = match instr.arg() {
            Argument::None => RawArgument::None,
            Argument::Constant(c) => RawArgument::Constant(c.clone()),
            Argument::Name(n) => RawArgument::Name(n.clone()),
            Argument::Local(n) => RawArgument::Local(*n),
            Argument::Global(n) => RawArgument::Global(*n),
            Argument::Free(n) => RawArgument::Free(*n),
            Argument::SmallInt(n) => RawArgument::SmallInt(*n),
            Argument::Compare(c) => RawArgument::Compare(*c),
            Argument::Label(label) => {
                let target = start_of.get(label).copied().ok_or(OptimizeError::DanglingLabel(*label))?;
                RawArgument::Target(target)
            }
        };
        out.push(RawInstruction::new(instr.opcode(), raw_arg, instr.lineno()));
    }
    Ok(CodeObject::new(out))
}
