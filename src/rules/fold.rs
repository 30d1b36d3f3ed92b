//! Constant-folding rules (spec §4.D): unary and binary folds, the three
//! container-builder folds, and unpack-after-build.
//!
//! Every rule here is expressed as a function from the tail of an
//! in-progress output buffer to an optional `(consumed, replacement)` pair:
//! how many trailing instructions the rule matched, and what to replace them
//! with. [`simplify_tail`] tries each in turn and performs the splice.

use crate::argument::Argument;
use crate::constant::{self, ConstantValue};
use crate::instruction::Instruction;
use crate::opcode::Opcode;

const BINARY_OPS: &[Opcode] = &[
    Opcode::BinaryAdd,
    Opcode::BinarySubtract,
    Opcode::BinaryMultiply,
    Opcode::BinaryTrueDivide,
    Opcode::BinaryFloorDivide,
    Opcode::BinaryModulo,
    Opcode::BinaryPower,
    Opcode::BinaryLshift,
    Opcode::BinaryRshift,
    Opcode::BinaryAnd,
    Opcode::BinaryOr,
    Opcode::BinaryXor,
];

const UNARY_OPS: &[Opcode] =
    &[Opcode::UnaryPositive, Opcode::UnaryNegative, Opcode::UnaryInvert, Opcode::UnaryNot];

/// Tries every constant-folding rule against the tail of `output`, in order,
/// performing the first match it finds. Returns whether anything changed.
pub fn simplify_tail(output: &mut Vec<Instruction>, max_size: usize) -> bool {
    let replacement = try_unary_fold(output)
        .or_else(|| try_binary_fold(output, max_size))
        .or_else(|| try_build_tuple_fold(output))
        .or_else(|| try_build_compare_fold(output, max_size))
        .or_else(|| try_unpack_after_build(output));

    let Some((consumed, replacement)) = replacement else {
        return false;
    };
    let keep = output.len() - consumed;
    output.truncate(keep);
    output.extend(replacement);
    true
}

fn load_const(output: &[Instruction], idx: usize) -> Option<&ConstantValue> {
    let instr = output.get(idx)?;
    (instr.opcode() == Opcode::LoadConst).then(|| instr.arg().as_constant()).flatten()
}

fn try_unary_fold(output: &[Instruction]) -> Option<(usize, Vec<Instruction>)> {
    let len = output.len();
    if len < 2 {
        return None;
    }
    let op = output[len - 1].opcode();
    if !UNARY_OPS.contains(&op) {
        return None;
    }
    let value = load_const(output, len - 2)?;
    let result = constant::try_unary(op, value)?;
    let lineno = output[len - 2].lineno();
    Some((2, vec![Instruction::new(Opcode::LoadConst, Argument::Constant(result), lineno).ok()?]))
}

fn try_binary_fold(output: &[Instruction], max_size: usize) -> Option<(usize, Vec<Instruction>)> {
    let len = output.len();
    if len < 3 {
        return None;
    }
    let op = output[len - 1].opcode();
    if !BINARY_OPS.contains(&op) {
        return None;
    }
    let left = load_const(output, len - 3)?;
    let right = load_const(output, len - 2)?;
    let result = constant::try_binary(op, left, right, max_size)?;
    let lineno = output[len - 3].lineno();
    Some((3, vec![Instruction::new(Opcode::LoadConst, Argument::Constant(result), lineno).ok()?]))
}

/// `BUILD_TUPLE n` with `n` preceding `LOAD_CONST`s folds to one `LOAD_CONST`
/// of the tuple.
fn try_build_tuple_fold(output: &[Instruction]) -> Option<(usize, Vec<Instruction>)> {
    let len = output.len();
    let last = output.last()?;
    if last.opcode() != Opcode::BuildTuple {
        return None;
    }
    let n = last.arg().as_small_int()? as usize;
    if len < n + 1 {
        return None;
    }
    let values = collect_preceding_constants(output, len - 1, n)?;
    let lineno = output[len - 1 - n].lineno();
    Some((
        n + 1,
        vec![Instruction::new(Opcode::LoadConst, Argument::Constant(ConstantValue::Tuple(values)), lineno).ok()?],
    ))
}

/// `BUILD_LIST n; COMPARE_OP in|not_in` folds the list into a tuple constant.
/// `BUILD_SET n; COMPARE_OP in|not_in` folds into a frozenset, aborting if
/// any member is unhashable.
fn try_build_compare_fold(output: &[Instruction], _max_size: usize) -> Option<(usize, Vec<Instruction>)> {
    let len = output.len();
    if len < 2 {
        return None;
    }
    let compare = &output[len - 1];
    let kind = (compare.opcode() == Opcode::CompareOp).then(|| compare.arg().as_compare()).flatten()?;
    if !kind.is_membership() {
        return None;
    }

    let build = output.get(len - 2)?;
    let n = build.arg().as_small_int()? as usize;
    if len < n + 2 {
        return None;
    }
    let values = collect_preceding_constants(output, len - 2, n)?;

    let folded = match build.opcode() {
        Opcode::BuildList => ConstantValue::Tuple(values),
        Opcode::BuildSet => constant::try_build_frozenset(values)?,
        _ => return None,
    };

    let lineno = output[len - 2 - n].lineno();
    Some((
        n + 2,
        vec![
            Instruction::new(Opcode::LoadConst, Argument::Constant(folded), lineno).ok()?,
            Instruction::new(Opcode::CompareOp, Argument::Compare(kind), output[len - 1].lineno()).ok()?,
        ],
    ))
}

fn collect_preceding_constants(output: &[Instruction], before: usize, n: usize) -> Option<Vec<ConstantValue>> {
    let start = before.checked_sub(n)?;
    let mut values = Vec::with_capacity(n);
    for instr in &output[start..before] {
        values.push(load_const(std::slice::from_ref(instr), 0)?.clone());
    }
    Some(values)
}

/// `BUILD_TUPLE n`/`BUILD_LIST n` immediately followed by `UNPACK_SEQUENCE n`
/// collapses into pure stack shuffling for small `n`, and is left unchanged
/// for `n >= 4`.
fn try_unpack_after_build(output: &[Instruction]) -> Option<(usize, Vec<Instruction>)> {
    let len = output.len();
    if len < 2 {
        return None;
    }
    let unpack = output.last()?;
    if unpack.opcode() != Opcode::UnpackSequence {
        return None;
    }
    let unpack_n = unpack.arg().as_small_int()?;

    let build = output.get(len - 2)?;
    if !matches!(build.opcode(), Opcode::BuildTuple | Opcode::BuildList) {
        return None;
    }
    let build_n = build.arg().as_small_int()?;
    if build_n != unpack_n {
        return None;
    }

    let lineno = build.lineno();
    let replacement = match build_n {
        1 => vec![],
        2 => vec![Instruction::new(Opcode::RotTwo, Argument::None, lineno).ok()?],
        3 => vec![
            Instruction::new(Opcode::RotThree, Argument::None, lineno).ok()?,
            Instruction::new(Opcode::RotTwo, Argument::None, lineno).ok()?,
        ],
        _ => return None,
    };
    Some((2, replacement))
}
