//! A purely local peephole optimizer for Monty's stack-based bytecode.
//!
//! Given a decoded [`CodeObject`] — a flat instruction stream whose jump
//! arguments already point at instruction indices, plus a constant pool
//! carried inline on each `LOAD_CONST` — [`optimize`] returns an equivalent
//! code object with small, locally recognizable inefficiencies rewritten:
//! constant folding, jump threading, redundant-return elimination, and a
//! handful of boolean-negation and unpack-to-rotate fusions.
//!
//! The optimizer never performs interprocedural analysis, dataflow beyond a
//! short window, or type inference, and it never raises on valid input —
//! every rewrite is guarded by a "match or leave unchanged" contract. See
//! [`OptimizeError`] for what does count as an error: malformed IR the
//! *caller* constructed, never something a valid bytecode program triggers.

pub mod argument;
pub mod block;
pub mod code_object;
pub mod config;
pub mod constant;
pub mod convert;
pub mod error;
pub mod instruction;
pub mod opcode;
pub mod rules;

pub use crate::argument::{Argument, CompareKind, LabelId};
pub use crate::block::{Block, BlockList};
pub use crate::code_object::CodeObject;
pub use crate::config::OptimizerConfig;
pub use crate::constant::ConstantValue;
pub use crate::error::OptimizeError;
pub use crate::instruction::{Instruction, RawArgument, RawInstruction};
pub use crate::opcode::Opcode;

/// Runs the full pipeline on an encoded code object: decode into blocks,
/// fix-point the rewrite rules, recurse into nested code-object constants,
/// then flatten and re-resolve labels back to instruction indices.
///
/// Byte-offset assignment and line-number table encoding remain the external
/// emitter's job — this only resolves the label-addressed IR back to the
/// index-addressed form [`CodeObject`] already uses.
///
/// # Errors
/// Returns [`OptimizeError`] if `code`'s instructions are malformed: an
/// argument that doesn't match its opcode, or a jump targeting an index
/// outside the stream.
pub fn optimize(code: CodeObject, config: &OptimizerConfig) -> Result<CodeObject, OptimizeError> {
    let blocks = convert::flat_to_blocks(code.instructions())?;
    let blocks = optimize_blocks(blocks, config)?;
    convert::resolve_to_code_object(&blocks)
}

/// Runs the rewrite pipeline on already-decoded IR, in place of the whole
/// flat-bytecode round trip. This is the primary hook for tests that build
/// a [`BlockList`] directly rather than going through a flat decoder.
///
/// Iterates every block's local rule pipeline (folding, then the intra-block
/// control-flow fusions) together with the two cross-block control-flow
/// rules (jump threading, jump-to-return copying) until a full pass leaves
/// every block unchanged, then recurses into any nested code-object
/// constants exposed by a surviving `LOAD_CONST`.
///
/// # Errors
/// Returns [`OptimizeError`] if `blocks` violates an IR invariant — a jump
/// whose target names no block in the list, for instance.
pub fn optimize_blocks(mut blocks: BlockList, config: &OptimizerConfig) -> Result<BlockList, OptimizeError> {
    blocks.check_label_integrity()?;
    blocks.check_well_formed()?;

    // Safety net against a pipeline bug turning a would-be fixed point into
    // an infinite loop. Exceeding this bound is a bug in this crate, not
    // something a valid bytecode program can trigger.
    let iteration_limit = total_instruction_count(&blocks).max(1) * 4 + 16;

    for _ in 0..iteration_limit {
        let mut changed = false;

        for label in block_labels(&blocks) {
            let block = blocks.get(label).expect("label came from this block list");
            let (rewritten, block_changed) = rules::run_local_rules(block.instructions(), config);
            if block_changed {
                blocks.get_mut(label).expect("label came from this block list").set_instructions(rewritten);
                changed = true;
            }
        }

        changed |= rules::control::thread_jumps(&mut blocks);
        changed |= rules::control::copy_jump_to_return(&mut blocks);

        if !changed {
            break;
        }
    }

    recurse_into_nested_code(&mut blocks, config)?;

    Ok(blocks)
}

fn block_labels(blocks: &BlockList) -> Vec<LabelId> {
    blocks.blocks().iter().map(Block::label).collect()
}

fn total_instruction_count(blocks: &BlockList) -> usize {
    blocks.blocks().iter().map(|b| b.instructions().len()).sum()
}

/// For every surviving `LOAD_CONST` whose constant is a nested code object,
/// optimizes that code object and replaces the constant with the result.
/// Code objects form a tree by construction, so a single recursive pass
/// suffices — there is no cycle to guard against.
fn recurse_into_nested_code(blocks: &mut BlockList, config: &OptimizerConfig) -> Result<(), OptimizeError> {
    for label in block_labels(blocks) {
        let block = blocks.get(label).expect("label came from this block list");
        let mut rewritten = None;
        for (idx, instr) in block.instructions().iter().enumerate() {
            if let Argument::Constant(ConstantValue::Code(nested)) = instr.arg() {
                let nested_blocks = convert::flat_to_blocks(nested.instructions())?;
                let nested_blocks = optimize_blocks(nested_blocks, config)?;
                let nested_code = convert::resolve_to_code_object(&nested_blocks)?;
                let new_instr = Instruction::new(
                    instr.opcode(),
                    Argument::Constant(ConstantValue::Code(Box::new(nested_code))),
                    instr.lineno(),
                )?;
                rewritten.get_or_insert_with(|| block.instructions().to_vec())[idx] = new_instr;
            }
        }
        if let Some(instrs) = rewritten {
            blocks.get_mut(label).expect("label came from this block list").set_instructions(instrs);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(opcode: Opcode, arg: RawArgument) -> RawInstruction {
        RawInstruction::new(opcode, arg, 1)
    }

    /// `LOAD_CONST 10; LOAD_CONST 20; BINARY_ADD; STORE_NAME x` folds to
    /// `LOAD_CONST 30; STORE_NAME x`.
    #[test]
    fn binary_fold_end_to_end() {
        let code = CodeObject::new(vec![
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::Int(10))),
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::Int(20))),
            instr(Opcode::BinaryAdd, RawArgument::None),
            instr(Opcode::StoreName, RawArgument::Name("x".into())),
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::None)),
            instr(Opcode::ReturnValue, RawArgument::None),
        ]);
        let result = optimize(code, &OptimizerConfig::default()).unwrap();
        let instrs = result.instructions();
        assert_eq!(instrs.len(), 4);
        assert_eq!(instrs[0].opcode(), Opcode::LoadConst);
        assert_eq!(instrs[0].arg(), &RawArgument::Constant(ConstantValue::Int(30)));
        assert_eq!(instrs[1].opcode(), Opcode::StoreName);
    }

    /// Folding that would raise (division by zero) is aborted, leaving the
    /// program byte-for-byte unchanged.
    #[test]
    fn divide_by_zero_preserved() {
        let code = CodeObject::new(vec![
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::Int(1))),
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::Int(0))),
            instr(Opcode::BinaryTrueDivide, RawArgument::None),
            instr(Opcode::Pop, RawArgument::None),
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::None)),
            instr(Opcode::ReturnValue, RawArgument::None),
        ]);
        let result = optimize(code.clone(), &OptimizerConfig::default()).unwrap();
        assert_eq!(result.instructions(), code.instructions());
    }

    #[test]
    fn idempotent_on_already_optimized_program() {
        let code = CodeObject::new(vec![
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::Int(10))),
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::Int(20))),
            instr(Opcode::BinaryAdd, RawArgument::None),
            instr(Opcode::ReturnValue, RawArgument::None),
        ]);
        let once = optimize(code, &OptimizerConfig::default()).unwrap();
        let twice = optimize(once.clone(), &OptimizerConfig::default()).unwrap();
        assert_eq!(once.instructions(), twice.instructions());
    }

    #[test]
    fn recurses_into_nested_code_constant() {
        let nested = CodeObject::new(vec![
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::Int(2))),
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::Int(3))),
            instr(Opcode::BinaryMultiply, RawArgument::None),
            instr(Opcode::ReturnValue, RawArgument::None),
        ]);
        let outer = CodeObject::new(vec![
            instr(Opcode::LoadConst, RawArgument::Constant(ConstantValue::Code(Box::new(nested)))),
            instr(Opcode::ReturnValue, RawArgument::None),
        ]);
        let result = optimize(outer, &OptimizerConfig::default()).unwrap();
        let Some(RawArgument::Constant(ConstantValue::Code(nested))) = result.instructions().first().map(RawInstruction::arg).cloned() else {
            panic!("expected a nested code constant");
        };
        assert_eq!(nested.instructions().len(), 2);
        assert_eq!(nested.instructions()[0].arg(), &RawArgument::Constant(ConstantValue::Int(6)));
    }

    #[test]
    fn invalid_argument_surfaces_as_error() {
        let code = CodeObject::new(vec![instr(Opcode::ReturnValue, RawArgument::Constant(ConstantValue::Int(1)))]);
        let err = optimize(code, &OptimizerConfig::default()).unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidArgument { .. }));
    }
}
