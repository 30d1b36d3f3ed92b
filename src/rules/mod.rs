//! The rewrite engine: constant folding (4.D) and control-flow rules (4.E).
//!
//! Both submodules work the same way — they inspect the tail of a growing
//! output buffer and, on a match, splice a replacement in — except for the
//! two control-flow rules that need to see another block (jump threading and
//! jump-to-return copying), which operate on a whole [`crate::block::BlockList`]
//! instead.

pub mod control;
pub mod fold;

use crate::config::OptimizerConfig;
use crate::instruction::Instruction;

/// Runs every intra-block rule (constant folding, dead code after return, and
/// the two jump/compare fusions) over one block's instructions to a local
/// fixed point, left to right.
///
/// Folded constants become visible to later rules immediately, which is what
/// lets a chain like `1 + 3 + 7` collapse in one pass: each pushed
/// instruction is simplified against the tail before the next one is read.
#[must_use]
pub fn run_local_rules(instrs: &[Instruction], config: &OptimizerConfig) -> (Vec<Instruction>, bool) {
    let mut output: Vec<Instruction> = Vec::with_capacity(instrs.len());
    let mut changed = false;
    let mut terminated = false;

    for instr in instrs {
        if terminated {
            changed = true;
            continue;
        }
        output.push(instr.clone());
        loop {
            let mut simplified = fold::simplify_tail(&mut output, config.max_size);
            simplified |= control::simplify_tail(&mut output);
            if simplified {
                changed = true;
            } else {
                break;
            }
        }
        if matches!(output.last(), Some(last) if last.opcode() == crate::opcode::Opcode::ReturnValue) {
            terminated = true;
        }
    }
    (output, changed)
}
