//! Opcode definitions for the peephole optimizer's intermediate representation.
//!
//! The bytecode interpreter itself stores opcodes as raw bytes for cache
//! efficiency (see Monty's own `bytecode::op` table). This crate never touches
//! packed bytes — it works over already-decoded instructions — so opcodes are
//! a proper enum instead, grouped the same way the interpreter groups them.

use strum::{Display, EnumIter};

/// A single bytecode operation.
///
/// Every opcode has a static [`OpKind`] that the optimizer's structural rules
/// consult (jump threading, dead-code elimination, ...) without needing to
/// know the specific opcode. Constant-folding rules match on the opcode
/// itself since the fold semantics differ per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, serde::Serialize, serde::Deserialize)]
pub enum Opcode {
    // === Stack operations (no operand) ===
    /// Discard top of stack.
    Pop,
    /// Duplicate top of stack.
    Dup,
    /// Swap top two: `[a, b] -> [b, a]`.
    RotTwo,
    /// Rotate top three: `[a, b, c] -> [c, a, b]`.
    RotThree,

    // === Constants & names ===
    /// Push a constant value. Argument: [`crate::Argument::Constant`].
    LoadConst,
    /// Push a named value from the enclosing namespace. Argument: [`crate::Argument::Name`].
    LoadName,
    /// Pop and store to a named slot. Argument: [`crate::Argument::Name`].
    StoreName,
    /// Delete a named slot. Argument: [`crate::Argument::Name`].
    DeleteName,

    // === Locals, globals, free variables ===
    /// Push a local variable. Argument: [`crate::Argument::Local`].
    LoadLocal,
    /// Pop and store to a local variable. Argument: [`crate::Argument::Local`].
    StoreLocal,
    /// Push a global variable. Argument: [`crate::Argument::Global`].
    LoadGlobal,
    /// Pop and store to a global variable. Argument: [`crate::Argument::Global`].
    StoreGlobal,
    /// Push a closure cell. Argument: [`crate::Argument::Free`].
    LoadDeref,
    /// Pop and store to a closure cell. Argument: [`crate::Argument::Free`].
    StoreDeref,

    // === Unary operations (no operand) ===
    /// `+a`.
    UnaryPositive,
    /// `-a`.
    UnaryNegative,
    /// `~a`.
    UnaryInvert,
    /// `not a`.
    UnaryNot,

    // === Binary operations (no operand) ===
    /// `a + b`.
    BinaryAdd,
    /// `a - b`.
    BinarySubtract,
    /// `a * b`.
    BinaryMultiply,
    /// `a / b`.
    BinaryTrueDivide,
    /// `a // b`.
    BinaryFloorDivide,
    /// `a % b`.
    BinaryModulo,
    /// `a ** b`.
    BinaryPower,
    /// `a << b`.
    BinaryLshift,
    /// `a >> b`.
    BinaryRshift,
    /// `a & b`.
    BinaryAnd,
    /// `a | b`.
    BinaryOr,
    /// `a ^ b`.
    BinaryXor,
    /// `a[b]`, pop index then obj, push result. Never constant-folded: the
    /// operand pair this opcode needs is a container plus an index/slice,
    /// never two folded constants a rule here could match against.
    BinarySubscr,

    // === Comparison (one operand: the comparator kind) ===
    /// Compare TOS-1 and TOS. Argument: [`crate::Argument::Compare`].
    CompareOp,

    // === Container construction (one operand: element count) ===
    /// Pop n items, push a tuple. Argument: [`crate::Argument::SmallInt`].
    BuildTuple,
    /// Pop n items, push a list. Argument: [`crate::Argument::SmallInt`].
    BuildList,
    /// Pop n items, push a set. Argument: [`crate::Argument::SmallInt`].
    BuildSet,
    /// Pop n start/stop/step items, push a slice object. Never folded.
    BuildSlice,
    /// Pop a tuple/list, unpack n items onto the stack. Argument: [`crate::Argument::SmallInt`].
    UnpackSequence,

    // === Control flow ===
    /// Unconditional jump. Argument: [`crate::Argument::Label`].
    JumpAbsolute,
    /// Unconditional jump (forward-only form used by some compilers).
    /// Argument: [`crate::Argument::Label`].
    JumpForward,
    /// Pop TOS; jump if truthy. Argument: [`crate::Argument::Label`].
    PopJumpIfTrue,
    /// Pop TOS; jump if falsy. Argument: [`crate::Argument::Label`].
    PopJumpIfFalse,
    /// Jump if TOS truthy, else pop. Argument: [`crate::Argument::Label`].
    JumpIfTrueOrPop,
    /// Jump if TOS falsy, else pop. Argument: [`crate::Argument::Label`].
    JumpIfFalseOrPop,
    /// Push a loop block recording where the loop ends; falls through.
    /// Argument: [`crate::Argument::Label`] naming the loop's exit block.
    SetupLoop,
    /// Pop the loop block pushed by `SetupLoop`.
    PopBlock,

    // === Return ===
    /// Return TOS from the current frame.
    ReturnValue,

    // === Misc ===
    /// No-op, used for alignment/patching.
    Nop,
}

/// Coarse category of an opcode, consulted by structural (non-folding) rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Load,
    Store,
    Unary,
    Binary,
    Compare,
    BuildContainer,
    Jump(JumpKind),
    Return,
    Rotate,
    Pop,
    Other,
}

/// Distinguishes unconditional jumps (one successor) from conditional jumps
/// (two successors: the target and the fall-through).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Unconditional,
    Conditional,
}

impl Opcode {
    /// Returns this opcode's structural category.
    #[must_use]
    pub const fn kind(self) -> OpKind {
        use Opcode::{
            BinaryAdd, BinaryAnd, BinaryFloorDivide, BinaryLshift, BinaryModulo, BinaryMultiply, BinaryOr,
            BinaryPower, BinaryRshift, BinarySubscr, BinarySubtract, BinaryTrueDivide, BinaryXor, BuildList,
            BuildSet, BuildSlice, BuildTuple, CompareOp, DeleteName, Dup, JumpAbsolute, JumpForward,
            JumpIfFalseOrPop, JumpIfTrueOrPop, LoadConst, LoadDeref, LoadGlobal, LoadLocal, LoadName, Nop, Pop,
            PopBlock, PopJumpIfFalse, PopJumpIfTrue, ReturnValue, RotThree, RotTwo, SetupLoop, StoreDeref,
            StoreGlobal, StoreLocal, StoreName, UnaryInvert, UnaryNegative, UnaryNot, UnaryPositive,
            UnpackSequence,
        };
        match self {
            LoadConst | LoadName | LoadLocal | LoadGlobal | LoadDeref => OpKind::Load,
            StoreName | StoreLocal | StoreGlobal | StoreDeref | DeleteName => OpKind::Store,
            UnaryPositive | UnaryNegative | UnaryInvert | UnaryNot => OpKind::Unary,
            BinaryAdd | BinarySubtract | BinaryMultiply | BinaryTrueDivide | BinaryFloorDivide | BinaryModulo
            | BinaryPower | BinaryLshift | BinaryRshift | BinaryAnd | BinaryOr | BinaryXor | BinarySubscr => {
                OpKind::Binary
            }
            CompareOp => OpKind::Compare,
            BuildTuple | BuildList | BuildSet | BuildSlice | UnpackSequence => OpKind::BuildContainer,
            JumpAbsolute | JumpForward => OpKind::Jump(JumpKind::Unconditional),
            PopJumpIfTrue | PopJumpIfFalse | JumpIfTrueOrPop | JumpIfFalseOrPop => {
                OpKind::Jump(JumpKind::Conditional)
            }
            ReturnValue => OpKind::Return,
            RotTwo | RotThree => OpKind::Rotate,
            Pop => OpKind::Pop,
            Dup | SetupLoop | PopBlock | Nop => OpKind::Other,
        }
    }

    /// Whether this opcode's argument names a block to jump to.
    ///
    /// True for every jump as well as `SetupLoop`, which records a target
    /// (the loop's exit) without itself transferring control.
    #[must_use]
    pub const fn has_jump_target(self) -> bool {
        matches!(self.kind(), OpKind::Jump(_)) || matches!(self, Opcode::SetupLoop)
    }

    /// True for jumps with exactly one successor (the target).
    #[must_use]
    pub const fn is_unconditional_jump(self) -> bool {
        matches!(self.kind(), OpKind::Jump(JumpKind::Unconditional))
    }

    /// True for jumps with two successors (the target and the fall-through).
    #[must_use]
    pub const fn is_conditional_jump(self) -> bool {
        matches!(self.kind(), OpKind::Jump(JumpKind::Conditional))
    }

    /// True for opcodes whose terminator position ends a block's control flow
    /// without a fall-through (i.e. the next instruction, if any, is
    /// unreachable through this path).
    #[must_use]
    pub const fn is_block_terminator(self) -> bool {
        self.is_unconditional_jump() || matches!(self, Opcode::ReturnValue)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    /// Every opcode's jump predicates agree with its `kind()`, checked
    /// exhaustively rather than for a handful of hand-picked variants.
    #[test]
    fn jump_predicates_agree_with_kind_for_every_opcode() {
        for op in Opcode::iter() {
            assert_eq!(op.is_unconditional_jump(), matches!(op.kind(), OpKind::Jump(JumpKind::Unconditional)));
            assert_eq!(op.is_conditional_jump(), matches!(op.kind(), OpKind::Jump(JumpKind::Conditional)));
            if op.is_unconditional_jump() || op.is_conditional_jump() {
                assert!(op.has_jump_target(), "{op} is a jump but has_jump_target() is false");
            }
        }
    }
}
