//! Instructions, in their two representations: the flat, index-addressed
//! form a decoder hands this crate, and the label-addressed form used once
//! the IR has been built.

use crate::argument::{Argument, LabelId};
use crate::error::OptimizeError;
use crate::opcode::Opcode;

/// One instruction inside the block-structured IR: an opcode, its argument,
/// and the source line it came from.
///
/// Instructions are immutable values — every rewrite produces a new one
/// rather than mutating in place (spec §3: "Instructions are immutable
/// values; rewrites create new instructions").
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Instruction {
    opcode: Opcode,
    arg: Argument,
    lineno: u32,
}

impl Instruction {
    /// Builds an instruction, checking that `arg`'s shape matches what
    /// `opcode` expects.
    ///
    /// # Errors
    /// Returns [`OptimizeError::InvalidArgument`] if the argument's kind does
    /// not match the opcode's expected operand kind (spec §4.A).
    pub fn new(opcode: Opcode, arg: Argument, lineno: u32) -> Result<Self, OptimizeError> {
        validate_argument(opcode, &arg)?;
        Ok(Self { opcode, arg, lineno })
    }

    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[must_use]
    pub const fn arg(&self) -> &Argument {
        &self.arg
    }

    #[must_use]
    pub const fn lineno(&self) -> u32 {
        self.lineno
    }

    #[must_use]
    pub fn jump_target(&self) -> Option<LabelId> {
        self.arg.as_label()
    }

    /// Builds a new instruction with the same opcode and line, but a
    /// different jump target — the shape every retargeting rewrite needs.
    #[must_use]
    pub fn with_target(&self, target: LabelId) -> Self {
        debug_assert!(self.opcode.has_jump_target());
        Self {
            opcode: self.opcode,
            arg: Argument::Label(target),
            lineno: self.lineno,
        }
    }
}

/// Checks that `arg`'s shape matches what `opcode` expects.
///
/// This is a deliberately permissive check: it validates the *kind* of
/// argument (a jump opcode needs a label, a compare needs a comparator, a
/// container builder needs a count) rather than host-runtime semantics,
/// which the fold rules check separately and non-fatally.
pub fn validate_argument(opcode: Opcode, arg: &Argument) -> Result<(), OptimizeError> {
    use crate::opcode::OpKind;

    let ok = if opcode.has_jump_target() {
        matches!(arg, Argument::Label(_))
    } else {
        match opcode.kind() {
            OpKind::Load | OpKind::Store => matches!(
                arg,
                Argument::Constant(_) | Argument::Name(_) | Argument::Local(_) | Argument::Global(_) | Argument::Free(_)
            ),
            OpKind::Compare => matches!(arg, Argument::Compare(_)),
            OpKind::BuildContainer => matches!(arg, Argument::SmallInt(_)) || opcode == Opcode::BuildSlice,
            OpKind::Unary | OpKind::Binary | OpKind::Return | OpKind::Rotate | OpKind::Pop => {
                matches!(arg, Argument::None)
            }
            OpKind::Jump(_) | OpKind::Other => true,
        }
    };

    if ok {
        Ok(())
    } else {
        Err(OptimizeError::InvalidArgument {
            opcode,
            reason: "argument kind does not match opcode",
        })
    }
}

/// The pre-IR operand shape: identical to [`Argument`] except that a jump
/// target is a flat instruction index rather than a label, since no blocks
/// exist yet. A real decoder has already resolved byte offsets to indices
/// by this point — it is only the label *identity* that this crate mints.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RawArgument {
    None,
    Constant(crate::constant::ConstantValue),
    Name(String),
    Local(u32),
    Global(u32),
    Free(u32),
    SmallInt(u32),
    Compare(crate::argument::CompareKind),
    /// Index, within the same flat instruction stream, of the target
    /// instruction.
    Target(usize),
}

impl RawArgument {
    #[must_use]
    pub const fn as_target(&self) -> Option<usize> {
        match self {
            Self::Target(idx) => Some(*idx),
            _ => None,
        }
    }
}

/// One instruction in the flat, pre-block stream a decoder produces.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawInstruction {
    opcode: Opcode,
    arg: RawArgument,
    lineno: u32,
}

impl RawInstruction {
    #[must_use]
    pub const fn new(opcode: Opcode, arg: RawArgument, lineno: u32) -> Self {
        Self { opcode, arg, lineno }
    }

    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[must_use]
    pub const fn arg(&self) -> &RawArgument {
        &self.arg
    }

    #[must_use]
    pub const fn lineno(&self) -> u32 {
        self.lineno
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ConstantValue;

    #[test]
    fn rejects_mismatched_argument() {
        let err = Instruction::new(Opcode::ReturnValue, Argument::Constant(ConstantValue::Int(1)), 1).unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidArgument { .. }));
    }

    #[test]
    fn accepts_matching_argument() {
        assert!(Instruction::new(Opcode::LoadConst, Argument::Constant(ConstantValue::Int(1)), 1).is_ok());
        assert!(Instruction::new(Opcode::Pop, Argument::None, 1).is_ok());
    }
}
