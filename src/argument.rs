//! Instruction operands: the [`Argument`] sum type, block [`LabelId`]s, and the
//! comparator kind used by `COMPARE_OP`.

use strum::{Display, EnumIter};

use crate::constant::ConstantValue;

/// Opaque identity of a block in the IR.
///
/// Two labels are equal iff they are the same token; labels never carry an
/// offset or index — that is strictly the emitter's concern, downstream of
/// this crate. IDs are drawn from a monotonic counter owned by whichever
/// [`crate::block::BlockList`] minted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct LabelId(pub(crate) u32);

impl LabelId {
    pub(crate) const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// The comparator a `COMPARE_OP` instruction performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, serde::Serialize, serde::Deserialize)]
pub enum CompareKind {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareKind {
    /// The comparator `k'` such that `not (a k b)` always equals `a k' b`
    /// without consulting the operands' `__bool__`.
    ///
    /// Only membership and identity invert this way. Ordering comparators
    /// (`<`, `<=`, `>`, `>=`, `==`, `!=`) are excluded: the rewrite would be
    /// unsound under partial orders and for NaN-bearing floats, where
    /// `not (a < b)` is not the same as `a >= b`.
    #[must_use]
    pub const fn invert_for_not(self) -> Option<Self> {
        match self {
            Self::In => Some(Self::NotIn),
            Self::NotIn => Some(Self::In),
            Self::Is => Some(Self::IsNot),
            Self::IsNot => Some(Self::Is),
            Self::Lt | Self::Le | Self::Eq | Self::Ne | Self::Gt | Self::Ge => None,
        }
    }

    /// True for the `in` / `not in` pair used by the `BUILD_SET`/`BUILD_LIST`
    /// compare folds.
    #[must_use]
    pub const fn is_membership(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

/// A typed instruction operand.
///
/// Matches the Design Notes' sum type exactly, with "container arity" folded
/// into `SmallInt` (both are simply a small integer the opcode interprets).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Argument {
    /// No operand (e.g. `POP`, `RETURN_VALUE`).
    None,
    /// A constant value, held directly — constant-pool membership is the
    /// emitter's concern, not the optimizer's.
    Constant(ConstantValue),
    /// An interned or source-level name (`LOAD_NAME`, `STORE_NAME`, ...).
    Name(String),
    /// A local-variable slot index.
    Local(u32),
    /// A global-variable slot index.
    Global(u32),
    /// A free-variable (closure cell) slot index.
    Free(u32),
    /// A small integer operand: container arity, unpack count, and similar.
    SmallInt(u32),
    /// The comparator performed by a `COMPARE_OP`.
    Compare(CompareKind),
    /// A jump target, naming another block by identity.
    Label(LabelId),
}

impl Argument {
    /// The label this argument names, if it is a jump target.
    #[must_use]
    pub const fn as_label(&self) -> Option<LabelId> {
        match self {
            Self::Label(id) => Some(*id),
            _ => None,
        }
    }

    /// The constant this argument carries, if it is a `LOAD_CONST` operand.
    #[must_use]
    pub const fn as_constant(&self) -> Option<&ConstantValue> {
        match self {
            Self::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// The small-integer count this argument carries (container arity,
    /// unpack count), if any.
    #[must_use]
    pub const fn as_small_int(&self) -> Option<u32> {
        match self {
            Self::SmallInt(n) => Some(*n),
            _ => None,
        }
    }

    /// The comparator this argument carries, if it is a `COMPARE_OP` operand.
    #[must_use]
    pub const fn as_compare(&self) -> Option<CompareKind> {
        match self {
            Self::Compare(k) => Some(*k),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    /// `invert_for_not` is an involution on every comparator it's defined
    /// for, checked exhaustively over all ten variants.
    #[test]
    fn invert_for_not_is_involution_where_defined() {
        for kind in CompareKind::iter() {
            if let Some(inverted) = kind.invert_for_not() {
                assert_eq!(inverted.invert_for_not(), Some(kind), "{kind} does not round-trip through its inverse");
            }
        }
    }

    /// Exactly the `in`/`not in` pair reports membership, over all variants.
    #[test]
    fn is_membership_matches_in_and_not_in_only() {
        for kind in CompareKind::iter() {
            assert_eq!(kind.is_membership(), matches!(kind, CompareKind::In | CompareKind::NotIn));
        }
    }
}
