//! The optimizer's error surface.
//!
//! Every variant here signals a programmer error in how this crate was
//! called — malformed instructions, a label that doesn't resolve, a block
//! list that violates the IR's invariants — never something a valid
//! bytecode program can trigger. Runtime-level failures a folded expression
//! would raise (division by zero, a negative shift) are not errors: the
//! optimizer simply declines to fold and leaves the original instructions in
//! place, preserving whatever exception the host runtime would raise later.

use std::fmt;

use crate::argument::LabelId;
use crate::opcode::Opcode;

/// A failure to build or manipulate the IR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizeError {
    /// An instruction's argument does not match what its opcode expects.
    InvalidArgument { opcode: Opcode, reason: &'static str },
    /// A jump, `SETUP_LOOP`, or other label reference names a block that does
    /// not exist in the surrounding [`crate::block::BlockList`].
    DanglingLabel(LabelId),
    /// The block list violates a structural invariant — two blocks sharing a
    /// label, an entry block that is unreachable, or similar.
    MalformedBlocks { block: LabelId, reason: &'static str },
}

impl fmt::Display for OptimizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument { opcode, reason } => {
                write!(f, "invalid argument for {opcode}: {reason}")
            }
            Self::DanglingLabel(label) => {
                write!(f, "label {} does not resolve to any block", label.0)
            }
            Self::MalformedBlocks { block, reason } => {
                write!(f, "malformed blocks at label {}: {reason}", block.0)
            }
        }
    }
}

impl std::error::Error for OptimizeError {}
