//! The unit of compilation this crate optimizes: a flat instruction stream
//! plus whatever metadata the rules need, but nothing about how it was
//! decoded or how it will be re-encoded.

use crate::instruction::RawInstruction;

/// A single function or module body, in flat pre-IR form.
///
/// Everything beyond the instruction stream (name, argument counts, line
/// table, constant pool layout) belongs to the decoder/encoder boundary this
/// crate does not cross; `CodeObject` carries only what the optimizer reads
/// or rewrites. Nested functions and comprehensions show up as
/// [`crate::constant::ConstantValue::Code`] entries reachable from this
/// object's own instructions, and are optimized by recursing into them.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct CodeObject {
    instructions: Vec<RawInstruction>,
}

impl CodeObject {
    #[must_use]
    pub const fn new(instructions: Vec<RawInstruction>) -> Self {
        Self { instructions }
    }

    /// A code object with no instructions, used where only the shape of a
    /// nested constant matters (e.g. in tests).
    #[must_use]
    pub const fn empty() -> Self {
        Self { instructions: Vec::new() }
    }

    #[must_use]
    pub fn instructions(&self) -> &[RawInstruction] {
        &self.instructions
    }

    #[must_use]
    pub fn into_instructions(self) -> Vec<RawInstruction> {
        self.instructions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_instructions() {
        assert!(CodeObject::empty().instructions().is_empty());
    }
}
