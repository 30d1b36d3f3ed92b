//! The block-structured intermediate representation.
//!
//! Every jump in this IR targets a [`LabelId`] — a block identity — rather
//! than a byte offset, so rewrites can freely change instruction counts and
//! positions without anyone having to patch offsets by hand. This mirrors the
//! Design Notes' "block IDs from a monotonic counter" approach: a flat arena
//! of blocks (`Vec<Block>`) indexed by position, with a side index from
//! label to position for lookups.

use ahash::AHashMap;

use crate::argument::LabelId;
use crate::error::OptimizeError;
use crate::instruction::Instruction;
use crate::opcode::OpKind;

/// An ordered, maximal straight-line run of instructions with a single entry
/// and (usually) a single terminator.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    label: LabelId,
    instructions: Vec<Instruction>,
}

impl Block {
    pub(crate) const fn new(label: LabelId, instructions: Vec<Instruction>) -> Self {
        Self { label, instructions }
    }

    #[must_use]
    pub const fn label(&self) -> LabelId {
        self.label
    }

    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    pub(crate) fn set_instructions(&mut self, instructions: Vec<Instruction>) {
        self.instructions = instructions;
    }

    /// The block's terminator, if it has one — its last instruction, when
    /// that instruction is a jump or a return. `None` means this block falls
    /// through to whatever follows it in block order.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        let last = self.instructions.last()?;
        matches!(last.opcode().kind(), OpKind::Jump(_) | OpKind::Return).then_some(last)
    }

    /// True when control leaves this block by falling into the next block in
    /// list order, rather than through an explicit terminator.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        self.terminator().is_none()
    }

    /// The label this block's terminator jumps to, if any. Present for both
    /// unconditional and conditional jumps.
    #[must_use]
    pub fn jump_target(&self) -> Option<LabelId> {
        self.terminator().and_then(Instruction::jump_target)
    }
}

/// An ordered list of blocks; the first block is the entry point.
///
/// `index` is a derived cache, not part of the list's logical content, so it
/// is excluded from `Serialize` and rebuilt by hand in `Deserialize` rather
/// than left to come back empty (a plain derive would desync it from
/// `blocks` on every round trip).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BlockList {
    blocks: Vec<Block>,
    #[serde(skip)]
    index: AHashMap<LabelId, usize>,
    next_label: u32,
}

impl<'de> serde::Deserialize<'de> for BlockList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Raw {
            blocks: Vec<Block>,
            next_label: u32,
        }
        let raw = Raw::deserialize(deserializer)?;
        let index = raw.blocks.iter().enumerate().map(|(pos, block)| (block.label(), pos)).collect();
        Ok(Self { blocks: raw.blocks, index, next_label: raw.next_label })
    }
}

impl Default for BlockList {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockList {
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            index: AHashMap::default(),
            next_label: 0,
        }
    }

    /// Mints a fresh, never-before-used label.
    pub(crate) fn fresh_label(&mut self) -> LabelId {
        let id = LabelId::new(self.next_label);
        self.next_label += 1;
        id
    }

    /// Appends a new block with a freshly minted label, returning its label.
    pub(crate) fn push_block(&mut self, instructions: Vec<Instruction>) -> LabelId {
        let label = self.fresh_label();
        self.index.insert(label, self.blocks.len());
        self.blocks.push(Block::new(label, instructions));
        label
    }

    /// The entry block, if any blocks exist.
    #[must_use]
    pub fn entry(&self) -> Option<&Block> {
        self.blocks.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Looks up a block by its identity label.
    #[must_use]
    pub fn get(&self, label: LabelId) -> Option<&Block> {
        self.index.get(&label).map(|&i| &self.blocks[i])
    }

    pub fn get_mut(&mut self, label: LabelId) -> Option<&mut Block> {
        let idx = *self.index.get(&label)?;
        Some(&mut self.blocks[idx])
    }

    /// Inserts `instructions` as a new block immediately after `after`,
    /// returning the new block's label.
    ///
    /// # Errors
    /// Returns [`OptimizeError::DanglingLabel`] if `after` names no block.
    pub fn insert_after(&mut self, after: LabelId, instructions: Vec<Instruction>) -> Result<LabelId, OptimizeError> {
        let pos = *self.index.get(&after).ok_or(OptimizeError::DanglingLabel(after))?;
        let label = self.fresh_label();
        self.blocks.insert(pos + 1, Block::new(label, instructions));
        self.reindex_from(pos + 1);
        Ok(label)
    }

    /// Inserts `instructions` as a new block immediately before `before`,
    /// returning the new block's label.
    ///
    /// # Errors
    /// Returns [`OptimizeError::DanglingLabel`] if `before` names no block.
    pub fn insert_before(&mut self, before: LabelId, instructions: Vec<Instruction>) -> Result<LabelId, OptimizeError> {
        let pos = *self.index.get(&before).ok_or(OptimizeError::DanglingLabel(before))?;
        let label = self.fresh_label();
        self.blocks.insert(pos, Block::new(label, instructions));
        self.reindex_from(pos);
        Ok(label)
    }

    /// Removes block `label`, provided no other block still references it.
    ///
    /// # Errors
    /// Returns [`OptimizeError::MalformedBlocks`] if some other instruction
    /// still targets this block's label.
    pub fn remove(&mut self, label: LabelId) -> Result<(), OptimizeError> {
        let still_referenced = self
            .blocks
            .iter()
            .filter(|b| b.label() != label)
            .any(|b| b.instructions().iter().any(|i| i.jump_target() == Some(label)));
        if still_referenced {
            return Err(OptimizeError::MalformedBlocks {
                block: label,
                reason: "label is still referenced by another block",
            });
        }
        let Some(&pos) = self.index.get(&label) else {
            return Ok(());
        };
        self.blocks.remove(pos);
        self.reindex_from(pos);
        Ok(())
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, block) in self.blocks.iter().enumerate().skip(start) {
            self.index.insert(block.label(), i);
        }
    }

    /// The position of `label` in block order, if any.
    #[must_use]
    pub fn position_of(&self, label: LabelId) -> Option<usize> {
        self.index.get(&label).copied()
    }

    /// The successors of `at` through control flow: the terminator's target
    /// (if any) and whether this block also falls through to the next one in
    /// list order.
    #[must_use]
    pub fn successors(&self, at: usize) -> (Option<LabelId>, bool) {
        let Some(block) = self.blocks.get(at) else {
            return (None, false);
        };
        match block.terminator() {
            None => (None, at + 1 < self.blocks.len()),
            Some(term) if term.opcode().is_conditional_jump() => (term.jump_target(), at + 1 < self.blocks.len()),
            Some(term) => (term.jump_target(), false),
        }
    }

    /// Checks that every label referenced by any instruction resolves to a
    /// block in this list.
    ///
    /// # Errors
    /// Returns the first [`OptimizeError::DanglingLabel`] found.
    pub fn check_label_integrity(&self) -> Result<(), OptimizeError> {
        for block in &self.blocks {
            for instr in block.instructions() {
                if let Some(target) = instr.jump_target() {
                    if self.get(target).is_none() {
                        return Err(OptimizeError::DanglingLabel(target));
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks that the last block does not fall through — it has to end in
    /// a jump or a return, since there is nothing after it to fall into.
    ///
    /// # Errors
    /// Returns [`OptimizeError::MalformedBlocks`] if the last block falls
    /// through.
    pub fn check_well_formed(&self) -> Result<(), OptimizeError> {
        if let Some(last) = self.blocks.last() {
            if last.falls_through() {
                return Err(OptimizeError::MalformedBlocks {
                    block: last.label(),
                    reason: "last block falls through with no terminator",
                });
            }
        }
        Ok(())
    }
}
