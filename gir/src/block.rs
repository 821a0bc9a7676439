use cranelift_entity::{entity_impl, packed_option::PackedOption, SecondaryMap};

use crate::inst::Inst;

/// A handle to a basic block.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// The data backing a [`Block`] handle.
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub label: Option<String>,
}

#[derive(Clone, Default)]
struct BlockNode {
    prev: PackedOption<Block>,
    next: PackedOption<Block>,
    first_inst: PackedOption<Inst>,
    last_inst: PackedOption<Inst>,
}

#[derive(Clone, Default)]
struct InstNode {
    block: PackedOption<Block>,
    prev: PackedOption<Inst>,
    next: PackedOption<Inst>,
}

/// Linear order of blocks in a function and of instructions within each
/// block, maintained as doubly-linked lists over entity maps.
///
/// Handles are stable across edits: erasing an instruction at a cursor
/// yields the next cursor, and every other handle into the same block stays
/// valid. Detached instructions remain in the function arena.
#[derive(Default)]
pub struct Layout {
    blocks: SecondaryMap<Block, BlockNode>,
    insts: SecondaryMap<Inst, InstNode>,
    first_block: PackedOption<Block>,
    last_block: PackedOption<Block>,
}

impl Layout {
    /// Appends `block` to the end of the function's block order.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(self.blocks[block].prev.is_none() && self.blocks[block].next.is_none());
        if let Some(last) = self.last_block.expand() {
            self.blocks[last].next = block.into();
            self.blocks[block].prev = last.into();
        } else {
            self.first_block = block.into();
        }
        self.last_block = block.into();
    }

    pub fn first_block(&self) -> Option<Block> {
        self.first_block.expand()
    }

    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].next.expand()
    }

    /// Iterates blocks in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        let mut next = self.first_block.expand();
        core::iter::from_fn(move || {
            let block = next?;
            next = self.blocks[block].next.expand();
            Some(block)
        })
    }

    /// Appends `inst` to the end of `block`.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert!(self.insts[inst].block.is_none(), "instruction already inserted");
        let node = &mut self.blocks[block];
        let prev = node.last_inst;
        node.last_inst = inst.into();
        if node.first_inst.is_none() {
            node.first_inst = inst.into();
        }
        if let Some(prev) = prev.expand() {
            self.insts[prev].next = inst.into();
        }
        self.insts[inst] = InstNode {
            block: block.into(),
            prev,
            next: None.into(),
        };
    }

    /// Inserts `inst` immediately before `before`.
    pub fn insert_before(&mut self, inst: Inst, before: Inst) {
        debug_assert!(self.insts[inst].block.is_none(), "instruction already inserted");
        let block = self.insts[before].block.expand().expect("`before` is not inserted");
        let prev = self.insts[before].prev;
        self.insts[inst] = InstNode {
            block: block.into(),
            prev,
            next: before.into(),
        };
        self.insts[before].prev = inst.into();
        match prev.expand() {
            Some(prev) => self.insts[prev].next = inst.into(),
            None => self.blocks[block].first_inst = inst.into(),
        }
    }

    /// Inserts `inst` immediately after `after`.
    pub fn insert_after(&mut self, inst: Inst, after: Inst) {
        debug_assert!(self.insts[inst].block.is_none(), "instruction already inserted");
        let block = self.insts[after].block.expand().expect("`after` is not inserted");
        let next = self.insts[after].next;
        self.insts[inst] = InstNode {
            block: block.into(),
            prev: after.into(),
            next,
        };
        self.insts[after].next = inst.into();
        match next.expand() {
            Some(next) => self.insts[next].prev = inst.into(),
            None => self.blocks[block].last_inst = inst.into(),
        }
    }

    /// Detaches `inst` from its block, returning the handle of the next
    /// instruction. Callers iterating a block must resume from the returned
    /// cursor.
    pub fn remove_inst(&mut self, inst: Inst) -> Option<Inst> {
        let node = core::mem::take(&mut self.insts[inst]);
        let block = node.block.expand().expect("instruction is not inserted");
        match node.prev.expand() {
            Some(prev) => self.insts[prev].next = node.next,
            None => self.blocks[block].first_inst = node.next,
        }
        match node.next.expand() {
            Some(next) => self.insts[next].prev = node.prev,
            None => self.blocks[block].last_inst = node.prev,
        }
        node.next.expand()
    }

    pub fn is_inserted(&self, inst: Inst) -> bool {
        self.insts[inst].block.is_some()
    }

    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.insts[inst].block.expand()
    }

    pub fn first_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].first_inst.expand()
    }

    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last_inst.expand()
    }

    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].next.expand()
    }

    pub fn prev_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].prev.expand()
    }

    /// Iterates the instructions of `block` front to back. The iterator
    /// snapshots nothing; do not edit the block while holding it.
    pub fn block_insts(&self, block: Block) -> BlockInsts<'_> {
        BlockInsts {
            layout: self,
            front: self.blocks[block].first_inst.expand(),
            back: self.blocks[block].last_inst.expand(),
            done: false,
        }
    }
}

/// Double-ended iterator over the instructions of one block.
pub struct BlockInsts<'a> {
    layout: &'a Layout,
    front: Option<Inst>,
    back: Option<Inst>,
    done: bool,
}

impl Iterator for BlockInsts<'_> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        if self.done {
            return None;
        }
        let inst = self.front?;
        if self.front == self.back {
            self.done = true;
        } else {
            self.front = self.layout.next_inst(inst);
        }
        Some(inst)
    }
}

impl DoubleEndedIterator for BlockInsts<'_> {
    fn next_back(&mut self) -> Option<Inst> {
        if self.done {
            return None;
        }
        let inst = self.back?;
        if self.front == self.back {
            self.done = true;
        } else {
            self.back = self.layout.prev_inst(inst);
        }
        Some(inst)
    }
}
