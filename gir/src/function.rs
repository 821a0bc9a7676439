use core::fmt;

use cranelift_entity::PrimaryMap;

use crate::{
    block::{Block, BlockData, Layout},
    decl::{Decl, DeclData},
    inst::{Inst, InstData},
};

/// A shader function: per-function arenas for declarations and instructions,
/// plus the block/instruction layout.
///
/// Arenas only grow; nothing is freed before the function is dropped, so
/// entity handles held by passes never dangle.
pub struct Function {
    pub name: String,
    /// SIMD width the shader was compiled at (8, 16, or 32 lanes).
    pub simd_size: u8,
    pub decls: PrimaryMap<Decl, DeclData>,
    pub insts: PrimaryMap<Inst, InstData>,
    pub blocks: PrimaryMap<Block, BlockData>,
    pub layout: Layout,
    builtin_r0: Decl,
}

impl Function {
    pub fn new(name: impl Into<String>, simd_size: u8) -> Self {
        let mut decls = PrimaryMap::new();
        let builtin_r0 = decls.push(DeclData::new("r0", 1));
        Self {
            name: name.into(),
            simd_size,
            decls,
            insts: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            layout: Layout::default(),
            builtin_r0,
        }
    }

    /// The builtin header register used as payload header by scratch
    /// messages.
    pub fn builtin_r0(&self) -> Decl {
        self.builtin_r0
    }

    /// Creates a block and appends it to the layout.
    pub fn create_block(&mut self, label: Option<&str>) -> Block {
        let block = self.blocks.push(BlockData {
            label: label.map(str::to_string),
        });
        self.layout.append_block(block);
        block
    }

    /// Allocates an instruction in the arena, unattached to any block.
    pub fn create_inst(&mut self, data: InstData) -> Inst {
        self.insts.push(data)
    }

    pub fn decl(&self, decl: Decl) -> &DeclData {
        &self.decls[decl]
    }

    pub fn decl_mut(&mut self, decl: Decl) -> &mut DeclData {
        &mut self.decls[decl]
    }

    pub fn inst(&self, inst: Inst) -> &InstData {
        &self.insts[inst]
    }

    pub fn inst_mut(&mut self, inst: Inst) -> &mut InstData {
        &mut self.insts[inst]
    }

    /// A listing of the function body, for trace logs and test failures.
    pub fn display(&self) -> FunctionDisplay<'_> {
        FunctionDisplay(self)
    }
}

pub struct FunctionDisplay<'a>(&'a Function);

impl fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.0;
        writeln!(f, "func {} (simd{})", func.name, func.simd_size)?;
        for block in func.layout.blocks() {
            match &func.blocks[block].label {
                Some(label) => writeln!(f, "{label}:")?,
                None => writeln!(f, "{block}:")?,
            }
            for inst in func.layout.block_insts(block) {
                writeln!(f, "    {}", func.insts[inst])?;
            }
        }
        Ok(())
    }
}
