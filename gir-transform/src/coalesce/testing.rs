//! Shared builders for the coalescing unit tests.

use genc_gir::{
    Base, Decl, DeclFlags, DeclKind, DstRegion, Function, Inst, InstData, IrBuilder, MaskOption,
    MsgKind, Op, SendDesc, SourceLoc, SrcOperand, Type, AccRegSel, MAX_SRCS,
};

/// A single-block function under construction, with a leading label the way
/// the CFG builder emits blocks.
pub(crate) struct TestBed {
    pub func: Function,
    pub block: genc_gir::Block,
    next_loc: u32,
}

impl TestBed {
    pub fn new() -> Self {
        let mut func = Function::new("test_kernel", 16);
        let block = func.create_block(Some("entry"));
        let label = func.create_inst(InstData {
            op: Op::Label,
            dst: None,
            srcs: [None; MAX_SRCS],
            exec_size: 1,
            mask: MaskOption::WRITE_ENABLE,
            loc: SourceLoc::INVALID,
        });
        func.layout.append_inst(label, block);
        Self {
            func,
            block,
            next_loc: 0,
        }
    }

    fn loc(&mut self) -> SourceLoc {
        self.next_loc += 1;
        SourceLoc::new(self.next_loc)
    }

    pub fn decl(&mut self, name: impl Into<String>, rows: u32) -> Decl {
        self.decl_with_flags(name, rows, DeclFlags::empty())
    }

    pub fn decl_with_flags(
        &mut self,
        name: impl Into<String>,
        rows: u32,
        flags: DeclFlags,
    ) -> Decl {
        IrBuilder::new(&mut self.func).create_decl(name, rows, DeclKind::Regular, flags)
    }

    pub fn append(&mut self, inst: Inst) {
        self.func.layout.append_inst(inst, self.block);
    }

    pub fn dst(&self, base: Decl, row: u32) -> DstRegion {
        DstRegion {
            base: Base::Decl(base),
            row,
            subreg: 0,
            hstride: 1,
            ty: Type::UD,
            acc_sel: AccRegSel::NoAcc,
        }
    }

    /// Appends a scratch write of `rows` rows at `offset`, sourcing
    /// `(payload, row)`.
    pub fn spill(
        &mut self,
        payload: Decl,
        row: u32,
        offset: u32,
        rows: u32,
        mask: MaskOption,
    ) -> Inst {
        let loc = self.loc();
        let mut b = IrBuilder::new(&mut self.func);
        let src = b.src_region(payload, row, Type::UD);
        let inst = b.spill(src, offset, rows, mask, loc);
        self.append(inst);
        inst
    }

    /// Appends a scratch read of `rows` rows at `offset` into `(dst, row)`.
    pub fn fill(&mut self, dst: Decl, row: u32, offset: u32, rows: u32) -> Inst {
        let loc = self.loc();
        let mut b = IrBuilder::new(&mut self.func);
        let dst = b.dst_region(dst, row, Type::UD);
        let inst = b.fill(dst, offset, rows, loc);
        self.append(inst);
        inst
    }

    /// Appends an instruction that reads `(d, row)` without defining
    /// anything observable.
    pub fn use_of(&mut self, d: Decl, row: u32) -> Inst {
        let loc = self.loc();
        let b = IrBuilder::new(&mut self.func);
        let src = b.src_region(d, row, Type::UD);
        let mut srcs: [Option<SrcOperand>; MAX_SRCS] = [None; MAX_SRCS];
        srcs[0] = Some(SrcOperand::Region(src));
        srcs[1] = Some(SrcOperand::Imm { value: 0, ty: Type::UD });
        let null = b.null_dst(Type::UD);
        let inst = self.func.create_inst(InstData {
            op: Op::Add,
            dst: Some(null),
            srcs,
            exec_size: 8,
            mask: MaskOption::Q1,
            loc,
        });
        self.append(inst);
        inst
    }

    pub fn pseudo_kill(&mut self, d: Decl) -> Inst {
        let loc = self.loc();
        let inst = self.func.create_inst(InstData {
            op: Op::PseudoKill,
            dst: Some(self.dst(d, 0)),
            srcs: [None; MAX_SRCS],
            exec_size: 1,
            mask: MaskOption::WRITE_ENABLE,
            loc,
        });
        self.append(inst);
        inst
    }

    /// Appends a non-scratch send writing `resp_len` rows into `dst`.
    pub fn send_into(&mut self, dst: Decl, resp_len: u32) -> Inst {
        let loc = self.loc();
        let b = IrBuilder::new(&mut self.func);
        let header = b.header_src();
        let dst = b.dst_region(dst, 0, Type::UD);
        let mut srcs: [Option<SrcOperand>; MAX_SRCS] = [None; MAX_SRCS];
        srcs[0] = Some(SrcOperand::Region(header));
        let inst = self.func.create_inst(InstData {
            op: Op::Send(SendDesc {
                split: false,
                msg: MsgKind::Sampler,
                msg_len: 1,
                ext_msg_len: 0,
                resp_len,
            }),
            dst: Some(dst),
            srcs,
            exec_size: 8,
            mask: MaskOption::WRITE_ENABLE,
            loc,
        });
        self.append(inst);
        inst
    }

    /// Appends a split send with sources `(d0, row0)` and `(d1, row1)` of
    /// `msg_len`/`ext_len` rows.
    pub fn split_send(
        &mut self,
        d0: Decl,
        row0: u32,
        msg_len: u32,
        d1: Decl,
        row1: u32,
        ext_len: u32,
    ) -> Inst {
        let loc = self.loc();
        let b = IrBuilder::new(&mut self.func);
        let src0 = b.src_region(d0, row0, Type::UD);
        let src1 = b.src_region(d1, row1, Type::UD);
        let null = b.null_dst(Type::UD);
        let mut srcs: [Option<SrcOperand>; MAX_SRCS] = [None; MAX_SRCS];
        srcs[0] = Some(SrcOperand::Region(src0));
        srcs[1] = Some(SrcOperand::Region(src1));
        let inst = self.func.create_inst(InstData {
            op: Op::Send(SendDesc {
                split: true,
                msg: MsgKind::DataPort,
                msg_len,
                ext_msg_len: ext_len,
                resp_len: 0,
            }),
            dst: Some(null),
            srcs,
            exec_size: 8,
            mask: MaskOption::WRITE_ENABLE,
            loc,
        });
        self.append(inst);
        inst
    }

    /// Appends a raw row-to-row copy of `exec_size * 4` bytes.
    pub fn raw_mov(
        &mut self,
        dst: Decl,
        dst_row: u32,
        src: Decl,
        src_row: u32,
        exec_size: u8,
    ) -> Inst {
        let loc = self.loc();
        let mut b = IrBuilder::new(&mut self.func);
        let d = b.dst_region(dst, dst_row, Type::UD);
        let s = b.src_region(src, src_row, Type::UD);
        let inst = b.mov(exec_size, d, s, MaskOption::WRITE_ENABLE, loc);
        self.append(inst);
        inst
    }

    /// Every inserted instruction satisfying `pred`, in program order.
    pub fn insts_matching(&self, pred: impl Fn(&InstData) -> bool) -> Vec<Inst> {
        let mut out = Vec::new();
        for bb in self.func.layout.blocks() {
            for inst in self.func.layout.block_insts(bb) {
                if pred(self.func.inst(inst)) {
                    out.push(inst);
                }
            }
        }
        out
    }
}
