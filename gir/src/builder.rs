use crate::{
    decl::{Decl, DeclData, DeclFlags, DeclKind},
    function::Function,
    inst::{Inst, InstData, Op, ScratchAccess, MAX_SRCS},
    operand::{
        AccRegSel, Base, DstRegion, MaskOption, RegionDesc, SrcModifier, SrcOperand, SrcRegion,
    },
    types::{SourceLoc, Type},
};

/// Factory for operand regions, internal moves, scratch intrinsics, and
/// fresh declarations.
///
/// Instructions come back unattached; callers place them through
/// [`crate::Layout`]. Declaration names are generated from the current
/// declaration count, so they are unique and stable for a given input.
pub struct IrBuilder<'f> {
    func: &'f mut Function,
}

impl<'f> IrBuilder<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        Self { func }
    }

    pub fn func(&self) -> &Function {
        &*self.func
    }

    /// A contiguous source region at `(base, row, 0)` with no modifier.
    pub fn src_region(&self, base: Decl, row: u32, ty: Type) -> SrcRegion {
        SrcRegion {
            base: Base::Decl(base),
            row,
            subreg: 0,
            region: RegionDesc::stride1(),
            ty,
            modifier: SrcModifier::None,
            acc_sel: AccRegSel::NoAcc,
        }
    }

    pub fn dst_region(&self, base: Decl, row: u32, ty: Type) -> DstRegion {
        DstRegion {
            base: Base::Decl(base),
            row,
            subreg: 0,
            hstride: 1,
            ty,
            acc_sel: AccRegSel::NoAcc,
        }
    }

    pub fn null_dst(&self, ty: Type) -> DstRegion {
        DstRegion {
            base: Base::Null,
            row: 0,
            subreg: 0,
            hstride: 1,
            ty,
            acc_sel: AccRegSel::NoAcc,
        }
    }

    /// The builtin r0 header payload carried by every scratch message.
    pub fn header_src(&self) -> SrcRegion {
        self.src_region(self.func.builtin_r0(), 0, Type::UD)
    }

    /// A raw register-to-register move.
    pub fn mov(
        &mut self,
        exec_size: u8,
        dst: DstRegion,
        src: SrcRegion,
        mask: MaskOption,
        loc: SourceLoc,
    ) -> Inst {
        let mut srcs: [Option<SrcOperand>; MAX_SRCS] = [None; MAX_SRCS];
        srcs[0] = Some(SrcOperand::Region(src));
        self.func.create_inst(InstData {
            op: Op::Mov,
            dst: Some(dst),
            srcs,
            exec_size,
            mask,
            loc,
        })
    }

    /// A scratch write of `num_rows` rows starting at `offset`, sourcing
    /// `payload`. The caller decides the mask: write-enable when every
    /// participant was, the shared quarter mask otherwise.
    pub fn spill(
        &mut self,
        payload: SrcRegion,
        offset: u32,
        num_rows: u32,
        mask: MaskOption,
        loc: SourceLoc,
    ) -> Inst {
        debug_assert!(
            crate::message::encode_spill_desc(num_rows, offset).is_ok(),
            "scratch write of {num_rows} rows is not encodable"
        );
        let mut srcs: [Option<SrcOperand>; MAX_SRCS] = [None; MAX_SRCS];
        srcs[0] = Some(SrcOperand::Region(self.header_src()));
        srcs[1] = Some(SrcOperand::Region(payload));
        self.func.create_inst(InstData {
            op: Op::Spill(ScratchAccess { offset, num_rows }),
            dst: Some(self.null_dst(Type::UW)),
            srcs,
            exec_size: 16,
            mask,
            loc,
        })
    }

    /// A scratch read of `num_rows` rows starting at `offset` into `dst`.
    /// Fills always run write-enabled.
    pub fn fill(&mut self, dst: DstRegion, offset: u32, num_rows: u32, loc: SourceLoc) -> Inst {
        debug_assert!(
            crate::message::encode_fill_desc(num_rows, offset).is_ok(),
            "scratch read of {num_rows} rows is not encodable"
        );
        let mut srcs: [Option<SrcOperand>; MAX_SRCS] = [None; MAX_SRCS];
        srcs[0] = Some(SrcOperand::Region(self.header_src()));
        self.func.create_inst(InstData {
            op: Op::Fill(ScratchAccess { offset, num_rows }),
            dst: Some(dst),
            srcs,
            exec_size: 16,
            mask: MaskOption::WRITE_ENABLE,
            loc,
        })
    }

    pub fn create_decl(
        &mut self,
        name: impl Into<String>,
        num_rows: u32,
        kind: DeclKind,
        flags: DeclFlags,
    ) -> Decl {
        self.func.decls.push(DeclData {
            name: name.into(),
            num_rows,
            kind,
            flags,
        })
    }

    /// A staging payload declaration for a coalesced spill. Never re-spilled.
    pub fn create_coalesced_spill_decl(&mut self, payload_rows: u32) -> Decl {
        let name = format!("COAL_SPILL_{}", self.func.decls.len());
        self.create_decl(
            name,
            payload_rows,
            DeclKind::CoalescedSpill,
            DeclFlags::DO_NOT_SPILL,
        )
    }

    /// The widened destination declaration for a coalesced fill. Never
    /// re-spilled; inherits the lead participant's alignment requirement.
    pub fn create_coalesced_fill_decl(&mut self, num_rows: u32, even_align: bool) -> Decl {
        let name = format!("COAL_FILL_{}", self.func.decls.len());
        let mut flags = DeclFlags::DO_NOT_SPILL;
        if even_align {
            flags |= DeclFlags::EVEN_ALIGN;
        }
        self.create_decl(name, num_rows, DeclKind::CoalescedFill, flags)
    }

    /// A copy declaration used to break a split-send source overlap.
    pub fn create_copy_decl(&mut self, num_rows: u32) -> Decl {
        let name = format!("COPY_{}", self.func.decls.len());
        self.create_decl(name, num_rows, DeclKind::Copy, DeclFlags::empty())
    }
}
