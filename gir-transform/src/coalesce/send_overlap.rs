//! Split-send sources must not overlap; coalescing can leave both sources
//! pointing into one coalesced declaration. Copy the second source out.

use genc_gir::{
    Block, IrBuilder, MaskOption, Op, RegisterPressure, SrcOperand, Type, GRF_REG_BYTES,
};

use super::CoalesceSpillFills;

impl<P: RegisterPressure> CoalesceSpillFills<'_, P> {
    pub(super) fn fix_send_src_overlap(&mut self) {
        let blocks: Vec<Block> = self.func.layout.blocks().collect();
        for bb in blocks {
            let mut cursor = self.func.layout.first_inst(bb);
            while let Some(inst) = cursor {
                cursor = self.func.layout.next_inst(inst);

                let data = self.func.inst(inst);
                let Op::Send(desc) = data.op else { continue };
                if !desc.split {
                    continue;
                }
                let (Some(&SrcOperand::Region(src0)), Some(&SrcOperand::Region(src1))) =
                    (data.src(0), data.src(1))
                else {
                    continue;
                };
                let (Some(d0), Some(d1)) = (src0.top_decl(), src1.top_decl()) else {
                    continue;
                };
                if d0 != d1 {
                    continue;
                }

                let lb0 = src0.left_bound();
                let rb0 = lb0 + desc.msg_len * GRF_REG_BYTES - 1;
                let lb1 = src1.left_bound();
                let rb1 = lb1 + desc.ext_msg_len * GRF_REG_BYTES - 1;
                if !((lb0 < lb1 && rb0 > lb1) || (lb1 < lb0 && rb1 > lb0)) {
                    continue;
                }

                log::trace!(
                    target: "coalesce-spill-fills",
                    "breaking source overlap of split send {}",
                    self.func.inst(inst)
                );

                // Copying src1 is the simpler choice; the overlap only shows
                // up for forced spill patterns, so the extra rows are cheap.
                let rows = desc.ext_msg_len;
                let loc = self.func.inst(inst).loc;
                let mut builder = IrBuilder::new(self.func);
                let copy_dcl = builder.create_copy_decl(rows);
                let mut movs = Vec::with_capacity(rows as usize);
                for row in 0..rows {
                    let src = builder.src_region(d1, src1.row + row, Type::UD);
                    let dst = builder.dst_region(copy_dcl, row, Type::UD);
                    movs.push(builder.mov(8, dst, src, MaskOption::WRITE_ENABLE, loc));
                }
                let new_src1 = builder.src_region(copy_dcl, 0, Type::UD);
                for mov in movs {
                    self.func.layout.insert_before(mov, inst);
                }
                self.func.inst_mut(inst).srcs[1] = Some(SrcOperand::Region(new_src1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use genc_gir::{Op, ZeroPressure};
    use pretty_assertions::assert_eq;

    use super::super::testing::TestBed;
    use super::super::{CoalesceOptions, CoalesceSpillFills};

    #[test]
    fn overlapping_split_send_sources_are_copied_apart() {
        // Scenario: a coalesced fill produced C; the send reads C rows 0..1
        // as src0 and rows 1..2 as src1. Two SIMD8 copies of rows 1..2 feed
        // a fresh COPY declaration and src1 is rewritten to it.
        let mut t = TestBed::new();
        let c = t.decl("C", 3);
        let send = t.split_send(c, 0, 2, c, 1, 2);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.fix_send_src_overlap();

        let movs = t.insts_matching(|d| matches!(d.op, Op::Mov));
        assert_eq!(movs.len(), 2);
        for (i, &m) in movs.iter().enumerate() {
            let data = t.func.inst(m);
            assert_eq!(data.exec_size, 8);
            let src = data.src(0).unwrap().as_region().unwrap();
            assert_eq!((src.top_decl(), src.row), (Some(c), 1 + i as u32));
        }
        let copy_dcl = t.func.inst(movs[0]).dst.as_ref().unwrap().top_decl().unwrap();
        assert!(t.func.decl(copy_dcl).name.starts_with("COPY_"));
        assert_eq!(t.func.decl(copy_dcl).num_rows, 2);

        let src1 = t.func.inst(send).src(1).unwrap().as_region().unwrap();
        assert_eq!((src1.top_decl(), src1.row), (Some(copy_dcl), 0));
    }

    #[test]
    fn disjoint_sources_are_left_alone() {
        let mut t = TestBed::new();
        let c = t.decl("C", 4);
        let send = t.split_send(c, 0, 2, c, 2, 2);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.fix_send_src_overlap();

        assert!(t.insts_matching(|d| matches!(d.op, Op::Mov)).is_empty());
        let src1 = t.func.inst(send).src(1).unwrap().as_region().unwrap();
        assert_eq!((src1.top_decl(), src1.row), (Some(c), 2));
    }

    #[test]
    fn different_declarations_never_trigger_the_fix() {
        let mut t = TestBed::new();
        let a = t.decl("A", 2);
        let b = t.decl("B", 2);
        t.split_send(a, 0, 2, b, 0, 2);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.fix_send_src_overlap();

        assert!(t.insts_matching(|d| matches!(d.op, Op::Mov)).is_empty());
    }
}
