//! Synthesis of coalesced scratch messages and rewriting of the operands
//! that referenced the originals.

use genc_gir::{
    Base, Block, Decl, FxHashSet, GirError, Inst, IrBuilder, MaskOption, RegisterPressure,
    SrcOperand, SrcRegion, Type, GRF_REG_BYTES, MAX_SRCS,
};

use super::{CoalesceSpillFills, InstList};

impl<P: RegisterPressure> CoalesceSpillFills<'_, P> {
    /// Emits one wider spill covering slots `[min, max]` in place of the
    /// selected group.
    ///
    /// When every participant sources the same declaration, the wider spill
    /// reads that declaration directly from the lowest participating row.
    /// Otherwise a staging declaration is allocated and the substitution map
    /// redirects each participant's producer into it.
    pub(super) fn coalesce_spill_group(
        &mut self,
        coalescable: &mut InstList,
        min: u32,
        max: u32,
        use_no_mask: bool,
        mask: MaskOption,
        bb: Block,
    ) -> Result<(), GirError> {
        let payload_size = max - min + 1;
        if !matches!(payload_size, 1 | 2 | 4 | 8) {
            return Err(GirError::UnsupportedPayloadSize(payload_size));
        }

        let mut declares: FxHashSet<Decl> = FxHashSet::default();
        let mut min_row = u32::MAX;
        for &s in coalescable.iter() {
            let src1 = *self
                .func
                .inst(s)
                .src(1)
                .and_then(|s| s.as_region())
                .expect("spill payload must be a register region");
            let cur_row = src1.left_bound() / GRF_REG_BYTES;
            declares.insert(src1.top_decl().expect("spill payload must reference a declaration"));
            min_row = min_row.min(cur_row);
        }

        let same_source = declares.len() == 1;
        let (dcl, row) = if same_source {
            (*declares.iter().next().expect("declaration set is non-empty"), min_row)
        } else {
            let staging = IrBuilder::new(self.func).create_coalesced_spill_decl(payload_size);
            (staging, 0)
        };

        let loc = self.func.inst(coalescable[0]).loc;
        let mut builder = IrBuilder::new(self.func);
        let payload = builder.src_region(dcl, row, Type::UD);
        let m = if use_no_mask { MaskOption::WRITE_ENABLE } else { mask };
        let new_spill = builder.spill(payload, min, payload_size, m, loc);

        if !same_source {
            for &c in coalescable.iter() {
                let (offset, _) = self.func.inst(c).scratch_msg_info()?;
                debug_assert_eq!(
                    self.func.inst(c).src(0).and_then(|s| s.top_decl()),
                    Some(self.func.builtin_r0()),
                    "unexpected spill header"
                );
                let orig = self
                    .payload_decl(c)
                    .expect("spill payload must reference a declaration");
                self.replace_map.insert(orig, (dcl, offset - min));
            }
        }

        // The coalesced spill lands after the last participant, so every
        // staged row is written before the message executes.
        let last = *coalescable.last().expect("group has at least two spills");
        let anchor = self.func.layout.next_inst(last);
        for &spill in coalescable.iter() {
            self.func.layout.remove_inst(spill);
        }
        coalescable.clear();
        match anchor {
            Some(anchor) => self.func.layout.insert_before(new_spill, anchor),
            None => self.func.layout.append_inst(new_spill, bb),
        }
        Ok(())
    }

    /// Emits one wider fill covering slots `[min, max]` in place of the
    /// selected group, into a fresh coalesced declaration.
    pub(super) fn coalesce_fill_group(
        &mut self,
        coalescable: &mut InstList,
        min: u32,
        max: u32,
        bb: Block,
    ) -> Result<(), GirError> {
        // Fills round the span up to the next legal message width.
        let payload_size = match max - min + 1 {
            0 => 1,
            3 => 4,
            p if p > 4 => 8,
            p => p,
        };
        if !matches!(payload_size, 1 | 2 | 4 | 8) {
            return Err(GirError::UnsupportedPayloadSize(payload_size));
        }

        // The declaration can outgrow the payload when a participant's
        // destination variable extends past the rows actually filled here.
        let mut dcl_size = payload_size;
        for &c in coalescable.iter() {
            let data = self.func.inst(c);
            let (offset, _) = data.scratch_msg_info()?;
            let dst = data.dst.as_ref().expect("fill has a destination");
            let dst_rows = self.func.decl(dst.top_decl().expect("fill writes a declaration")).num_rows;
            let max_row = dst_rows + offset - dst.row - min;
            dcl_size = dcl_size.max(max_row);
        }

        let lead = coalescable[0];
        let even_align = self
            .func
            .inst(lead)
            .dst
            .as_ref()
            .and_then(|d| d.top_decl())
            .is_some_and(|d| self.func.decl(d).is_even_aligned());
        let loc = self.func.inst(lead).loc;

        let mut builder = IrBuilder::new(self.func);
        let fill_dcl = builder.create_coalesced_fill_decl(dcl_size, even_align);
        let dst = builder.dst_region(fill_dcl, 0, Type::UD);
        let new_fill = builder.fill(dst, min, payload_size, loc);

        for &c in coalescable.iter() {
            let (offset, _) = self.func.inst(c).scratch_msg_info()?;
            let orig = self
                .func
                .inst(c)
                .dst
                .as_ref()
                .and_then(|d| d.top_decl())
                .expect("fill writes a declaration");
            self.replace_map.insert(orig, (fill_dcl, offset - min));
        }

        // The coalesced fill lands after the first participant; its
        // definition must dominate every rewritten use in the block.
        let front = coalescable[0];
        let mut anchor = self.func.layout.next_inst(front);
        while let Some(a) = anchor {
            if !coalescable.contains(&a) {
                break;
            }
            anchor = self.func.layout.next_inst(a);
        }
        for &fill in coalescable.iter() {
            self.func.layout.remove_inst(fill);
        }
        coalescable.clear();
        match anchor {
            Some(anchor) => self.func.layout.insert_before(new_fill, anchor),
            None => self.func.layout.append_inst(new_fill, bb),
        }
        Ok(())
    }

    /// Rebuilds any operand of `inst` whose top declaration has a
    /// substitution entry, shifting its row offset by the mapped amount and
    /// preserving everything else. Operands without a declaration base are
    /// skipped.
    pub(super) fn replace_coalesced_operands(&mut self, inst: Inst) {
        let data = self.func.inst(inst);

        if let Some(dst) = data.dst {
            if let Some(&(new_dcl, shift)) =
                dst.top_decl().and_then(|d| self.replace_map.get(&d))
            {
                let mut new_dst = dst;
                new_dst.base = Base::Decl(new_dcl);
                new_dst.row = shift + dst.row;
                self.func.inst_mut(inst).dst = Some(new_dst);
            }
        }

        for i in 0..MAX_SRCS {
            let Some(&SrcOperand::Region(src)) = self.func.inst(inst).src(i) else {
                continue;
            };
            if let Some(&(new_dcl, shift)) =
                src.top_decl().and_then(|d| self.replace_map.get(&d))
            {
                let new_src = SrcRegion {
                    base: Base::Decl(new_dcl),
                    row: shift + src.row,
                    ..src
                };
                self.func.inst_mut(inst).srcs[i] = Some(SrcOperand::Region(new_src));
            }
        }
    }
}
