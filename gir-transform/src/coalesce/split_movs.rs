//! Removal of redundant split movs.
//!
//! When a send result is first copied row-by-row into a temporary and the
//! temporary is then spilled, the spill can read the send result directly,
//! and the copies die with the temporary:
//!
//! ```text
//! send (8) SAMPLE      // resLen = 3
//! mov  (8) T(0,0), SAMPLE(0,0)
//! mov  (8) T(1,0), SAMPLE(1,0)
//! spill    T(0,0)      // 2 rows
//! ==>
//! send (8) SAMPLE
//! spill    SAMPLE(0,0) // 2 rows
//! ```

use genc_gir::{
    Base, Block, Decl, FxHashMap, FxHashSet, GirError, Inst, Op, RegisterPressure, SrcOperand,
    SrcRegion, GRF_REG_BYTES, MAX_SRCS,
};

use super::CoalesceSpillFills;

impl<P: RegisterPressure> CoalesceSpillFills<'_, P> {
    pub(super) fn remove_redundant_split_movs(&mut self) -> Result<(), GirError> {
        // Reference counts and erase locations of each declaration whose
        // spill was redirected; computed first, erased after.
        let mut movs: FxHashMap<Decl, (u32, Vec<Inst>)> = FxHashMap::default();

        let blocks: Vec<Block> = self.func.layout.blocks().collect();
        for &bb in &blocks {
            // Only copies out of declarations defined by non-scratch sends
            // in this block are candidates. Raw movs from partial writes of
            // ordinary instructions must be preserved.
            let mut send_dst: FxHashSet<Decl> = FxHashSet::default();
            for inst in self.func.layout.block_insts(bb) {
                let data = self.func.inst(inst);
                if let Op::Send(desc) = data.op {
                    if !desc.is_scratch() {
                        if let Some(d) = data.dst.as_ref().and_then(|d| d.top_decl()) {
                            send_dst.insert(d);
                        }
                    }
                }
            }

            let first = self.func.layout.first_inst(bb);
            let mut cursor = first;
            while let Some(inst) = cursor {
                cursor = self.func.layout.next_inst(inst);
                if !self.func.inst(inst).is_spill_intrinsic() {
                    continue;
                }
                let Some(&SrcOperand::Region(src1)) = self.func.inst(inst).src(1) else {
                    continue;
                };
                let Some(src1_dcl) = src1.top_decl() else {
                    continue;
                };
                let (_, num_rows) = self.func.inst(inst).scratch_msg_info()?;
                let row_lo = src1.left_bound() / GRF_REG_BYTES;
                let payload_rows: FxHashSet<u32> = (row_lo..row_lo + num_rows).collect();

                // Walk backwards over the contiguous raw-mov chain defining
                // the payload.
                let mut src_dcl: Option<Decl> = None;
                let mut row_mapping: FxHashMap<u32, u32> = FxHashMap::default();
                let mut copies: Vec<Inst> = Vec::new();
                let mut t = self.func.layout.prev_inst(inst);
                while let Some(pinst) = t {
                    if Some(pinst) == first {
                        break;
                    }
                    let pdata = self.func.inst(pinst);
                    if !pdata.is_raw_mov() {
                        break;
                    }
                    let Some(&SrcOperand::Region(psrc)) = pdata.src(0) else {
                        break;
                    };
                    let Some(psrc_dcl) = psrc.top_decl() else {
                        break;
                    };
                    if !send_dst.contains(&psrc_dcl) {
                        break;
                    }
                    let pdst = pdata.dst.expect("raw mov has a destination");
                    if pdst.top_decl() != Some(src1_dcl) {
                        break;
                    }
                    let plb = pdst.left_bound();
                    let prb = pdst.right_bound(pdata.exec_size);
                    // The copy must define whole rows of the payload.
                    if (prb - plb + 1) % GRF_REG_BYTES != 0 {
                        break;
                    }
                    let row_start = plb / GRF_REG_BYTES;
                    let n = (prb - plb + 1) / GRF_REG_BYTES;
                    if (row_start..row_start + n).any(|k| !payload_rows.contains(&k)) {
                        break;
                    }
                    match src_dcl {
                        None => src_dcl = Some(psrc_dcl),
                        Some(d) if d != psrc_dcl => break,
                        _ => {}
                    }
                    if !psrc.is_row_aligned() {
                        break;
                    }
                    let src_lb = psrc.left_bound();
                    let src_rb = psrc.right_bound(pdata.exec_size);
                    if src_rb - src_lb != prb - plb {
                        break;
                    }
                    let p_start_row = src_lb / GRF_REG_BYTES;
                    for k in row_start..row_start + n {
                        row_mapping.insert(k, p_start_row + (k - row_start));
                    }
                    copies.push(pinst);
                    t = self.func.layout.prev_inst(pinst);
                }

                if row_mapping.is_empty() {
                    continue;
                }
                // The chain must cover every payload row through one pure
                // row translation.
                let Some(&base) = row_mapping.get(&row_lo) else {
                    continue;
                };
                let translated = payload_rows
                    .iter()
                    .all(|&k| row_mapping.get(&k) == Some(&(base + (k - row_lo))));
                if !translated {
                    continue;
                }
                let Some(src_dcl) = src_dcl else { continue };

                log::trace!(
                    target: "coalesce-spill-fills",
                    "redirecting spill {} to read its send result directly",
                    self.func.inst(inst)
                );

                let new_src1 = SrcRegion {
                    base: Base::Decl(src_dcl),
                    row: base,
                    subreg: 0,
                    ..src1
                };
                self.func.inst_mut(inst).srcs[1] = Some(SrcOperand::Region(new_src1));

                for &c in &copies {
                    let def_dcl = self
                        .func
                        .inst(c)
                        .dst
                        .as_ref()
                        .and_then(|d| d.top_decl())
                        .expect("raw mov writes a declaration");
                    movs.entry(def_dcl).or_default().1.push(c);
                }
            }
        }

        // Count surviving references to each replaced declaration; its
        // pseudo-kills go with the copies when it is dead.
        for &bb in &blocks {
            for inst in self.func.layout.block_insts(bb) {
                let data = self.func.inst(inst);
                if data.is_pseudo_kill() {
                    if let Some(d) = data.dst.as_ref().and_then(|d| d.top_decl()) {
                        if let Some(entry) = movs.get_mut(&d) {
                            entry.1.push(inst);
                        }
                    }
                }
                for i in 0..MAX_SRCS {
                    if let Some(d) = data.src(i).and_then(|s| s.top_decl()) {
                        if let Some(entry) = movs.get_mut(&d) {
                            entry.0 += 1;
                        }
                    }
                }
            }
        }

        for (dcl, (refs, locations)) in movs {
            if refs == 0 && !self.func.decl(dcl).is_address_taken() {
                log::trace!(
                    target: "coalesce-spill-fills",
                    "erasing {} dead copies of {}",
                    locations.len(),
                    self.func.decl(dcl).name
                );
                for inst in locations {
                    if self.func.layout.is_inserted(inst) {
                        self.func.layout.remove_inst(inst);
                    }
                }
            }
        }
        Ok(())
    }
}
