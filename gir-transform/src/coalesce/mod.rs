//! Spill/fill coalescing.
//!
//! After register allocation inserts scratch spill and fill code, nearby
//! accesses to adjacent scratch slots are folded into fewer, wider scratch
//! messages, and redundant scratch traffic is eliminated. Six stages run in
//! order over every basic block:
//!
//! 1. remove redundant split movs feeding spills from send results,
//! 2. coalesce fills,
//! 3. coalesce spills,
//! 4. replace fills whose slots were written nearby with register moves,
//! 5. remove redundant scratch writes,
//! 6. fix split-send source overlaps the coalescing introduced.
//!
//! The pass never moves an access across a basic-block boundary and never
//! shrinks the scratch region an instruction touches.

mod cleanup;
mod emit;
mod select;
mod send_overlap;
mod split_movs;

#[cfg(test)]
pub(crate) mod testing;

use genc_gir::{
    Block, Decl, FxHashMap, FxHashSet, Function, GirError, Inst, Op, RegisterPressure, SmallVec,
};

/// Candidate window: spill or fill instructions under consideration.
type InstList = SmallVec<[Inst; 8]>;

/// Tuning knobs of the coalescing pass.
#[derive(Debug, Clone)]
pub struct CoalesceOptions {
    /// Instructions scanned since the first open candidate before a window
    /// closes.
    pub window_size: u32,
    /// Backward look-back distance of the fill-to-move cleanup stage.
    pub cleanup_window_size: u32,
    /// Register pressure above which fill windows narrow to ~3 instructions.
    pub fill_window_pressure_threshold: u32,
    /// Register pressure above which spill windows narrow to ~3 instructions.
    pub spill_window_pressure_threshold: u32,
    /// Widest fill message emitted, in rows. Must be 4.
    pub max_fill_payload: u32,
    /// Widest spill message emitted, in rows. 2 to 4.
    pub max_spill_payload: u32,
}

impl Default for CoalesceOptions {
    fn default() -> Self {
        Self {
            window_size: 10,
            cleanup_window_size: 10,
            fill_window_pressure_threshold: 120,
            spill_window_pressure_threshold: 120,
            max_fill_payload: 4,
            max_spill_payload: 4,
        }
    }
}

/// The spill/fill coalescing pass.
///
/// Owns the function for its duration; [`run`](Self::run) performs all six
/// stages and leaves the IR semantically equivalent with fewer, wider
/// scratch messages.
pub struct CoalesceSpillFills<'a, P: RegisterPressure> {
    func: &'a mut Function,
    rpe: &'a P,
    opts: CoalesceOptions,
    /// Substitution map of one coalescing stage: original declaration to
    /// (replacement declaration, row shift). Insert-only within a stage,
    /// cleared between stages.
    replace_map: FxHashMap<Decl, (Decl, u32)>,
    /// Declarations produced by non-scratch sends; their rows must stay
    /// consecutive, which constrains spill grouping.
    send_dst_dcl: FxHashSet<Decl>,
    /// Address-taken spill/fill declarations; never coalesced.
    addr_taken: FxHashSet<Decl>,
}

impl<'a, P: RegisterPressure> CoalesceSpillFills<'a, P> {
    pub fn new(func: &'a mut Function, rpe: &'a P, opts: CoalesceOptions) -> Self {
        Self {
            func,
            rpe,
            opts,
            replace_map: FxHashMap::default(),
            send_dst_dcl: FxHashSet::default(),
            addr_taken: FxHashSet::default(),
        }
    }

    /// Runs all six stages in order.
    pub fn run(&mut self) -> Result<(), GirError> {
        log::debug!(
            target: "coalesce-spill-fills",
            "coalescing spills and fills in {}",
            self.func.name
        );

        self.compute_address_taken_decls();
        self.remove_redundant_split_movs()?;

        self.coalesce_fills_stage()?;
        self.replace_map.clear();
        self.coalesce_spills_stage()?;
        self.replace_map.clear();

        self.spill_fill_cleanup()?;
        self.remove_redundant_writes()?;
        self.fix_send_src_overlap();

        log::trace!(
            target: "coalesce-spill-fills",
            "function after coalescing:\n{}",
            self.func.display()
        );
        Ok(())
    }

    fn compute_address_taken_decls(&mut self) {
        for (decl, data) in self.func.decls.iter() {
            if data.is_address_taken() {
                self.addr_taken.insert(decl);
            }
        }
    }

    /// Declarations whose rows are produced as a unit: destinations of
    /// non-scratch sends, and spill payloads the allocator already merged
    /// with a send result.
    fn populate_send_dst_dcl(&mut self) {
        let blocks: Vec<Block> = self.func.layout.blocks().collect();
        for bb in blocks {
            for inst in self.func.layout.block_insts(bb) {
                let data = self.func.inst(inst);
                match data.op {
                    Op::Send(desc) if !desc.is_scratch() => {
                        if let Some(dcl) = data.dst.as_ref().and_then(|d| d.top_decl()) {
                            self.send_dst_dcl.insert(dcl);
                        }
                    }
                    Op::Spill(_) => {
                        if let Some(dcl) = self.payload_decl(inst) {
                            if self.func.decl(dcl).is_allocator_coalesced() {
                                self.send_dst_dcl.insert(dcl);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// The declaration referenced by a spill's payload operand.
    fn payload_decl(&self, spill: Inst) -> Option<Decl> {
        self.func.inst(spill).src(1).and_then(|s| s.top_decl())
    }

    /// Walks each block grouping nearby fills and coalescing each group.
    fn coalesce_fills_stage(&mut self) -> Result<(), GirError> {
        let blocks: Vec<Block> = self.func.layout.blocks().collect();
        for bb in blocks {
            let mut fills_to_coalesce = InstList::new();
            let mut spills = InstList::new();
            let mut w = 0u32;
            let mut cursor = self.func.layout.first_inst(bb);
            while let Some(inst) = cursor {
                let data = self.func.inst(inst);
                if data.is_pseudo_kill() || data.is_label() {
                    cursor = self.func.layout.next_inst(inst);
                    continue;
                }
                let (is_spill, is_fill) = (data.is_spill_intrinsic(), data.is_fill_intrinsic());

                if is_spill {
                    spills.push(inst);
                } else if is_fill {
                    if fills_to_coalesce.is_empty() {
                        w = 0;
                        spills.clear();
                    }
                    // A fill overlapping a spill seen in this window would
                    // read a slot the window also writes; leave it alone.
                    if !self.overlaps_any(inst, &spills)? {
                        fills_to_coalesce.push(inst);
                    }
                }

                if !fills_to_coalesce.is_empty()
                    && self.rpe.pressure_at(inst) > self.opts.fill_window_pressure_threshold
                {
                    // High register pressure region; shrink the remaining
                    // window to about 3 instructions.
                    w = w.max(self.opts.window_size.saturating_sub(3));
                }

                let at_end = self.func.layout.last_inst(bb) == Some(inst);
                if w == self.opts.window_size || at_end {
                    if fills_to_coalesce.len() > 1 {
                        cursor = self.analyze_fill_coalescing(&mut fills_to_coalesce, inst, bb)?;
                    } else if w == self.opts.window_size {
                        // Restart the window at the current instruction.
                    } else if at_end {
                        break;
                    }
                    w = 0;
                    fills_to_coalesce.clear();
                    spills.clear();
                    continue;
                }

                if !fills_to_coalesce.is_empty() {
                    w += 1;
                }
                cursor = self.func.layout.next_inst(inst);
            }

            self.rewrite_block_substitutions(bb);
        }
        Ok(())
    }

    /// Attempts coalescing amongst the fills of a closed window. Returns the
    /// cursor scanning resumes from: past `end` when every fill was
    /// consumed, else the first fill that was not.
    fn analyze_fill_coalescing(
        &mut self,
        inst_list: &mut InstList,
        end: Inst,
        bb: Block,
    ) -> Result<Option<Inst>, GirError> {
        let past_end = self.func.layout.next_inst(end);
        if inst_list.len() < 2 {
            return Ok(past_end);
        }

        let orig: InstList = inst_list.clone();
        let mut coalescable = InstList::new();
        self.sends_in_range(inst_list, &mut coalescable, self.opts.max_fill_payload)?;

        match self.fill_heuristic(&coalescable)? {
            Some((min, max)) => {
                log::trace!(
                    target: "coalesce-spill-fills",
                    "coalescing {} fills over slots [{min}, {max}]",
                    coalescable.len()
                );
                if coalescable.len() > 1 {
                    self.coalesce_fill_group(&mut coalescable, min, max, bb)?;
                }
            }
            None => {
                coalescable.clear();
                *inst_list = orig;
                inst_list.remove(0);
            }
        }

        if inst_list.is_empty() {
            Ok(past_end)
        } else {
            Ok(Some(inst_list[0]))
        }
    }

    /// Walks each block grouping nearby spills and coalescing each group.
    fn coalesce_spills_stage(&mut self) -> Result<(), GirError> {
        self.populate_send_dst_dcl();

        let blocks: Vec<Block> = self.func.layout.blocks().collect();
        for bb in blocks {
            let mut spills_to_coalesce = InstList::new();
            let mut w = 0u32;
            let mut cursor = self.func.layout.first_inst(bb);
            while let Some(inst) = cursor {
                let data = self.func.inst(inst);
                if data.is_pseudo_kill() || data.is_label() {
                    cursor = self.func.layout.next_inst(inst);
                    continue;
                }
                let (is_spill, is_fill) = (data.is_spill_intrinsic(), data.is_fill_intrinsic());

                let mut early_coalesce = false;
                if is_spill {
                    if spills_to_coalesce.is_empty() {
                        w = 0;
                    }
                    // Drop overlapping candidates from the window; one the
                    // new spill fully covers is already redundant.
                    let mut idx = 0;
                    while idx < spills_to_coalesce.len() {
                        let cand = spills_to_coalesce[idx];
                        let (overlaps, full) = self.scratch_overlap(inst, cand)?;
                        if overlaps {
                            if full {
                                log::trace!(
                                    target: "coalesce-spill-fills",
                                    "erasing spill {} made redundant by a covering spill",
                                    self.func.inst(cand)
                                );
                                self.func.layout.remove_inst(cand);
                            }
                            spills_to_coalesce.remove(idx);
                            continue;
                        }
                        idx += 1;
                    }
                    spills_to_coalesce.push(inst);
                } else if is_fill {
                    // A fill from a slot the window writes: close now and try
                    // to coalesce, which may expose the write as dead later.
                    for &cand in spills_to_coalesce.iter() {
                        let (overlaps, _) = self.scratch_overlap(inst, cand)?;
                        if overlaps {
                            early_coalesce = true;
                            break;
                        }
                    }
                }

                if !spills_to_coalesce.is_empty()
                    && self.rpe.pressure_at(inst) > self.opts.spill_window_pressure_threshold
                    && !self.all_spills_same_var(&spills_to_coalesce)
                {
                    w = w.max(self.opts.window_size.saturating_sub(3));
                }

                let at_end = self.func.layout.last_inst(bb) == Some(inst);
                if w == self.opts.window_size || at_end || early_coalesce {
                    if spills_to_coalesce.len() > 1 {
                        cursor = self.analyze_spill_coalescing(&mut spills_to_coalesce, inst, bb)?;
                    } else if w == self.opts.window_size {
                        // Restart the window at the current instruction.
                    } else if at_end {
                        break;
                    }
                    w = 0;
                    spills_to_coalesce.clear();
                    continue;
                }

                if !spills_to_coalesce.is_empty() {
                    w += 1;
                }
                cursor = self.func.layout.next_inst(inst);
            }

            self.rewrite_block_substitutions(bb);
        }
        Ok(())
    }

    /// Attempts coalescing amongst the spills of a closed window. Returns
    /// the cursor scanning resumes from, as for fills.
    fn analyze_spill_coalescing(
        &mut self,
        inst_list: &mut InstList,
        end: Inst,
        bb: Block,
    ) -> Result<Option<Inst>, GirError> {
        let past_end = self.func.layout.next_inst(end);
        if inst_list.len() < 2 {
            return Ok(past_end);
        }

        let mut coalescable = InstList::new();
        let (min, max, use_no_mask, mask) =
            self.keep_consecutive_spills(inst_list, &mut coalescable, self.opts.max_spill_payload)?;

        if coalescable.len() > 1 {
            log::trace!(
                target: "coalesce-spill-fills",
                "coalescing {} spills over slots [{min}, {max}]",
                coalescable.len()
            );
            self.coalesce_spill_group(&mut coalescable, min, max, use_no_mask, mask, bb)?;
        } else {
            inst_list.remove(0);
        }

        if inst_list.is_empty() {
            Ok(past_end)
        } else {
            Ok(Some(inst_list[0]))
        }
    }

    /// Rewrites every operand in `bb` through the substitution map and
    /// deletes pseudo-kills of remapped declarations, whose originals are
    /// now dead.
    fn rewrite_block_substitutions(&mut self, bb: Block) {
        let mut cursor = self.func.layout.first_inst(bb);
        while let Some(inst) = cursor {
            let data = self.func.inst(inst);
            if data.is_pseudo_kill()
                && data
                    .dst
                    .as_ref()
                    .and_then(|d| d.top_decl())
                    .is_some_and(|d| self.replace_map.contains_key(&d))
            {
                cursor = self.func.layout.remove_inst(inst);
                continue;
            }
            self.replace_coalesced_operands(inst);
            cursor = self.func.layout.next_inst(inst);
        }
    }
}

#[cfg(test)]
mod tests {
    use genc_gir::{DeclFlags, MaskOption, Op, SrcOperand, ZeroPressure};
    use pretty_assertions::assert_eq;

    use super::testing::*;
    use super::*;

    #[test]
    fn adjacent_spills_from_one_variable_become_one_message() {
        // Scenario: spills of V rows 0 and 1 to slots 10 and 11 fold into a
        // single two-row message sourced straight from V.
        let mut t = TestBed::new();
        let v = t.decl("V", 2);
        t.spill(v, 0, 10, 1, MaskOption::WRITE_ENABLE);
        t.spill(v, 1, 11, 1, MaskOption::WRITE_ENABLE);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_spills_stage().unwrap();

        let spills = t.insts_matching(|d| d.is_spill_intrinsic());
        assert_eq!(spills.len(), 1);
        let data = t.func.inst(spills[0]);
        assert_eq!(data.scratch_msg_info(), Ok((10, 2)));
        assert!(data.is_write_enable());
        let payload = data.src(1).unwrap().as_region().unwrap();
        assert_eq!(payload.top_decl(), Some(v));
        assert_eq!(payload.row, 0);
    }

    #[test]
    fn spills_from_mixed_variables_stage_through_a_fresh_declaration() {
        let mut t = TestBed::new();
        let a = t.decl("A", 1);
        let b = t.decl("B", 1);
        let sa = t.spill(a, 0, 20, 1, MaskOption::WRITE_ENABLE);
        let sb = t.spill(b, 0, 21, 1, MaskOption::WRITE_ENABLE);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_spills_stage().unwrap();

        assert!(!t.func.layout.is_inserted(sa));
        assert!(!t.func.layout.is_inserted(sb));
        let spills = t.insts_matching(|d| d.is_spill_intrinsic());
        assert_eq!(spills.len(), 1);
        let payload = t.func.inst(spills[0]).src(1).unwrap().as_region().unwrap();
        let staging = payload.top_decl().unwrap();
        assert!(t.func.decl(staging).do_not_spill());
        assert!(t.func.decl(staging).name.starts_with("COAL_SPILL_"));
        // Producers of A and B now write the staging declaration at the
        // offsets their slots map to.
        assert_eq!(payload.row, 0);
    }

    #[test]
    fn fill_coalescing_rewrites_users_of_both_destinations() {
        // Scenario: fills of slots 10 and 12 coalesce into a four-row fill;
        // users of the old destinations read the fresh declaration at rows
        // 0 and 2.
        let mut t = TestBed::new();
        let a = t.decl("A", 1);
        let b = t.decl("B", 1);
        t.fill(a, 0, 10, 1);
        t.fill(b, 0, 12, 1);
        let use_a = t.use_of(a, 0);
        let use_b = t.use_of(b, 0);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_fills_stage().unwrap();

        let fills = t.insts_matching(|d| d.is_fill_intrinsic());
        assert_eq!(fills.len(), 1);
        let data = t.func.inst(fills[0]);
        assert_eq!(data.scratch_msg_info(), Ok((10, 4)));
        let coalesced = data.dst.as_ref().unwrap().top_decl().unwrap();
        assert_eq!(t.func.decl(coalesced).num_rows, 4);
        assert!(t.func.decl(coalesced).name.starts_with("COAL_FILL_"));

        let src_a = t.func.inst(use_a).src(0).unwrap().as_region().unwrap();
        assert_eq!((src_a.top_decl(), src_a.row), (Some(coalesced), 0));
        let src_b = t.func.inst(use_b).src(0).unwrap().as_region().unwrap();
        assert_eq!((src_b.top_decl(), src_b.row), (Some(coalesced), 2));
    }

    #[test]
    fn pseudo_kills_of_remapped_declarations_are_deleted() {
        let mut t = TestBed::new();
        let a = t.decl("A", 1);
        let b = t.decl("B", 1);
        let kill = t.pseudo_kill(a);
        t.fill(a, 0, 10, 1);
        t.fill(b, 0, 11, 1);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_fills_stage().unwrap();

        assert!(!t.func.layout.is_inserted(kill));
    }

    #[test]
    fn fill_overlapping_a_window_spill_is_not_a_candidate() {
        // The fill from slot 10 reads what the first spill wrote; grouping
        // it with the later fill would reorder the read past the write.
        let mut t = TestBed::new();
        let v = t.decl("V", 1);
        let a = t.decl("A", 1);
        let b = t.decl("B", 1);
        t.fill(a, 0, 30, 1);
        t.spill(v, 0, 10, 1, MaskOption::WRITE_ENABLE);
        let hazard = t.fill(b, 0, 10, 1);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_fills_stage().unwrap();

        // Nothing coalesced: the hazard fill never joined the window.
        assert!(t.func.layout.is_inserted(hazard));
        assert_eq!(t.insts_matching(|d| d.is_fill_intrinsic()).len(), 2);
    }

    #[test]
    fn covering_spill_erases_covered_window_candidate() {
        let mut t = TestBed::new();
        let v = t.decl("V", 1);
        let w2 = t.decl("W", 2);
        let covered = t.spill(v, 0, 10, 1, MaskOption::WRITE_ENABLE);
        t.spill(w2, 0, 10, 2, MaskOption::WRITE_ENABLE);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_spills_stage().unwrap();

        assert!(!t.func.layout.is_inserted(covered));
        assert_eq!(t.insts_matching(|d| d.is_spill_intrinsic()).len(), 1);
    }

    #[test]
    fn pressure_narrows_the_fill_window() {
        // Under pressure the effective window shrinks to ~3 instructions, so
        // fills 6 instructions apart no longer meet in one window.
        let mut t = TestBed::new();
        let a = t.decl("A", 1);
        let b = t.decl("B", 1);
        t.fill(a, 0, 10, 1);
        let mut pressured = Vec::new();
        for _ in 0..6 {
            pressured.push(t.use_of(a, 0));
        }
        t.fill(b, 0, 11, 1);

        let mut rpe = genc_gir::TablePressure::default();
        for inst in pressured {
            rpe.set(inst, 200);
        }
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_fills_stage().unwrap();
        assert_eq!(t.insts_matching(|d| d.is_fill_intrinsic()).len(), 2);

        // Without pressure the same shape coalesces.
        let mut t = TestBed::new();
        let a = t.decl("A", 1);
        let b = t.decl("B", 1);
        t.fill(a, 0, 10, 1);
        for _ in 0..6 {
            t.use_of(a, 0);
        }
        t.fill(b, 0, 11, 1);
        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_fills_stage().unwrap();
        assert_eq!(t.insts_matching(|d| d.is_fill_intrinsic()).len(), 1);
    }

    #[test]
    fn address_taken_destinations_are_never_grouped() {
        let mut t = TestBed::new();
        let a = t.decl_with_flags("A", 1, DeclFlags::ADDRESS_TAKEN);
        let b = t.decl("B", 1);
        let fa = t.fill(a, 0, 10, 1);
        let fb = t.fill(b, 0, 11, 1);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_fills_stage().unwrap();

        assert!(t.func.layout.is_inserted(fa));
        assert!(t.func.layout.is_inserted(fb));
    }

    #[test]
    fn emitted_payloads_are_always_legal() {
        // A mix of adjacent and disjoint accesses; whatever the pass does,
        // every surviving scratch message has a hardware-encodable size.
        let mut t = TestBed::new();
        let decls: Vec<_> = (0..6).map(|i| t.decl(format!("V{i}"), 1)).collect();
        for (i, &d) in decls.iter().enumerate() {
            t.spill(d, 0, 10 + i as u32, 1, MaskOption::WRITE_ENABLE);
        }
        for (i, &d) in decls.iter().enumerate() {
            t.fill(d, 0, 10 + i as u32, 1);
        }

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.run().unwrap();

        for inst in t.insts_matching(|d| d.is_spill_intrinsic() || d.is_fill_intrinsic()) {
            let data = t.func.inst(inst);
            let (_, rows) = data.scratch_msg_info().unwrap();
            assert!(matches!(rows, 1 | 2 | 4 | 8), "illegal payload: {data}");
        }
    }

    #[test]
    fn substitution_skips_non_declaration_operands() {
        let mut t = TestBed::new();
        let a = t.decl("A", 1);
        let b = t.decl("B", 1);
        t.fill(a, 0, 10, 1);
        t.fill(b, 0, 11, 1);
        // An instruction with an immediate operand; rewriting must skip it.
        let imm_use = t.func.create_inst(genc_gir::InstData {
            op: Op::Add,
            dst: Some(t.dst(a, 0)),
            srcs: [
                Some(SrcOperand::Imm { value: 1, ty: genc_gir::Type::UD }),
                None,
                None,
                None,
            ],
            exec_size: 8,
            mask: MaskOption::Q1,
            loc: Default::default(),
        });
        t.append(imm_use);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_fills_stage().unwrap();

        let data = t.func.inst(imm_use);
        assert!(matches!(
            data.src(0),
            Some(SrcOperand::Imm { value: 1, .. })
        ));
        // The destination, which does reference A, was remapped.
        assert_ne!(data.dst.as_ref().unwrap().top_decl(), Some(a));
    }

    #[test]
    fn scratch_access_is_never_narrowed() {
        let mut t = TestBed::new();
        let a = t.decl("A", 2);
        let b = t.decl("B", 1);
        t.fill(a, 0, 10, 2);
        t.fill(b, 0, 12, 1);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_fills_stage().unwrap();

        let fills = t.insts_matching(|d| d.is_fill_intrinsic());
        assert_eq!(fills.len(), 1);
        let (off, rows) = t.func.inst(fills[0]).scratch_msg_info().unwrap();
        assert!(off <= 10 && off + rows > 12, "coalesced fill must cover all slots");
    }

    #[test]
    fn window_restarts_after_size_is_reached() {
        // Fills 12 instructions apart never share a window of size 10, even
        // with no pressure.
        let mut t = TestBed::new();
        let a = t.decl("A", 1);
        let b = t.decl("B", 1);
        t.fill(a, 0, 10, 1);
        for _ in 0..12 {
            t.use_of(a, 0);
        }
        t.fill(b, 0, 11, 1);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.coalesce_fills_stage().unwrap();
        assert_eq!(t.insts_matching(|d| d.is_fill_intrinsic()).len(), 2);
    }

    #[test]
    fn run_is_idempotent() {
        let mut t = TestBed::new();
        let a = t.decl("A", 1);
        let b = t.decl("B", 1);
        let v = t.decl("V", 2);
        t.spill(v, 0, 10, 1, MaskOption::WRITE_ENABLE);
        t.spill(v, 1, 11, 1, MaskOption::WRITE_ENABLE);
        t.fill(a, 0, 10, 1);
        t.fill(b, 0, 11, 1);
        t.use_of(a, 0);
        t.use_of(b, 0);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.run().unwrap();
        let after_once = format!("{}", t.func.display());

        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.run().unwrap();
        let after_twice = format!("{}", t.func.display());

        assert_eq!(after_once, after_twice);
    }

    #[test]
    fn send_destinations_are_collected_per_function() {
        let mut t = TestBed::new();
        let sampled = t.decl("SAMPLED", 2);
        let merged = t.decl_with_flags("MERGED", 1, DeclFlags::ALLOCATOR_COALESCED);
        t.send_into(sampled, 2);
        t.spill(merged, 0, 40, 1, MaskOption::WRITE_ENABLE);

        let rpe = ZeroPressure;
        let mut pass = CoalesceSpillFills::new(&mut t.func, &rpe, CoalesceOptions::default());
        pass.populate_send_dst_dcl();
        assert!(pass.send_dst_dcl.contains(&sampled));
        assert!(pass.send_dst_dcl.contains(&merged));
    }
}
