//! Candidate selection: which scratch accesses of an open window may legally
//! and profitably merge into one message.

use genc_gir::{
    FxHashMap, GirError, Inst, MaskOption, RegisterPressure, GRF_REG_BYTES,
};

use super::{CoalesceSpillFills, InstList};

/// Rows a declaration may have at most; bounds the per-declaration coverage
/// bitmask of the fill heuristic.
const MAX_DECL_ROWS: u32 = 128;

impl<P: RegisterPressure> CoalesceSpillFills<'_, P> {
    /// Whether the scratch regions of `a` and `b` intersect, and whether
    /// `a`'s region fully covers `b`'s.
    pub(super) fn scratch_overlap(&self, a: Inst, b: Inst) -> Result<(bool, bool), GirError> {
        let (off1, size1) = self.func.inst(a).scratch_msg_info()?;
        let (off2, size2) = self.func.inst(b).scratch_msg_info()?;
        let end1 = off1 + size1 - 1;
        let end2 = off2 + size2 - 1;

        let overlaps = if off1 <= off2 { end1 >= off2 } else { end2 >= off1 };
        let full = overlaps && off1 <= off2 && off1 + size1 >= off2 + size2;
        Ok((overlaps, full))
    }

    pub(super) fn overlaps_any(&self, inst: Inst, others: &[Inst]) -> Result<bool, GirError> {
        for &other in others {
            if self.scratch_overlap(inst, other)?.0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Moves every fill of `inst_list` whose scratch range lies within
    /// `max_payload - 1` rows of the running window into `coalescable`,
    /// growing the window as it goes. The first fill seeds the window; masks
    /// must match it and non-leading fills with alignment requirements stay
    /// put. Returns the final `[min, max]` slot range.
    pub(super) fn sends_in_range(
        &self,
        inst_list: &mut InstList,
        coalescable: &mut InstList,
        max_payload: u32,
    ) -> Result<(u32, u32), GirError> {
        let mut min = u32::MAX;
        let mut max = 0u32;
        let mut is_first_no_mask = false;
        let mut mask = MaskOption::empty();

        let mut i = 0;
        while i < inst_list.len() {
            let inst = inst_list[i];
            let data = self.func.inst(inst);
            let (offset, size) = data.scratch_msg_info()?;
            let last = offset + size - 1;

            if min == u32::MAX && max == 0 {
                // The first access is always a candidate.
                min = offset;
                max = last;
                is_first_no_mask = data.is_write_enable();
                mask = data.mask_option();
                let addr_taken = data
                    .dst
                    .as_ref()
                    .and_then(|d| d.top_decl())
                    .is_some_and(|d| self.addr_taken.contains(&d));
                coalescable.push(inst);
                inst_list.remove(0);
                if addr_taken {
                    return Ok((min, max));
                }
                continue;
            }

            let mask_match =
                (is_first_no_mask && data.is_write_enable()) || mask == data.mask_option();
            // A non-leading fill with an alignment requirement cannot be
            // moved into the group; we may not be able to satisfy it.
            let dst_aligned = data
                .dst
                .as_ref()
                .and_then(|d| d.top_decl())
                .is_some_and(|d| self.func.decl(d).is_even_aligned());
            if !mask_match || dst_aligned {
                i += 1;
                continue;
            }

            if offset <= min && min - offset <= max_payload - 1 && max - offset <= max_payload - 1
            {
                // Window extends downwards.
                min = offset;
                if max < last {
                    max = last;
                }
                coalescable.push(inst);
                inst_list.remove(i);
            } else if offset >= max
                && last - min <= max_payload - 1
                && last - max <= max_payload - 1
            {
                // Window extends upwards.
                max = last;
                coalescable.push(inst);
                inst_list.remove(i);
            } else if offset >= min && last <= max {
                // Contained in the current window.
                coalescable.push(inst);
                inst_list.remove(i);
            } else {
                i += 1;
            }
        }

        Ok((min, max))
    }

    /// Decides whether a selected fill group is worth coalescing, returning
    /// its `[min, max]` slot range when it is.
    ///
    /// Vetoes: singleton groups, 8-row members, address-taken destinations,
    /// groups that cover only part of some destination variable (coalescing
    /// those materializes a larger live value than originally required and
    /// provokes re-spilling), and fragmented slot patterns across a full
    /// 4-slot window that waste most of the payload.
    pub(super) fn fill_heuristic(
        &self,
        coalescable: &InstList,
    ) -> Result<Option<(u32, u32)>, GirError> {
        if coalescable.len() <= 1 {
            return Ok(None);
        }

        let mut min = u32::MAX;
        let mut max = 0u32;
        for &f in coalescable.iter() {
            let data = self.func.inst(f);
            let (offset, size) = data.scratch_msg_info()?;
            if size == 8 {
                // Already as wide as the hardware goes.
                return Ok(None);
            }
            if data
                .dst
                .as_ref()
                .and_then(|d| d.top_decl())
                .is_some_and(|d| self.addr_taken.contains(&d))
            {
                return Ok(None);
            }
            min = min.min(offset);
            max = max.max(offset + size - 1);
        }

        // Every row of every destination variable in the group must itself
        // be filled by the group. Partial coverage would force the whole
        // coalesced variable live for the sake of a few rows.
        let mut all_rows: FxHashMap<genc_gir::Decl, u128> = FxHashMap::default();
        for &f in coalescable.iter() {
            let data = self.func.inst(f);
            let (_, size) = data.scratch_msg_info()?;
            let dst = data.dst.as_ref().expect("fill has a destination");
            let Some(dcl) = dst.top_decl() else {
                return Ok(None);
            };
            let bits = all_rows.entry(dcl).or_default();
            for r in dst.row..dst.row + size {
                if r < MAX_DECL_ROWS {
                    *bits |= 1u128 << r;
                }
            }
        }
        for (dcl, bits) in &all_rows {
            let rows = self.func.decl(*dcl).num_rows.min(MAX_DECL_ROWS);
            for i in 0..rows {
                if bits & (1u128 << i) == 0 {
                    return Ok(None);
                }
            }
        }

        // Slot-coverage fragmentation across a full 4-slot window: patterns
        // alternating per pair (1010/0101) or covering only the two ends
        // (1001) utilize the payload too poorly to widen.
        if max - min == 3 {
            let mut bits = [false; 4];
            for &f in coalescable.iter() {
                let (offset, size) = self.func.inst(f).scratch_msg_info()?;
                for i in offset..offset + size {
                    bits[(i - min) as usize] = true;
                }
            }
            if bits[0] != bits[1] && bits[2] != bits[3] {
                return Ok(None);
            }
            if (bits[0] && bits[3]) && !(bits[1] || bits[2]) {
                return Ok(None);
            }
        }

        Ok(Some((min, max)))
    }

    /// Prunes an open spill window down to a run of consecutive scratch
    /// slots starting at the first spill, legal to emit as one message.
    ///
    /// On return `coalescable` holds the selected spills in program order
    /// (empty if nothing coalesces) and `inst_list` the rest of the window.
    /// Returns `(min, max, use_no_mask, mask)` for the emitter.
    pub(super) fn keep_consecutive_spills(
        &self,
        inst_list: &mut InstList,
        coalescable: &mut InstList,
        max_payload: u32,
    ) -> Result<(u32, u32, bool, MaskOption), GirError> {
        let orig: InstList = inst_list.clone();

        // `allowed` accumulates candidates in ascending slot order.
        let mut allowed: InstList = InstList::new();
        allowed.push(inst_list.remove(0));
        let first = allowed[0];
        let first_data = self.func.inst(first);
        let mask_offset = first_data.mask_option();
        let mask = mask_offset.quarter_bits();
        let mut use_no_mask = mask_offset.is_write_enable();
        let (mut min_offset, first_size) = first_data.scratch_msg_info()?;
        let mut max_offset = min_offset + first_size - 1;

        let send_top_dcl = self.payload_decl(first);
        // An address-taken payload can lead a window but never coalesce;
        // nothing may be renamed under an indirect operand.
        if send_top_dcl.is_some_and(|d| self.addr_taken.contains(&d)) {
            *inst_list = orig;
            return Ok((min_offset, max_offset, use_no_mask, mask));
        }
        let first_spill_from_send =
            send_top_dcl.is_some_and(|d| self.send_dst_dcl.contains(&d));

        for &inst in inst_list.iter() {
            use_no_mask &= self.func.inst(inst).is_write_enable();
            if !use_no_mask {
                break;
            }
        }

        // Spill coalescing does not work as expected without NoMask.
        if use_no_mask {
            let mut redo = true;
            while redo {
                redo = false;
                let mut idx = 0;
                while idx < inst_list.len() {
                    let spill = inst_list[idx];
                    let data = self.func.inst(spill);
                    let (offset, size) = data.scratch_msg_info()?;
                    let src1_dcl = self.payload_decl(spill);

                    // Address-taken dcls are never coalesced with others;
                    // nothing ties an indirect operand to its scratch code
                    // until allocation assigns the address register.
                    if src1_dcl.is_some_and(|d| self.addr_taken.contains(&d)) {
                        idx += 1;
                        continue;
                    }

                    let mask_ok = data.mask_option() == mask
                        || (use_no_mask && data.is_write_enable());
                    if offset == max_offset + 1
                        && offset + size - 1 <= min_offset + max_payload - 1
                        && mask_ok
                    {
                        if !first_spill_from_send
                            && src1_dcl.is_some_and(|d| self.send_dst_dcl.contains(&d))
                        {
                            idx += 1;
                            continue;
                        }
                        // Sends coalesce only when no participant comes from
                        // a send, or all come from the same one.
                        if !first_spill_from_send || src1_dcl == send_top_dcl {
                            if src1_dcl == send_top_dcl
                                && !self.payload_rows_consecutive(&allowed, spill, offset)?
                            {
                                idx += 1;
                                continue;
                            }
                            allowed.push(spill);
                            inst_list.remove(idx);
                            redo = true;
                            max_offset += size;
                            break;
                        }
                    }
                    idx += 1;
                }
            }
        }

        // Trim from the tail until the slot span is a legal payload width.
        while allowed.len() > 1 {
            let slots = max_offset - min_offset + 1;
            if slots == 2 || slots == 4 {
                // Emit coalescable spills in order of appearance.
                for &orig_inst in orig.iter() {
                    if allowed.contains(&orig_inst) {
                        coalescable.push(orig_inst);
                    }
                }
                debug_assert_eq!(
                    coalescable.len(),
                    allowed.len(),
                    "coalesced spills list missing entries"
                );
                break;
            }
            allowed.pop();
            let last = *allowed.last().expect("allowed list cannot empty below one");
            let (offset, size) = self.func.inst(last).scratch_msg_info()?;
            max_offset = offset + size - 1;
        }

        *inst_list = orig;
        inst_list.retain(|i| !coalescable.contains(i));

        Ok((min_offset, max_offset, use_no_mask, mask))
    }

    /// When grouping spills of one send result, the payload rows must be
    /// consecutive in the same order as their scratch slots, or the send's
    /// result length semantics would break.
    fn payload_rows_consecutive(
        &self,
        allowed: &InstList,
        spill: Inst,
        offset: u32,
    ) -> Result<bool, GirError> {
        let cur_row = self.payload_row(spill);
        for &cand in allowed.iter() {
            let (cand_offset, _) = self.func.inst(cand).scratch_msg_info()?;
            let prev_row = self.payload_row(cand);
            let delta = offset - cand_offset;
            if prev_row + delta != cur_row {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The starting GRF row of a spill's payload operand.
    pub(super) fn payload_row(&self, spill: Inst) -> u32 {
        self.func
            .inst(spill)
            .src(1)
            .and_then(|s| s.as_region())
            .map(|r| r.left_bound() / GRF_REG_BYTES)
            .expect("spill payload must be a register region")
    }

    /// True when every open spill sources one declaration and that
    /// declaration is a send result; coalescing such a window cannot raise
    /// register pressure.
    pub(super) fn all_spills_same_var(&self, spills: &InstList) -> bool {
        let mut dcl = None;
        for &s in spills.iter() {
            let top = self.payload_decl(s);
            if dcl.is_none() {
                dcl = top;
            }
            if top != dcl {
                return false;
            }
        }
        dcl.is_some_and(|d| self.send_dst_dcl.contains(&d))
    }
}
