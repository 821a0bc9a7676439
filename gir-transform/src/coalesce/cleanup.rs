//! Scratch traffic cleanup: fills satisfied by nearby writes become register
//! moves, and writes nothing ever reads are removed.

use genc_gir::{
    Block, FxHashMap, FxHashSet, GirError, Inst, IrBuilder, MaskOption, RegisterPressure, Type,
};

use super::CoalesceSpillFills;

impl<P: RegisterPressure> CoalesceSpillFills<'_, P> {
    /// For each fill whose rows were all written by spills in the preceding
    /// window, and whose written values are still intact in their source
    /// variables, replaces the fill with register-to-register moves from
    /// those variables.
    pub(super) fn spill_fill_cleanup(&mut self) -> Result<(), GirError> {
        let blocks: Vec<Block> = self.func.layout.blocks().collect();
        for bb in blocks {
            let start = self.func.layout.first_inst(bb);
            let mut cursor = start;
            while let Some(inst) = cursor {
                if !self.func.inst(inst).is_fill_intrinsic() {
                    cursor = self.func.layout.next_inst(inst);
                    continue;
                }
                let (row_start, num_rows) = self.func.inst(inst).scratch_msg_info()?;
                let last_row = row_start + num_rows - 1;

                // Most recent spill writing each slot within the look-back
                // window, and every declaration defined since.
                let mut writes_per_offset: FxHashMap<u32, Inst> = FxHashMap::default();
                let mut defs: FxHashSet<genc_gir::Decl> = FxHashSet::default();
                let mut w = self.opts.cleanup_window_size;
                let mut p = self.func.layout.prev_inst(inst);
                while let Some(pinst) = p {
                    if Some(pinst) == start || w == 0 {
                        break;
                    }
                    let pdata = self.func.inst(pinst);
                    if pdata.is_spill_intrinsic() {
                        // A redefined payload variable no longer holds what
                        // memory does; its write is unusable here.
                        let psrc_dcl = self.payload_decl(pinst);
                        if psrc_dcl.is_some_and(|d| defs.contains(&d)) {
                            p = self.func.layout.prev_inst(pinst);
                            continue;
                        }
                        let (p_start, p_rows) = pdata.scratch_msg_info()?;
                        for prow in p_start..p_start + p_rows {
                            writes_per_offset.entry(prow).or_insert(pinst);
                        }
                    }
                    if let Some(d) = pdata.dst.as_ref().and_then(|d| d.top_decl()) {
                        defs.insert(d);
                    }
                    w -= 1;
                    p = self.func.layout.prev_inst(pinst);
                }

                if !(row_start..=last_row).all(|r| writes_per_offset.contains_key(&r)) {
                    cursor = self.func.layout.next_inst(inst);
                    continue;
                }

                log::trace!(
                    target: "coalesce-spill-fills",
                    "replacing fill {} with register moves",
                    self.func.inst(inst)
                );

                let fill_dst = *self.func.inst(inst).dst.as_ref().expect("fill has a destination");
                let fill_dst_dcl = fill_dst.top_decl().expect("fill writes a declaration");
                let loc = self.func.inst(inst).loc;

                // SIMD16 moves cover two rows at once, but only while both
                // rows come from one spill; drop to SIMD8 otherwise and for
                // the odd final row.
                let mut exec_size: u8 = if self.func.simd_size > 16 {
                    16
                } else {
                    self.func.simd_size
                };
                let mut row = row_start;
                while row <= last_row {
                    if exec_size == 16 && row == last_row {
                        exec_size = 8;
                    } else if exec_size == 16
                        && writes_per_offset[&row] != writes_per_offset[&(row + 1)]
                    {
                        exec_size = 8;
                    }
                    let write = writes_per_offset[&row];
                    let write_src = *self
                        .func
                        .inst(write)
                        .src(1)
                        .and_then(|s| s.as_region())
                        .expect("spill payload must be a register region");
                    let (write_row_start, _) = self.func.inst(write).scratch_msg_info()?;
                    let diff = row - write_row_start;
                    let src_dcl = write_src
                        .top_decl()
                        .expect("spill payload must reference a declaration");

                    let mut builder = IrBuilder::new(self.func);
                    let ndst =
                        builder.dst_region(fill_dst_dcl, row + fill_dst.row - row_start, Type::UD);
                    let nsrc = builder.src_region(src_dcl, diff + write_src.row, Type::UD);
                    let mov = builder.mov(exec_size, ndst, nsrc, MaskOption::WRITE_ENABLE, loc);
                    self.func.layout.insert_before(mov, inst);

                    row += (exec_size / 8) as u32;
                }

                cursor = self.func.layout.remove_inst(inst);
            }
        }
        Ok(())
    }

    /// Removes redundant scratch writes: spills every slot of which is
    /// overwritten later in the block without an intervening read, and
    /// function-wide, spills to slots never filled (plus fills of slots
    /// never spilled).
    pub(super) fn remove_redundant_writes(&mut self) -> Result<(), GirError> {
        let blocks: Vec<Block> = self.func.layout.blocks().collect();

        // Successive-write elimination, bottom-up per block.
        for &bb in &blocks {
            let first = self.func.layout.first_inst(bb);
            let mut later_mask_per_slot: FxHashMap<u32, MaskOption> = FxHashMap::default();
            let mut cursor = self.func.layout.last_inst(bb);
            while let Some(inst) = cursor {
                if Some(inst) == first {
                    break;
                }
                let prev = self.func.layout.prev_inst(inst);
                let data = self.func.inst(inst);
                if data.is_fill_intrinsic() {
                    let (offset, size) = data.scratch_msg_info()?;
                    for k in offset..offset + size {
                        later_mask_per_slot.remove(&k);
                    }
                } else if data.is_spill_intrinsic() {
                    let (offset, size) = data.scratch_msg_info()?;
                    let emask = data.mask_option();
                    let covered = (offset..offset + size).all(|k| {
                        later_mask_per_slot
                            .get(&k)
                            .is_some_and(|&m| m == emask || m.is_write_enable())
                    });
                    if covered {
                        log::trace!(
                            target: "coalesce-spill-fills",
                            "removing redundant successive write {}",
                            self.func.inst(inst)
                        );
                        self.func.layout.remove_inst(inst);
                    } else {
                        for k in offset..offset + size {
                            later_mask_per_slot.entry(k).or_insert(emask);
                        }
                    }
                }
                cursor = prev;
            }
        }

        // Dead scratch traffic, function-wide: collect every access per
        // slot, then drop accesses all of whose slots lack the opposite
        // direction entirely.
        let mut access: FxHashMap<u32, (Vec<Inst>, Vec<Inst>)> = FxHashMap::default();
        for &bb in &blocks {
            for inst in self.func.layout.block_insts(bb) {
                let data = self.func.inst(inst);
                if !data.is_spill_intrinsic() && !data.is_fill_intrinsic() {
                    continue;
                }
                let is_read = data.is_fill_intrinsic();
                let (offset, size) = data.scratch_msg_info()?;
                for slot in offset..offset + size {
                    let entry = access.entry(slot).or_default();
                    if is_read {
                        entry.1.push(inst);
                    } else {
                        entry.0.push(inst);
                    }
                }
            }
        }

        let mut to_remove: FxHashSet<Inst> = FxHashSet::default();
        for (spills, fills) in access.values() {
            if fills.is_empty() && !spills.is_empty() {
                for &spill in spills {
                    let (offset, size) = self.func.inst(spill).scratch_msg_info()?;
                    let required = (offset..offset + size)
                        .any(|s| access.get(&s).is_some_and(|e| !e.1.is_empty()));
                    if !required {
                        to_remove.insert(spill);
                    }
                }
            } else if spills.is_empty() && !fills.is_empty() {
                for &fill in fills {
                    let (offset, size) = self.func.inst(fill).scratch_msg_info()?;
                    let required = (offset..offset + size)
                        .any(|s| access.get(&s).is_some_and(|e| !e.0.is_empty()));
                    if !required {
                        to_remove.insert(fill);
                    }
                }
            }
        }

        for inst in to_remove {
            log::trace!(
                target: "coalesce-spill-fills",
                "removing dead scratch access {}",
                self.func.inst(inst)
            );
            self.func.layout.remove_inst(inst);
        }
        Ok(())
    }
}
