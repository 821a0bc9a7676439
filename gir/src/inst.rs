use core::fmt;

use cranelift_entity::entity_impl;

use crate::{
    operand::{AccRegSel, DstRegion, MaskOption, SrcModifier, SrcOperand},
    types::SourceLoc,
    GirError,
};

/// Maximum number of source operands an instruction can carry.
pub const MAX_SRCS: usize = 4;

/// A handle to an instruction in a function's arena.
///
/// Handles stay valid after the instruction is detached from its block; only
/// dropping the function frees the storage.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// The scratch-memory region accessed by a spill or fill intrinsic, in GRF
/// register rows. This is authoritative: coalescing never shrinks the region
/// actually written or read.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScratchAccess {
    /// Base scratch offset, in rows.
    pub offset: u32,
    /// Payload size, in rows.
    pub num_rows: u32,
}

impl ScratchAccess {
    /// Last row (inclusive) of the accessed region.
    pub fn last_row(&self) -> u32 {
        self.offset + self.num_rows - 1
    }
}

/// The message category of a send instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MsgKind {
    Sampler,
    DataPort,
    ScratchRead,
    ScratchWrite,
}

/// Descriptor summary of a send instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SendDesc {
    /// Split-send: two independent source payloads that must not overlap.
    pub split: bool,
    pub msg: MsgKind,
    /// Length of the first payload, in rows.
    pub msg_len: u32,
    /// Length of the second payload, in rows (split sends only).
    pub ext_msg_len: u32,
    /// Length of the response, in rows.
    pub resp_len: u32,
}

impl SendDesc {
    pub fn is_scratch(&self) -> bool {
        matches!(self.msg, MsgKind::ScratchRead | MsgKind::ScratchWrite)
    }
}

/// Instruction opcodes, with per-kind payload where the pass needs it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Op {
    /// Block label; carries no operands.
    Label,
    /// Marks its destination declaration dead.
    PseudoKill,
    Mov,
    Add,
    Send(SendDesc),
    /// Scratch write intrinsic: srcs are `[header, payload]`.
    Spill(ScratchAccess),
    /// Scratch read intrinsic: src is `[header]`, dst receives the rows.
    Fill(ScratchAccess),
}

/// The data backing an [`Inst`] handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstData {
    pub op: Op,
    pub dst: Option<DstRegion>,
    pub srcs: [Option<SrcOperand>; MAX_SRCS],
    pub exec_size: u8,
    pub mask: MaskOption,
    pub loc: SourceLoc,
}

impl InstData {
    pub fn src(&self, i: usize) -> Option<&SrcOperand> {
        self.srcs.get(i).and_then(|s| s.as_ref())
    }

    pub fn is_spill_intrinsic(&self) -> bool {
        matches!(self.op, Op::Spill(_))
    }

    pub fn is_fill_intrinsic(&self) -> bool {
        matches!(self.op, Op::Fill(_))
    }

    pub fn is_send(&self) -> bool {
        matches!(self.op, Op::Send(_))
    }

    pub fn is_split_send(&self) -> bool {
        matches!(self.op, Op::Send(SendDesc { split: true, .. }))
    }

    pub fn is_pseudo_kill(&self) -> bool {
        matches!(self.op, Op::PseudoKill)
    }

    pub fn is_label(&self) -> bool {
        matches!(self.op, Op::Label)
    }

    pub fn is_write_enable(&self) -> bool {
        self.mask.is_write_enable()
    }

    pub fn mask_option(&self) -> MaskOption {
        self.mask
    }

    /// A raw mov copies registers verbatim: no modifier, no accumulator
    /// access, no type conversion, unit destination stride.
    pub fn is_raw_mov(&self) -> bool {
        if !matches!(self.op, Op::Mov) {
            return false;
        }
        let Some(dst) = &self.dst else {
            return false;
        };
        let Some(SrcOperand::Region(src)) = &self.srcs[0] else {
            return false;
        };
        dst.hstride == 1
            && dst.acc_sel == AccRegSel::NoAcc
            && src.modifier == SrcModifier::None
            && src.acc_sel == AccRegSel::NoAcc
            && src.region.is_contiguous()
            && src.ty == dst.ty
    }

    /// Projects `(offset, num_rows)` for either scratch intrinsic arm.
    pub fn scratch_msg_info(&self) -> Result<(u32, u32), GirError> {
        match self.op {
            Op::Spill(access) | Op::Fill(access) => Ok((access.offset, access.num_rows)),
            _ => Err(GirError::NotAScratchAccess),
        }
    }
}

impl fmt::Display for InstData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Op::Label => write!(f, "label"),
            Op::PseudoKill => write!(f, "pseudo_kill ({})", self.exec_size),
            Op::Mov => write!(f, "mov ({})", self.exec_size),
            Op::Add => write!(f, "add ({})", self.exec_size),
            Op::Send(desc) => {
                let name = if desc.split { "sends" } else { "send" };
                write!(f, "{name} ({})", self.exec_size)
            }
            Op::Spill(a) => {
                write!(f, "spill ({}) off={} rows={}", self.exec_size, a.offset, a.num_rows)
            }
            Op::Fill(a) => {
                write!(f, "fill ({}) off={} rows={}", self.exec_size, a.offset, a.num_rows)
            }
        }?;
        if self.mask.is_write_enable() {
            f.write_str(" {NoMask}")?;
        }
        write!(f, " {}", self.loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        operand::{Base, RegionDesc, SrcRegion},
        types::Type,
    };

    fn raw_mov() -> InstData {
        InstData {
            op: Op::Mov,
            dst: Some(DstRegion {
                base: Base::Null,
                row: 0,
                subreg: 0,
                hstride: 1,
                ty: Type::UD,
                acc_sel: AccRegSel::NoAcc,
            }),
            srcs: [
                Some(SrcOperand::Region(SrcRegion {
                    base: Base::Null,
                    row: 0,
                    subreg: 0,
                    region: RegionDesc::stride1(),
                    ty: Type::UD,
                    modifier: SrcModifier::None,
                    acc_sel: AccRegSel::NoAcc,
                })),
                None,
                None,
                None,
            ],
            exec_size: 8,
            mask: MaskOption::WRITE_ENABLE,
            loc: SourceLoc::INVALID,
        }
    }

    #[test]
    fn raw_mov_rejects_conversions_and_modifiers() {
        assert!(raw_mov().is_raw_mov());

        let mut converting = raw_mov();
        converting.dst.as_mut().unwrap().ty = Type::UW;
        assert!(!converting.is_raw_mov());

        let mut negated = raw_mov();
        match negated.srcs[0].as_mut().unwrap() {
            SrcOperand::Region(r) => r.modifier = SrcModifier::Neg,
            _ => unreachable!(),
        }
        assert!(!negated.is_raw_mov());
    }

    #[test]
    fn scratch_info_rejects_other_opcodes() {
        let spill = InstData {
            op: Op::Spill(ScratchAccess { offset: 4, num_rows: 2 }),
            ..raw_mov()
        };
        assert_eq!(spill.scratch_msg_info(), Ok((4, 2)));
        assert_eq!(raw_mov().scratch_msg_info(), Err(GirError::NotAScratchAccess));
    }
}
