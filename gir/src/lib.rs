//! Linear machine IR for the genc shader back-end.
//!
//! This crate models the post-register-allocation view of a Gen-style GPU
//! shader: declarations (symbolic register ranges), instructions with rich
//! operand regions, basic blocks laid out as linked lists over per-function
//! arenas, and the scratch-message metadata carried by spill/fill intrinsics.
//!
//! Everything is stored in [`cranelift_entity`] arenas and addressed through
//! stable entity handles; instructions detached from the layout remain in the
//! arena until the function is dropped, so handles never dangle.

mod block;
mod builder;
mod decl;
mod function;
mod inst;
mod message;
mod operand;
mod pressure;
mod types;

pub use rustc_hash::{FxHashMap, FxHashSet};
pub use smallvec::SmallVec;

pub use self::{
    block::{Block, BlockData, BlockInsts, Layout},
    builder::IrBuilder,
    decl::{Decl, DeclData, DeclFlags, DeclKind},
    function::{Function, FunctionDisplay},
    inst::{
        Inst, InstData, MsgKind, Op, ScratchAccess, SendDesc, MAX_SRCS,
    },
    message::{encode_fill_desc, encode_spill_desc},
    operand::{
        AccRegSel, Base, DstRegion, MaskOption, RegionDesc, SrcModifier, SrcOperand, SrcRegion,
    },
    pressure::{RegisterPressure, TablePressure, ZeroPressure},
    types::{SourceLoc, Type, GRF_REG_BYTES, GRF_REG_DWORDS},
};

/// Errors raised by IR helpers and transformations.
///
/// Every variant is a programmer contract violation; none is recoverable.
/// A pass that observes one aborts compilation of the shader.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GirError {
    /// A scratch payload size was computed that the hardware cannot encode.
    #[error("unsupported scratch payload size: {0} rows")]
    UnsupportedPayloadSize(u32),
    /// Scratch message info was queried on an instruction that is neither a
    /// spill nor a fill intrinsic.
    #[error("scratch message info queried on a non-scratch instruction")]
    NotAScratchAccess,
}
