use crate::{
    decl::Decl,
    types::{Type, GRF_REG_BYTES},
};

/// The base register of an operand region.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Base {
    /// A reference to a declaration.
    Decl(Decl),
    /// The null register; writes are discarded, reads are undefined.
    Null,
}

impl Base {
    /// The declaration this base references, if any.
    pub fn decl(&self) -> Option<Decl> {
        match self {
            Self::Decl(d) => Some(*d),
            Self::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A `<vstride; width, hstride>` source region descriptor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegionDesc {
    pub vstride: u8,
    pub width: u8,
    pub hstride: u8,
}

impl RegionDesc {
    /// The contiguous unit-stride region, `<8;8,1>`.
    pub const fn stride1() -> Self {
        Self {
            vstride: 8,
            width: 8,
            hstride: 1,
        }
    }

    /// The scalar broadcast region, `<0;1,0>`.
    pub const fn scalar() -> Self {
        Self {
            vstride: 0,
            width: 1,
            hstride: 0,
        }
    }

    /// Whether consecutive lanes read consecutive elements.
    pub fn is_contiguous(&self) -> bool {
        self.hstride == 1 && self.vstride == self.width
    }
}

/// Source operand modifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SrcModifier {
    #[default]
    None,
    Neg,
    Abs,
    NegAbs,
}

/// Accumulator-register select; preserved verbatim by every operand rewrite.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum AccRegSel {
    #[default]
    NoAcc,
    Acc(u8),
}

bitflags::bitflags! {
    /// Lane predication control of an instruction: quarter/half control bits
    /// plus the write-enable (NoMask) flag.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct MaskOption: u16 {
        const Q1 = 1 << 0;
        const Q2 = 1 << 1;
        const Q3 = 1 << 2;
        const Q4 = 1 << 3;
        const H1 = 1 << 4;
        const H2 = 1 << 5;
        /// NoMask: lane predication is disabled entirely.
        const WRITE_ENABLE = 1 << 6;
    }
}

impl MaskOption {
    /// All quarter/half control bits, excluding write-enable.
    pub const QUARTER_MASKS: Self = Self::Q1
        .union(Self::Q2)
        .union(Self::Q3)
        .union(Self::Q4)
        .union(Self::H1)
        .union(Self::H2);

    pub fn is_write_enable(&self) -> bool {
        self.contains(Self::WRITE_ENABLE)
    }

    /// The quarter-control bits with write-enable stripped.
    pub fn quarter_bits(&self) -> Self {
        *self & Self::QUARTER_MASKS
    }
}

/// A source register region: base, row offset, subregister offset, region
/// descriptor, element type, modifier, and accumulator select.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SrcRegion {
    pub base: Base,
    pub row: u32,
    pub subreg: u32,
    pub region: RegionDesc,
    pub ty: Type,
    pub modifier: SrcModifier,
    pub acc_sel: AccRegSel,
}

impl SrcRegion {
    /// The declaration referenced by this region's base, if any.
    pub fn top_decl(&self) -> Option<Decl> {
        self.base.decl()
    }

    /// First byte of the region within its declaration.
    pub fn left_bound(&self) -> u32 {
        self.row * GRF_REG_BYTES + self.subreg * self.ty.size_in_bytes()
    }

    /// Last byte (inclusive) touched when read at `exec_size` lanes.
    pub fn right_bound(&self, exec_size: u8) -> u32 {
        let elem = self.ty.size_in_bytes();
        if self.region.is_contiguous() {
            self.left_bound() + exec_size as u32 * elem - 1
        } else {
            // Strided reads end at the last lane's element.
            let lanes = exec_size.max(1) as u32;
            self.left_bound() + (lanes - 1) * self.region.hstride as u32 * elem + elem - 1
        }
    }

    /// Closed interval of GRF rows covered when read at `exec_size` lanes.
    pub fn row_span(&self, exec_size: u8) -> (u32, u32) {
        (
            self.left_bound() / GRF_REG_BYTES,
            self.right_bound(exec_size) / GRF_REG_BYTES,
        )
    }

    /// Whether the region begins on a row boundary.
    pub fn is_row_aligned(&self) -> bool {
        self.left_bound() % GRF_REG_BYTES == 0
    }
}

/// A destination register region.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DstRegion {
    pub base: Base,
    pub row: u32,
    pub subreg: u32,
    pub hstride: u8,
    pub ty: Type,
    pub acc_sel: AccRegSel,
}

impl DstRegion {
    pub fn top_decl(&self) -> Option<Decl> {
        self.base.decl()
    }

    pub fn left_bound(&self) -> u32 {
        self.row * GRF_REG_BYTES + self.subreg * self.ty.size_in_bytes()
    }

    pub fn right_bound(&self, exec_size: u8) -> u32 {
        let elem = self.ty.size_in_bytes();
        let lanes = exec_size.max(1) as u32;
        self.left_bound() + (lanes - 1) * self.hstride.max(1) as u32 * elem + elem - 1
    }

    pub fn row_span(&self, exec_size: u8) -> (u32, u32) {
        (
            self.left_bound() / GRF_REG_BYTES,
            self.right_bound(exec_size) / GRF_REG_BYTES,
        )
    }
}

/// A source operand: a register region or an immediate.
///
/// Rewrites keyed on declarations skip immediates silently; valid IR permits
/// operands that cannot match a substitution.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SrcOperand {
    Region(SrcRegion),
    Imm { value: i64, ty: Type },
}

impl SrcOperand {
    pub fn top_decl(&self) -> Option<Decl> {
        match self {
            Self::Region(r) => r.top_decl(),
            Self::Imm { .. } => None,
        }
    }

    pub fn as_region(&self) -> Option<&SrcRegion> {
        match self {
            Self::Region(r) => Some(r),
            Self::Imm { .. } => None,
        }
    }
}
