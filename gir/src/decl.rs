use cranelift_entity::entity_impl;

/// A handle to a declaration, a symbolic register range of known row count.
///
/// Declarations are the unit of register-allocator bookkeeping; operand
/// regions reference them as their base.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Decl(u32);
entity_impl!(Decl, "dcl");

bitflags::bitflags! {
    /// Allocator-facing properties of a declaration.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct DeclFlags: u8 {
        /// The declaration's address is used by indirect addressing; it can
        /// never be renamed or coalesced.
        const ADDRESS_TAKEN = 1 << 0;
        /// The allocator must not spill this declaration again.
        const DO_NOT_SPILL = 1 << 1;
        /// The declaration must be assigned an even-aligned physical row.
        const EVEN_ALIGN = 1 << 2;
        /// The register allocator already merged this declaration with the
        /// payload of a send; its rows must stay consecutive.
        const ALLOCATOR_COALESCED = 1 << 3;
    }
}

/// How a declaration came to exist.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeclKind {
    /// An ordinary variable created before this pass ran.
    Regular,
    /// A staging payload created when coalescing spills from mixed sources.
    CoalescedSpill,
    /// The widened destination of a coalesced fill.
    CoalescedFill,
    /// A copy created to break a split-send source overlap.
    Copy,
}

/// The data backing a [`Decl`] handle.
#[derive(Debug, Clone)]
pub struct DeclData {
    pub name: String,
    pub num_rows: u32,
    pub kind: DeclKind,
    pub flags: DeclFlags,
}

impl DeclData {
    pub fn new(name: impl Into<String>, num_rows: u32) -> Self {
        Self {
            name: name.into(),
            num_rows,
            kind: DeclKind::Regular,
            flags: DeclFlags::empty(),
        }
    }

    pub fn is_address_taken(&self) -> bool {
        self.flags.contains(DeclFlags::ADDRESS_TAKEN)
    }

    pub fn do_not_spill(&self) -> bool {
        self.flags.contains(DeclFlags::DO_NOT_SPILL)
    }

    pub fn is_even_aligned(&self) -> bool {
        self.flags.contains(DeclFlags::EVEN_ALIGN)
    }

    pub fn is_allocator_coalesced(&self) -> bool {
        self.flags.contains(DeclFlags::ALLOCATOR_COALESCED)
    }

    pub fn set_do_not_spill(&mut self) {
        self.flags |= DeclFlags::DO_NOT_SPILL;
    }

    pub fn set_even_align(&mut self) {
        self.flags |= DeclFlags::EVEN_ALIGN;
    }
}
