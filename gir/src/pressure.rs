use rustc_hash::FxHashMap;

use crate::inst::Inst;

/// Register-pressure oracle, queried per instruction.
///
/// The estimator itself runs before this crate's consumers; passes only
/// observe its answers. Pressure is measured in live GRF rows.
pub trait RegisterPressure {
    fn pressure_at(&self, inst: Inst) -> u32;
}

/// An oracle reporting zero pressure everywhere, for callers without an
/// estimate.
#[derive(Default)]
pub struct ZeroPressure;

impl RegisterPressure for ZeroPressure {
    fn pressure_at(&self, _inst: Inst) -> u32 {
        0
    }
}

/// A table-backed oracle; instructions absent from the table report zero.
#[derive(Default)]
pub struct TablePressure {
    table: FxHashMap<Inst, u32>,
}

impl TablePressure {
    pub fn set(&mut self, inst: Inst, pressure: u32) {
        self.table.insert(inst, pressure);
    }
}

impl RegisterPressure for TablePressure {
    fn pressure_at(&self, inst: Inst) -> u32 {
        self.table.get(&inst).copied().unwrap_or(0)
    }
}
