//! SSA temporaries: the typed result Values of instructions

use super::instruction::InstId;
use super::types::Type;
use std::fmt;

/// Dense identity of an SSA temporary within one compilation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TmpId(pub(crate) u32);

impl TmpId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TmpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A physical register number, assigned by the register allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysReg(pub u8);

/// Where a spilled value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpillInfo {
    /// An extra register class set aside for spills
    Mmx(u8),
    /// A numbered slot in the spill area
    Memory(u32),
}

impl fmt::Display for SpillInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpillInfo::Mmx(n) => write!(f, "mmx{}", n),
            SpillInfo::Memory(slot) => write!(f, "spill[{}]", slot),
        }
    }
}

/// An SSA Value: produced by exactly one instruction, typed once at creation
#[derive(Debug, Clone)]
pub struct SsaTmp {
    id: TmpId,
    inst: InstId,
    ty: Type,
    use_count: u32,
    last_use_id: u32,
    regs: [Option<PhysReg>; 2],
    spill_info: [Option<SpillInfo>; 2],
}

impl SsaTmp {
    pub(crate) fn new(id: TmpId, inst: InstId, ty: Type) -> Self {
        Self {
            id,
            inst,
            ty,
            use_count: 0,
            last_use_id: 0,
            regs: [None; 2],
            spill_info: [None; 2],
        }
    }

    pub fn id(&self) -> TmpId {
        self.id
    }

    /// The producing instruction.
    pub fn inst(&self) -> InstId {
        self.inst
    }

    pub(crate) fn set_inst(&mut self, inst: InstId) {
        self.inst = inst;
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    /// Overwrites the type. Only optimization replay and label joins retype.
    pub fn retype(&mut self, ty: Type) {
        self.ty = ty;
    }

    pub fn is_a(&self, ty: Type) -> bool {
        self.ty.subtype_of(ty)
    }

    pub fn is_boxed(&self) -> bool {
        self.ty.is_boxed()
    }

    pub fn is_string(&self) -> bool {
        self.ty.is_string()
    }

    pub fn is_array(&self) -> bool {
        self.ty.is_array()
    }

    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    pub fn inc_use_count(&mut self) {
        self.use_count += 1;
    }

    pub fn dec_use_count(&mut self) {
        self.use_count = self.use_count.saturating_sub(1);
    }

    pub fn set_use_count(&mut self, count: u32) {
        self.use_count = count;
    }

    /// Linear id of the last instruction reading this value.
    pub fn last_use_id(&self) -> u32 {
        self.last_use_id
    }

    pub fn set_last_use_id(&mut self, id: u32) {
        self.last_use_id = id;
    }

    /// Registers needed to hold this value: one for the payload, plus one for
    /// the runtime type tag when the type isn't known statically.
    pub fn num_needed_regs(&self) -> usize {
        if self.ty == Type::NONE || self.ty.subtype_of(Type::NULL) {
            return 0;
        }
        if self.ty.subtype_of(Type::GEN) && !self.ty.is_statically_known() {
            return 2;
        }
        1
    }

    pub fn reg(&self, index: usize) -> Option<PhysReg> {
        self.regs[index]
    }

    pub fn set_reg(&mut self, index: usize, reg: PhysReg) {
        self.regs[index] = Some(reg);
    }

    pub fn num_allocated_regs(&self) -> usize {
        self.regs.iter().filter(|r| r.is_some()).count()
    }

    pub fn spill_info(&self, index: usize) -> Option<SpillInfo> {
        self.spill_info[index]
    }

    pub fn set_spill_info(&mut self, index: usize, info: SpillInfo) {
        self.spill_info[index] = Some(info);
    }

    pub fn is_spilled(&self) -> bool {
        self.spill_info[0].is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(ty: Type) -> SsaTmp {
        SsaTmp::new(TmpId(0), InstId(0), ty)
    }

    #[test]
    fn test_needed_regs() {
        assert_eq!(tmp(Type::INIT_NULL).num_needed_regs(), 0);
        assert_eq!(tmp(Type::INT).num_needed_regs(), 1);
        assert_eq!(tmp(Type::STR).num_needed_regs(), 1);
        assert_eq!(tmp(Type::CELL).num_needed_regs(), 2);
        assert_eq!(tmp(Type::STK_PTR).num_needed_regs(), 1);
    }

    #[test]
    fn test_spill_and_regs() {
        let mut t = tmp(Type::CELL);
        assert!(!t.is_spilled());
        t.set_spill_info(0, SpillInfo::Memory(3));
        t.set_reg(1, PhysReg(4));
        assert!(t.is_spilled());
        assert_eq!(t.num_allocated_regs(), 1);
        assert_eq!(t.spill_info(0).map(|s| s.to_string()), Some("spill[3]".to_string()));
        assert_eq!(SpillInfo::Mmx(2).to_string(), "mmx2");
    }
}
