//! IR instructions

use super::extra::{ConstData, ExtraData, LabelData, LocalId, MarkerData};
use super::opcode::{OpFlags, Opcode};
use super::tmp::TmpId;
use super::types::Type;
use std::fmt;

/// Arena identity of a committed instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub(crate) u32);

impl InstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0)
    }
}

/// A control-flow target: the `DefLabel` instruction that starts a trace
/// or a join point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) InstId);

impl Label {
    pub fn inst(self) -> InstId {
        self.0
    }
}

/// Registers live after an instruction, filled in by register allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegSet(u64);

impl RegSet {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, reg: u8) {
        self.0 |= 1 << reg;
    }

    pub fn remove(&mut self, reg: u8) {
        self.0 &= !(1 << reg);
    }

    pub fn contains(&self, reg: u8) -> bool {
        self.0 & (1 << reg) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..64u8).filter(move |r| self.contains(*r))
    }
}

/// One IR operation.
///
/// Instructions built by hand are transient (no `iid`) until the factory
/// clones them into its arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    op: Opcode,
    type_param: Type,
    srcs: Vec<TmpId>,
    dst: Option<TmpId>,
    dsts: Vec<TmpId>,
    extra: Option<ExtraData>,
    taken: Option<Label>,
    iid: Option<InstId>,
    id: u32,
    live_out: RegSet,
}

impl Instruction {
    pub fn new(op: Opcode) -> Self {
        Self {
            op,
            type_param: Type::NONE,
            srcs: Vec::new(),
            dst: None,
            dsts: Vec::new(),
            extra: None,
            taken: None,
            iid: None,
            id: 0,
            live_out: RegSet::new(),
        }
    }

    pub fn op(&self) -> Opcode {
        self.op
    }

    pub fn set_op(&mut self, op: Opcode) {
        self.op = op;
    }

    pub fn type_param(&self) -> Type {
        self.type_param
    }

    pub fn set_type_param(&mut self, ty: Type) {
        self.type_param = ty;
    }

    pub fn srcs(&self) -> &[TmpId] {
        &self.srcs
    }

    pub fn num_srcs(&self) -> usize {
        self.srcs.len()
    }

    pub fn src(&self, index: usize) -> TmpId {
        self.srcs[index]
    }

    pub fn set_src(&mut self, index: usize, tmp: TmpId) {
        self.srcs[index] = tmp;
    }

    pub fn append_src(&mut self, tmp: TmpId) {
        self.srcs.push(tmp);
    }

    pub fn set_srcs(&mut self, srcs: Vec<TmpId>) {
        self.srcs = srcs;
    }

    pub fn dst(&self) -> Option<TmpId> {
        self.dst
    }

    pub fn set_dst(&mut self, dst: Option<TmpId>) {
        self.dst = dst;
    }

    /// Destinations of a label-style instruction.
    pub fn dsts(&self) -> &[TmpId] {
        &self.dsts
    }

    pub fn set_dsts(&mut self, dsts: Vec<TmpId>) {
        self.dsts = dsts;
    }

    pub fn extra(&self) -> Option<&ExtraData> {
        self.extra.as_ref()
    }

    /// Attaches extra data of the shape the opcode expects.
    pub fn set_extra(&mut self, data: ExtraData) {
        assert!(self.extra.is_none(), "{} already has extra data", self.op);
        assert_eq!(
            self.op.extra_kind(),
            Some(data.kind()),
            "{} does not take {:?} extra data",
            self.op,
            data.kind()
        );
        self.extra = Some(data);
    }

    pub fn local_id(&self) -> Option<LocalId> {
        match self.extra {
            Some(ExtraData::Local(id)) => Some(id),
            _ => None,
        }
    }

    pub fn const_data(&self) -> Option<ConstData> {
        match self.extra {
            Some(ExtraData::Const(data)) => Some(data),
            _ => None,
        }
    }

    pub fn marker(&self) -> Option<MarkerData> {
        match self.extra {
            Some(ExtraData::Marker(data)) => Some(data),
            _ => None,
        }
    }

    pub fn label_data(&self) -> Option<LabelData> {
        match self.extra {
            Some(ExtraData::Label(data)) => Some(data),
            _ => None,
        }
    }

    /// Branch target, for control-flow instructions.
    pub fn taken(&self) -> Option<Label> {
        self.taken
    }

    pub fn set_taken(&mut self, label: Option<Label>) {
        self.taken = label;
    }

    pub fn is_control_flow(&self) -> bool {
        self.taken.is_some()
    }

    pub fn iid(&self) -> Option<InstId> {
        self.iid
    }

    pub(crate) fn set_iid(&mut self, iid: InstId) {
        self.iid = Some(iid);
    }

    pub fn is_transient(&self) -> bool {
        self.iid.is_none()
    }

    /// Linear id assigned by instruction numbering.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn live_out_regs(&self) -> RegSet {
        self.live_out
    }

    pub fn set_live_out_regs(&mut self, regs: RegSet) {
        self.live_out = regs;
    }

    /// Turns this instruction into a `Nop` in place.
    pub fn convert_to_nop(&mut self) {
        self.op = Opcode::Nop;
        self.type_param = Type::NONE;
        self.srcs.clear();
        self.extra = None;
        self.taken = None;
    }

    // ==================== Flag queries ====================

    fn has_flags(&self, flags: OpFlags) -> bool {
        self.op.has_flags(flags)
    }

    pub fn has_dst(&self) -> bool {
        self.op.has_dst()
    }

    pub fn nary_dst(&self) -> bool {
        self.op.nary_dst()
    }

    pub fn has_mem_effects(&self) -> bool {
        self.has_flags(OpFlags::MEM_EFFECTS)
    }

    pub fn is_rematerializable(&self) -> bool {
        self.has_flags(OpFlags::REMATERIALIZABLE)
    }

    pub fn is_native(&self) -> bool {
        self.has_flags(OpFlags::CALLS_NATIVE)
    }

    pub fn consumes_references(&self) -> bool {
        self.has_flags(OpFlags::CONSUMES_RC)
    }

    /// Whether this instruction takes ownership of the reference held by
    /// source `src_no`.
    pub fn consumes_reference(&self, src_no: usize) -> bool {
        if !self.consumes_references() {
            return false;
        }
        match self.op {
            Opcode::StRef | Opcode::StRefNT | Opcode::StLoc | Opcode::StLocNT | Opcode::RetVal => {
                src_no == 1
            }
            Opcode::StMem | Opcode::StMemNT | Opcode::StProp | Opcode::StPropNT => src_no == 2,
            Opcode::SpillStack => src_no >= 2,
            Opcode::Call => src_no >= 3,
            Opcode::IterInit | Opcode::IterInitK => src_no == 0,
            Opcode::AddElemStrKey | Opcode::AddElemIntKey => src_no == 0 || src_no == 2,
            _ => true,
        }
    }

    pub fn produces_reference(&self) -> bool {
        self.has_flags(OpFlags::PRODUCES_RC)
    }

    pub fn may_modify_refs(&self) -> bool {
        self.has_flags(OpFlags::MODIFIES_REFS)
    }

    pub fn may_raise_error(&self) -> bool {
        self.has_flags(OpFlags::MAY_RAISE_ERROR)
    }

    /// Essential instructions survive dead-code removal. Control flow is
    /// always essential.
    pub fn is_essential(&self) -> bool {
        self.is_control_flow() || self.has_flags(OpFlags::ESSENTIAL)
    }

    pub fn is_terminal(&self) -> bool {
        self.has_flags(OpFlags::TERMINAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_transient() {
        let inst = Instruction::new(Opcode::OpAdd);
        assert!(inst.is_transient());
        assert_eq!(inst.type_param(), Type::NONE);
        assert!(inst.srcs().is_empty());
        assert!(!inst.is_control_flow());
    }

    #[test]
    fn test_extra_data_shape() {
        let mut inst = Instruction::new(Opcode::LdLoc);
        inst.set_extra(LocalId(2).into());
        assert_eq!(inst.local_id(), Some(LocalId(2)));
        assert_eq!(inst.const_data(), None);
    }

    #[test]
    #[should_panic(expected = "does not take")]
    fn test_extra_data_rejects_wrong_shape() {
        let mut inst = Instruction::new(Opcode::OpAdd);
        inst.set_extra(LocalId(0).into());
    }

    #[test]
    fn test_consumes_reference() {
        let st = Instruction::new(Opcode::StLoc);
        assert!(!st.consumes_reference(0));
        assert!(st.consumes_reference(1));
        let spill = Instruction::new(Opcode::SpillStack);
        assert!(!spill.consumes_reference(1));
        assert!(spill.consumes_reference(2));
        assert!(!Instruction::new(Opcode::OpAdd).consumes_reference(0));
    }

    #[test]
    fn test_convert_to_nop() {
        let mut inst = Instruction::new(Opcode::JmpZero);
        inst.append_src(TmpId(1));
        inst.set_taken(Some(Label(InstId(0))));
        inst.convert_to_nop();
        assert_eq!(inst.op(), Opcode::Nop);
        assert!(inst.srcs().is_empty());
        assert!(!inst.is_essential());
    }

    #[test]
    fn test_reg_set() {
        let mut regs = RegSet::new();
        regs.insert(3);
        regs.insert(12);
        assert_eq!(regs.len(), 2);
        assert_eq!(regs.iter().collect::<Vec<_>>(), vec![3, 12]);
        regs.remove(3);
        assert!(!regs.contains(3));
    }
}
