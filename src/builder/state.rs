//! Translation-time model of the VM state
//!
//! [`TrackedState`] follows the stack pointer, frame pointer, the stack
//! offset between them and what is known about each local slot while a
//! trace is built. [`TrackedState::update`] is the whole transition table:
//! one arm per opcode that changes something, every other opcode leaves the
//! state alone.

use crate::config::CallingConvention;
use crate::ir::{vector_operands, Instruction, IrFactory, LocalId, Opcode, TmpId, Type, VectorEffects};
use tracing::{debug, trace};

/// What is known about one local slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalState {
    /// Value currently held, if it is available in a temporary
    pub value: Option<TmpId>,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, Default)]
pub struct TrackedState {
    sp: Option<TmpId>,
    fp: Option<TmpId>,
    sp_offset: i32,
    this_available: bool,
    locals: Vec<LocalState>,
}

/// Reads the integer constant in source `index` of `inst`.
pub(crate) fn const_src(factory: &IrFactory, inst: &Instruction, index: usize) -> i64 {
    match factory.int_val(inst.src(index)) {
        Some(v) => v,
        None => panic!(
            "{}: source {} must be an Int constant",
            factory.display(inst),
            index
        ),
    }
}

/// Stack cells a `SpillStack` pushes. Each activation record counts as
/// `act_rec_cells` cells and hides the operands that follow it.
pub(crate) fn spill_value_cells(inst: &Instruction, factory: &IrFactory, conv: &CallingConvention) -> i32 {
    let mut cells = 0;
    let mut i = 2;
    while i < inst.num_srcs() {
        if factory.ty(inst.src(i)) == Type::ACT_REC {
            cells += conv.act_rec_cells;
            i += conv.spill_act_rec_extra_args;
        } else {
            cells += 1;
        }
        i += 1;
    }
    cells
}

impl TrackedState {
    pub fn new(sp_offset: i32) -> Self {
        Self {
            sp_offset,
            ..Self::default()
        }
    }

    pub fn sp(&self) -> Option<TmpId> {
        self.sp
    }

    pub fn fp(&self) -> Option<TmpId> {
        self.fp
    }

    /// Stack pointer offset from the frame pointer, in cells.
    pub fn sp_offset(&self) -> i32 {
        self.sp_offset
    }

    pub fn is_this_available(&self) -> bool {
        self.this_available
    }

    pub fn set_this_available(&mut self) {
        self.this_available = true;
    }

    pub fn locals(&self) -> &[LocalState] {
        &self.locals
    }

    pub fn local_value(&self, id: LocalId) -> Option<TmpId> {
        self.locals.get(id.index()).and_then(|l| l.value)
    }

    pub fn local_type(&self, id: LocalId) -> Option<Type> {
        self.locals.get(id.index()).and_then(|l| l.ty)
    }

    fn slot(&mut self, id: LocalId) -> &mut LocalState {
        if id.index() >= self.locals.len() {
            self.locals.resize(id.index() + 1, LocalState::default());
        }
        &mut self.locals[id.index()]
    }

    fn set_local_value(&mut self, id: LocalId, value: TmpId, ty: Type) {
        *self.slot(id) = LocalState {
            value: Some(value),
            ty: Some(ty),
        };
    }

    /// Narrows the slot's type; the held value is no longer known.
    fn set_local_type(&mut self, id: LocalId, ty: Type) {
        *self.slot(id) = LocalState {
            value: None,
            ty: Some(ty),
        };
    }

    /// Forgets both the value and the type of a slot.
    fn kill_local_value(&mut self, id: LocalId) {
        if let Some(slot) = self.locals.get_mut(id.index()) {
            *slot = LocalState::default();
        }
    }

    pub fn any_local_has_value(&self, tmp: TmpId) -> bool {
        self.locals.iter().any(|l| l.value == Some(tmp))
    }

    /// Retargets every slot holding `old_ref` to `new_ref`.
    fn update_local_ref_values(&mut self, old_ref: TmpId, new_ref: TmpId, new_ty: Type) {
        for slot in self.locals.iter_mut().filter(|l| l.value == Some(old_ref)) {
            slot.value = Some(new_ref);
            slot.ty = Some(new_ty);
        }
    }

    /// Drops local values at a call boundary. Types survive. Slots holding
    /// a `DefConst` keep it; slots holding an `LdConst` get a `DefConst`
    /// copy of it.
    pub(crate) fn kill_locals(&mut self, factory: &mut IrFactory) {
        for slot in &mut self.locals {
            let Some(value) = slot.value else {
                continue;
            };
            match factory.producer(value).op() {
                Opcode::DefConst => {}
                Opcode::LdConst => {
                    let ld = factory.producer(value).clone();
                    let iid = factory.clone_inst(&ld);
                    factory.inst_mut(iid).set_op(Opcode::DefConst);
                    slot.value = factory.inst(iid).dst();
                }
                _ => slot.value = None,
            }
        }
    }

    /// Forgets everything, as before replaying a trace.
    pub(crate) fn clear(&mut self) {
        for slot in &mut self.locals {
            *slot = LocalState::default();
        }
        self.sp = None;
        self.fp = None;
        self.sp_offset = 0;
        self.this_available = false;
    }

    fn adjust_sp_offset(&mut self, delta: i32) {
        self.sp_offset += delta;
        assert!(self.sp_offset >= 0, "stack offset underflow: {}", self.sp_offset);
    }

    /// Applies the effects of a committed instruction. Returns true when the
    /// CSE table must be invalidated.
    pub(crate) fn update(&mut self, inst: &Instruction, factory: &mut IrFactory, conv: &CallingConvention) -> bool {
        let mut kill_cse = false;
        match inst.op() {
            Opcode::Call => {
                self.sp = inst.dst();
                self.adjust_sp_offset(1 - conv.act_rec_cells);
                self.kill_locals(factory);
                kill_cse = true;
                debug!(target: "hhir::state", sp_offset = self.sp_offset, "call kills locals");
            }
            Opcode::ContEnter => {
                self.kill_locals(factory);
                kill_cse = true;
            }
            Opcode::DefFP => self.fp = inst.dst(),
            Opcode::DefSP => {
                self.sp = inst.dst();
                self.sp_offset = const_src(factory, inst, 1) as i32;
            }
            Opcode::AssertStk | Opcode::GuardStk => self.sp = inst.dst(),
            Opcode::SpillStack => {
                self.sp = inst.dst();
                let popped = const_src(factory, inst, 1) as i32;
                self.adjust_sp_offset(spill_value_cells(inst, factory, conv) - popped);
            }
            Opcode::NewObj => {
                self.sp = inst.dst();
                // The new object and its activation record.
                self.adjust_sp_offset(conv.act_rec_cells + 1);
            }
            Opcode::InterpOne => {
                self.sp = inst.dst();
                let popped = const_src(factory, inst, 3) as i32;
                let pushed = i32::from(inst.type_param() != Type::NONE);
                self.adjust_sp_offset(pushed - popped);
            }
            Opcode::StRef | Opcode::StRefNT => {
                if let Some(new_ref) = inst.dst() {
                    let old_ref = inst.src(0);
                    debug_assert!(factory.ty(old_ref).is_boxed());
                    self.update_local_ref_values(old_ref, new_ref, factory.ty(new_ref));
                }
            }
            Opcode::StLoc | Opcode::StLocNT => {
                if let Some(id) = inst.local_id() {
                    let value = inst.src(1);
                    self.set_local_value(id, value, factory.ty(value));
                }
            }
            Opcode::LdLoc => {
                if let (Some(id), Some(dst)) = (inst.local_id(), inst.dst()) {
                    self.set_local_value(id, dst, factory.ty(dst));
                }
            }
            Opcode::AssertLoc | Opcode::GuardLoc => {
                if let Some(id) = inst.local_id() {
                    self.set_local_type(id, inst.type_param());
                }
            }
            Opcode::IterInit | Opcode::IterInitK | Opcode::IterNext | Opcode::IterNextK => {
                // Iterators write the current value (and key) into locals.
                let val_src = match inst.op() {
                    Opcode::IterInit | Opcode::IterInitK => 3,
                    _ => 2,
                };
                self.kill_local_value(LocalId(const_src(factory, inst, val_src) as u32));
                if matches!(inst.op(), Opcode::IterInitK | Opcode::IterNextK) {
                    self.kill_local_value(LocalId(const_src(factory, inst, val_src + 1) as u32));
                }
            }
            Opcode::LdThis => self.this_available = true,
            Opcode::SetProp | Opcode::SetElem => self.update_member_base(inst, factory),
            _ => {}
        }
        trace!(target: "hhir::state", op = %inst.op(), sp_offset = self.sp_offset, "state updated");
        kill_cse
    }

    /// A member write through a pointer base may retype or replace the local
    /// the pointer came from.
    fn update_member_base(&mut self, inst: &Instruction, factory: &IrFactory) {
        let Some((base_idx, _, _)) = vector_operands(inst.op()) else {
            return;
        };
        let base = inst.src(base_idx);
        if !factory.ty(base).is_ptr() {
            return;
        }
        let effects = VectorEffects::for_inst(inst, factory);
        if !effects.base_type_changed && !effects.base_val_changed {
            return;
        }

        let mut origin = base;
        let mut through_box = false;
        loop {
            let producer = factory.producer(origin);
            match producer.op() {
                Opcode::Mov | Opcode::LdAddr => origin = producer.src(0),
                Opcode::UnboxPtr => {
                    through_box = true;
                    origin = producer.src(0);
                }
                _ => break,
            }
        }

        let producer = factory.producer(origin);
        match (producer.op(), producer.local_id()) {
            (Opcode::LdLocAddr, Some(id)) => {
                let new_ty = effects.base_type.deref_if_ptr();
                let new_ty = if through_box {
                    // The write landed in the cell; the local keeps whatever
                    // boxing it had before.
                    let loc_ty = factory.ty(origin).deref();
                    let inner = new_ty.unbox();
                    if loc_ty.is_boxed() {
                        inner.boxed()
                    } else if loc_ty.maybe_boxed() {
                        inner | inner.boxed()
                    } else {
                        inner
                    }
                } else {
                    new_ty
                };
                debug!(target: "hhir::state", local = id.0, ty = %new_ty, "member write retypes local");
                self.set_local_type(id, new_ty);
            }
            _ => {
                // Unknown pointer: any boxed local may share the cell.
                for slot in &mut self.locals {
                    if let Some(ty) = slot.ty.filter(|t| t.maybe_boxed()) {
                        slot.value = None;
                        slot.ty = Some(ty | Type::BOXED_CELL);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen_ir;
    use crate::ir::ConstData;

    fn int_const(factory: &mut IrFactory, v: i64) -> TmpId {
        let iid = gen_ir!(factory, Opcode::DefConst, Type::INT, ConstData::new(v));
        factory.inst(iid).dst().unwrap()
    }

    fn commit(state: &mut TrackedState, factory: &mut IrFactory, iid: crate::ir::InstId) -> bool {
        let inst = factory.inst(iid).clone();
        state.update(&inst, factory, &CallingConvention::default())
    }

    fn frame(state: &mut TrackedState, factory: &mut IrFactory) -> (TmpId, TmpId) {
        let fp = gen_ir!(factory, Opcode::DefFP);
        commit(state, factory, fp);
        let fp = factory.inst(fp).dst().unwrap();
        let zero = int_const(factory, 0);
        let sp = gen_ir!(factory, Opcode::DefSP, fp, zero);
        commit(state, factory, sp);
        (fp, factory.inst(sp).dst().unwrap())
    }

    #[test]
    fn test_frame_and_spill_offsets() {
        let mut factory = IrFactory::with_operand_checks(true);
        let mut state = TrackedState::new(0);
        let (fp, sp) = frame(&mut state, &mut factory);
        assert_eq!(state.fp(), Some(fp));
        assert_eq!(state.sp(), Some(sp));

        let adj = int_const(&mut factory, 1);
        let v = int_const(&mut factory, 5);
        let spill = gen_ir!(factory, Opcode::SpillStack, sp, adj, v, v, v);
        commit(&mut state, &mut factory, spill);
        assert_eq!(state.sp_offset(), 2);
        assert_eq!(state.sp(), factory.inst(spill).dst());
    }

    #[test]
    fn test_local_bindings() {
        let mut factory = IrFactory::with_operand_checks(true);
        let mut state = TrackedState::new(0);
        let (fp, _) = frame(&mut state, &mut factory);
        let v = int_const(&mut factory, 5);
        let st = gen_ir!(factory, Opcode::StLoc, LocalId(2), fp, v);
        commit(&mut state, &mut factory, st);
        assert_eq!(state.local_value(LocalId(2)), Some(v));
        assert_eq!(state.local_type(LocalId(2)), Some(Type::INT));
        assert_eq!(state.local_value(LocalId(0)), None);
        assert!(state.any_local_has_value(v));

        let guard = gen_ir!(factory, Opcode::AssertLoc, Type::STR, LocalId(1), fp);
        commit(&mut state, &mut factory, guard);
        assert_eq!(state.local_type(LocalId(1)), Some(Type::STR));
        assert_eq!(state.local_value(LocalId(1)), None);
    }

    #[test]
    fn test_kill_locals_keeps_constants() {
        let mut factory = IrFactory::with_operand_checks(true);
        let mut state = TrackedState::new(0);
        let (fp, _) = frame(&mut state, &mut factory);
        let def = int_const(&mut factory, 1);
        let ld = gen_ir!(factory, Opcode::LdConst, Type::INT, ConstData::new(2i64));
        let ld = factory.inst(ld).dst().unwrap();
        let loaded = gen_ir!(factory, Opcode::LdLoc, Type::DBL, LocalId(2), fp);
        commit(&mut state, &mut factory, loaded);
        for (i, v) in [def, ld].into_iter().enumerate() {
            let st = gen_ir!(factory, Opcode::StLoc, LocalId(i as u32), fp, v);
            commit(&mut state, &mut factory, st);
        }

        state.kill_locals(&mut factory);
        assert_eq!(state.local_value(LocalId(0)), Some(def));
        let remat = state.local_value(LocalId(1)).unwrap();
        assert_ne!(remat, ld);
        assert_eq!(factory.producer(remat).op(), Opcode::DefConst);
        assert_eq!(factory.int_val(remat), Some(2));
        assert_eq!(state.local_value(LocalId(2)), None);
        assert_eq!(state.local_type(LocalId(2)), Some(Type::DBL));
    }

    #[test]
    fn test_iterators_kill_their_locals() {
        let mut factory = IrFactory::with_operand_checks(true);
        let mut state = TrackedState::new(0);
        let (fp, _) = frame(&mut state, &mut factory);
        let v = int_const(&mut factory, 5);
        for id in [1, 2] {
            let st = gen_ir!(factory, Opcode::StLoc, LocalId(id), fp, v);
            commit(&mut state, &mut factory, st);
        }
        let iter = int_const(&mut factory, 0);
        let val = int_const(&mut factory, 1);
        let key = int_const(&mut factory, 2);
        let next = gen_ir!(factory, Opcode::IterNextK, Type::BOOL, fp, iter, val, key);
        commit(&mut state, &mut factory, next);
        assert_eq!(state.local_value(LocalId(1)), None);
        assert_eq!(state.local_type(LocalId(1)), None);
        assert_eq!(state.local_value(LocalId(2)), None);
    }

    #[test]
    #[should_panic(expected = "stack offset underflow")]
    fn test_offset_never_negative() {
        let mut factory = IrFactory::with_operand_checks(true);
        let mut state = TrackedState::new(0);
        let (_, sp) = frame(&mut state, &mut factory);
        let adj = int_const(&mut factory, 1);
        let spill = gen_ir!(factory, Opcode::SpillStack, sp, adj);
        commit(&mut state, &mut factory, spill);
    }

    #[test]
    fn test_clear() {
        let mut factory = IrFactory::with_operand_checks(true);
        let mut state = TrackedState::new(4);
        frame(&mut state, &mut factory);
        state.set_this_available();
        state.clear();
        assert_eq!(state.sp(), None);
        assert_eq!(state.sp_offset(), 0);
        assert!(!state.is_this_available());
    }
}
